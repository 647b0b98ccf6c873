pub mod chroma;
pub mod edges;
pub mod ela;
pub mod region_metrics;
