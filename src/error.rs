use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Image decoding error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Decoded image contains no pixels")]
    EmptyImage,

    #[error("Image encoding error: {0}")]
    Encode(image::ImageError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Saliency inference failed: {0}")]
    SaliencyInference(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
