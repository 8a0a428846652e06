use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Model loading error: {0}")]
    ModelLoad(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "tensorflow")]
impl From<tensorflow::Status> for Error {
    fn from(status: tensorflow::Status) -> Self {
        Error::Inference(status.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
