use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolylocError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing file: {0}")]
    MissingFile(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("degenerate result: {0}")]
    DegenerateResult(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PolylocError>;
