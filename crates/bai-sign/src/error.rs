#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("unsupported hash type: {0}")]
    UnknownHashType(String),
}

pub type Result<T> = std::result::Result<T, SignError>;
