use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetsiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid capacity {value} for table {table}: must be greater than zero")]
    InvalidCapacity { table: &'static str, value: usize },

    #[error("Invalid frame on line {line}: {reason}")]
    InvalidFrame { line: usize, reason: String },

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<prometheus::Error> for NetsiftError {
    fn from(err: prometheus::Error) -> Self {
        NetsiftError::Metrics(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NetsiftError>;
