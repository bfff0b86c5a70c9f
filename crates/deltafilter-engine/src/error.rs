use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Unknown rate unit: {0:?}")]
    UnknownRateUnit(String),
    #[error("Config deserialization failed: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FilterError>;
