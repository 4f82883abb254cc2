use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reference property '{key}' must carry a string uid")]
    NotStringValue { key: String },

    #[error("malformed reference key '{0}'")]
    InvalidReferenceKey(String),

    #[error("property '{0}' appears more than once")]
    DuplicateProperty(String),
}
