use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShdrError {
    #[error("malformed timestamp token `{0}`")]
    BadTimestamp(String),
    #[error("unresolved data item `{0}`")]
    UnresolvedDataItem(String),
    #[error("conversion failed for data item `{id}`: {reason}")]
    ConversionFailed { id: String, reason: String },
}
