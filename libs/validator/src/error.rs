use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("data item `{0}` has no known controlled vocabulary entry")]
    UnknownType(String),
}
