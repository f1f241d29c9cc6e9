use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("data item `{0}` has no recorded previous value")]
    NoBaseline(String),
}
