use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("unknown device `{0}`")]
    UnknownDevice(String),
    #[error("unknown data item `{0}` on device `{1}`")]
    UnknownDataItem(String, String),
}
