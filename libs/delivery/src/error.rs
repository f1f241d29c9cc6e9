use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("metrics data item `{0}` is not configured")]
    MissingMetricsDataItem(String),
}
