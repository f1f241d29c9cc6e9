//! Terminal delivery transforms and the metrics timer that rides alongside
//! them (§4.7).

pub mod deliver;
pub mod error;
pub mod metrics;

pub use deliver::{
    DeliverAsset, DeliverAssetCommand, DeliverCommand, DeliverConnectionStatus, DeliverDevice,
    DeliverObservation,
};
pub use error::DeliveryError;
pub use metrics::ComputeMetrics;
