//! The externally-supplied, read-only data-item dictionary and the narrow
//! `Contract` interface the pipeline calls to resolve data items and deliver
//! results. This crate has no pipeline logic of its own; it is the seam an
//! agent implementation plugs into.

pub mod device;
pub mod error;

pub use device::{
    Category, Category::*, Device, DataItemDescriptor, Representation, Representation::*,
};
pub use error::ContractError;

use entity::{Asset, DataItemHandle, Entity, Observation};
use std::sync::Arc;

/// Narrow interface the pipeline calls; implemented by the agent process
/// that owns the device model, observation buffer, and asset store.
pub trait Contract: Send + Sync {
    fn find_device(&self, name_or_uuid: &str) -> Option<Device>;
    fn find_data_item(&self, device: &str, name_or_id: &str) -> Option<Arc<DataItemDescriptor>>;
    fn each_data_item(&self, f: &mut dyn FnMut(&DataItemDescriptor));

    /// Encoded `major*100+minor`.
    fn schema_version(&self) -> i32;
    fn is_validating(&self) -> bool;

    fn deliver_observation(&self, obs: Observation);
    fn deliver_asset(&self, asset: Asset);
    fn deliver_devices(&self, devices: Vec<Device>);
    fn deliver_device(&self, device: Device);
    fn deliver_asset_command(&self, command: Entity);
    fn deliver_command(&self, command: Entity);
    fn deliver_connect_status(&self, status: Entity, devices: Vec<Device>, auto_available: bool);

    fn source_failed(&self, identity: &str);

    /// Returns `Some(obs)` (possibly with a subsetted VALUE for data sets)
    /// if not a full duplicate, or `None` if the observation is a complete
    /// duplicate of the last forwarded value for its data item.
    fn check_duplicate(&self, obs: &Observation) -> Option<Observation>;
}

/// Constructs the weak-reference handle an [`Observation`] points at.
pub fn handle_for(id: impl Into<String>) -> Arc<DataItemHandle> {
    Arc::new(DataItemHandle { id: id.into() })
}
