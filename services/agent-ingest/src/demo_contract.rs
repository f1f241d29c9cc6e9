use contract::{Category, Contract, DataItemDescriptor, Device, Representation};
use dashmap::DashMap;
use entity::{Asset, DataItemHandle, Entity, Observation};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// A minimal in-process `Contract` for running the demo binary: an
/// in-memory device model plus logging "sinks". The real observation
/// buffer, asset store, and device registry are external collaborators
/// (§1 non-goals) — this stands in for them so `agent-ingest` has
/// something to wire the pipeline against.
pub struct DemoContract {
    devices: DashMap<String, Device>,
    data_items: DashMap<(String, String), Arc<DataItemDescriptor>>,
    last_values: DashMap<String, String>,
    schema_version: AtomicI32,
    sequence: AtomicU64,
}

impl DemoContract {
    pub fn new(schema_version: i32) -> Self {
        DemoContract {
            devices: DashMap::new(),
            data_items: DashMap::new(),
            last_values: DashMap::new(),
            schema_version: AtomicI32::new(schema_version),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn add_device(&self, device: Device) {
        self.devices.insert(device.id.clone(), device);
    }

    /// Registers a data item under both its id and (if present) its name,
    /// so `find_data_item` can resolve either the way the wire formats do.
    pub fn add_data_item(&self, device: &str, descriptor: DataItemDescriptor) {
        let descriptor = Arc::new(descriptor);
        if let Some(name) = &descriptor.name {
            self.data_items
                .insert((device.to_string(), name.clone()), descriptor.clone());
        }
        self.data_items
            .insert((device.to_string(), descriptor.id().to_string()), descriptor);
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl Contract for DemoContract {
    fn find_device(&self, name_or_uuid: &str) -> Option<Device> {
        if let Some(device) = self.devices.get(name_or_uuid) {
            return Some(device.clone());
        }
        self.devices
            .iter()
            .find(|entry| entry.name == name_or_uuid || entry.uuid == name_or_uuid)
            .map(|entry| entry.clone())
    }

    fn find_data_item(&self, device: &str, name_or_id: &str) -> Option<Arc<DataItemDescriptor>> {
        self.data_items
            .get(&(device.to_string(), name_or_id.to_string()))
            .map(|entry| entry.clone())
    }

    fn each_data_item(&self, f: &mut dyn FnMut(&DataItemDescriptor)) {
        for entry in self.data_items.iter() {
            f(entry.value());
        }
    }

    fn schema_version(&self) -> i32 {
        self.schema_version.load(Ordering::Relaxed)
    }

    fn is_validating(&self) -> bool {
        true
    }

    fn deliver_observation(&self, mut obs: Observation) {
        obs.sequence = Some(self.next_sequence());
        info!(data_item = %obs.data_item_id, device = ?obs.device, value = ?obs.value, "observation delivered");
    }

    fn deliver_asset(&self, asset: Asset) {
        info!(asset_id = %asset.asset_id, asset_type = %asset.asset_type, "asset delivered");
    }

    fn deliver_devices(&self, devices: Vec<Device>) {
        for device in devices {
            self.add_device(device);
        }
    }

    fn deliver_device(&self, device: Device) {
        info!(id = %device.id, "device delivered");
        self.add_device(device);
    }

    fn deliver_asset_command(&self, command: Entity) {
        info!(?command, "asset command delivered");
    }

    fn deliver_command(&self, command: Entity) {
        info!(?command, "command delivered");
    }

    fn deliver_connect_status(&self, status: Entity, devices: Vec<Device>, auto_available: bool) {
        info!(?status, device_count = devices.len(), auto_available, "connection status delivered");
    }

    fn source_failed(&self, identity: &str) {
        tracing::error!(identity, "upstream source reported failed");
    }

    fn check_duplicate(&self, obs: &Observation) -> Option<Observation> {
        if obs.is_orphaned() {
            return None;
        }
        let repr = format!("{:?}", obs.value);
        let changed = self
            .last_values
            .insert(obs.data_item_id.clone(), repr.clone())
            .map(|previous| previous != repr)
            .unwrap_or(true);
        if changed {
            Some(obs.clone())
        } else {
            None
        }
    }
}

/// Builds a placeholder data-item handle for descriptors seeded outside the
/// pipeline (demo devices have no upstream-issued handle to reuse).
pub fn handle(id: impl Into<String>) -> Arc<DataItemHandle> {
    Arc::new(DataItemHandle { id: id.into() })
}
