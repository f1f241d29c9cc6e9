use contract::Contract;
use entity::{AssetCommand, Entity};
use pipeline::{Frame, Guard, GuardResult, Transform};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Forwards observations to `contract.deliver_observation` and counts them
/// for the companion [`crate::ComputeMetrics`] timer (§4.7).
pub struct DeliverObservation {
    contract: Arc<dyn Contract>,
    counter: Arc<AtomicU64>,
}

impl DeliverObservation {
    pub fn new(contract: Arc<dyn Contract>) -> Self {
        DeliverObservation {
            contract,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle read by a [`crate::ComputeMetrics`] wired to this stage.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.counter.clone()
    }
}

impl Transform<Frame> for DeliverObservation {
    fn name(&self) -> &str {
        "deliver_observation"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Observation(_) | Frame::ObservationBatch(_) => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::Observation(obs) => {
                self.contract.deliver_observation(obs.clone());
                self.counter.fetch_add(1, Ordering::Relaxed);
                Some(Frame::Observation(obs))
            }
            Frame::ObservationBatch(batch) => {
                for obs in &batch {
                    self.contract.deliver_observation(obs.clone());
                }
                self.counter.fetch_add(batch.len() as u64, Ordering::Relaxed);
                Some(Frame::ObservationBatch(batch))
            }
            other => Some(other),
        }
    }
}

/// Forwards assets to `contract.deliver_asset`, counted the same way.
pub struct DeliverAsset {
    contract: Arc<dyn Contract>,
    counter: Arc<AtomicU64>,
}

impl DeliverAsset {
    pub fn new(contract: Arc<dyn Contract>) -> Self {
        DeliverAsset {
            contract,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        self.counter.clone()
    }
}

impl Transform<Frame> for DeliverAsset {
    fn name(&self) -> &str {
        "deliver_asset"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Asset(_) => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::Asset(asset) => {
                self.contract.deliver_asset(asset.clone());
                self.counter.fetch_add(1, Ordering::Relaxed);
                Some(Frame::Asset(asset))
            }
            other => Some(other),
        }
    }
}

/// Forwards non-observation control entities to their `Contract` methods
/// (§4.7), one transform per frame kind.
pub struct DeliverConnectionStatus {
    contract: Arc<dyn Contract>,
}

impl DeliverConnectionStatus {
    pub fn new(contract: Arc<dyn Contract>) -> Self {
        DeliverConnectionStatus { contract }
    }
}

impl Transform<Frame> for DeliverConnectionStatus {
    fn name(&self) -> &str {
        "deliver_connection_status"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::ConnectStatus { .. } => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::ConnectStatus {
                status,
                devices,
                auto_available,
            } => {
                self.contract
                    .deliver_connect_status(status.clone(), devices.clone(), auto_available);
                Some(Frame::ConnectStatus {
                    status,
                    devices,
                    auto_available,
                })
            }
            other => Some(other),
        }
    }
}

pub struct DeliverAssetCommand {
    contract: Arc<dyn Contract>,
}

impl DeliverAssetCommand {
    pub fn new(contract: Arc<dyn Contract>) -> Self {
        DeliverAssetCommand { contract }
    }
}

impl Transform<Frame> for DeliverAssetCommand {
    fn name(&self) -> &str {
        "deliver_asset_command"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::AssetCommand(_) => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::AssetCommand(cmd) => {
                let entity = asset_command_to_entity(&cmd);
                self.contract.deliver_asset_command(entity);
                Some(Frame::AssetCommand(cmd))
            }
            other => Some(other),
        }
    }
}

fn asset_command_to_entity(cmd: &AssetCommand) -> Entity {
    let mut entity = Entity::new("AssetCommand");
    match cmd {
        AssetCommand::RemoveAll { asset_type } => {
            entity.set("command", entity::Value::String("REMOVE_ALL_ASSETS".into()));
            if let Some(t) = asset_type {
                entity.set("assetType", entity::Value::String(t.clone()));
            }
        }
        AssetCommand::RemoveAsset { asset_id } => {
            entity.set("command", entity::Value::String("REMOVE_ASSET".into()));
            entity.set("assetId", entity::Value::String(asset_id.clone()));
        }
    }
    entity
}

pub struct DeliverCommand {
    contract: Arc<dyn Contract>,
}

impl DeliverCommand {
    pub fn new(contract: Arc<dyn Contract>) -> Self {
        DeliverCommand { contract }
    }
}

impl Transform<Frame> for DeliverCommand {
    fn name(&self) -> &str {
        "deliver_command"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Command(_) => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::Command(entity) => {
                self.contract.deliver_command(entity.clone());
                Some(Frame::Command(entity))
            }
            other => Some(other),
        }
    }
}

pub struct DeliverDevice {
    contract: Arc<dyn Contract>,
}

impl DeliverDevice {
    pub fn new(contract: Arc<dyn Contract>) -> Self {
        DeliverDevice { contract }
    }
}

impl Transform<Frame> for DeliverDevice {
    fn name(&self) -> &str {
        "deliver_device"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Device(_) | Frame::Devices(_) => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::Device(device) => {
                self.contract.deliver_device(device.clone());
                Some(Frame::Device(device))
            }
            Frame::Devices(devices) => {
                self.contract.deliver_devices(devices.clone());
                Some(Frame::Devices(devices))
            }
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract::{Device, DataItemDescriptor};
    use entity::{DataItemHandle, Observation, ObservationValue};
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    struct FakeContract {
        delivered: Mutex<Vec<Observation>>,
    }

    impl Contract for FakeContract {
        fn find_device(&self, _: &str) -> Option<Device> {
            None
        }
        fn find_data_item(&self, _: &str, _: &str) -> Option<Arc<DataItemDescriptor>> {
            None
        }
        fn each_data_item(&self, _: &mut dyn FnMut(&DataItemDescriptor)) {}
        fn schema_version(&self) -> i32 {
            200
        }
        fn is_validating(&self) -> bool {
            true
        }
        fn deliver_observation(&self, obs: Observation) {
            self.delivered.lock().unwrap().push(obs);
        }
        fn deliver_asset(&self, _: entity::Asset) {}
        fn deliver_devices(&self, _: Vec<Device>) {}
        fn deliver_device(&self, _: Device) {}
        fn deliver_asset_command(&self, _: Entity) {}
        fn deliver_command(&self, _: Entity) {}
        fn deliver_connect_status(&self, _: Entity, _: Vec<Device>, _: bool) {}
        fn source_failed(&self, _: &str) {}
        fn check_duplicate(&self, obs: &Observation) -> Option<Observation> {
            Some(obs.clone())
        }
    }

    #[test]
    fn delivering_an_observation_increments_the_counter() {
        let contract = Arc::new(FakeContract {
            delivered: Mutex::new(Vec::new()),
        });
        let stage = DeliverObservation::new(contract.clone());
        let handle = Arc::new(DataItemHandle { id: "x".into() });
        let obs = Observation {
            data_item_id: "x".into(),
            data_item: Arc::downgrade(&handle),
            device: None,
            timestamp: chrono::Utc::now(),
            duration: None,
            unavailable: false,
            sequence: None,
            quality: None,
            deprecated: false,
            reset_triggered: None,
            value: ObservationValue::Sample(1.0),
        };

        let out = stage.apply(Frame::Observation(obs));
        assert!(out.is_some());
        assert_eq!(stage.counter().load(Ordering::Relaxed), 1);
        assert_eq!(contract.delivered.lock().unwrap().len(), 1);
    }
}
