use contract::Representation;
use dashmap::DashMap;
use pipeline::{Frame, Guard, GuardResult, PipelineContext, Transform};
use std::sync::Arc;

/// Drops a `Sample` observation unless it differs from the last forwarded
/// value by at least the data item's `minimumDelta` (§4.5.2). Forwards
/// unchanged anything else (a data item with no configured delta, or a
/// non-scalar value).
pub struct DeltaFilter {
    context: Arc<PipelineContext>,
}

impl DeltaFilter {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        DeltaFilter { context }
    }

    fn last_values(&self) -> Arc<DashMap<String, f64>> {
        self.context.state("delta_filter_last", DashMap::new)
    }
}

impl Transform<Frame> for DeltaFilter {
    fn name(&self) -> &str {
        "delta_filter"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Observation(_) => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        let obs = match input {
            Frame::Observation(obs) => obs,
            other => return Some(other),
        };

        if obs.is_orphaned() {
            self.last_values().remove(&obs.data_item_id);
            return None;
        }
        if obs.unavailable {
            self.last_values().remove(&obs.data_item_id);
            return Some(Frame::Observation(obs));
        }

        let value = match obs.sample_value() {
            Some(v) => v,
            None => return Some(Frame::Observation(obs)),
        };

        let device = obs.device.clone().unwrap_or_default();
        let min_delta = self
            .context
            .contract()
            .find_data_item(&device, &obs.data_item_id)
            .filter(|d| d.representation == Representation::Value)
            .and_then(|d| d.minimum_delta);

        let Some(delta) = min_delta else {
            return Some(Frame::Observation(obs));
        };

        let last_values = self.last_values();
        let passes = match last_values.get(&obs.data_item_id) {
            None => true,
            Some(last) => (value - *last).abs() >= delta,
        };

        if passes {
            last_values.insert(obs.data_item_id.clone(), value);
            Some(Frame::Observation(obs))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract::{Category, Contract, DataItemDescriptor, Device};
    use entity::{DataItemHandle, Observation, ObservationValue};

    struct FakeContract {
        delta: Option<f64>,
    }

    impl Contract for FakeContract {
        fn find_device(&self, _: &str) -> Option<Device> {
            None
        }
        fn find_data_item(&self, _: &str, id: &str) -> Option<Arc<DataItemDescriptor>> {
            Some(Arc::new(DataItemDescriptor {
                handle: Arc::new(DataItemHandle { id: id.to_string() }),
                name: None,
                category: Category::Sample,
                data_type: "GENERIC".into(),
                sub_type: None,
                units: None,
                representation: Representation::Value,
                minimum_delta: self.delta,
                minimum_period: None,
                reset_trigger: None,
                constant_value: None,
                conversion_required: false,
            }))
        }
        fn each_data_item(&self, _: &mut dyn FnMut(&DataItemDescriptor)) {}
        fn schema_version(&self) -> i32 {
            200
        }
        fn is_validating(&self) -> bool {
            true
        }
        fn deliver_observation(&self, _: Observation) {}
        fn deliver_asset(&self, _: entity::Asset) {}
        fn deliver_devices(&self, _: Vec<Device>) {}
        fn deliver_device(&self, _: Device) {}
        fn deliver_asset_command(&self, _: entity::Entity) {}
        fn deliver_command(&self, _: entity::Entity) {}
        fn deliver_connect_status(&self, _: entity::Entity, _: Vec<Device>, _: bool) {}
        fn source_failed(&self, _: &str) {}
        fn check_duplicate(&self, obs: &Observation) -> Option<Observation> {
            Some(obs.clone())
        }
    }

    fn obs(handle: &Arc<DataItemHandle>, value: f64) -> Observation {
        Observation {
            data_item_id: handle.id.clone(),
            data_item: Arc::downgrade(handle),
            device: None,
            timestamp: chrono::Utc::now(),
            duration: None,
            unavailable: false,
            sequence: None,
            quality: None,
            deprecated: false,
            reset_triggered: None,
            value: ObservationValue::Sample(value),
        }
    }

    #[test]
    fn exact_delta_boundary_passes() {
        let contract = Arc::new(FakeContract { delta: Some(2.0) });
        let context = Arc::new(PipelineContext::new(contract));
        let filter = DeltaFilter::new(context);
        let handle = Arc::new(DataItemHandle { id: "x".into() });

        assert!(filter.apply(Frame::Observation(obs(&handle, 10.0))).is_some());
        // Exactly last + delta: strict-inequality boundary passes.
        assert!(filter.apply(Frame::Observation(obs(&handle, 12.0))).is_some());
        // Within delta: dropped.
        assert!(filter.apply(Frame::Observation(obs(&handle, 13.0))).is_none());
    }
}
