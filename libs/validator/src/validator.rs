use crate::vocabulary::VOCABULARY;
use entity::{ObservationValue, Quality};
use pipeline::{Frame, Guard, GuardResult, PipelineContext, Transform};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{trace, warn};

/// Tags each observation with a `Quality` and, for deprecated controlled
/// vocabulary values, a `deprecated` flag (§4.6). A no-op (no `quality`
/// attached) when `contract.is_validating()` is `false`.
pub struct Validator {
    context: Arc<PipelineContext>,
    warned: Mutex<HashSet<String>>,
}

impl Validator {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Validator {
            context,
            warned: Mutex::new(HashSet::new()),
        }
    }

    fn warn_invalid_once(&self, id: &str) {
        let mut warned = self.warned.lock().unwrap();
        if warned.insert(id.to_string()) {
            warn!(id, "invalid observation");
        } else {
            trace!(id, "invalid observation (repeat)");
        }
    }
}

impl Transform<Frame> for Validator {
    fn name(&self) -> &str {
        "validator"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Observation(_) => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        let mut obs = match input {
            Frame::Observation(obs) => obs,
            other => return Some(other),
        };

        if !self.context.contract().is_validating() {
            return Some(Frame::Observation(obs));
        }

        if obs.unavailable {
            obs.quality = Some(Quality::Valid);
            return Some(Frame::Observation(obs));
        }

        let schema_version = self.context.contract().schema_version();
        let device = obs.device.clone().unwrap_or_default();
        let descriptor = self.context.contract().find_data_item(&device, &obs.data_item_id);

        let quality = match &obs.value {
            ObservationValue::DataSetEvent { .. } | ObservationValue::TableEvent { .. } => {
                Quality::Valid
            }
            ObservationValue::Sample(v) if v.is_nan() => Quality::Invalid,
            ObservationValue::Sample(_) => Quality::Valid,
            ObservationValue::Event(entity::Value::String(value)) => {
                let data_type = descriptor.as_ref().map(|d| d.data_type.as_str());
                match data_type.and_then(|t| VOCABULARY.get(t)) {
                    None => Quality::Unverifiable,
                    Some(values) => match values.get(value.as_str()) {
                        None => Quality::Invalid,
                        Some((introduced, deprecated)) => {
                            if introduced.map_or(false, |i| i > schema_version) {
                                Quality::Invalid
                            } else if deprecated.map_or(false, |d| d <= schema_version) {
                                obs.deprecated = true;
                                Quality::Valid
                            } else {
                                Quality::Valid
                            }
                        }
                    },
                }
            }
            _ => Quality::Valid,
        };

        if quality == Quality::Invalid {
            self.warn_invalid_once(&obs.data_item_id);
        }
        obs.quality = Some(quality);
        Some(Frame::Observation(obs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract::{Category, Contract, DataItemDescriptor, Device, Representation};
    use entity::{DataItemHandle, Observation, Value};
    use std::sync::Arc as StdArc;

    struct FakeContract {
        schema_version: i32,
        data_type: String,
    }

    impl Contract for FakeContract {
        fn find_device(&self, _: &str) -> Option<Device> {
            None
        }
        fn find_data_item(&self, _: &str, id: &str) -> Option<StdArc<DataItemDescriptor>> {
            Some(StdArc::new(DataItemDescriptor {
                handle: StdArc::new(DataItemHandle { id: id.to_string() }),
                name: None,
                category: Category::Event,
                data_type: self.data_type.clone(),
                sub_type: None,
                units: None,
                representation: Representation::Value,
                minimum_delta: None,
                minimum_period: None,
                reset_trigger: None,
                constant_value: None,
                conversion_required: false,
            }))
        }
        fn each_data_item(&self, _: &mut dyn FnMut(&DataItemDescriptor)) {}
        fn schema_version(&self) -> i32 {
            self.schema_version
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

    fn event_obs(handle: &StdArc<DataItemHandle>, value: &str) -> Observation {
        Observation {
            data_item_id: handle.id.clone(),
            data_item: StdArc::downgrade(handle),
            device: None,
            timestamp: chrono::Utc::now(),
            duration: None,
            unavailable: false,
            sequence: None,
            quality: None,
            deprecated: false,
            reset_triggered: None,
            value: ObservationValue::Event(Value::String(value.to_string())),
        }
    }

    #[test]
    fn not_yet_introduced_value_is_invalid() {
        let contract = StdArc::new(FakeContract {
            schema_version: 104,
            data_type: "EXECUTION".to_string(),
        });
        let context = StdArc::new(PipelineContext::new(contract));
        let validator = Validator::new(context);
        let handle = StdArc::new(DataItemHandle { id: "exec".into() });

        let out = validator
            .apply(Frame::Observation(event_obs(&handle, "WAIT")))
            .and_then(Frame::into_observation)
            .unwrap();
        assert_eq!(out.quality, Some(Quality::Invalid));
    }

    #[test]
    fn deprecated_value_is_valid_and_flagged() {
        let contract = StdArc::new(FakeContract {
            schema_version: 205,
            data_type: "EXECUTION".to_string(),
        });
        let context = StdArc::new(PipelineContext::new(contract));
        let validator = Validator::new(context);
        let handle = StdArc::new(DataItemHandle { id: "exec".into() });

        let out = validator
            .apply(Frame::Observation(event_obs(&handle, "PROGRAM_OPTIONAL_STOP")))
            .and_then(Frame::into_observation)
            .unwrap();
        assert_eq!(out.quality, Some(Quality::Valid));
        assert!(out.deprecated);
    }
}
