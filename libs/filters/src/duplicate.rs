use pipeline::{Frame, Guard, GuardResult, PipelineContext, Transform};
use std::sync::Arc;

/// Drops an observation that is a complete duplicate of the last value
/// forwarded for its data item (§4.5.1). The last-value cache lives behind
/// the `Contract`, not in this transform; a data-set observation may come
/// back with its `VALUE` subsetted to only the changed entries.
pub struct DuplicateFilter {
    context: Arc<PipelineContext>,
}

impl DuplicateFilter {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        DuplicateFilter { context }
    }
}

impl Transform<Frame> for DuplicateFilter {
    fn name(&self) -> &str {
        "duplicate_filter"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Observation(_) => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::Observation(obs) => {
                if obs.is_orphaned() {
                    return None;
                }
                self.context
                    .contract()
                    .check_duplicate(&obs)
                    .map(Frame::Observation)
            }
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract::{Contract, DataItemDescriptor, Device};
    use entity::{DataItemHandle, Observation, ObservationValue};
    use std::sync::Mutex;

    struct FakeContract {
        last: Mutex<Option<f64>>,
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
        fn deliver_observation(&self, _: Observation) {}
        fn deliver_asset(&self, _: entity::Asset) {}
        fn deliver_devices(&self, _: Vec<Device>) {}
        fn deliver_device(&self, _: Device) {}
        fn deliver_asset_command(&self, _: entity::Entity) {}
        fn deliver_command(&self, _: entity::Entity) {}
        fn deliver_connect_status(&self, _: entity::Entity, _: Vec<Device>, _: bool) {}
        fn source_failed(&self, _: &str) {}
        fn check_duplicate(&self, obs: &Observation) -> Option<Observation> {
            let mut last = self.last.lock().unwrap();
            let value = obs.sample_value();
            if *last == value {
                None
            } else {
                *last = value;
                Some(obs.clone())
            }
        }
    }

    fn obs(id: &str, handle: &Arc<DataItemHandle>, value: f64) -> Observation {
        Observation {
            data_item_id: id.to_string(),
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
    fn second_identical_sample_is_dropped() {
        let contract = Arc::new(FakeContract { last: Mutex::new(None) });
        let context = Arc::new(PipelineContext::new(contract));
        let filter = DuplicateFilter::new(context);
        let handle = Arc::new(DataItemHandle { id: "x".into() });

        let first = filter.apply(Frame::Observation(obs("x", &handle, 1.0)));
        assert!(first.is_some());
        let second = filter.apply(Frame::Observation(obs("x", &handle, 1.0)));
        assert!(second.is_none());
        let third = filter.apply(Frame::Observation(obs("x", &handle, 2.0)));
        assert!(third.is_some());
    }

    #[test]
    fn orphaned_observation_is_dropped() {
        let contract = Arc::new(FakeContract { last: Mutex::new(None) });
        let context = Arc::new(PipelineContext::new(contract));
        let filter = DuplicateFilter::new(context);
        let handle = Arc::new(DataItemHandle { id: "x".into() });
        let mut observation = obs("x", &handle, 1.0);
        drop(handle);
        observation.data_item = std::sync::Weak::new();
        assert!(filter.apply(Frame::Observation(observation)).is_none());
    }

    /// A `Contract` whose `check_duplicate` subsets a data-set observation's
    /// VALUE down to what `entity::DataSet::diff` reports changed, the way
    /// the trait's doc comment promises.
    struct DataSetFakeContract {
        last: Mutex<entity::DataSet>,
    }

    impl Contract for DataSetFakeContract {
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
        fn deliver_observation(&self, _: Observation) {}
        fn deliver_asset(&self, _: entity::Asset) {}
        fn deliver_devices(&self, _: Vec<Device>) {}
        fn deliver_device(&self, _: Device) {}
        fn deliver_asset_command(&self, _: entity::Entity) {}
        fn deliver_command(&self, _: entity::Entity) {}
        fn deliver_connect_status(&self, _: entity::Entity, _: Vec<Device>, _: bool) {}
        fn source_failed(&self, _: &str) {}
        fn check_duplicate(&self, obs: &Observation) -> Option<Observation> {
            let ObservationValue::DataSetEvent { set, .. } = &obs.value else {
                return Some(obs.clone());
            };
            let mut last = self.last.lock().unwrap();
            let changed = last.diff(set);
            if changed.is_empty() {
                return None;
            }
            last.merge(set);
            let mut reduced = obs.clone();
            reduced.value = ObservationValue::DataSetEvent {
                count: changed.len() as u32,
                set: changed,
            };
            Some(reduced)
        }
    }

    fn dataset_entry(key: &str, value: i64) -> entity::Entry {
        entity::Entry {
            key: key.to_string(),
            value: entity::DataSetValue::Int(value),
            removed: false,
        }
    }

    #[test]
    fn dataset_duplicate_reduces_value_to_changed_entries() {
        let contract = Arc::new(DataSetFakeContract { last: Mutex::new(entity::DataSet::new()) });
        let context = Arc::new(PipelineContext::new(contract));
        let filter = DuplicateFilter::new(context);
        let handle = Arc::new(DataItemHandle { id: "x".into() });

        let mut first_set = entity::DataSet::new();
        first_set.insert(dataset_entry("a", 1));
        first_set.insert(dataset_entry("b", 2));
        let mut first = obs("x", &handle, 0.0);
        first.value = ObservationValue::DataSetEvent { set: first_set.clone(), count: first_set.len() as u32 };
        let forwarded_first = filter.apply(Frame::Observation(first));
        match forwarded_first {
            Some(Frame::Observation(obs)) => match obs.value {
                ObservationValue::DataSetEvent { set, count } => {
                    assert_eq!(count, 2);
                    assert_eq!(set, first_set);
                }
                other => panic!("expected a data set event, got {other:?}"),
            },
            other => panic!("expected the first observation to be forwarded, got {other:?}"),
        }

        let mut second_set = entity::DataSet::new();
        second_set.insert(dataset_entry("a", 1));
        second_set.insert(dataset_entry("c", 3));
        let mut second = obs("x", &handle, 0.0);
        second.value = ObservationValue::DataSetEvent { set: second_set, count: 2 };
        let forwarded_second = filter.apply(Frame::Observation(second));
        match forwarded_second {
            Some(Frame::Observation(obs)) => match obs.value {
                ObservationValue::DataSetEvent { set, count } => {
                    assert_eq!(count, 1);
                    assert_eq!(set.get("c").map(|e| &e.value), Some(&entity::DataSetValue::Int(3)));
                    assert!(set.get("a").is_none());
                }
                other => panic!("expected a data set event, got {other:?}"),
            },
            other => panic!("expected the second observation to be forwarded, got {other:?}"),
        }
    }
}
