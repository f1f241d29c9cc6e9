use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use entity::Observation;
use parking_lot::Mutex;
use pipeline::{Frame, Guard, GuardResult, PipelineContext, StrandHandle, Transform};
use std::sync::Arc;
use tracing::warn;

struct PeriodState {
    /// End of the current window. `None` before the first sample for this
    /// data item has been seen.
    next: Option<DateTime<Utc>>,
    pending: Option<Observation>,
}

/// Coalesces `Sample`/`Event` observations that arrive faster than a data
/// item's `minimumPeriod` into one per window (§4.5.3). A too-frequent
/// observation is held as `pending` and deferred onto the pipeline strand;
/// `forward` is the re-entry point for observations released asynchronously
/// by the timer or emitted alongside the one returned from `apply`, since a
/// single `Transform::apply` call can only hand back one value synchronously.
pub struct PeriodFilter {
    context: Arc<PipelineContext>,
    strand: StrandHandle,
    forward: Arc<dyn Fn(Observation) + Send + Sync>,
    states: Arc<DashMap<String, Arc<Mutex<PeriodState>>>>,
}

impl PeriodFilter {
    pub fn new(
        context: Arc<PipelineContext>,
        strand: StrandHandle,
        forward: Arc<dyn Fn(Observation) + Send + Sync>,
    ) -> Self {
        PeriodFilter {
            context,
            strand,
            forward,
            states: Arc::new(DashMap::new()),
        }
    }

    fn period_ms(&self, device: &str, id: &str) -> Option<f64> {
        self.context
            .contract()
            .find_data_item(device, id)
            .and_then(|d| d.minimum_period)
    }

    fn state_for(&self, id: &str) -> Arc<Mutex<PeriodState>> {
        self.states
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(PeriodState {
                    next: None,
                    pending: None,
                }))
            })
            .clone()
    }

    fn arm_timer(&self, id: String, fire_at: DateTime<Utc>, period_ms: f64) {
        let states = self.states.clone();
        let forward = self.forward.clone();
        let strand = self.strand.clone();
        tokio::spawn(async move {
            let wait = (fire_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            strand.post(move || {
                let Some(state_arc) = states.get(&id).map(|e| e.clone()) else {
                    return;
                };
                let mut state = state_arc.lock();
                let fires_now = matches!(state.next, Some(next) if Utc::now() >= next);
                if state.pending.is_some() && fires_now {
                    if let Some(obs) = state.pending.take() {
                        state.next = Some(
                            state.next.unwrap_or_else(Utc::now)
                                + ChronoDuration::milliseconds(period_ms as i64),
                        );
                        drop(state);
                        forward(obs);
                    }
                } else {
                    state.pending = None;
                }
            });
        });
    }
}

impl Transform<Frame> for PeriodFilter {
    fn name(&self) -> &str {
        "period_filter"
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
            self.states.remove(&obs.data_item_id);
            return None;
        }
        if obs.unavailable {
            self.states.remove(&obs.data_item_id);
            return Some(Frame::Observation(obs));
        }

        let device = obs.device.clone().unwrap_or_default();
        let period_ms = match self.period_ms(&device, &obs.data_item_id) {
            Some(p) => p,
            None => return Some(Frame::Observation(obs)),
        };
        let period = ChronoDuration::milliseconds(period_ms as i64);
        let id = obs.data_item_id.clone();
        let ts = obs.timestamp;
        let state_arc = self.state_for(&id);
        let mut state = state_arc.lock();

        let next = match state.next {
            None => {
                // First sample for this data item: open the window here.
                state.next = Some(ts + period);
                return Some(Frame::Observation(obs));
            }
            Some(next) => next,
        };

        if ts < next - period {
            warn!(id = %id, "observation in the past of its period window");
            return None;
        }

        if ts < next {
            let should_arm = state.pending.is_none();
            state.pending = Some(obs);
            drop(state);
            if should_arm {
                self.arm_timer(id, next, period_ms);
            }
            return None;
        }

        if ts == next {
            let old_pending = state.pending.take();
            let new_next = next + period;
            state.next = Some(new_next);
            match old_pending {
                // A value was already waiting out this window: release it now and
                // let the arriving observation open the next window instead of
                // forwarding both at once.
                Some(old) => {
                    state.pending = Some(obs);
                    drop(state);
                    self.arm_timer(id, new_next, period_ms);
                    return Some(Frame::Observation(old));
                }
                None => {
                    drop(state);
                    return Some(Frame::Observation(obs));
                }
            }
        }

        if ts < next + period {
            if let Some(old_pending) = state.pending.take() {
                let new_next = next + period;
                state.next = Some(new_next);
                drop(state);
                (self.forward)(obs);
                self.arm_timer(id, new_next, period_ms);
                return Some(Frame::Observation(old_pending));
            }
        }

        let old_pending = state.pending.take();
        state.next = Some(ts + period);
        drop(state);
        if let Some(old_pending) = old_pending {
            (self.forward)(old_pending);
        }
        Some(Frame::Observation(obs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract::{Category, Contract, DataItemDescriptor, Device, Representation};
    use entity::{DataItemHandle, ObservationValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeContract {
        period_ms: f64,
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
                minimum_delta: None,
                minimum_period: Some(self.period_ms),
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

    fn obs_at(handle: &Arc<DataItemHandle>, ts: DateTime<Utc>) -> Observation {
        Observation {
            data_item_id: handle.id.clone(),
            data_item: Arc::downgrade(handle),
            device: None,
            timestamp: ts,
            duration: None,
            unavailable: false,
            sequence: None,
            quality: None,
            deprecated: false,
            reset_triggered: None,
            value: ObservationValue::Sample(1.0),
        }
    }

    #[tokio::test]
    async fn first_sample_opens_window_and_forwards() {
        let contract = Arc::new(FakeContract { period_ms: 1000.0 });
        let context = Arc::new(PipelineContext::new(contract));
        let strand = pipeline::Strand::spawn();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let filter = PeriodFilter::new(
            context,
            strand.handle(),
            Arc::new(move |_| {
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let handle = Arc::new(DataItemHandle { id: "x".into() });
        let t0 = Utc::now();

        let first = filter.apply(Frame::Observation(obs_at(&handle, t0)));
        assert!(first.is_some());

        // Exactly at `next`: forwards and advances the window again.
        let second = filter.apply(Frame::Observation(obs_at(
            &handle,
            t0 + ChronoDuration::milliseconds(1000),
        )));
        assert!(second.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn boundary_arrival_releases_the_latest_queued_value() {
        let contract = Arc::new(FakeContract { period_ms: 1000.0 });
        let context = Arc::new(PipelineContext::new(contract));
        let strand = pipeline::Strand::spawn();
        let filter = PeriodFilter::new(context, strand.handle(), Arc::new(|_| {}));
        let handle = Arc::new(DataItemHandle { id: "x".into() });
        let t0 = Utc::now();

        // T: first sample opens the window and forwards immediately.
        assert!(filter.apply(Frame::Observation(obs_at(&handle, t0))).is_some());

        // T+0.2s: too frequent, queued.
        assert!(filter
            .apply(Frame::Observation(obs_at(&handle, t0 + ChronoDuration::milliseconds(200))))
            .is_none());

        // T+0.4s: still too frequent, overwrites the T+0.2s value in the queue.
        let at_400 = obs_at(&handle, t0 + ChronoDuration::milliseconds(400));
        assert!(filter.apply(Frame::Observation(at_400.clone())).is_none());

        // T+1s: exactly on the boundary. Releases the T+0.4s value queued
        // above, not the T+0.2s one it replaced, and not this arrival itself.
        let released = filter.apply(Frame::Observation(obs_at(&handle, t0 + ChronoDuration::milliseconds(1000))));
        match released {
            Some(Frame::Observation(obs)) => assert_eq!(obs.timestamp, at_400.timestamp),
            other => panic!("expected the queued T+0.4s observation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn too_frequent_sample_is_dropped_and_queued() {
        let contract = Arc::new(FakeContract { period_ms: 1000.0 });
        let context = Arc::new(PipelineContext::new(contract));
        let strand = pipeline::Strand::spawn();
        let filter = PeriodFilter::new(context, strand.handle(), Arc::new(|_| {}));
        let handle = Arc::new(DataItemHandle { id: "x".into() });
        let t0 = Utc::now();

        assert!(filter.apply(Frame::Observation(obs_at(&handle, t0))).is_some());
        let too_soon = filter.apply(Frame::Observation(obs_at(
            &handle,
            t0 + ChronoDuration::milliseconds(200),
        )));
        assert!(too_soon.is_none());
    }
}
