use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pipeline::{Frame, Guard, GuardResult, PipelineContext, Transform};
use std::sync::Arc;
use tracing::warn;

/// Enforces per-data-item timestamp monotonicity (§4.5.4): a timestamp
/// earlier than the last one forwarded is replaced with the agent's clock,
/// never dropped.
pub struct TimestampCorrector {
    context: Arc<PipelineContext>,
    last_seen: Arc<DashMap<String, DateTime<Utc>>>,
}

impl TimestampCorrector {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        TimestampCorrector {
            context,
            last_seen: Arc::new(DashMap::new()),
        }
    }
}

impl Transform<Frame> for TimestampCorrector {
    fn name(&self) -> &str {
        "timestamp_corrector"
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

        if obs.is_orphaned() {
            self.last_seen.remove(&obs.data_item_id);
            return None;
        }
        if obs.unavailable {
            self.last_seen.remove(&obs.data_item_id);
            return Some(Frame::Observation(obs));
        }

        if let Some(last) = self.last_seen.get(&obs.data_item_id) {
            if obs.timestamp < *last {
                warn!(
                    id = %obs.data_item_id,
                    observed = %obs.timestamp,
                    last = %*last,
                    "non-monotonic timestamp corrected to agent clock"
                );
                obs.timestamp = Utc::now();
            }
        }
        self.last_seen.insert(obs.data_item_id.clone(), obs.timestamp);
        Some(Frame::Observation(obs))
    }
}
