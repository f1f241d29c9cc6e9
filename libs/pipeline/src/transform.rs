use crate::guard::{Guard, GuardResult};
use crate::strand::StrandHandle;

/// Entity-in -> entity-out (or empty = drop) stage. Carries a [`Guard`]
/// (tested by the engine, not by the transform itself), and `start`/`stop`
/// hooks for stages that arm timers (period filter, metrics).
pub trait Transform<T>: Send + Sync {
    fn name(&self) -> &str;

    fn guard(&self) -> Guard<T>;

    fn apply(&self, input: T) -> Option<T>;

    fn start(&self, _strand: &StrandHandle) {}

    fn stop(&self) {}
}

/// Sentinel transform at the head of every pipeline: guard is always
/// `Skip`, so it forwards unconditionally without being invoked.
pub struct StartTransform;

impl<T: Send + Sync + 'static> Transform<T> for StartTransform {
    fn name(&self) -> &str {
        "start"
    }

    fn guard(&self) -> Guard<T> {
        Guard::always_skip()
    }

    fn apply(&self, input: T) -> Option<T> {
        Some(input)
    }
}

pub(crate) fn guard_result_of<T>(g: &Guard<T>, e: &T) -> GuardResult {
    g.test(e)
}
