use contract::Contract;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

/// Process-wide container of named shared states (each independently
/// locked) plus a reference to the external [`Contract`]. Transforms hold
/// `Arc` clones of the states they need rather than touching the context
/// directly once constructed.
pub struct PipelineContext {
    contract: Arc<dyn Contract>,
    states: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl PipelineContext {
    pub fn new(contract: Arc<dyn Contract>) -> Self {
        PipelineContext {
            contract,
            states: DashMap::new(),
        }
    }

    pub fn contract(&self) -> &Arc<dyn Contract> {
        &self.contract
    }

    /// Returns the named state, constructing it with `default` on first
    /// access. The returned `Arc` is the transform's handle onto state
    /// shared with any other transform using the same name.
    pub fn state<S>(&self, name: &str, default: impl FnOnce() -> S) -> Arc<S>
    where
        S: Send + Sync + 'static,
    {
        if let Some(existing) = self.states.get(name) {
            return existing
                .clone()
                .downcast::<S>()
                .expect("pipeline state type mismatch for slot");
        }
        let created: Arc<dyn Any + Send + Sync> = Arc::new(default());
        self.states
            .entry(name.to_string())
            .or_insert(created)
            .clone()
            .downcast::<S>()
            .expect("pipeline state type mismatch for slot")
    }
}
