use crate::observation::Observation;
use std::collections::HashMap;

/// Snapshot of the latest observation per data item. Used to answer
/// `current`-style reads and to seed a rebuilt pipeline's duplicate-filter
/// state (mirrors the original `observation::Checkpoint`).
#[derive(Debug, Default)]
pub struct Checkpoint {
    latest: HashMap<String, Observation>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, obs: Observation) {
        self.latest.insert(obs.data_item_id.clone(), obs);
    }

    pub fn get(&self, data_item_id: &str) -> Option<&Observation> {
        self.latest.get(data_item_id)
    }

    /// Copies entries whose data-item id passes `filter`.
    pub fn copy_filtered(&self, filter: impl Fn(&str) -> bool) -> Checkpoint {
        let mut out = Checkpoint::new();
        for (id, obs) in &self.latest {
            if filter(id) {
                out.latest.insert(id.clone(), obs.clone());
            }
        }
        out
    }
}
