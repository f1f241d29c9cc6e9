use crate::value::{DataSet, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// Minimal handle an [`Observation`] holds a non-owning (weak) reference to.
/// The richer, externally-owned descriptor (`contract::DataItemDescriptor`)
/// wraps one of these so observation code does not need to depend on the
/// contract crate.
#[derive(Debug)]
pub struct DataItemHandle {
    pub id: String,
}

pub type DataItemRef = Weak<DataItemHandle>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionLevel {
    Normal,
    Warning,
    Fault,
    Unavailable,
}

/// One node of a condition chain. `prev` is a strong reference to the next
/// older active condition; the chain is immutable, each mutation produces a
/// new head via shallow copy (see crate-level design notes).
#[derive(Debug, Clone)]
pub struct ConditionNode {
    pub level: ConditionLevel,
    pub code: String,
    pub native_severity: Option<String>,
    pub qualifier: Option<String>,
    pub message: Value,
}

/// The chain of active non-normal conditions for a single data item,
/// ordered by insertion (most recent first).
#[derive(Debug, Clone, Default)]
pub struct ConditionChain {
    head: Option<Arc<ConditionChainLink>>,
}

#[derive(Debug)]
struct ConditionChainLink {
    node: ConditionNode,
    prev: Option<Arc<ConditionChainLink>>,
}

impl ConditionChain {
    pub fn new() -> Self {
        ConditionChain { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConditionNode> {
        ConditionChainIter {
            current: self.head.as_deref(),
        }
    }

    fn to_vec(&self) -> Vec<ConditionNode> {
        self.iter().cloned().collect()
    }

    fn from_vec(nodes: Vec<ConditionNode>) -> Self {
        let mut prev: Option<Arc<ConditionChainLink>> = None;
        for node in nodes.into_iter().rev() {
            prev = Some(Arc::new(ConditionChainLink { node, prev }));
        }
        ConditionChain { head: prev }
    }

    /// Invariant (a): a NORMAL with empty code clears the whole chain.
    pub fn clear_all(&self) -> ConditionChain {
        ConditionChain::new()
    }

    /// Invariant (b): a NORMAL with a non-empty code removes the matching
    /// node. Returns the new chain and whether it became empty (the caller
    /// should then emit a bare NORMAL observation).
    pub fn clear_code(&self, code: &str) -> (ConditionChain, bool) {
        let before = self.to_vec();
        let had_any = !before.is_empty();
        let remaining: Vec<_> = before.into_iter().filter(|n| n.code != code).collect();
        let became_empty = had_any && remaining.is_empty();
        (ConditionChain::from_vec(remaining), became_empty)
    }

    /// Invariant (c): UNAVAILABLE collapses the chain to a single node.
    pub fn collapse_unavailable(&self, node: ConditionNode) -> ConditionChain {
        ConditionChain::from_vec(vec![node])
    }

    /// Invariant (d): inserts an active WARNING/FAULT node. If a node with
    /// the same code is already active, its contents are replaced in place
    /// (same relative position); otherwise the node is inserted at the head.
    pub fn insert_active(&self, node: ConditionNode) -> ConditionChain {
        let mut nodes = self.to_vec();
        if let Some(pos) = nodes.iter().position(|n| n.code == node.code) {
            nodes[pos] = node;
        } else {
            nodes.insert(0, node);
        }
        ConditionChain::from_vec(nodes)
    }
}

struct ConditionChainIter<'a> {
    current: Option<&'a ConditionChainLink>,
}

impl<'a> Iterator for ConditionChainIter<'a> {
    type Item = &'a ConditionNode;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.current?;
        self.current = link.prev.as_deref();
        Some(&link.node)
    }
}

/// Discriminator for the disjoint observation variants named in the data
/// model. Each carries only the fields meaningful for that variant.
#[derive(Debug, Clone)]
pub enum ObservationValue {
    Sample(f64),
    ThreeSpaceSample([f64; 3]),
    Timeseries {
        sample_rate: f64,
        sample_count: u32,
        values: Vec<f64>,
    },
    Event(Value),
    DataSetEvent {
        set: DataSet,
        count: u32,
    },
    TableEvent {
        rows: DataSet,
    },
    Message {
        text: String,
        native_code: Option<String>,
    },
    Alarm {
        code: String,
        native_code: Option<String>,
        severity: Option<String>,
        state: String,
        message: String,
    },
    AssetEvent {
        asset_id: String,
        asset_type: Option<String>,
    },
    Condition(ConditionChain),
}

/// An entity with additional typed slots specific to the pipeline's
/// observation flow: a weak reference to its data item, a timestamp, an
/// `unavailable` flag, and a sequence number assigned only at delivery.
#[derive(Debug, Clone)]
pub struct Observation {
    pub data_item_id: String,
    pub data_item: DataItemRef,
    pub device: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration: Option<f64>,
    pub unavailable: bool,
    pub sequence: Option<u64>,
    pub quality: Option<Quality>,
    pub deprecated: bool,
    pub reset_triggered: Option<String>,
    pub value: ObservationValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Valid,
    Invalid,
    Unverifiable,
}

impl Observation {
    pub fn is_orphaned(&self) -> bool {
        self.data_item.upgrade().is_none()
    }

    pub fn sample_value(&self) -> Option<f64> {
        match &self.value {
            ObservationValue::Sample(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(code: &str, level: ConditionLevel) -> ConditionNode {
        ConditionNode {
            level,
            code: code.to_string(),
            native_severity: None,
            qualifier: None,
            message: Value::String(code.to_string()),
        }
    }

    #[test]
    fn insert_then_clear_restores_chain() {
        let base = ConditionChain::new().insert_active(node("A", ConditionLevel::Fault));
        let with_b = base.insert_active(node("B", ConditionLevel::Warning));
        let (restored, became_empty) = with_b.clear_code("B");
        assert!(!became_empty);
        let base_codes: Vec<_> = base.iter().map(|n| n.code.clone()).collect();
        let restored_codes: Vec<_> = restored.iter().map(|n| n.code.clone()).collect();
        assert_eq!(base_codes, restored_codes);
    }

    #[test]
    fn duplicate_code_replaces_not_duplicates() {
        let chain = ConditionChain::new()
            .insert_active(node("A", ConditionLevel::Fault))
            .insert_active(node("A", ConditionLevel::Warning));
        assert_eq!(chain.iter().count(), 1);
        assert_eq!(chain.iter().next().unwrap().level, ConditionLevel::Warning);
    }

    #[test]
    fn clear_all_becomes_empty() {
        let chain = ConditionChain::new()
            .insert_active(node("A", ConditionLevel::Fault))
            .clear_all();
        assert!(chain.is_empty());
    }
}
