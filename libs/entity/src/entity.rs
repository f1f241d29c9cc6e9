use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node in a tree: a `name`, an optional namespaced `qname`, and a mapping
/// from property name to [`Value`]. Property order is not semantically
/// significant except within an `EntityList`, which preserves insertion
/// order on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub qname: Option<(String, String)>,
    properties: BTreeMap<String, Value>,
}

/// Dedicated slot under which an entity-list factory stores its members.
pub const LIST_PROPERTY: &str = "LIST";

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Entity {
            name: name.into(),
            qname: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Value {
        self.properties.get(key).cloned().unwrap_or(Value::Absent)
    }

    pub fn maybe_get_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn maybe_get_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    pub fn erase(&mut self, key: &str) {
        self.properties.remove(key);
    }

    pub fn set_qname(&mut self, ns: impl Into<String>, local: impl Into<String>) {
        self.qname = Some((ns.into(), local.into()));
    }

    pub fn get_list(&self, key: &str) -> Option<&[Entity]> {
        match self.properties.get(key) {
            Some(Value::EntityList(l)) => Some(l.as_slice()),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.properties.keys()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn kind_of(&self, key: &str) -> Option<ValueKind> {
        self.properties.get(key).map(Value::kind)
    }
}
