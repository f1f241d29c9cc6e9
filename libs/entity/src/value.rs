use crate::entity::Entity;
use crate::error::EntityError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single entry in a [`DataSet`].
///
/// Set-uniqueness is keyed on `key`; `removed` marks a tombstone produced by
/// a reset or an explicit `key` (no `=value`) token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: DataSetValue,
    pub removed: bool,
}

/// The value carried by a data-set [`Entry`]. The nested `DataSet` form is a
/// table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataSetValue {
    Absent,
    Int(i64),
    Double(f64),
    String(String),
    Row(DataSet),
}

/// An ordered-by-key collection of [`Entry`] values with merge/reset semantics.
///
/// Stored as a `BTreeMap` rather than insertion-ordered to make merge
/// idempotence (§8 "applying `B` twice yields the same result as applying
/// once") a structural property of the container rather than something each
/// call site has to get right.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    entries: BTreeMap<String, Entry>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.removed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, entry: Entry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.insert(
            key.to_string(),
            Entry {
                key: key.to_string(),
                value: DataSetValue::Absent,
                removed: true,
            },
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Applies `update` on top of `self`. Idempotent: `merge(b); merge(b)` is
    /// the same as `merge(b)` once, since re-inserting the same entry is a
    /// no-op on the underlying map.
    pub fn merge(&mut self, update: &DataSet) {
        for entry in update.entries.values() {
            self.entries.insert(entry.key.clone(), entry.clone());
        }
    }

    /// Full reset: replaces the contents of `self` with `update`'s entries.
    pub fn reset(&mut self, update: &DataSet) {
        self.entries.clear();
        for entry in update.entries.values() {
            self.entries.insert(entry.key.clone(), entry.clone());
        }
    }

    /// Returns the entries of `update` that differ from what is already
    /// cached in `self` (used by the duplicate filter to emit a subsetted
    /// VALUE). An entry present in both with the same value/removed state is
    /// omitted.
    pub fn diff(&self, update: &DataSet) -> DataSet {
        let mut out = DataSet::new();
        for entry in update.entries.values() {
            match self.entries.get(&entry.key) {
                Some(existing) if existing == entry => continue,
                _ => out.insert(entry.clone()),
            }
        }
        out
    }
}

/// Which variant a [`Value`] is tagged with, without carrying its payload.
/// Used to describe a `Requirement`'s declared type and as the target of an
/// explicit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Absent,
    Bool,
    Int,
    Double,
    String,
    Timestamp,
    Vector,
    DataSet,
    Entity,
    EntityList,
}

/// Tagged-variant value: the lingua franca of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Absent,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Vector(Vec<f64>),
    DataSet(DataSet),
    Entity(Box<Entity>),
    EntityList(Vec<Entity>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Absent => ValueKind::Absent,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Vector(_) => ValueKind::Vector,
            Value::DataSet(_) => ValueKind::DataSet,
            Value::Entity(_) => ValueKind::Entity,
            Value::EntityList(_) => ValueKind::EntityList,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Converts `self` into `target`, following the total truth table named
    /// in the source: `string<->int<->double<->vector` convert on a
    /// best-effort basis; `vector->entity`, `entity->scalar`, and
    /// `entity-list->non-list` are always rejected; everything else not
    /// explicitly listed passes through unchanged if the kind already
    /// matches, or is rejected.
    pub fn convert(&self, target: ValueKind, property: &str) -> Result<Value, EntityError> {
        if self.kind() == target {
            return Ok(self.clone());
        }
        let fail = || EntityError::ConversionFailed {
            property: property.to_string(),
            from: format!("{:?}", self.kind()),
            to: format!("{:?}", target),
        };
        match (self, target) {
            (Value::Absent, _) => Ok(Value::Absent),
            (Value::String(s), ValueKind::Int) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| fail()),
            (Value::String(s), ValueKind::Double) => {
                s.trim().parse::<f64>().map(Value::Double).map_err(|_| fail())
            }
            (Value::String(s), ValueKind::Bool) => match s.trim().to_ascii_uppercase().as_str() {
                "TRUE" | "1" => Ok(Value::Bool(true)),
                "FALSE" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            (Value::String(s), ValueKind::Vector) => {
                let parts: Result<Vec<f64>, _> =
                    s.split_whitespace().map(|t| t.parse::<f64>()).collect();
                parts.map(Value::Vector).map_err(|_| fail())
            }
            (Value::Int(i), ValueKind::String) => Ok(Value::String(i.to_string())),
            (Value::Int(i), ValueKind::Double) => Ok(Value::Double(*i as f64)),
            (Value::Double(d), ValueKind::String) => Ok(Value::String(d.to_string())),
            (Value::Double(d), ValueKind::Int) => Ok(Value::Int(*d as i64)),
            (Value::Bool(b), ValueKind::String) => Ok(Value::String(b.to_string())),
            (Value::Vector(v), ValueKind::String) => Ok(Value::String(
                v.iter()
                    .map(|x| x.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            )),
            (Value::Vector(_), ValueKind::Entity) | (Value::Vector(_), ValueKind::EntityList) => {
                Err(fail())
            }
            (Value::Entity(_), ValueKind::Bool)
            | (Value::Entity(_), ValueKind::Int)
            | (Value::Entity(_), ValueKind::Double)
            | (Value::Entity(_), ValueKind::String)
            | (Value::Entity(_), ValueKind::Vector) => Err(fail()),
            (Value::EntityList(_), k) if k != ValueKind::EntityList => Err(fail()),
            _ => Err(fail()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_int_roundtrip() {
        let v = Value::String("42".into());
        assert_eq!(v.convert(ValueKind::Int, "x").unwrap(), Value::Int(42));
    }

    #[test]
    fn vector_to_entity_rejected() {
        let v = Value::Vector(vec![1.0, 2.0]);
        assert!(v.convert(ValueKind::Entity, "x").is_err());
    }

    #[test]
    fn dataset_merge_idempotent() {
        let mut a = DataSet::new();
        a.insert(Entry {
            key: "a".into(),
            value: DataSetValue::Int(1),
            removed: false,
        });
        let mut b = DataSet::new();
        b.insert(Entry {
            key: "b".into(),
            value: DataSetValue::Int(2),
            removed: false,
        });
        let mut once = a.clone();
        once.merge(&b);
        let mut twice = a.clone();
        twice.merge(&b);
        twice.merge(&b);
        assert_eq!(once, twice);
    }
}
