use entity::{DataItemHandle, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Sample,
    Event,
    Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Representation {
    Value,
    TimeSeries,
    DataSet,
    Table,
    ThreeD,
}

/// Immutable for the life of a device-model version. Wraps the
/// `entity::DataItemHandle` observations hold a weak reference to, so an
/// observation outlives its descriptor gracefully if the device model
/// reloads.
#[derive(Debug, Clone)]
pub struct DataItemDescriptor {
    pub handle: Arc<DataItemHandle>,
    pub name: Option<String>,
    pub category: Category,
    pub data_type: String,
    pub sub_type: Option<String>,
    pub units: Option<String>,
    pub representation: Representation,
    pub minimum_delta: Option<f64>,
    pub minimum_period: Option<f64>,
    pub reset_trigger: Option<String>,
    pub constant_value: Option<Value>,
    pub conversion_required: bool,
}

impl DataItemDescriptor {
    pub fn id(&self) -> &str {
        &self.handle.id
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub uuid: String,
}
