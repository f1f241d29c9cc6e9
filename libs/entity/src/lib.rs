//! Tagged-variant value type and entity tree that forms the lingua franca of
//! the ingestion pipeline: [`Value`], [`Entity`], [`Observation`] and its
//! condition chain, and [`Asset`].

pub mod asset;
pub mod checkpoint;
pub mod entity;
pub mod error;
pub mod factory;
pub mod observation;
pub mod value;
pub mod xml;

pub use asset::{Asset, AssetCommand};
pub use checkpoint::Checkpoint;
pub use entity::{Entity, LIST_PROPERTY};
pub use error::EntityError;
pub use factory::{Factory, Requirement};
pub use observation::{
    ConditionChain, ConditionLevel, ConditionNode, DataItemHandle, DataItemRef, Observation,
    ObservationValue, Quality,
};
pub use value::{DataSet, DataSetValue, Entry, Value, ValueKind};
pub use xml::parse_asset_body;
