use crate::entity::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entity identified by `asset_id`, mutated only by the pipeline (usually
/// `removed := true`) under the asset-store lock, destroyed only by LRU
/// eviction once the store's cap is exceeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: String,
    pub device_uuid: Option<String>,
    pub asset_type: String,
    pub timestamp: DateTime<Utc>,
    pub removed: bool,
    pub body: Entity,
}

impl Asset {
    pub fn new(asset_id: impl Into<String>, asset_type: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Asset {
            asset_id: asset_id.into(),
            device_uuid: None,
            asset_type: asset_type.into(),
            timestamp,
            removed: false,
            body: Entity::new("Asset"),
        }
    }
}

/// The two asset-stream control commands (§4.3.3).
#[derive(Debug, Clone)]
pub enum AssetCommand {
    RemoveAll { asset_type: Option<String> },
    RemoveAsset { asset_id: String },
}
