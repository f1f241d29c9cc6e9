use crate::pipeline::Named;
use chrono::{DateTime, Utc};
use contract::Device;
use entity::{Asset, AssetCommand, Entity, Observation};

/// The concrete currency that flows through an ingestion pipeline. Each
/// stage (tokenizer, timestamp extractor, token mapper, filters, validator,
/// delivery) consumes and/or produces one of these variants; `Pipeline<Frame>`
/// is what `shdr`/`topics`/`filters`/`validator`/`delivery` build against.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A raw line or message body not yet tokenized.
    Raw { text: String, device: Option<String> },
    /// A pub/sub message prior to topic resolution.
    TopicMessage { topic: String, body: String },
    /// A topic-routed message whose body starts with `{` or `[`.
    JsonMessage {
        device: Option<String>,
        data_item: Option<String>,
        body: String,
    },
    /// A topic-routed message whose body is plain text.
    DataMessage {
        device: Option<String>,
        data_item: Option<String>,
        body: String,
    },
    /// Output of the SHDR tokenizer: ordered pipe-delimited fields.
    Tokens {
        tokens: Vec<String>,
        device: Option<String>,
    },
    /// Output of the timestamp extractor: the remaining tokens paired with
    /// the timestamp/duration consumed from the first token.
    Timestamped {
        timestamp: DateTime<Utc>,
        duration: Option<f64>,
        tokens: Vec<String>,
        device: Option<String>,
    },
    Observation(Observation),
    ObservationBatch(Vec<Observation>),
    Asset(Asset),
    AssetCommand(AssetCommand),
    Device(Device),
    Devices(Vec<Device>),
    ConnectStatus {
        status: Entity,
        devices: Vec<Device>,
        auto_available: bool,
    },
    Command(Entity),
}

impl Named for Frame {
    fn type_name(&self) -> &'static str {
        match self {
            Frame::Raw { .. } => "Raw",
            Frame::TopicMessage { .. } => "TopicMessage",
            Frame::JsonMessage { .. } => "JsonMessage",
            Frame::DataMessage { .. } => "DataMessage",
            Frame::Tokens { .. } => "Tokens",
            Frame::Timestamped { .. } => "Timestamped",
            Frame::Observation(_) => "Observation",
            Frame::ObservationBatch(_) => "ObservationBatch",
            Frame::Asset(_) => "Asset",
            Frame::AssetCommand(_) => "AssetCommand",
            Frame::Device(_) => "Device",
            Frame::Devices(_) => "Devices",
            Frame::ConnectStatus { .. } => "ConnectStatus",
            Frame::Command(_) => "Command",
        }
    }
}

impl Frame {
    pub fn as_observation(&self) -> Option<&Observation> {
        match self {
            Frame::Observation(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_observation(self) -> Option<Observation> {
        match self {
            Frame::Observation(o) => Some(o),
            _ => None,
        }
    }
}
