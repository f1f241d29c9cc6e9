use chrono::Utc;
use contract::Contract;
use entity::{Observation, ObservationValue, Value};
use pipeline::{Frame, Guard, GuardResult, Transform};
use shdr::{tokenize, TimestampExtractor, TimestampMode, TokenMapper};
use std::sync::Arc;
use tracing::debug;

/// Maps a plain-text topic-routed message (§4.4.3). If the topic resolved to
/// a known data item, the body is taken verbatim as a string-valued event
/// observation timestamped `now`. Otherwise the body is assumed to be an
/// SHDR line and re-parsed with the SHDR chain.
pub struct DataMapper {
    contract: Arc<dyn Contract>,
    default_device: String,
    shdr_timestamps: TimestampExtractor,
    shdr_mapper: TokenMapper,
}

impl DataMapper {
    pub fn new(
        contract: Arc<dyn Contract>,
        default_device: impl Into<String>,
        shdr_version: shdr::ShdrVersion,
    ) -> Self {
        let default_device = default_device.into();
        DataMapper {
            contract: contract.clone(),
            default_device: default_device.clone(),
            shdr_timestamps: TimestampExtractor::new(TimestampMode::Ignore),
            shdr_mapper: TokenMapper::new(contract, shdr_version, default_device),
        }
    }

    fn map_resolved(&self, device: &str, data_item: &str, body: &str) -> Option<Frame> {
        let descriptor = self.contract.find_data_item(device, data_item)?;
        Some(Frame::Observation(Observation {
            data_item_id: descriptor.id().to_string(),
            data_item: std::sync::Arc::downgrade(&descriptor.handle),
            device: Some(device.to_string()),
            timestamp: Utc::now(),
            duration: None,
            unavailable: false,
            sequence: None,
            quality: None,
            deprecated: false,
            reset_triggered: None,
            value: ObservationValue::Event(Value::String(body.trim().to_string())),
        }))
    }

    fn map_as_shdr(&self, body: &str, device: Option<String>) -> Option<Frame> {
        let tokens = tokenize(body);
        if tokens.is_empty() {
            return None;
        }
        let frame = Frame::Tokens { tokens, device };
        let frame = self.shdr_timestamps.apply(frame)?;
        self.shdr_mapper.apply(frame)
    }
}

impl Transform<Frame> for DataMapper {
    fn name(&self) -> &str {
        "data_mapper"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::DataMessage { .. } => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::DataMessage {
                device,
                data_item,
                body,
            } => match (device.as_deref(), data_item.as_deref()) {
                (Some(device), Some(data_item)) => self
                    .map_resolved(device, data_item, &body)
                    .or_else(|| self.map_as_shdr(&body, Some(device.to_string()))),
                _ => {
                    debug!(%body, "unresolved topic, falling back to SHDR parse");
                    self.map_as_shdr(&body, device.or_else(|| Some(self.default_device.clone())))
                }
            },
            other => Some(other),
        }
    }
}
