use chrono::{DateTime, Utc};
use contract::{Category, Contract, DataItemDescriptor, Representation};
use entity::{
    Asset, AssetCommand, DataSet, DataSetValue, Entry, Observation, ObservationValue, Value,
};
use pipeline::{Frame, Guard, GuardResult, Transform};
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShdrVersion {
    V1,
    V2,
}

/// Pairs remaining tokens with `(device:)id` and builds typed observations
/// or asset commands (§4.3.3).
pub struct TokenMapper {
    contract: Arc<dyn Contract>,
    version: ShdrVersion,
    default_device: String,
    warned_ids: Mutex<std::collections::HashSet<String>>,
}

impl TokenMapper {
    pub fn new(contract: Arc<dyn Contract>, version: ShdrVersion, default_device: impl Into<String>) -> Self {
        TokenMapper {
            contract,
            version,
            default_device: default_device.into(),
            warned_ids: Mutex::new(std::collections::HashSet::new()),
        }
    }

    fn warn_unresolved_once(&self, id: &str) {
        let mut warned = self.warned_ids.lock().unwrap();
        if warned.insert(id.to_string()) {
            warn!(id, "unresolved data item in SHDR stream");
        } else {
            trace!(id, "unresolved data item (repeat)");
        }
    }

    fn resolve(&self, device: &str, id_token: &str) -> Option<Arc<DataItemDescriptor>> {
        let (device, id) = match id_token.split_once(':') {
            Some((d, i)) => (d, i),
            None => (device, id_token),
        };
        self.contract.find_data_item(device, id)
    }

    pub fn map(
        &self,
        timestamp: DateTime<Utc>,
        duration: Option<f64>,
        device: &str,
        mut tokens: Vec<String>,
    ) -> Frame {
        if let Some(first) = tokens.first() {
            if let Some(cmd) = parse_asset_command(first, &tokens, device, timestamp) {
                return cmd;
            }
        }

        let mut observations = Vec::new();
        loop {
            if tokens.is_empty() {
                break;
            }
            let id_token = tokens.remove(0);
            match self.resolve(device, &id_token) {
                None => {
                    self.warn_unresolved_once(&id_token);
                    match self.version {
                        ShdrVersion::V1 => {
                            // Open question (spec.md §9): legacy v1 hard-codes a
                            // skip of 2 follow-up tokens for an unresolved id,
                            // regardless of category. Kept as documented, not
                            // redesigned.
                            let skip = 2.min(tokens.len());
                            tokens.drain(0..skip);
                            break;
                        }
                        ShdrVersion::V2 => continue,
                    }
                }
                Some(descriptor) => {
                    let count = expected_token_count(&descriptor);
                    let take = count.min(tokens.len());
                    let record: Vec<String> = tokens.drain(0..take).collect();
                    match build_observation(&descriptor, timestamp, duration, &record) {
                        Ok(obs) => observations.push(obs),
                        Err(e) => warn!(id = id_token, error = %e, "conversion failed"),
                    }
                    if self.version == ShdrVersion::V1 {
                        break;
                    }
                }
            }
        }

        match observations.len() {
            0 => Frame::ObservationBatch(Vec::new()),
            1 => Frame::Observation(observations.remove(0)),
            _ => Frame::ObservationBatch(observations),
        }
    }
}

fn parse_asset_command(
    first: &str,
    tokens: &[String],
    device: &str,
    timestamp: DateTime<Utc>,
) -> Option<Frame> {
    if first == "@ASSET@" {
        let id = tokens.get(1)?.clone();
        let asset_type = tokens.get(2)?.clone();
        let body = tokens.get(3).cloned().unwrap_or_default();
        let mut asset = Asset::new(id, asset_type, timestamp);
        asset.device_uuid = Some(device.to_string());
        asset.body = match entity::parse_asset_body(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, asset = %asset.asset_id, "asset body did not parse as xml, keeping raw text");
                let mut fallback = entity::Entity::new("Asset");
                fallback.set("xml", Value::String(body));
                fallback
            }
        };
        return Some(Frame::Asset(asset));
    }
    if first == "@REMOVE_ALL_ASSETS@" {
        let asset_type = tokens.get(1).cloned();
        return Some(Frame::AssetCommand(AssetCommand::RemoveAll { asset_type }));
    }
    if first == "@REMOVE_ASSET@" {
        let id = tokens.get(1)?.clone();
        return Some(Frame::AssetCommand(AssetCommand::RemoveAsset { asset_id: id }));
    }
    None
}

fn expected_token_count(d: &DataItemDescriptor) -> usize {
    match d.category {
        Category::Condition => 5,
        Category::Event if d.data_type == "ALARM" => 5,
        Category::Event if d.data_type == "MESSAGE" => 2,
        Category::Event if matches!(d.data_type.as_str(), "ASSET_CHANGED" | "ASSET_REMOVED") => 2,
        Category::Sample if d.representation == Representation::TimeSeries => 3,
        _ => 1,
    }
}

fn is_unavailable(token: &str) -> bool {
    token.eq_ignore_ascii_case("UNAVAILABLE")
}

fn strip_trigger(token: &str) -> (Option<String>, &str) {
    if let Some(rest) = token.strip_prefix(':') {
        if let Some((trigger, value)) = rest.split_once(' ') {
            return (Some(trigger.to_string()), value);
        }
    }
    (None, token)
}

/// Parses a space-separated `key=value` list (§4.3.3 item 5). A value
/// wrapped in `{...}` is a table row: its contents are themselves a
/// space-separated `key=value` list, parsed recursively so a row's entries
/// can nest further rows.
fn parse_dataset(token: &str) -> DataSet {
    let mut set = DataSet::new();
    for part in split_respecting_braces(token) {
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim();
            let parsed = match value.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
                Some(row) => DataSetValue::Row(parse_dataset(row)),
                None => DataSetValue::String(value.to_string()),
            };
            set.insert(Entry {
                key: key.to_string(),
                value: parsed,
                removed: false,
            });
        } else {
            set.remove(part);
        }
    }
    set
}

/// Splits `token` on whitespace, but whitespace inside a `{...}` span does
/// not count as a separator, so a table-row value is kept as one field.
fn split_respecting_braces(token: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for ch in token.chars() {
        match ch {
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' => {
                depth -= 1;
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn build_observation(
    d: &DataItemDescriptor,
    timestamp: DateTime<Utc>,
    duration: Option<f64>,
    record: &[String],
) -> Result<Observation, crate::error::ShdrError> {
    let data_item: entity::DataItemRef = std::sync::Weak::new();
    let mut unavailable = false;
    let mut reset_triggered = None;

    let value = match d.category {
        Category::Condition => {
            let level_tok = record.first().cloned().unwrap_or_default();
            let native_code = record.get(1).cloned();
            let native_severity = record.get(2).cloned();
            let qualifier = record.get(3).cloned();
            let message = record.get(4).cloned().unwrap_or_default();
            if is_unavailable(&level_tok) {
                unavailable = true;
            }
            let level = match level_tok.to_ascii_uppercase().as_str() {
                "NORMAL" => entity::ConditionLevel::Normal,
                "WARNING" => entity::ConditionLevel::Warning,
                "FAULT" => entity::ConditionLevel::Fault,
                "UNAVAILABLE" => entity::ConditionLevel::Unavailable,
                _ => entity::ConditionLevel::Normal,
            };
            let node = entity::ConditionNode {
                level,
                code: native_code.clone().unwrap_or_default(),
                native_severity,
                qualifier,
                message: Value::String(message),
            };
            let chain = entity::ConditionChain::new().insert_active(node);
            ObservationValue::Condition(chain)
        }
        Category::Event if d.data_type == "ALARM" => ObservationValue::Alarm {
            code: record.first().cloned().unwrap_or_default(),
            native_code: record.get(1).cloned(),
            severity: record.get(2).cloned(),
            state: record.get(3).cloned().unwrap_or_default(),
            message: record.get(4).cloned().unwrap_or_default(),
        },
        Category::Event if d.data_type == "MESSAGE" => ObservationValue::Message {
            native_code: record.first().cloned(),
            text: record.get(1).cloned().unwrap_or_default(),
        },
        Category::Event
            if matches!(d.data_type.as_str(), "ASSET_CHANGED" | "ASSET_REMOVED") =>
        {
            ObservationValue::AssetEvent {
                asset_type: record.first().cloned(),
                asset_id: record.get(1).cloned().unwrap_or_default(),
            }
        }
        Category::Sample if d.representation == Representation::TimeSeries => {
            let sample_count = record.first().and_then(|s| s.parse().ok()).unwrap_or(0);
            let sample_rate = record.get(1).and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let values = record
                .get(2)
                .map(|s| {
                    s.split_whitespace()
                        .filter_map(|t| t.parse::<f64>().ok())
                        .collect()
                })
                .unwrap_or_default();
            ObservationValue::Timeseries {
                sample_rate,
                sample_count,
                values,
            }
        }
        Category::Sample if d.representation == Representation::ThreeD => {
            let tok = record.first().cloned().unwrap_or_default();
            let parts: Vec<f64> = tok
                .split_whitespace()
                .filter_map(|t| t.parse::<f64>().ok())
                .collect();
            if parts.len() == 3 {
                ObservationValue::ThreeSpaceSample([parts[0], parts[1], parts[2]])
            } else {
                ObservationValue::ThreeSpaceSample([0.0, 0.0, 0.0])
            }
        }
        Category::Sample => {
            let tok = record.first().cloned().unwrap_or_default();
            if is_unavailable(&tok) {
                unavailable = true;
                ObservationValue::Sample(0.0)
            } else {
                let (trigger, value_str) = strip_trigger(&tok);
                reset_triggered = trigger;
                match value_str.parse::<f64>() {
                    Ok(v) => ObservationValue::Sample(v),
                    Err(_) => {
                        return Err(crate::error::ShdrError::ConversionFailed {
                            id: d.id().to_string(),
                            reason: format!("not a number: `{}`", value_str),
                        })
                    }
                }
            }
        }
        Category::Event
            if matches!(
                d.representation,
                Representation::DataSet | Representation::Table
            ) =>
        {
            let tok = record.first().cloned().unwrap_or_default();
            let set = parse_dataset(&tok);
            let count = set.len() as u32;
            if d.representation == Representation::Table {
                ObservationValue::TableEvent { rows: set }
            } else {
                ObservationValue::DataSetEvent { set, count }
            }
        }
        Category::Event => {
            let tok = record.first().cloned().unwrap_or_default();
            if is_unavailable(&tok) {
                unavailable = true;
                ObservationValue::Event(Value::Absent)
            } else {
                let (trigger, value_str) = strip_trigger(&tok);
                reset_triggered = trigger;
                ObservationValue::Event(Value::String(value_str.to_string()))
            }
        }
    };

    Ok(Observation {
        data_item_id: d.id().to_string(),
        data_item,
        device: None,
        timestamp,
        duration,
        unavailable,
        sequence: None,
        quality: None,
        deprecated: false,
        reset_triggered,
        value,
    })
}

impl Transform<Frame> for TokenMapper {
    fn name(&self) -> &str {
        "token_mapper"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Timestamped { .. } => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::Timestamped {
                timestamp,
                duration,
                tokens,
                device,
            } => {
                let device = device.unwrap_or_else(|| self.default_device.clone());
                let out = self.map(timestamp, duration, &device, tokens);
                Some(out)
            }
            other => Some(other),
        }
    }
}
