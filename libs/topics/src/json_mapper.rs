use chrono::{DateTime, Utc};
use contract::{Category, Contract};
use entity::{Asset, AssetCommand, DataSet, DataSetValue, Entry, Observation, ObservationValue, Value};
use pipeline::{Frame, Guard, GuardResult, Transform};
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::warn;

const RESERVED_KEYS: &[&str] = &["timestamp", "device", "asset", "assets"];

/// Streams a JSON document (one object, or one array of objects) into
/// observations (§4.4.2). Each object is a batch for one timestamp;
/// `flush()`-on-end-of-object semantics are modeled by defaulting to `now`
/// when no `timestamp` key was present in the object. A batch can mix
/// observation, asset, and asset-command frames; since `Transform::apply`
/// only hands back one value synchronously, every frame past the first is
/// re-entered into the graph via `forward`, the same continuation pattern
/// `filters::PeriodFilter` uses for its timer-released observations.
pub struct JsonMapper {
    contract: Arc<dyn Contract>,
    default_device: String,
    forward: Arc<dyn Fn(Frame) + Send + Sync>,
}

impl JsonMapper {
    pub fn new(
        contract: Arc<dyn Contract>,
        default_device: impl Into<String>,
        forward: Arc<dyn Fn(Frame) + Send + Sync>,
    ) -> Self {
        JsonMapper {
            contract,
            default_device: default_device.into(),
            forward,
        }
    }

    pub fn map(&self, body: &str) -> Vec<Frame> {
        let parsed: Result<Json, _> = serde_json::from_str(body);
        let doc = match parsed {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "JSON parse failure");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        match doc {
            Json::Array(items) => {
                for item in items {
                    if let Json::Object(map) = item {
                        self.process_object(&map, &self.default_device, &mut out);
                    }
                }
            }
            Json::Object(map) => self.process_object(&map, &self.default_device, &mut out),
            _ => warn!("top-level JSON document is neither object nor array"),
        }
        out
    }

    fn process_object(&self, obj: &serde_json::Map<String, Json>, default_device: &str, out: &mut Vec<Frame>) {
        let timestamp = obj
            .get("timestamp")
            .and_then(Json::as_str)
            .and_then(|s| parse_timestamp(s))
            .unwrap_or_else(Utc::now);

        let device = obj
            .get("device")
            .and_then(Json::as_str)
            .unwrap_or(default_device)
            .to_string();

        if let Some(assets) = obj.get("asset").or_else(|| obj.get("assets")) {
            self.process_assets(assets, &device, timestamp, out);
        }

        for (key, value) in obj {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Some(nested) = value.as_object() {
                if self.contract.find_device(key).is_some() {
                    self.process_object(nested, key, out);
                    continue;
                }
            }
            self.map_data_item_value(key, value, &device, timestamp, out);
        }
    }

    /// `asset`/`assets` is a map keyed by `assetId`. A string value is an XML
    /// asset body to parse (mirrors the SHDR `@ASSET@` command); `null`
    /// removes that asset id; the reserved key `removeAll` takes an asset
    /// type string (or `null` for every type) and clears the whole store.
    fn process_assets(&self, assets: &Json, device: &str, timestamp: DateTime<Utc>, out: &mut Vec<Frame>) {
        let Some(map) = assets.as_object() else {
            warn!("asset/assets value is not a JSON object");
            return;
        };

        for (key, value) in map {
            if key == "removeAll" {
                let asset_type = value.as_str().map(str::to_string);
                out.push(Frame::AssetCommand(AssetCommand::RemoveAll { asset_type }));
                continue;
            }
            match value {
                Json::Null => {
                    out.push(Frame::AssetCommand(AssetCommand::RemoveAsset { asset_id: key.clone() }));
                }
                Json::String(xml) => match entity::parse_asset_body(xml) {
                    Ok(body) => {
                        let asset_type = body.name.clone();
                        let mut asset = Asset::new(key.clone(), asset_type, timestamp);
                        asset.device_uuid = Some(device.to_string());
                        asset.body = body;
                        out.push(Frame::Asset(asset));
                    }
                    Err(e) => warn!(error = %e, asset_id = key.as_str(), "asset body did not parse as xml"),
                },
                other => warn!(asset_id = key.as_str(), value = %other, "unsupported asset value shape"),
            }
        }
    }

    fn map_data_item_value(
        &self,
        key: &str,
        value: &Json,
        device: &str,
        timestamp: DateTime<Utc>,
        out: &mut Vec<Frame>,
    ) {
        let descriptor = match self.contract.find_data_item(device, key) {
            Some(d) => d,
            None => {
                warn!(key, device, "unresolved data item in JSON batch");
                return;
            }
        };

        let obs_value = match value {
            Json::String(s) => ObservationValue::Event(Value::String(s.clone())),
            Json::Number(n) => ObservationValue::Sample(n.as_f64().unwrap_or(0.0)),
            Json::Bool(b) => ObservationValue::Event(Value::Bool(*b)),
            Json::Array(items) => {
                let values: Vec<f64> = items.iter().filter_map(Json::as_f64).collect();
                if values.len() == 3 {
                    ObservationValue::ThreeSpaceSample([values[0], values[1], values[2]])
                } else {
                    ObservationValue::Timeseries {
                        sample_rate: 0.0,
                        sample_count: values.len() as u32,
                        values,
                    }
                }
            }
            Json::Object(map) => {
                if descriptor.category == Category::Condition {
                    let level = map.get("level").and_then(Json::as_str).unwrap_or("NORMAL");
                    let message = map
                        .get("value")
                        .or_else(|| map.get("message"))
                        .and_then(Json::as_str)
                        .unwrap_or_default();
                    let node = entity::ConditionNode {
                        level: match level.to_ascii_uppercase().as_str() {
                            "WARNING" => entity::ConditionLevel::Warning,
                            "FAULT" => entity::ConditionLevel::Fault,
                            "UNAVAILABLE" => entity::ConditionLevel::Unavailable,
                            _ => entity::ConditionLevel::Normal,
                        },
                        code: map
                            .get("nativeCode")
                            .and_then(Json::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        native_severity: map.get("nativeSeverity").and_then(Json::as_str).map(String::from),
                        qualifier: map.get("qualifier").and_then(Json::as_str).map(String::from),
                        message: Value::String(message.to_string()),
                    };
                    ObservationValue::Condition(entity::ConditionChain::new().insert_active(node))
                } else {
                    let mut set = DataSet::new();
                    for (k, v) in map {
                        if v.is_null() {
                            set.remove(k);
                        } else {
                            set.insert(Entry {
                                key: k.clone(),
                                value: json_to_dataset_value(v),
                                removed: false,
                            });
                        }
                    }
                    let count = set.len() as u32;
                    ObservationValue::DataSetEvent { set, count }
                }
            }
            Json::Null => ObservationValue::Event(Value::Absent),
        };

        out.push(Frame::Observation(Observation {
            data_item_id: descriptor.id().to_string(),
            data_item: std::sync::Arc::downgrade(&descriptor.handle),
            device: Some(device.to_string()),
            timestamp,
            duration: None,
            unavailable: false,
            sequence: None,
            quality: None,
            deprecated: false,
            reset_triggered: None,
            value: obs_value,
        }));
    }
}

fn json_to_dataset_value(v: &Json) -> DataSetValue {
    match v {
        Json::String(s) => DataSetValue::String(s.clone()),
        Json::Number(n) => n
            .as_i64()
            .map(DataSetValue::Int)
            .unwrap_or_else(|| DataSetValue::Double(n.as_f64().unwrap_or(0.0))),
        Json::Object(map) => {
            let mut row = DataSet::new();
            for (k, v) in map {
                row.insert(Entry {
                    key: k.clone(),
                    value: json_to_dataset_value(v),
                    removed: false,
                });
            }
            DataSetValue::Row(row)
        }
        _ => DataSetValue::Absent,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Transform<Frame> for JsonMapper {
    fn name(&self) -> &str {
        "json_mapper"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::JsonMessage { .. } => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::JsonMessage { body, .. } => {
                let mut frames = self.map(&body);
                if frames.is_empty() {
                    return None;
                }
                let first = frames.remove(0);
                for frame in frames {
                    (self.forward)(frame);
                }
                Some(first)
            }
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract::{DataItemDescriptor, Device, Representation};
    use entity::DataItemHandle;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeContract(Mutex<HashMap<(String, String), Arc<DataItemDescriptor>>>);

    impl Contract for FakeContract {
        fn find_device(&self, _: &str) -> Option<Device> {
            None
        }
        fn find_data_item(&self, device: &str, id: &str) -> Option<Arc<DataItemDescriptor>> {
            self.0.lock().unwrap().get(&(device.to_string(), id.to_string())).cloned()
        }
        fn each_data_item(&self, _: &mut dyn FnMut(&DataItemDescriptor)) {}
        fn schema_version(&self) -> i32 {
            200
        }
        fn is_validating(&self) -> bool {
            true
        }
        fn deliver_observation(&self, _: Observation) {}
        fn deliver_asset(&self, _: entity::Asset) {}
        fn deliver_devices(&self, _: Vec<Device>) {}
        fn deliver_device(&self, _: Device) {}
        fn deliver_asset_command(&self, _: entity::Entity) {}
        fn deliver_command(&self, _: entity::Entity) {}
        fn deliver_connect_status(&self, _: entity::Entity, _: Vec<Device>, _: bool) {}
        fn source_failed(&self, _: &str) {}
        fn check_duplicate(&self, obs: &Observation) -> Option<Observation> {
            Some(obs.clone())
        }
    }

    fn descriptor(id: &str, category: Category) -> Arc<DataItemDescriptor> {
        Arc::new(DataItemDescriptor {
            handle: Arc::new(DataItemHandle { id: id.to_string() }),
            name: None,
            category,
            data_type: "GENERIC".to_string(),
            sub_type: None,
            units: None,
            representation: Representation::Value,
            minimum_delta: None,
            minimum_period: None,
            reset_trigger: None,
            constant_value: None,
            conversion_required: false,
        })
    }

    fn no_forward() -> Arc<dyn Fn(Frame) + Send + Sync> {
        Arc::new(|_| {})
    }

    #[test]
    fn json_batch_yields_event_and_sample() {
        let mut items = HashMap::new();
        items.insert(("default".to_string(), "a".to_string()), descriptor("a", Category::Event));
        items.insert(("default".to_string(), "b".to_string()), descriptor("b", Category::Sample));
        let contract = Arc::new(FakeContract(Mutex::new(items)));
        let mapper = JsonMapper::new(contract, "default", no_forward());
        let frames = mapper.map(r#"{"timestamp":"2023-11-09T11:20:00Z","a":"ACTIVE","b":123.456}"#);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn asset_key_parses_xml_body_into_asset_frame() {
        let contract = Arc::new(FakeContract(Mutex::new(HashMap::new())));
        let mapper = JsonMapper::new(contract, "default", no_forward());
        let frames = mapper.map(
            r#"{"timestamp":"2023-11-09T11:20:00Z","assets":{"T1":"<CuttingTool assetId=\"T1\" serialNumber=\"S1\"/>"}}"#,
        );
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Asset(asset) => {
                assert_eq!(asset.asset_id, "T1");
                assert_eq!(asset.asset_type, "CuttingTool");
                assert_eq!(asset.body.get("serialNumber"), Value::String("S1".into()));
            }
            other => panic!("expected an asset frame, got {other:?}"),
        }
    }

    #[test]
    fn asset_key_null_value_removes_asset() {
        let contract = Arc::new(FakeContract(Mutex::new(HashMap::new())));
        let mapper = JsonMapper::new(contract, "default", no_forward());
        let frames = mapper.map(r#"{"assets":{"T1":null}}"#);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::AssetCommand(AssetCommand::RemoveAsset { asset_id }) => {
                assert_eq!(asset_id, "T1");
            }
            other => panic!("expected a remove-asset command, got {other:?}"),
        }
    }

    #[test]
    fn asset_key_remove_all_maps_to_command() {
        let contract = Arc::new(FakeContract(Mutex::new(HashMap::new())));
        let mapper = JsonMapper::new(contract, "default", no_forward());
        let frames = mapper.map(r#"{"assets":{"removeAll":"CuttingTool"}}"#);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::AssetCommand(AssetCommand::RemoveAll { asset_type }) => {
                assert_eq!(asset_type.as_deref(), Some("CuttingTool"));
            }
            other => panic!("expected a remove-all command, got {other:?}"),
        }
    }

    #[test]
    fn extra_frames_beyond_the_first_are_forwarded() {
        let mut items = HashMap::new();
        items.insert(("default".to_string(), "a".to_string()), descriptor("a", Category::Event));
        let contract = Arc::new(FakeContract(Mutex::new(items)));
        let forwarded = Arc::new(Mutex::new(Vec::new()));
        let forwarded2 = forwarded.clone();
        let mapper = JsonMapper::new(
            contract,
            "default",
            Arc::new(move |f: Frame| forwarded2.lock().unwrap().push(f)),
        );
        let result = mapper.apply(Frame::JsonMessage {
            device: None,
            data_item: None,
            body: r#"{"a":"ACTIVE","assets":{"T1":null}}"#.to_string(),
        });
        assert!(result.is_some());
        assert_eq!(forwarded.lock().unwrap().len(), 1);
    }
}
