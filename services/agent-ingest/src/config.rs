use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Options named in §6: the knobs that shape how the pipeline is built for
/// a particular device, independent of where they came from (file, CLI,
/// env — loading itself is an external concern, per §1).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub device: String,
    pub schema_version: String,
    pub upcase_data_item_value: bool,
    pub conversion_required: bool,
    pub ignore_timestamps: bool,
    pub relative_time: bool,
    pub filter_duplicates: bool,
    pub shdr_version: ShdrVersionConfig,
    pub metrics_data_item: String,
    #[serde(with = "duration_secs")]
    pub metrics_interval: Duration,
    pub adapter: Option<AdapterSection>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            device: "default".into(),
            schema_version: "2.0".into(),
            upcase_data_item_value: true,
            conversion_required: true,
            ignore_timestamps: false,
            relative_time: false,
            filter_duplicates: true,
            shdr_version: ShdrVersionConfig::V2,
            metrics_data_item: "agent_avg_free_memory".into(),
            metrics_interval: Duration::from_secs(10),
            adapter: None,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("reading config {}: {err}", path.display()))?;
        toml::from_str(&text).map_err(|err| anyhow::anyhow!("parsing config {}: {err}", path.display()))
    }

    /// Encodes `schema_version` the way `Contract::schema_version` does:
    /// `major*100+minor`.
    pub fn encoded_schema_version(&self) -> anyhow::Result<i32> {
        let (major, minor) = self
            .schema_version
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("schema_version must be MAJOR.MINOR, got {}", self.schema_version))?;
        let major: i32 = major.parse()?;
        let minor: i32 = minor.parse()?;
        Ok(major * 100 + minor)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShdrVersionConfig {
    V1,
    V2,
}

/// Connection settings for the optional upstream-agent adapter (C11).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterSection {
    pub url: String,
    pub source_device: String,
    pub probe_agent: bool,
    #[serde(with = "duration_millis")]
    pub heartbeat: Duration,
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    #[serde(with = "duration_millis")]
    pub polling_interval: Duration,
    #[serde(with = "duration_millis")]
    pub reconnect_interval: Duration,
    pub count: u32,
}

impl Default for AdapterSection {
    fn default() -> Self {
        AdapterSection {
            url: String::new(),
            source_device: String::new(),
            probe_agent: true,
            heartbeat: Duration::from_secs(10),
            interval: Duration::from_millis(500),
            polling_interval: Duration::from_millis(500),
            reconnect_interval: Duration::from_secs(5),
            count: 1000,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(de)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(de)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_schema_version_as_major_times_100_plus_minor() {
        let mut config = PipelineConfig::default();
        config.schema_version = "2.5".into();
        assert_eq!(config.encoded_schema_version().unwrap(), 205);
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let toml_text = r#"
            device = "VMC-1"
            schema_version = "1.7"
            upcase_data_item_value = true
            conversion_required = true
            ignore_timestamps = false
            relative_time = false
            filter_duplicates = true
            shdr_version = "v1"
            metrics_data_item = "agent_avg_free_memory"
            metrics_interval = 5
        "#;
        let config: PipelineConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.device, "VMC-1");
        assert_eq!(config.shdr_version, ShdrVersionConfig::V1);
        assert_eq!(config.metrics_interval, Duration::from_secs(5));
        assert!(config.adapter.is_none());
    }
}
