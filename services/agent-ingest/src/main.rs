mod build;
mod config;
mod demo_contract;

use clap::Parser;
use config::PipelineConfig;
use contract::{Category, Contract, DataItemDescriptor, Device, Representation};
use demo_contract::DemoContract;
use pipeline::Frame;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use upstream_adapter::{AdapterConfig, UpstreamAdapter};

/// Runs the MTConnect ingestion pipeline against a demo device model,
/// optionally fed by an upstream-agent adapter.
#[derive(Parser, Debug)]
#[command(name = "agent-ingest", version, about)]
struct Cli {
    /// Path to a PipelineConfig TOML file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the device name from the config file.
    #[arg(long)]
    device: Option<String>,

    /// Log level filter, e.g. "info", "agent_ingest=debug".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut pipeline_config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(device) = cli.device {
        pipeline_config.device = device;
    }

    let contract = Arc::new(DemoContract::new(pipeline_config.encoded_schema_version()?));
    seed_demo_device(&contract, &pipeline_config.device);

    let built = build::build(&pipeline_config, contract.clone())?;
    info!(device = %pipeline_config.device, "pipeline built and running");

    if let Some(adapter_config) = &pipeline_config.adapter {
        if !adapter_config.url.is_empty() {
            let pipeline = built.pipeline.clone();
            let forward_contract = contract.clone();
            let forward = Arc::new(move |frame: Frame| {
                if let Err(err) = pipeline.process(frame) {
                    tracing::warn!(%err, "pipeline rejected adapter frame");
                }
            });
            let adapter = UpstreamAdapter::new(
                AdapterConfig {
                    url: adapter_config.url.clone(),
                    source_device: adapter_config.source_device.clone(),
                    probe_agent: adapter_config.probe_agent,
                    heartbeat: adapter_config.heartbeat,
                    interval: adapter_config.interval,
                    polling_interval: adapter_config.polling_interval,
                    reconnect_interval: adapter_config.reconnect_interval,
                    count: adapter_config.count,
                },
                forward_contract,
                forward,
            );
            info!(identity = %adapter.identity(), "starting upstream adapter");
            tokio::spawn(async move { adapter.run().await });
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Seeds a small demo device model so the pipeline has somewhere to
/// resolve data items for the CLI demo; a real deployment wires `Contract`
/// to its own device-model store instead (§1, §6).
fn seed_demo_device(contract: &DemoContract, device: &str) {
    contract.add_device(Device {
        id: device.to_string(),
        name: device.to_string(),
        uuid: format!("{device}-uuid"),
    });

    contract.add_data_item(
        device,
        DataItemDescriptor {
            handle: demo_contract::handle("avail"),
            name: Some("avail".into()),
            category: Category::Event,
            data_type: "AVAILABILITY".into(),
            sub_type: None,
            units: None,
            representation: Representation::Value,
            minimum_delta: None,
            minimum_period: None,
            reset_trigger: None,
            constant_value: None,
            conversion_required: false,
        },
    );
    contract.add_data_item(
        device,
        DataItemDescriptor {
            handle: demo_contract::handle("execution"),
            name: Some("execution".into()),
            category: Category::Event,
            data_type: "EXECUTION".into(),
            sub_type: None,
            units: None,
            representation: Representation::Value,
            minimum_delta: None,
            minimum_period: None,
            reset_trigger: None,
            constant_value: None,
            conversion_required: false,
        },
    );
    contract.add_data_item(
        device,
        DataItemDescriptor {
            handle: demo_contract::handle("Xact"),
            name: Some("Xact".into()),
            category: Category::Sample,
            data_type: "POSITION".into(),
            sub_type: Some("ACTUAL".into()),
            units: Some("MILLIMETER".into()),
            representation: Representation::Value,
            minimum_delta: Some(0.001),
            minimum_period: None,
            reset_trigger: None,
            constant_value: None,
            conversion_required: false,
        },
    );
}
