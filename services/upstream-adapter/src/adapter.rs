use crate::error::AdapterError;
use crate::identity::adapter_identity;
use crate::multipart::{extract_boundary, MultipartReader};
use contract::Contract;
use futures_util::StreamExt;
use pipeline::Frame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, warn};

/// Connection states for the upstream-agent lifecycle (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Resolving,
    Connecting,
    Handshaking,
    Probe,
    Assets,
    Current,
    Sample(SampleMode),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    Stream,
    Poll,
}

/// The five error codes the §4.8 taxonomy table says downstream transforms
/// can raise back into the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorCode {
    InstanceIdChanged,
    RestartStream,
    RetryRequest,
    StreamClosed,
    MultipartStreamFailed,
    AdapterFailed,
}

impl UpstreamErrorCode {
    pub fn into_error(self, reason: impl Into<String>) -> AdapterError {
        match self {
            UpstreamErrorCode::InstanceIdChanged => AdapterError::InstanceIdChanged,
            UpstreamErrorCode::RestartStream => AdapterError::RestartStream,
            UpstreamErrorCode::RetryRequest => AdapterError::RetryRequest,
            UpstreamErrorCode::StreamClosed => AdapterError::StreamClosed,
            UpstreamErrorCode::MultipartStreamFailed => AdapterError::MultipartStreamFailed,
            UpstreamErrorCode::AdapterFailed => AdapterError::AdapterFailed(reason.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub url: String,
    pub source_device: String,
    pub probe_agent: bool,
    pub heartbeat: Duration,
    pub interval: Duration,
    pub polling_interval: Duration,
    pub reconnect_interval: Duration,
    pub count: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
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

#[derive(Default)]
struct Feedback {
    next_sequence: Option<u64>,
}

/// Replays another agent's stream into the head of this pipeline over
/// HTTP(S), driven as its own task (§4.8, §5). Grounded on the teacher's
/// `ConnectionManager` shape: an explicit state enum, backoff between
/// reconnects, and a forwarding callback instead of a channel so callers
/// decide how frames re-enter the pipeline.
pub struct UpstreamAdapter {
    config: AdapterConfig,
    contract: Arc<dyn Contract>,
    client: reqwest::Client,
    state: Arc<RwLock<ConnectionState>>,
    mode: Arc<RwLock<SampleMode>>,
    feedback: Arc<RwLock<Feedback>>,
    forward: Arc<dyn Fn(Frame) + Send + Sync>,
}

impl UpstreamAdapter {
    pub fn new(
        config: AdapterConfig,
        contract: Arc<dyn Contract>,
        forward: Arc<dyn Fn(Frame) + Send + Sync>,
    ) -> Self {
        UpstreamAdapter {
            client: reqwest::Client::new(),
            config,
            contract,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            mode: Arc::new(RwLock::new(SampleMode::Stream)),
            feedback: Arc::new(RwLock::new(Feedback::default())),
            forward,
        }
    }

    pub fn identity(&self) -> String {
        adapter_identity(&self.config.url, &self.config.source_device)
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn set_state(&self, next: ConnectionState) {
        *self.state.write().await = next;
    }

    /// Drives the state machine until it reaches `Failed`. Meant to run as
    /// its own task; returns only on a permanent `ADAPTER_FAILED`.
    pub async fn run(&self) {
        loop {
            self.set_state(ConnectionState::Resolving).await;
            self.set_state(ConnectionState::Connecting).await;

            if self.config.url.starts_with("https://") {
                self.set_state(ConnectionState::Handshaking).await;
            }

            if let Err(err) = self.establish().await {
                self.handle_error(err).await;
                if self.state().await == ConnectionState::Failed {
                    return;
                }
                continue;
            }

            let mode = *self.mode.read().await;
            self.set_state(ConnectionState::Sample(mode)).await;
            let result = match mode {
                SampleMode::Stream => self.stream_long_poll().await,
                SampleMode::Poll => self.poll_short().await,
            };
            let err = match result {
                Ok(()) => unreachable!("sample loops only return on error"),
                Err(err) => err,
            };
            self.handle_error(err).await;
            if self.state().await == ConnectionState::Failed {
                return;
            }
        }
    }

    async fn establish(&self) -> Result<(), AdapterError> {
        if self.config.probe_agent {
            self.set_state(ConnectionState::Probe).await;
            self.fetch("probe").await?;
        }
        self.set_state(ConnectionState::Assets).await;
        self.fetch("assets").await?;
        self.set_state(ConnectionState::Current).await;
        self.fetch("current").await?;
        Ok(())
    }

    async fn fetch(&self, endpoint: &str) -> Result<(), AdapterError> {
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), endpoint);
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let body = resp.text().await?;
        self.emit(body);
        Ok(())
    }

    fn emit(&self, text: String) {
        (self.forward)(Frame::Raw {
            text,
            device: Some(self.config.source_device.clone()),
        });
    }

    async fn stream_long_poll(&self) -> Result<(), AdapterError> {
        let next = self.feedback.read().await.next_sequence;
        let mut url = format!(
            "{}/sample?interval={}&heartbeat={}",
            self.config.url.trim_end_matches('/'),
            self.config.interval.as_millis(),
            self.config.heartbeat.as_millis(),
        );
        if let Some(next) = next {
            url.push_str(&format!("&from={next}"));
        }

        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let boundary = extract_boundary(&content_type)
            .ok_or_else(|| AdapterError::FramingFailed("response missing multipart boundary".into()))?;

        let mut reader = MultipartReader::new(boundary);
        let mut stream = resp.bytes_stream();
        let timeout = self.config.heartbeat * 2;

        loop {
            let next_chunk = tokio::time::timeout(timeout, stream.next())
                .await
                .map_err(|_| AdapterError::MultipartStreamFailed)?;
            let chunk = match next_chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(err)) => return Err(AdapterError::Http(err)),
                None => return Err(AdapterError::StreamClosed),
            };
            reader.push(&chunk);
            while let Some(payload) = reader.next_payload()? {
                self.emit(String::from_utf8_lossy(&payload).into_owned());
            }
        }
    }

    async fn poll_short(&self) -> Result<(), AdapterError> {
        loop {
            let next = self.feedback.read().await.next_sequence;
            let mut url = format!(
                "{}/sample?count={}",
                self.config.url.trim_end_matches('/'),
                self.config.count,
            );
            if let Some(next) = next {
                url.push_str(&format!("&from={next}"));
            }
            let resp = self.client.get(&url).send().await?.error_for_status()?;
            let body = resp.text().await?;
            self.emit(body);
            tokio::time::sleep(self.config.polling_interval).await;
        }
    }

    /// Raises a taxonomy error code from downstream into the adapter
    /// (§4.8). Exposed so the pipeline side of the contract can report
    /// protocol errors without reaching back into HTTP internals.
    pub async fn report_error(&self, code: UpstreamErrorCode, reason: impl Into<String>) {
        self.handle_error(code.into_error(reason)).await;
    }

    async fn handle_error(&self, err: AdapterError) {
        let identity = self.identity();
        match err {
            AdapterError::InstanceIdChanged | AdapterError::RestartStream => {
                warn!(%identity, "instance id changed or restart requested, clearing feedback");
                *self.feedback.write().await = Feedback::default();
                self.set_state(ConnectionState::Disconnected).await;
                tokio::time::sleep(self.config.reconnect_interval).await;
            }
            AdapterError::RetryRequest | AdapterError::StreamClosed | AdapterError::Http(_) => {
                warn!(%identity, "connection dropped, reconnecting");
                self.set_state(ConnectionState::Disconnected).await;
                tokio::time::sleep(self.config.reconnect_interval).await;
            }
            AdapterError::MultipartStreamFailed | AdapterError::FramingFailed(_) => {
                warn!(%identity, "multipart stream failed, switching to polling");
                *self.mode.write().await = SampleMode::Poll;
                self.set_state(ConnectionState::Disconnected).await;
                tokio::time::sleep(self.config.reconnect_interval).await;
            }
            AdapterError::AdapterFailed(reason) => {
                error!(%identity, %reason, "adapter failed permanently");
                self.contract.source_failed(&identity);
                self.set_state(ConnectionState::Failed).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract::{DataItemDescriptor, Device};
    use entity::{Asset, Entity, Observation};
    use std::sync::Mutex;

    struct FakeContract {
        failed: Mutex<Vec<String>>,
    }

    impl Contract for FakeContract {
        fn find_device(&self, _: &str) -> Option<Device> {
            None
        }
        fn find_data_item(&self, _: &str, _: &str) -> Option<Arc<DataItemDescriptor>> {
            None
        }
        fn each_data_item(&self, _: &mut dyn FnMut(&DataItemDescriptor)) {}
        fn schema_version(&self) -> i32 {
            200
        }
        fn is_validating(&self) -> bool {
            true
        }
        fn deliver_observation(&self, _: Observation) {}
        fn deliver_asset(&self, _: Asset) {}
        fn deliver_devices(&self, _: Vec<Device>) {}
        fn deliver_device(&self, _: Device) {}
        fn deliver_asset_command(&self, _: Entity) {}
        fn deliver_command(&self, _: Entity) {}
        fn deliver_connect_status(&self, _: Entity, _: Vec<Device>, _: bool) {}
        fn source_failed(&self, identity: &str) {
            self.failed.lock().unwrap().push(identity.to_string());
        }
        fn check_duplicate(&self, obs: &Observation) -> Option<Observation> {
            Some(obs.clone())
        }
    }

    fn test_adapter() -> (UpstreamAdapter, Arc<FakeContract>) {
        let contract = Arc::new(FakeContract {
            failed: Mutex::new(Vec::new()),
        });
        let config = AdapterConfig {
            url: "http://localhost:5000".into(),
            source_device: "device1".into(),
            reconnect_interval: Duration::from_millis(1),
            ..AdapterConfig::default()
        };
        let adapter = UpstreamAdapter::new(config, contract.clone(), Arc::new(|_| {}));
        (adapter, contract)
    }

    #[tokio::test]
    async fn multipart_stream_failure_switches_to_polling_without_stopping() {
        let (adapter, contract) = test_adapter();
        adapter.report_error(UpstreamErrorCode::MultipartStreamFailed, "timeout").await;
        assert_eq!(*adapter.mode.read().await, SampleMode::Poll);
        assert_eq!(adapter.state().await, ConnectionState::Disconnected);
        assert!(contract.failed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn adapter_failed_stops_and_notifies_contract() {
        let (adapter, contract) = test_adapter();
        adapter.report_error(UpstreamErrorCode::AdapterFailed, "fatal").await;
        assert_eq!(adapter.state().await, ConnectionState::Failed);
        assert_eq!(contract.failed.lock().unwrap().len(), 1);
        assert_eq!(contract.failed.lock().unwrap()[0], adapter.identity());
    }

    #[tokio::test]
    async fn instance_id_changed_clears_feedback() {
        let (adapter, _contract) = test_adapter();
        adapter.feedback.write().await.next_sequence = Some(42);
        adapter.report_error(UpstreamErrorCode::InstanceIdChanged, "").await;
        assert_eq!(adapter.feedback.read().await.next_sequence, None);
        assert_eq!(adapter.state().await, ConnectionState::Disconnected);
    }
}
