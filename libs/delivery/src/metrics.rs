use chrono::Utc;
use entity::{DataItemRef, Observation, ObservationValue};
use pipeline::{Frame, Guard, GuardResult, StrandHandle, Transform};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Periodically reads a delivery stage's counter and, when the decayed
/// average changes, emits a synthetic metrics observation (§4.7). Passive
/// with respect to the frame stream itself: all of its work happens in
/// `start`/`stop`.
pub struct ComputeMetrics {
    counter: Arc<AtomicU64>,
    metrics_data_item: String,
    device: Option<String>,
    forward: Arc<dyn Fn(Observation) + Send + Sync>,
    interval: Duration,
    last_avg: Arc<Mutex<Option<f64>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ComputeMetrics {
    pub fn new(
        counter: Arc<AtomicU64>,
        metrics_data_item: impl Into<String>,
        device: Option<String>,
        forward: Arc<dyn Fn(Observation) + Send + Sync>,
    ) -> Self {
        ComputeMetrics {
            counter,
            metrics_data_item: metrics_data_item.into(),
            device,
            forward,
            interval: Duration::from_secs(10),
            last_avg: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Transform<Frame> for ComputeMetrics {
    fn name(&self) -> &str {
        "compute_metrics"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::always_skip()
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        Some(input)
    }

    fn start(&self, strand: &StrandHandle) {
        let counter = self.counter.clone();
        let data_item = self.metrics_data_item.clone();
        let device = self.device.clone();
        let forward = self.forward.clone();
        let last_avg = self.last_avg.clone();
        let interval = self.interval;
        let strand = strand.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_tick = Instant::now();
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f64();
                last_tick = now;
                let delta = counter.swap(0, Ordering::Relaxed) as f64;

                let mut avg_guard = last_avg.lock().unwrap();
                let decayed = (-dt / 60.0).exp() * (avg_guard.unwrap_or(0.0) - delta);
                let new_avg = delta + decayed;
                let changed = *avg_guard != Some(new_avg);
                *avg_guard = Some(new_avg);
                drop(avg_guard);

                if changed {
                    let data_item = data_item.clone();
                    let device = device.clone();
                    let forward = forward.clone();
                    strand.post(move || {
                        let obs = Observation {
                            data_item_id: data_item,
                            data_item: DataItemRef::new(),
                            device,
                            timestamp: Utc::now(),
                            duration: Some(10.0),
                            unavailable: false,
                            sequence: None,
                            quality: None,
                            deprecated: false,
                            reset_triggered: None,
                            value: ObservationValue::Sample(delta / 10.0),
                        };
                        forward(obs);
                    });
                }
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }
}
