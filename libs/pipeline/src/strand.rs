use tokio::sync::mpsc;
use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serializing executor: work posted to it runs one at a time, in post
/// order. The pipeline, its graph mutations, and its timers all post here so
/// they are sequentially consistent with each other (§5 concurrency model).
#[derive(Clone)]
pub struct StrandHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl StrandHandle {
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            trace!("strand post after shutdown, dropping job");
        }
    }

    pub async fn post_and_wait<F, R>(&self, job: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.post(move || {
            let _ = reply_tx.send(job());
        });
        reply_rx.await.ok()
    }
}

/// Owns the strand's task and receiver; dropping it stops the drain loop
/// once all `StrandHandle` senders are dropped.
pub struct Strand {
    handle: StrandHandle,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Strand {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let task = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        Strand {
            handle: StrandHandle { tx },
            task: Some(task),
        }
    }

    pub fn handle(&self) -> StrandHandle {
        self.handle.clone()
    }

    /// Idempotent: further posts after this become no-ops.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
