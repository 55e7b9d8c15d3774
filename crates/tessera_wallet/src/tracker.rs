use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatcher::{FailureMessage, UNKNOWN_ERROR};
use crate::normalizer::{TransactionRecord, find_record, normalize_transactions};
use crate::sdk::{SdkError, WalletSdk};

/// What a poll of the order history found for the tracked job.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchUpdate {
    Found(TransactionRecord),
    NotFound,
    /// The history fetch failed; polling continues.
    Error(String),
}

impl WatchUpdate {
    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            Self::Found(record) => Some(record),
            _ => None,
        }
    }

    /// Whether another poll is worth doing after this update.
    fn keeps_polling(&self) -> bool {
        match self {
            Self::Found(record) => record.job_status().is_pending(),
            Self::NotFound => false,
            Self::Error(_) => true,
        }
    }
}

/// Polls the order history for submitted jobs.
#[derive(Clone)]
pub struct JobTracker {
    sdk: Arc<dyn WalletSdk>,
    interval: Duration,
}

impl JobTracker {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new(sdk: Arc<dyn WalletSdk>) -> Self {
        Self {
            sdk,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch the history once and look the job up.
    pub async fn lookup(&self, job_id: &str) -> Result<Option<TransactionRecord>, SdkError> {
        let history = self.sdk.get_orders_history().await?;
        Ok(find_record(&normalize_transactions(&history), job_id).cloned())
    }

    /// Start polling for `job_id` until it leaves a pending status.
    ///
    /// Polling is tied to the returned handle: dropping it, or calling
    /// [`JobWatch::stop`], ends the task.
    pub fn watch(&self, job_id: impl Into<String>) -> JobWatch {
        let job_id = job_id.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);

        let handle = tokio::spawn(poll_job(
            self.sdk.clone(),
            job_id.clone(),
            self.interval,
            cancel.clone(),
            tx,
        ));

        JobWatch {
            job_id,
            cancel,
            rx,
            handle: Some(handle),
        }
    }
}

async fn poll_job(
    sdk: Arc<dyn WalletSdk>,
    job_id: String,
    interval: Duration,
    cancel: CancellationToken,
    tx: watch::Sender<Option<WatchUpdate>>,
) {
    debug!(job = %job_id, ?interval, "job watch started");
    loop {
        let update = match sdk.get_orders_history().await {
            Ok(history) => match find_record(&normalize_transactions(&history), &job_id) {
                Some(record) => WatchUpdate::Found(record.clone()),
                None => WatchUpdate::NotFound,
            },
            Err(e) => {
                let message = e.failure_message().unwrap_or_else(|| UNKNOWN_ERROR.into());
                warn!(job = %job_id, "order history fetch failed: {message}");
                WatchUpdate::Error(message)
            }
        };

        if cancel.is_cancelled() {
            break;
        }
        let keep_polling = update.keeps_polling();
        if tx.send(Some(update)).is_err() || !keep_polling {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!(job = %job_id, "job watch finished");
}

/// Handle to a running job watch. Dropping it stops the polling.
pub struct JobWatch {
    job_id: String,
    cancel: CancellationToken,
    rx: watch::Receiver<Option<WatchUpdate>>,
    handle: Option<JoinHandle<()>>,
}

impl JobWatch {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The most recent update, if any poll has completed.
    pub fn latest(&self) -> Option<WatchUpdate> {
        self.rx.borrow().clone()
    }

    /// Wait for the next update. `None` once polling has ended.
    pub async fn changed(&mut self) -> Option<WatchUpdate> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<WatchUpdate>> {
        self.rx.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for polling to end on its own and return the final update.
    pub async fn join(mut self) -> Option<WatchUpdate> {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(job = %self.job_id, "job watch task failed: {e}");
            }
        }
        self.latest()
    }
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
