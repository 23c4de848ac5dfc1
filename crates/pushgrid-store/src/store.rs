//! MetricStore: the public handle to the serializer task.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use pushgrid_core::{GroupingKey, MetricFamily};

use crate::error::{StoreError, StoreResult};
use crate::persist;
use crate::serializer::{Request, Serializer};
use crate::table::{GroupTable, Snapshot};

/// How a [`MetricStore`] is set up.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Snapshot file. `None` keeps everything in memory.
    pub persistence_file: Option<PathBuf>,
    /// Minimum time between two debounced snapshot writes.
    pub persistence_interval: Duration,
    /// Bound on how long a caller waits for room in the request queue.
    /// An accepted request is always waited for.
    pub request_timeout: Duration,
    /// Request queue capacity.
    pub queue_depth: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            persistence_file: None,
            persistence_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(5),
            queue_depth: 1024,
        }
    }
}

impl StoreOptions {
    pub fn with_persistence(mut self, file: impl Into<PathBuf>, interval: Duration) -> Self {
        self.persistence_file = Some(file.into());
        self.persistence_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }
}

/// Cloneable handle to the grouped metric store.
///
/// Every operation is queued to one serializer task, so all callers
/// observe the same total order of pushes and deletes. Dropping the last
/// handle shuts the store down as if [`MetricStore::shutdown`] had been
/// called, without anyone to report the result to.
#[derive(Clone)]
pub struct MetricStore {
    tx: mpsc::Sender<Request>,
    request_timeout: Duration,
    writes: Arc<AtomicU64>,
}

impl MetricStore {
    /// Restore state (if persistence is configured) and start the serializer.
    ///
    /// Never fails: an unusable snapshot file is logged and the store
    /// starts empty.
    pub async fn open(options: StoreOptions) -> Self {
        let writes = Arc::new(AtomicU64::new(0));

        let (table, persister) = match options.persistence_file.clone() {
            Some(path) => {
                let counter = writes.clone();
                match tokio::task::spawn_blocking(move || persist::restore(&path, counter)).await
                {
                    Ok(restored) => (GroupTable::from_groups(restored.groups), restored.persister),
                    Err(e) => {
                        error!(error = %e, "snapshot restore task failed; starting empty");
                        (GroupTable::new(), None)
                    }
                }
            }
            None => (GroupTable::new(), None),
        };

        info!(
            groups = table.len(),
            file = ?options.persistence_file,
            interval_ms = options.persistence_interval.as_millis() as u64,
            "metric store opened"
        );

        let (tx, rx) = mpsc::channel(options.queue_depth.max(1));
        let serializer = Serializer::new(table, persister, options.persistence_interval);
        tokio::spawn(serializer.run(rx));

        Self {
            tx,
            request_timeout: options.request_timeout,
            writes,
        }
    }

    /// Replace the group at `key` with `families`.
    ///
    /// A rejected push leaves any existing group untouched.
    pub async fn push(&self, key: GroupingKey, families: Vec<MetricFamily>) -> StoreResult<()> {
        self.request(|reply| Request::Push {
            key,
            families,
            reply,
        })
        .await??;
        Ok(())
    }

    /// Remove the group at exactly `key`. Returns whether one existed;
    /// deleting an absent key is not an error.
    pub async fn delete(&self, key: GroupingKey) -> StoreResult<bool> {
        self.request(|reply| Request::Delete { key, reply }).await
    }

    /// Every group as of this point in the request order.
    pub async fn snapshot(&self) -> StoreResult<Snapshot> {
        self.request(|reply| Request::Snapshot { reply }).await
    }

    /// Write the current state to the snapshot file now.
    ///
    /// A no-op when persistence is disabled.
    pub async fn flush(&self) -> StoreResult<()> {
        self.request(|reply| Request::Flush { reply }).await?
    }

    /// Stop accepting requests, perform the final snapshot write, and
    /// release the snapshot file.
    pub async fn shutdown(&self) -> StoreResult<()> {
        self.request(|reply| Request::Shutdown { reply }).await?
    }

    /// Number of successful snapshot writes since open.
    pub fn persistence_writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Queue a request and wait for its answer.
    ///
    /// Only acquiring a queue slot is bounded by the request timeout. Once
    /// a request is queued it will be applied, so its caller always waits
    /// for the outcome instead of reporting a timeout for a change that
    /// still lands.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> StoreResult<T> {
        let permit = tokio::time::timeout(self.request_timeout, self.tx.reserve())
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(|_| StoreError::ShutDown)?;
        let (reply, rx) = oneshot::channel();
        permit.send(make(reply));
        rx.await.map_err(|_| StoreError::ShutDown)
    }
}
