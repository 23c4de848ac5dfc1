//! Serializer: the single task that owns the group table.
//!
//! Requests are handled strictly one at a time in arrival order. The
//! debounce deadline is polled in the same `select!` as the queue, so a
//! snapshot write never races a mutation.

use std::ops::ControlFlow;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use pushgrid_core::{GroupingKey, MetricFamily, ValidationResult};

use crate::error::{PersistError, StoreResult};
use crate::persist::Persister;
use crate::table::{GroupTable, Snapshot};

/// One queued store operation and where to send its answer.
pub(crate) enum Request {
    Push {
        key: GroupingKey,
        families: Vec<MetricFamily>,
        reply: oneshot::Sender<ValidationResult<()>>,
    },
    Delete {
        key: GroupingKey,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    /// Write the current table now, ignoring the debounce interval.
    Flush {
        reply: oneshot::Sender<StoreResult<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<StoreResult<()>>,
    },
}

pub(crate) struct Serializer {
    table: GroupTable,
    persister: Option<Persister>,
    interval: Duration,
    /// Table changed since the last successful write.
    dirty: bool,
    /// When the pending debounced write is due.
    deadline: Option<Instant>,
}

impl Serializer {
    pub(crate) fn new(table: GroupTable, persister: Option<Persister>, interval: Duration) -> Self {
        Self {
            table,
            persister,
            interval,
            dirty: false,
            deadline: None,
        }
    }

    /// Process requests until shutdown or until every handle is gone.
    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        info!(
            groups = self.table.len(),
            persistence = self.persister.is_some(),
            "metric store serializer started"
        );

        loop {
            let deadline = self.deadline;
            tokio::select! {
                request = rx.recv() => match request {
                    Some(request) => {
                        if matches!(request, Request::Shutdown { .. }) {
                            // Later senders fail fast while the final write runs.
                            rx.close();
                        }
                        if self.handle(request).await.is_break() {
                            info!("metric store shut down");
                            return;
                        }
                    }
                    None => {
                        // Every handle dropped without an explicit shutdown.
                        if let Err(e) = self.finish().await {
                            error!(error = %e, "final snapshot write failed");
                        }
                        info!("metric store stopped");
                        return;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    if self.dirty {
                        // Failures are logged and rescheduled inside write().
                        let _ = self.write().await;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, request: Request) -> ControlFlow<()> {
        match request {
            Request::Push {
                key,
                families,
                reply,
            } => {
                let result = match self.table.push(key.clone(), families, now_ms()) {
                    Ok(replaced) => {
                        debug!(group = %key, replaced, "group pushed");
                        self.mark_dirty();
                        Ok(())
                    }
                    Err(e) => {
                        debug!(group = %key, error = %e, "push rejected");
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            Request::Delete { key, reply } => {
                let existed = self.table.delete(&key);
                debug!(group = %key, existed, "group deleted");
                if existed {
                    self.mark_dirty();
                }
                let _ = reply.send(existed);
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.table.snapshot());
            }
            Request::Flush { reply } => {
                self.deadline = None;
                let result = self.write().await;
                let _ = reply.send(result);
            }
            Request::Shutdown { reply } => {
                let result = self.finish().await;
                let _ = reply.send(result);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Final write, then release the snapshot file.
    async fn finish(&mut self) -> StoreResult<()> {
        self.deadline = None;
        let result = self.write().await;
        self.persister = None;
        result
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.arm();
    }

    fn arm(&mut self) {
        if self.persister.is_some() && self.deadline.is_none() {
            // No deadline when the interval overflows the clock; flush and
            // shutdown still write.
            self.deadline = Instant::now().checked_add(self.interval);
        }
    }

    /// Write the current table. A failure keeps the table dirty and
    /// schedules a retry one interval out.
    async fn write(&mut self) -> StoreResult<()> {
        let Some(persister) = self.persister.clone() else {
            return Ok(());
        };
        let snapshot = self.table.snapshot();
        self.dirty = false;

        let result = tokio::task::spawn_blocking(move || persister.write(snapshot.shared()))
            .await
            .unwrap_or_else(|e| Err(PersistError::Write(format!("write task failed: {e}"))));

        if let Err(e) = &result {
            warn!(error = %e, retry_in_ms = self.interval.as_millis() as u64, "snapshot write failed");
            self.dirty = true;
            self.arm();
        }
        Ok(result?)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
