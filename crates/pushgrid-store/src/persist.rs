//! Persister: redb-backed snapshot file for the group table.
//!
//! Each write replaces the whole `groups` table inside one write
//! transaction, so a crash mid-write leaves the previous snapshot intact.
//! Loading is best effort: anything unreadable is logged and discarded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, error, info, warn};

use pushgrid_core::MetricGroup;

use crate::error::{PersistError, PersistResult};
use crate::tables::*;

/// Convert any `Display` error into a `PersistError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| PersistError::$variant(e.to_string())
    };
}

/// Handle to an open snapshot file. Cheap to clone.
#[derive(Clone)]
pub struct Persister {
    path: PathBuf,
    db: Arc<Database>,
    /// Successful writes, shared with the store handle.
    writes: Arc<AtomicU64>,
    /// Writes left to fail on purpose.
    #[cfg(test)]
    faults: Arc<std::sync::atomic::AtomicU32>,
}

/// Outcome of [`restore`].
pub struct Restored {
    /// `None` when the file could not be opened at all.
    pub persister: Option<Persister>,
    pub groups: Vec<MetricGroup>,
}

/// Open the snapshot file at `path` and load what it holds.
///
/// Never fails. A file redb cannot open is moved to `<path>.corrupt` and
/// replaced by a fresh one; a file whose contents cannot be decoded is
/// ignored and overwritten by the next write.
pub fn restore(path: &Path, writes: Arc<AtomicU64>) -> Restored {
    let persister = match Persister::open(path, writes.clone()) {
        Ok(p) => p,
        Err(PersistError::Locked) => {
            error!(?path, "snapshot file in use; persistence disabled");
            return Restored {
                persister: None,
                groups: Vec::new(),
            };
        }
        Err(e) => {
            warn!(?path, error = %e, "snapshot file unusable; moving it aside");
            let aside = aside_path(path);
            if let Err(e) = std::fs::rename(path, &aside) {
                error!(?path, error = %e, "could not move snapshot file; persistence disabled");
                return Restored {
                    persister: None,
                    groups: Vec::new(),
                };
            }
            match Persister::open(path, writes) {
                Ok(p) => p,
                Err(e) => {
                    error!(?path, error = %e, "could not create snapshot file; persistence disabled");
                    return Restored {
                        persister: None,
                        groups: Vec::new(),
                    };
                }
            }
        }
    };

    let groups = match persister.load() {
        Ok(groups) => {
            info!(?path, groups = groups.len(), "snapshot restored");
            groups
        }
        Err(e) => {
            warn!(?path, error = %e, "snapshot could not be decoded; starting empty");
            Vec::new()
        }
    };
    Restored {
        persister: Some(persister),
        groups,
    }
}

fn aside_path(path: &Path) -> PathBuf {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    PathBuf::from(aside)
}

impl Persister {
    /// Open (or create) the snapshot file at `path`.
    pub fn open(path: &Path, writes: Arc<AtomicU64>) -> PersistResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            redb::DatabaseError::DatabaseAlreadyOpen => PersistError::Locked,
            other => PersistError::Open(other.to_string()),
        })?;
        let persister = Self {
            path: path.to_path_buf(),
            db: Arc::new(db),
            writes,
            #[cfg(test)]
            faults: Arc::default(),
        };
        persister.ensure_tables()?;
        debug!(?path, "snapshot file opened");
        Ok(persister)
    }

    /// Make the next `n` writes fail without touching the file.
    #[cfg(test)]
    pub(crate) fn fail_next_writes(&self, n: u32) {
        self.faults.store(n, Ordering::Relaxed);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create both tables if they don't exist yet.
    fn ensure_tables(&self) -> PersistResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.open_table(GROUPS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read every stored group, revalidating each one.
    pub fn load(&self) -> PersistResult<Vec<MetricGroup>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        let version = meta
            .get(FORMAT_VERSION_KEY)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value());
        match version {
            // Never written.
            None => return Ok(Vec::new()),
            Some(FORMAT_VERSION) => {}
            Some(other) => return Err(PersistError::Version(other)),
        }

        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let stored: MetricGroup =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            let group = MetricGroup::new(
                stored.key,
                stored.families.into_values().collect(),
                stored.last_push_ms,
                stored.push_seq,
            )
            .map_err(map_err!(Deserialize))?;
            results.push(group);
        }
        Ok(results)
    }

    /// Replace the stored snapshot with `groups`.
    pub fn write(&self, groups: &[Arc<MetricGroup>]) -> PersistResult<()> {
        #[cfg(test)]
        if self
            .faults
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PersistError::Write("injected failure".to_string()));
        }

        let started = Instant::now();
        let rows = groups
            .iter()
            .map(|g| {
                let value = serde_json::to_vec(g.as_ref()).map_err(map_err!(Serialize))?;
                Ok((g.key.to_string(), value))
            })
            .collect::<PersistResult<Vec<_>>>()?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.delete_table(GROUPS).map_err(map_err!(Table))?;
        {
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            meta.insert(FORMAT_VERSION_KEY, FORMAT_VERSION)
                .map_err(map_err!(Write))?;
            let mut table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            for (key, value) in &rows {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(
            path = ?self.path,
            groups = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot written"
        );
        Ok(())
    }
}
