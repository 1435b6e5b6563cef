//! Open-event pipeline: decode, filter, match, update, persist.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::decode_identifier;
use crate::config::TrackingConfig;
use crate::error::{Result, TrackerError};
use crate::matcher::{find_exact, find_row, MatchKind};
use crate::row::TrackingRow;
use crate::sheets::Sheet;
use crate::stats::{apply_open, is_ignored_sender, OpenUpdate};

/// Remote row store behind the tracker.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Load the tracking worksheet with all rows, checked for required columns.
    async fn open_sheet(&self) -> Result<Sheet>;

    /// Append a row; the returned copy carries its assigned row number and
    /// `sheet.rows` includes it afterwards.
    async fn insert_row(&self, sheet: &mut Sheet, row: TrackingRow) -> Result<TrackingRow>;

    /// Write an updated row back to the store.
    async fn persist(&self, sheet: &Sheet, row: &TrackingRow) -> Result<()>;
}

/// Terminal non-error result of one open event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Recorded {
        row: usize,
        total_opens: u64,
        slot: usize,
        matched_by: MatchKind,
        inserted: bool,
    },
    /// The row was last seen within the dedup window
    Duplicate { row: usize },
    /// The recipient email is on the denylist
    IgnoredSender,
}

impl OpenOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenOutcome::Recorded { .. } => "recorded",
            OpenOutcome::Duplicate { .. } => "duplicate",
            OpenOutcome::IgnoredSender => "ignored_sender",
        }
    }
}

type CidLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Applies open events to the tracking log.
///
/// Events for the same CID are serialized: a later event waits for the
/// earlier one to finish, then reloads the sheet so the dedup check sees the
/// earlier write.
pub struct Tracker {
    store: Arc<dyn TrackingStore>,
    config: TrackingConfig,
    locks: CidLocks,
}

impl Tracker {
    pub fn new(store: Arc<dyn TrackingStore>, config: TrackingConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Record one pixel fetch of `cid` observed at `observed_at`.
    pub async fn record_open(&self, cid: &str, observed_at: DateTime<Utc>) -> Result<OpenOutcome> {
        let cid = cid.trim();
        let identifier = decode_identifier(cid)?;

        if is_ignored_sender(&identifier, &self.config.ignored_senders) {
            return Ok(OpenOutcome::IgnoredSender);
        }

        let _lock = CidLock::acquire(&self.locks, cid).await;

        let mut sheet = self.store.open_sheet().await?;

        let mut inserted = false;
        let (index, matched_by) = match find_row(&sheet.rows, cid, &identifier) {
            Some(found) => (found.index, found.kind),
            None if self.config.create_missing_rows => {
                let row = TrackingRow::initial(0, cid, &identifier);
                let created = self.store.insert_row(&mut sheet, row).await?;
                debug!(cid = %cid, row = created.row_number(), "Created row for unmatched CID");
                inserted = true;
                let index = find_exact(&sheet.rows, cid)
                    .ok_or_else(|| TrackerError::NotFound(cid.to_string()))?;
                (index, MatchKind::ExactCid)
            }
            None => return Err(TrackerError::NotFound(cid.to_string())),
        };

        let mut row = sheet.rows[index].clone();
        match apply_open(&mut row, observed_at, self.config.dedup_window()) {
            OpenUpdate::WithinDedupWindow => Ok(OpenOutcome::Duplicate {
                row: row.row_number(),
            }),
            OpenUpdate::Applied { total_opens, slot } => {
                self.store.persist(&sheet, &row).await?;
                Ok(OpenOutcome::Recorded {
                    row: row.row_number(),
                    total_opens,
                    slot,
                    matched_by,
                    inserted,
                })
            }
        }
    }

    /// Run `record_open` on a detached task. The outcome only reaches logs
    /// and metrics; callers never await it for a response.
    pub fn spawn_open(self: Arc<Self>, cid: String, observed_at: DateTime<Utc>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let result = self.record_open(&cid, observed_at).await;
            report_outcome(&cid, &result);
        })
    }
}

fn report_outcome(cid: &str, result: &Result<OpenOutcome>) {
    match result {
        Ok(OpenOutcome::Recorded {
            row,
            total_opens,
            slot,
            matched_by,
            inserted,
        }) => {
            counter!("pixel.opens.recorded", 1);
            info!(
                cid = %cid,
                row,
                total_opens,
                slot,
                matched_by = matched_by.as_str(),
                inserted,
                "Recorded email open"
            );
        }
        Ok(OpenOutcome::Duplicate { row }) => {
            counter!("pixel.opens.duplicate", 1);
            debug!(cid = %cid, row, "Open within dedup window, skipped");
        }
        Ok(OpenOutcome::IgnoredSender) => {
            counter!("pixel.opens.ignored", 1);
            debug!(cid = %cid, "Sender is ignored, open not recorded");
        }
        Err(e) => {
            counter!("pixel.opens.failed", 1, "kind" => e.kind());
            warn!(cid = %cid, kind = e.kind(), error = %e, "Failed to record email open");
        }
    }
}

/// Holds the per-CID lock; the map entry is pruned once no task holds or
/// waits on it.
struct CidLock<'a> {
    locks: &'a CidLocks,
    key: String,
    entry: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> CidLock<'a> {
    async fn acquire(locks: &'a CidLocks, key: &str) -> CidLock<'a> {
        let entry = locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone();
        let mut lock = Self {
            locks,
            key: key.to_string(),
            entry,
            guard: None,
        };
        lock.guard = Some(lock.entry.clone().lock_owned().await);
        lock
    }
}

impl Drop for CidLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this handle still own the entry
        if Arc::strong_count(&self.entry) == 2 {
            locks.remove(&self.key);
        }
    }
}
