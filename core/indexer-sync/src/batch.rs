//! Batched writes with failure isolation.
//!
//! Queued items are sent to the pool in groups of `batch_size`. Each group is
//! one atomic unit; when a unit fails it is split in halves and each half is
//! retried, until every failing item is isolated on its own and recorded.
//! The left half is resolved completely before the right half is sent.
//! Items that share a unit with a bad item still land on a later retry.
//!
//! A connectivity failure ends all work: the unit that saw it stops, other
//! units stop before their next round trip, and further queueing fails fast.

use indexer_db::{ConnectionPool, DbError, DbResult, Statement};
use indexer_types::{SyncAction, SyncError, SyncResponse, ITEM_ERROR_MESSAGE};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// One queued mutation.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub statement: Statement,
    /// Decides which error list a failure is reported in.
    pub action: SyncAction,
    /// UIDs blamed if this item fails.
    pub uids: Vec<String>,
}

impl BatchItem {
    pub fn new(statement: Statement, action: SyncAction, uid: impl Into<String>) -> Self {
        Self {
            statement,
            action,
            uids: vec![uid.into()],
        }
    }

    /// An item covering several resources at once, e.g. a coalesced delete.
    pub fn with_uids(statement: Statement, action: SyncAction, uids: Vec<String>) -> Self {
        Self {
            statement,
            action,
            uids,
        }
    }
}

/// Failures isolated by a writer, in the order they were found.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Vec<(SyncAction, SyncError)>,
}

impl ErrorLog {
    fn record(&mut self, item: &BatchItem) {
        for uid in &item.uids {
            self.entries
                .push((item.action, SyncError::new(uid.clone(), ITEM_ERROR_MESSAGE)));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends every failure to the matching list of `response`. A UID is
    /// listed at most once among delete errors.
    pub fn merge_into(self, response: &mut SyncResponse) {
        let mut deleted: HashSet<String> = response
            .errors(SyncAction::DeleteResource)
            .iter()
            .map(|e| e.resource_uid.clone())
            .collect();
        for (action, err) in self.entries {
            if action == SyncAction::DeleteResource && !deleted.insert(err.resource_uid.clone()) {
                continue;
            }
            response.errors_mut(action).push(err);
        }
    }
}

/// Everything a writer learned once all its units finished.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub errors: ErrorLog,
    /// Set if the store became unreachable.
    pub conn_error: Option<DbError>,
}

/// Accumulates items and sends them in concurrent units.
pub struct BatchWriter {
    pool: Arc<dyn ConnectionPool>,
    batch_size: usize,
    items: Vec<BatchItem>,
    units: JoinSet<()>,
    errors: Arc<Mutex<ErrorLog>>,
    conn_error: Arc<Mutex<Option<DbError>>>,
}

impl BatchWriter {
    pub fn new(pool: Arc<dyn ConnectionPool>, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            items: Vec::new(),
            units: JoinSet::new(),
            errors: Arc::new(Mutex::new(ErrorLog::default())),
            conn_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Queues an item, dispatching a unit once `batch_size` items are waiting.
    ///
    /// Fails with the connectivity error if the store was found unreachable.
    pub fn queue(&mut self, item: BatchItem) -> DbResult<()> {
        if let Some(err) = self.connection_error() {
            return Err(err);
        }
        self.items.push(item);
        if self.items.len() >= self.batch_size {
            self.dispatch();
        }
        Ok(())
    }

    /// Dispatches whatever is waiting, even if less than a full unit.
    pub fn flush(&mut self) {
        if !self.items.is_empty() {
            self.dispatch();
        }
    }

    /// Items queued but not dispatched yet.
    pub fn pending(&self) -> usize {
        self.items.len()
    }

    pub fn connection_error(&self) -> Option<DbError> {
        self.conn_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch(&mut self) {
        let unit = std::mem::take(&mut self.items);
        debug!("dispatching unit of {} items", unit.len());
        self.units.spawn(send_unit(
            Arc::clone(&self.pool),
            unit,
            Arc::clone(&self.errors),
            Arc::clone(&self.conn_error),
        ));
    }

    /// Waits for the units dispatched so far. Queued items stay queued.
    pub async fn join(&mut self) {
        while let Some(joined) = self.units.join_next().await {
            if let Err(e) = joined {
                error!("batch unit task failed: {e}");
            }
        }
    }

    /// Flushes and waits for every dispatched unit.
    pub async fn finish(mut self) -> BatchReport {
        self.flush();
        self.join().await;

        let errors =
            std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner));
        let conn_error = self
            .conn_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        BatchReport { errors, conn_error }
    }
}

async fn send_unit(
    pool: Arc<dyn ConnectionPool>,
    unit: Vec<BatchItem>,
    errors: Arc<Mutex<ErrorLog>>,
    conn_error: Arc<Mutex<Option<DbError>>>,
) {
    let mut pending = vec![unit];

    while let Some(mut unit) = pending.pop() {
        if unit.is_empty() {
            continue;
        }
        if conn_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return;
        }

        let statements: Vec<Statement> = unit.iter().map(|i| i.statement.clone()).collect();
        match pool.submit_group(&statements).await {
            Ok(()) => {}
            Err(err) if err.is_connectivity() => {
                error!("database is unavailable, abandoning unit of {} items: {err}", unit.len());
                conn_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert(err);
                return;
            }
            Err(err) if unit.len() == 1 => {
                let item = &unit[0];
                error!(action = %item.action, uids = ?item.uids, "write failed: {err}");
                errors
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(item);
            }
            Err(err) => {
                debug!("unit of {} items failed, retrying halves: {err}", unit.len());
                let right = unit.split_off(unit.len() / 2);
                pending.push(right);
                pending.push(unit);
            }
        }
    }
}
