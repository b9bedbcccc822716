//! Streaming results and the resources behind them.
//!
//! A [`Cursor`] owns the driver cursor, the prepared statement and the
//! connection of one query until it is exhausted, closed, fails, or is
//! force-closed by [`Storage::close`](crate::Storage::close). Teardown always
//! runs in the same order:
//!
//! 1. result cursor
//! 2. statement
//! 3. connection
//!
//! Every step is attempted even when an earlier one fails; the first failure
//! is returned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use futures::stream::{self, Stream};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::value::Row;
use crate::driver::{Connection, RowCursor, StatementHandle};
use crate::error::{Result, StoreError};

/// Driver resources held by an open cursor.
pub(crate) struct OpenResources {
    pub(crate) rows: Box<dyn RowCursor>,
    pub(crate) statement: Option<StatementHandle>,
    pub(crate) connection: Box<dyn Connection>,
}

fn keep_first(first: &mut Option<StoreError>, err: StoreError) {
    match first {
        None => *first = Some(err),
        Some(_) => warn!("Additional failure during teardown: {}", err),
    }
}

impl OpenResources {
    /// Close cursor, statement and connection, in that order.
    pub(crate) async fn teardown(mut self) -> Result<()> {
        let mut first = None;

        if let Err(e) = self.rows.close().await {
            keep_first(&mut first, StoreError::storage("closing result cursor", e));
        }
        if let Some(statement) = self.statement.take() {
            if let Err(e) = self.connection.close_statement(statement).await {
                keep_first(&mut first, StoreError::storage("closing statement", e));
            }
        }
        if let Err(e) = self.connection.close().await {
            keep_first(&mut first, StoreError::storage("releasing connection", e));
        }

        first.map_or(Ok(()), Err)
    }
}

enum SlotState {
    Open(OpenResources),
    Closed,
    ForceClosed,
}

impl SlotState {
    fn take(&mut self, next: SlotState) -> Option<OpenResources> {
        match std::mem::replace(self, next) {
            SlotState::Open(resources) => Some(resources),
            SlotState::Closed => {
                *self = SlotState::Closed;
                None
            }
            SlotState::ForceClosed => {
                *self = SlotState::ForceClosed;
                None
            }
        }
    }
}

pub(crate) struct CursorSlot {
    id: u64,
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct RegistryState {
    closed: bool,
    open: HashMap<u64, Arc<CursorSlot>>,
}

/// Open cursors of one storage session, so they can be force-closed with it.
#[derive(Default)]
pub(crate) struct CursorRegistry {
    next_id: AtomicU64,
    state: StdMutex<RegistryState>,
}

impl CursorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Fails once `close_all` has run, handing the resources back.
    fn register(
        &self,
        resources: OpenResources,
    ) -> std::result::Result<Arc<CursorSlot>, OpenResources> {
        let mut state = self.lock();
        if state.closed {
            return Err(resources);
        }
        let slot = Arc::new(CursorSlot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SlotState::Open(resources)),
        });
        state.open.insert(slot.id, slot.clone());
        Ok(slot)
    }

    fn deregister(&self, id: u64) {
        self.lock().open.remove(&id);
    }

    /// Number of cursors still holding resources.
    pub(crate) fn open_count(&self) -> usize {
        self.lock().open.len()
    }

    /// Tear down every open cursor and refuse new ones; later reads on the
    /// closed cursors fail with `Closed`.
    pub(crate) async fn close_all(&self) -> Result<()> {
        let slots: Vec<Arc<CursorSlot>> = {
            let mut state = self.lock();
            state.closed = true;
            state.open.drain().map(|(_, slot)| slot).collect()
        };

        let mut first = None;
        for slot in slots {
            let resources = slot.state.lock().await.take(SlotState::ForceClosed);
            if let Some(resources) = resources {
                warn!("Force-closing cursor {} left open at shutdown", slot.id);
                if let Err(e) = resources.teardown().await {
                    keep_first(&mut first, e);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }
}

type Decoder<T> = Box<dyn Fn(Row) -> Result<T> + Send + Sync>;

/// Forward-only, non-restartable stream of decoded rows.
pub struct Cursor<T> {
    slot: Arc<CursorSlot>,
    registry: Arc<CursorRegistry>,
    decode: Decoder<T>,
}

impl<T> Cursor<T> {
    /// Register an open query with the session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Closed` after releasing the resources if the
    /// storage was closed while the query was being opened.
    pub(crate) async fn open(
        registry: Arc<CursorRegistry>,
        resources: OpenResources,
        decode: impl Fn(Row) -> Result<T> + Send + Sync + 'static,
    ) -> Result<Self> {
        let slot = match registry.register(resources) {
            Ok(slot) => slot,
            Err(resources) => {
                if let Err(e) = resources.teardown().await {
                    warn!("Failed to release cursor opened during shutdown: {}", e);
                }
                return Err(StoreError::Closed(
                    "storage was closed while the query was opening".to_string(),
                ));
            }
        };
        Ok(Self {
            slot,
            registry,
            decode: Box::new(decode),
        })
    }

    /// Next item, or `None` once the result is exhausted.
    ///
    /// Exhaustion and any error release the cursor's resources. Reading a
    /// cursor closed by its owner returns `None`; reading one force-closed by
    /// the storage returns `StoreError::Closed`.
    pub async fn next(&mut self) -> Result<Option<T>> {
        let mut state = self.slot.state.lock().await;
        let rows = match &mut *state {
            SlotState::Open(resources) => &mut resources.rows,
            SlotState::Closed => return Ok(None),
            SlotState::ForceClosed => {
                return Err(StoreError::Closed("cursor was closed with its storage".to_string()))
            }
        };

        let failure = match rows.next_row().await {
            Ok(Some(row)) => match (self.decode)(row) {
                Ok(item) => return Ok(Some(item)),
                Err(e) => Some(e),
            },
            Ok(None) => None,
            Err(e) => Some(StoreError::storage("reading next row", e)),
        };

        let resources = state.take(SlotState::Closed);
        drop(state);
        self.registry.deregister(self.slot.id);

        let released = match resources {
            Some(resources) => resources.teardown().await,
            None => Ok(()),
        };
        debug!("Cursor {} released", self.slot.id);

        match failure {
            None => released.map(|_| None),
            Some(e) => {
                if let Err(teardown) = released {
                    warn!("Teardown after failed read also failed: {}", teardown);
                }
                Err(e)
            }
        }
    }

    /// Release the cursor's resources. Closing a closed cursor does nothing.
    pub async fn close(&mut self) -> Result<()> {
        let resources = self.slot.state.lock().await.take(SlotState::Closed);
        match resources {
            Some(resources) => {
                self.registry.deregister(self.slot.id);
                resources.teardown().await
            }
            None => Ok(()),
        }
    }

    /// Drain the remaining items.
    pub async fn try_collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Adapt into a [`Stream`] that ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>>
    where
        T: 'static,
    {
        stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        let resources = match self.slot.state.try_lock() {
            Ok(mut state) => state.take(SlotState::Closed),
            Err(_) => None,
        };
        let Some(resources) = resources else {
            return;
        };
        self.registry.deregister(self.slot.id);

        warn!("Cursor {} dropped while open; releasing it in the background", self.slot.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = resources.teardown().await {
                        warn!("Background cursor teardown failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime to release dropped cursor; resources are dropped unclosed"),
        }
    }
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("id", &self.slot.id).finish()
    }
}
