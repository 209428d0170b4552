mod availability;
mod bookings;
mod conflict;
mod error;
mod inventory;
mod lifecycle;
mod queries;
mod reports;
mod store;

pub use availability::{merge_overlapping, subtract_intervals};
pub use error::{EngineError, FieldError};
pub use inventory::{
    LocationDraft, LocationFilter, LocationPatch, SpaceDraft, SpacePatch, normalize_services,
};
pub use reports::{Counts, SpaceReport};
pub use store::Store;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedSpaceState = Arc<RwLock<SpaceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the `Wal`. Every append waits for an fsync, so appends that queue up
/// while one sync runs share the next one: the first queued append opens a
/// batch, whatever else is already in the channel joins it, and the batch is
/// synced once before any caller hears back. A compaction or counter request
/// found mid-drain runs after the batch it interrupted.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                while let Ok(next) = rx.try_recv() {
                    match next {
                        WalCommand::Append { event, response } => batch.push((event, response)),
                        other => {
                            deferred = Some(other);
                            break;
                        }
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

/// All or nothing: on any error the batch's bytes are cut from the log, so a
/// record whose caller saw a failure can never come back on replay.
fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err() {
        if let Err(e) = wal.rollback() {
            tracing::error!("WAL rollback failed, retrying on next append: {e}");
        }
    }
    result
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking store: committed in-memory state in front of a durable WAL.
///
/// Lock order is always `write_gate`, then a location's catalog lock, then
/// space locks (sorted by id when more than one is taken). Mutations hold the
/// gate shared; compaction holds it exclusively so no append can land between
/// its snapshot and the file swap.
pub struct Engine {
    pub store: Store,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) write_gate: RwLock<()>,
    /// Serializes catalog edits within one location (space create/update/delete
    /// against location delete). Bookings never take it.
    catalog_locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Store::new();
        for event in &events {
            store.replay(event);
        }
        tracing::info!(
            "replayed {} events: {} spaces",
            events.len(),
            store.space_count()
        );

        Ok(Self {
            store,
            wal_tx,
            write_gate: RwLock::new(()),
            catalog_locks: DashMap::new(),
        })
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply. Nothing is applied unless the append is durable.
    pub(super) async fn persist_and_apply(
        &self,
        ss: &mut SpaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_space(ss, event);
        Ok(())
    }

    pub(super) fn space_handle(&self, id: &Ulid) -> Result<SharedSpaceState, EngineError> {
        self.store.get_space(id).ok_or(EngineError::NotFound(*id))
    }

    pub(super) async fn catalog_lock(&self, location_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.catalog_locks.entry(location_id).or_default().clone();
        lock.lock_owned().await
    }

    pub(super) fn forget_catalog_lock(&self, location_id: &Ulid) {
        self.catalog_locks.remove(location_id);
    }

    /// Lookup booking → space, acquire the space's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<SpaceState>, EngineError> {
        let space_id = self
            .store
            .space_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let rs = self.space_handle(&space_id)?;
        let guard = rs.write_owned().await;
        if guard.deleted || guard.booking(*booking_id).is_none() {
            return Err(EngineError::NotFound(*booking_id));
        }
        Ok(guard)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;

        let mut locations = self.store.locations();
        locations.sort_by_key(|l| l.id);

        let mut events = Vec::new();
        let mut bookings = Vec::new();
        for location in locations {
            let mut spaces = Vec::new();
            for space_id in self.store.location_space_ids(&location.id) {
                let Some(rs) = self.store.get_space(&space_id) else {
                    continue;
                };
                let guard = rs.read().await;
                spaces.push(guard.space.clone());
                bookings.extend(guard.bookings.iter().cloned());
            }
            events.push(Event::LocationCreated { location, spaces });
        }
        events.extend(
            bookings
                .into_iter()
                .map(|booking| Event::BookingCreated { booking }),
        );

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
