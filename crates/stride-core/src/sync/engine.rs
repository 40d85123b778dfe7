//! Sync engine.
//!
//! Owns the in-memory mirror of the queue, sync metadata, review block and
//! pending conflicts. Every change is written through to the database before
//! the mirror is updated, so a crash never loses an acknowledged mutation.
//! At most one round is in flight; the round's status doubles as the lock.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libsql::Connection;
use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tracing::{debug, error, info, warn};

use super::conflicts::ConflictResolver;
use super::events::SyncEvent;
use super::merge::{self, MergeWinner};
use super::protocol::{QueueEntry, SyncMeta, SyncRequest, SyncResponse};
use super::queue::{ChangeQueue, QueueChange};
use super::transport::SyncTransport;
use crate::config::SyncSettings;
use crate::db::{
    Database, EntityRepository, MetaRepository, QueueRepository, CONFLICTS_KEY, REVIEW_KEY,
    SYNC_META_KEY,
};
use crate::error::{Error, Result};
use crate::models::{
    EntityKind, GlobalGoal, Goal, Habit, LocalOperation, Milestone, Resolution, ReviewState,
    SyncConflict, SyncEntity,
};
use crate::state::SyncState;
use crate::util::now_ms;

const EVENT_CAPACITY: usize = 64;

/// Why a round was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    AppStart,
    Poll,
    /// A user action whose loss would hurt (reschedule, delete, end of day)
    Critical,
    /// The immediate round after the user resolved conflicts
    ConflictsResolved,
    Manual,
}

impl SyncTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppStart => "app-start",
            Self::Poll => "poll",
            Self::Critical => "critical",
            Self::ConflictsResolved => "conflicts-resolved",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Conflicts are waiting for the user
    PendingConflicts,
    /// A UI flow stopped polling
    PollingStopped,
}

/// What a completed round did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sent: usize,
    pub acknowledged: usize,
    pub merged: usize,
    pub deleted: usize,
    pub conflicts: usize,
    pub last_sync_at: i64,
}

impl SyncReport {
    /// Fold a later batch of the same round into this report
    fn absorb(&mut self, batch: &Self) {
        self.sent += batch.sent;
        self.acknowledged += batch.acknowledged;
        self.merged += batch.merged;
        self.deleted += batch.deleted;
        self.conflicts += batch.conflicts;
        self.last_sync_at = self.last_sync_at.max(batch.last_sync_at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Transport or server failure; the queue is unchanged
    Failed(String),
    /// Another caller's round finished while we waited
    Joined,
    /// Gave up waiting for another caller's round
    TimedOut,
    Blocked(BlockReason),
    /// No sync server configured
    Offline,
}

#[derive(Debug, Clone)]
struct LocalState {
    queue: ChangeQueue,
    meta: SyncMeta,
    review: ReviewState,
    conflicts: Vec<SyncConflict>,
}

struct Inner<T> {
    db: Database,
    transport: T,
    settings: SyncSettings,
    state: Mutex<LocalState>,
    status: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
    polling_stopped: AtomicBool,
    wake: Notify,
}

/// Handle to the sync engine; clones share one engine
pub struct SyncService<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SyncService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Resets a round left `Syncing` by an error path or a dropped future
struct RoundGuard<'a> {
    status: &'a watch::Sender<SyncState>,
}

impl RoundGuard<'_> {
    fn finish(self, state: SyncState) {
        self.status.send_replace(state);
    }
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.status.send_if_modified(|state| {
            if *state == SyncState::Syncing {
                *state = SyncState::Error;
                true
            } else {
                false
            }
        });
    }
}

impl<T: SyncTransport> SyncService<T> {
    /// Load persisted queue, metadata, review and conflicts
    pub async fn open(db: Database, transport: T, settings: SyncSettings) -> Result<Self> {
        let conn = db.connection();
        let meta_repo = MetaRepository::new(conn);

        let meta = if let Some(meta) = meta_repo.get::<SyncMeta>(SYNC_META_KEY).await? {
            meta
        } else {
            let meta = SyncMeta::new_device();
            meta_repo.set(SYNC_META_KEY, &meta).await?;
            info!(device_id = %meta.device_id, "Registered new sync device");
            meta
        };
        let review = meta_repo
            .get::<ReviewState>(REVIEW_KEY)
            .await?
            .unwrap_or_default();
        let conflicts = meta_repo
            .get::<Vec<SyncConflict>>(CONFLICTS_KEY)
            .await?
            .unwrap_or_default();
        let queue = ChangeQueue::from_entries(QueueRepository::new(conn).load_all().await?);

        let initial = if !conflicts.is_empty() {
            SyncState::Conflicted
        } else if transport.is_available() {
            SyncState::Idle
        } else {
            SyncState::Offline
        };
        debug!(
            pending = queue.len(),
            conflicts = conflicts.len(),
            last_sync_at = meta.last_sync_at,
            "Loaded sync state"
        );

        let (status, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                transport,
                settings,
                state: Mutex::new(LocalState {
                    queue,
                    meta,
                    review,
                    conflicts,
                }),
                status,
                events,
                polling_stopped: AtomicBool::new(false),
                wake: Notify::new(),
            }),
        })
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn status(&self) -> SyncState {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncState> {
        self.inner.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub async fn device_id(&self) -> String {
        self.inner.state.lock().await.meta.device_id.clone()
    }

    pub async fn last_sync_at(&self) -> i64 {
        self.inner.state.lock().await.meta.last_sync_at
    }

    pub async fn pending_changes(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    pub async fn queue(&self) -> ChangeQueue {
        self.inner.state.lock().await.queue.clone()
    }

    pub async fn review(&self) -> ReviewState {
        self.inner.state.lock().await.review.clone()
    }

    pub async fn pending_conflicts(&self) -> Vec<SyncConflict> {
        self.inner.state.lock().await.conflicts.clone()
    }

    pub async fn has_pending_conflicts(&self) -> bool {
        !self.inner.state.lock().await.conflicts.is_empty()
    }

    /// Write an entity and enqueue the mutation in one transaction
    pub async fn record_mutation<E: SyncEntity>(
        &self,
        mut entity: E,
        operation: LocalOperation,
    ) -> Result<E> {
        let mut state = self.inner.state.lock().await;
        let change = stage(&state.queue, &mut entity, operation)?;
        let db = &self.inner.db;
        db.atomically(persist_staged(db.connection(), &entity, &change))
            .await?;
        state.queue.apply(E::KIND, entity.id(), &change);

        debug!(
            kind = %E::KIND,
            id = %entity.id(),
            operation = operation.as_str(),
            collapsed = matches!(change, QueueChange::Collapsed),
            "Queued local change"
        );
        Ok(entity)
    }

    /// Apply `update` to the review block and persist it
    pub async fn update_review(&self, update: impl FnOnce(&mut ReviewState)) -> Result<ReviewState> {
        let mut state = self.inner.state.lock().await;
        let mut review = state.review.clone();
        update(&mut review);
        if review != state.review {
            MetaRepository::new(self.inner.db.connection())
                .set(REVIEW_KEY, &review)
                .await?;
            state.review = review.clone();
        }
        Ok(review)
    }

    /// Run one sync round, or join the one already in flight.
    ///
    /// A critical caller that joins someone else's round runs its own round
    /// afterwards, since the joined request predates its change.
    /// Transport failures are reported as [`SyncOutcome::Failed`]; only local
    /// persistence failures surface as `Err`.
    pub async fn request_sync(&self, trigger: SyncTrigger) -> Result<SyncOutcome> {
        if let Some(outcome) = self.gate(trigger).await {
            return Ok(outcome);
        }
        if let Some(result) = self.try_round(trigger).await {
            return result;
        }

        let joined = self.join_in_flight(trigger).await;
        if trigger != SyncTrigger::Critical || joined != SyncOutcome::Joined {
            return Ok(joined);
        }
        if let Some(outcome) = self.gate(trigger).await {
            return Ok(outcome);
        }
        match self.try_round(trigger).await {
            Some(result) => result,
            None => Ok(self.join_in_flight(trigger).await),
        }
    }

    /// Outcome for a trigger that may not start a round right now
    async fn gate(&self, trigger: SyncTrigger) -> Option<SyncOutcome> {
        if !self.inner.transport.is_available() {
            self.inner.status.send_if_modified(|state| {
                if *state == SyncState::Conflicted || *state == SyncState::Offline {
                    false
                } else {
                    *state = SyncState::Offline;
                    true
                }
            });
            return Some(SyncOutcome::Offline);
        }
        if trigger != SyncTrigger::ConflictsResolved && self.has_pending_conflicts().await {
            debug!(%trigger, "Sync blocked by pending conflicts");
            return Some(SyncOutcome::Blocked(BlockReason::PendingConflicts));
        }
        if trigger == SyncTrigger::Poll && self.is_polling_stopped() {
            return Some(SyncOutcome::Blocked(BlockReason::PollingStopped));
        }
        None
    }

    /// Run a round if none is in flight; `None` when another caller holds it
    async fn try_round(&self, trigger: SyncTrigger) -> Option<Result<SyncOutcome>> {
        let acquired = self.inner.status.send_if_modified(|state| {
            if *state == SyncState::Syncing {
                false
            } else {
                *state = SyncState::Syncing;
                true
            }
        });
        if !acquired {
            return None;
        }

        let guard = RoundGuard {
            status: &self.inner.status,
        };
        let result = self.run_round(trigger).await;
        guard.finish(match &result {
            Ok(SyncOutcome::Completed(report)) if report.conflicts > 0 => SyncState::Conflicted,
            Ok(SyncOutcome::Completed(_)) => SyncState::Synced,
            _ => SyncState::Error,
        });
        Some(result)
    }

    /// Fire-and-forget round for critical actions
    pub fn request_sync_in_background(&self, trigger: SyncTrigger) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%trigger, "No async runtime; skipping background sync");
            return;
        };
        let service = self.clone();
        runtime.spawn(async move {
            if let Err(error) = service.request_sync(trigger).await {
                error!(%trigger, "Background sync failed: {error}");
            }
        });
    }

    async fn join_in_flight(&self, trigger: SyncTrigger) -> SyncOutcome {
        let mut status = self.inner.status.subscribe();
        let wait = self.inner.settings.busy_wait_timeout;
        let finished = tokio::time::timeout(wait, async {
            status
                .wait_for(|state| *state != SyncState::Syncing)
                .await
                .is_ok()
        })
        .await;

        match finished {
            Ok(true) => {
                debug!(%trigger, "Joined in-flight sync round");
                SyncOutcome::Joined
            }
            _ => {
                warn!(%trigger, ?wait, "Gave up waiting for in-flight sync round");
                SyncOutcome::TimedOut
            }
        }
    }

    /// Drain the queue in batches of at most `max_batch_size` entries.
    ///
    /// Each batch is its own exchange and is acknowledged on its own; the
    /// round stops at the first failure or conflict. Batches already applied
    /// stay applied when a later one fails.
    async fn run_round(&self, trigger: SyncTrigger) -> Result<SyncOutcome> {
        let limit = self.inner.settings.max_batch_size.max(1);
        let batches = self.inner.state.lock().await.queue.len().div_ceil(limit).max(1);
        let mut total = SyncReport::default();

        for batch in 1..=batches {
            let request = {
                let state = self.inner.state.lock().await;
                SyncRequest {
                    user_id: self.inner.settings.user_id.clone(),
                    device_id: state.meta.device_id.clone(),
                    last_sync_at: state.meta.last_sync_at,
                    changes: state.queue.batch(limit),
                    review: state.review.clone(),
                }
            };
            info!(
                %trigger,
                batch,
                batches,
                changes = request.change_count(),
                last_sync_at = request.last_sync_at,
                "Starting sync round"
            );

            let response = match self.inner.transport.exchange(&request).await {
                Ok(response) if response.success => response,
                Ok(response) => {
                    let message = response
                        .error
                        .unwrap_or_else(|| "server rejected the sync request".to_string());
                    return Ok(self.fail(message));
                }
                Err(error) => return Ok(self.fail(error.to_string())),
            };

            let report = self.apply_response(&request, response).await?;
            total.absorb(&report);
            if report.conflicts > 0 {
                break;
            }
        }
        Ok(SyncOutcome::Completed(total))
    }

    fn fail(&self, message: String) -> SyncOutcome {
        error!("Sync round failed: {message}");
        self.emit(SyncEvent::SyncFailed {
            message: message.clone(),
        });
        SyncOutcome::Failed(message)
    }

    async fn apply_response(
        &self,
        request: &SyncRequest,
        response: SyncResponse,
    ) -> Result<SyncReport> {
        let mut state = self.inner.state.lock().await;
        let mut next = state.clone();
        let mut events = Vec::new();
        let db = &self.inner.db;
        let report = db
            .atomically(apply_to_state(
                db.connection(),
                &mut next,
                request,
                response,
                &mut events,
            ))
            .await?;
        *state = next;
        drop(state);

        for event in events {
            self.emit(event);
        }
        info!(
            sent = report.sent,
            acknowledged = report.acknowledged,
            merged = report.merged,
            deleted = report.deleted,
            conflicts = report.conflicts,
            last_sync_at = report.last_sync_at,
            "Sync round complete"
        );
        Ok(report)
    }

    /// Apply the user's choices, then immediately sync the result.
    ///
    /// `resolver` must cover exactly the pending conflicts; nothing is
    /// written unless every conflict has a side.
    pub async fn resolve_conflicts(&self, resolver: ConflictResolver) -> Result<SyncOutcome> {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            if state.conflicts.is_empty() {
                return Err(Error::NotFound("no conflicts are pending".to_string()));
            }
            let pending: HashSet<_> = state.conflicts.iter().map(SyncConflict::key).collect();
            let chosen: HashSet<_> = resolver.conflicts().iter().map(SyncConflict::key).collect();
            if pending != chosen {
                return Err(Error::Conflict(
                    "pending conflicts changed; resolve the current set".to_string(),
                ));
            }
            let plan = resolver.into_plan()?;

            let mut next = state.clone();
            let db = &self.inner.db;
            db.atomically(apply_resolutions(
                db.connection(),
                &mut next,
                plan,
                &mut events,
            ))
            .await?;
            *state = next;
        }

        self.inner.status.send_if_modified(|state| {
            if *state == SyncState::Conflicted {
                *state = SyncState::Idle;
                true
            } else {
                false
            }
        });
        for event in events {
            self.emit(event);
        }
        self.emit(SyncEvent::ConflictsResolved);
        self.inner.wake.notify_waiters();
        info!("Conflicts resolved; resuming sync");

        self.request_sync(SyncTrigger::ConflictsResolved).await
    }

    /// Pause periodic polling while a UI flow needs a stable view
    pub fn stop_polling(&self) {
        self.inner.polling_stopped.store(true, Ordering::SeqCst);
        debug!("Polling stopped");
    }

    pub fn resume_polling(&self) {
        self.inner.polling_stopped.store(false, Ordering::SeqCst);
        self.inner.wake.notify_waiters();
        debug!("Polling resumed");
    }

    pub fn is_polling_stopped(&self) -> bool {
        self.inner.polling_stopped.load(Ordering::SeqCst)
    }

    /// Resolve once polling is allowed and no conflicts are pending
    pub async fn wait_until_pollable(&self) {
        loop {
            let notified = self.inner.wake.notified();
            if !self.is_polling_stopped() && !self.has_pending_conflicts().await {
                return;
            }
            notified.await;
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        self.inner.events.send(event).ok();
    }
}

/// Stamp the entity and work out its queue change
fn stage<E: SyncEntity>(
    queue: &ChangeQueue,
    entity: &mut E,
    operation: LocalOperation,
) -> Result<QueueChange> {
    let stamp = queue.next_timestamp(E::KIND, entity.id(), now_ms());
    entity.sync_mut().touch(operation, stamp);
    let payload = entity.to_payload()?;
    Ok(queue.plan(E::KIND, operation, entity.id(), payload, stamp))
}

async fn persist_staged<E: SyncEntity>(
    conn: &Connection,
    entity: &E,
    change: &QueueChange,
) -> Result<()> {
    let entities = EntityRepository::new(conn);
    let queue = QueueRepository::new(conn);
    match change {
        QueueChange::Stored(entry) => {
            entities.put(entity).await?;
            queue.upsert(E::KIND, entry).await?;
        }
        QueueChange::Collapsed => {
            entities.remove(E::KIND, entity.id()).await?;
            queue.remove(E::KIND, entity.id()).await?;
        }
    }
    Ok(())
}

async fn apply_to_state(
    conn: &Connection,
    state: &mut LocalState,
    request: &SyncRequest,
    response: SyncResponse,
    events: &mut Vec<SyncEvent>,
) -> Result<SyncReport> {
    let entities = EntityRepository::new(conn);
    let queue_repo = QueueRepository::new(conn);
    let meta_repo = MetaRepository::new(conn);
    let mut report = SyncReport {
        sent: request.change_count(),
        ..SyncReport::default()
    };

    // Conflicted entries stay queued until the user picks a side
    let conflicted: HashSet<(EntityKind, String)> =
        response.conflicts.iter().map(SyncConflict::key).collect();
    let acked: Vec<_> = state
        .queue
        .acknowledged(&request.changes)
        .into_iter()
        .filter(|(kind, entry)| !conflicted.contains(&(*kind, entry.id.clone())))
        .collect();

    let mut deleted: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
    for (kind, entry) in &acked {
        queue_repo
            .remove_acknowledged(*kind, &entry.id, entry.client_updated_at)
            .await?;
        if entry.operation == LocalOperation::Delete {
            if entities.remove(*kind, &entry.id).await? {
                deleted.entry(*kind).or_default().push(entry.id.clone());
            }
        } else {
            entities
                .mark_synced(*kind, &entry.id, entry.client_updated_at)
                .await?;
        }
    }
    state.queue.acknowledge(&acked);
    report.acknowledged = acked.len();

    // The server now knows every create it accepted; edits made during the
    // round must reach it as updates, and a later delete must not collapse
    for (kind, sent) in &request.changes {
        for entry in sent.iter().filter(|entry| entry.operation == LocalOperation::Create) {
            if conflicted.contains(&(*kind, entry.id.clone())) {
                continue;
            }
            let Some(pending) = state.queue.get(*kind, &entry.id) else {
                continue;
            };
            if pending.operation != LocalOperation::Create {
                continue;
            }
            let promoted = QueueEntry {
                operation: LocalOperation::Update,
                ..pending.clone()
            };
            queue_repo.upsert(*kind, &promoted).await?;
            entities
                .set_pending_operation(*kind, &promoted.id, LocalOperation::Update)
                .await?;
            debug!(kind = %kind, id = %promoted.id, "Pending create is now an update");
            state
                .queue
                .apply(*kind, &entry.id, &QueueChange::Stored(promoted));
        }
    }

    state.meta.last_sync_at = state.meta.last_sync_at.max(response.new_last_sync_at);
    meta_repo.set(SYNC_META_KEY, &state.meta).await?;
    report.last_sync_at = state.meta.last_sync_at;

    // Entities re-mutated during the round keep their local copy until sent
    let mut held = conflicted.clone();
    for (kind, entries) in state.queue.snapshot() {
        held.extend(entries.into_iter().map(|entry| (kind, entry.id)));
    }

    if let Some(data) = response.data {
        for (kind, snapshots) in data {
            let ids = match kind {
                EntityKind::Goal => merge_snapshots::<Goal>(&entities, snapshots, &held).await?,
                EntityKind::Habit => merge_snapshots::<Habit>(&entities, snapshots, &held).await?,
                EntityKind::GlobalGoal => {
                    merge_snapshots::<GlobalGoal>(&entities, snapshots, &held).await?
                }
                EntityKind::Milestone => {
                    merge_snapshots::<Milestone>(&entities, snapshots, &held).await?
                }
            };
            if !ids.is_empty() {
                report.merged += ids.len();
                events.push(SyncEvent::EntitiesMerged { kind, ids });
            }
        }
    }

    for (kind, ids) in response.deleted {
        for id in ids {
            // A pending local change reaches the server next round instead
            if state.queue.get(kind, &id).is_some() {
                continue;
            }
            if entities.remove(kind, &id).await? {
                deleted.entry(kind).or_default().push(id);
            }
        }
    }
    for (kind, ids) in deleted {
        report.deleted += ids.len();
        events.push(SyncEvent::EntitiesDeleted { kind, ids });
    }

    if let Some(review) = response.review {
        if state.review != request.review {
            // Changed while the round was in flight; the next round sends it
            debug!("Keeping review state edited during the round");
        } else if review != state.review {
            meta_repo.set(REVIEW_KEY, &review).await?;
            state.review = review;
            events.push(SyncEvent::ReviewUpdated);
        }
    }

    if !response.conflicts.is_empty() {
        warn!(count = response.conflicts.len(), "Server reported sync conflicts");
        meta_repo.set(CONFLICTS_KEY, &response.conflicts).await?;
        report.conflicts = response.conflicts.len();
        events.push(SyncEvent::ConflictsDetected {
            count: report.conflicts,
        });
        state.conflicts = response.conflicts;
    }

    Ok(report)
}

/// Merge server snapshots of one kind; returns the ids the server won
async fn merge_snapshots<E: SyncEntity>(
    entities: &EntityRepository<'_>,
    snapshots: Vec<Value>,
    skip: &HashSet<(EntityKind, String)>,
) -> Result<Vec<String>> {
    let mut merged = Vec::new();
    for snapshot in snapshots {
        let Some(id) = snapshot
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
        else {
            warn!(kind = %E::KIND, "Skipping server snapshot without an id");
            continue;
        };
        if skip.contains(&(E::KIND, id.clone())) {
            continue;
        }
        let server = match E::from_snapshot(snapshot, &id) {
            Ok(server) => server,
            Err(error) => {
                warn!(kind = %E::KIND, %id, "Skipping malformed server snapshot: {error}");
                continue;
            }
        };

        let local = entities.get::<E>(&id).await?;
        if merge::choose(local.as_ref(), Some(&server)) == Some(MergeWinner::Server) {
            let mut server = server;
            server.sync_mut().strip_local();
            entities.put(&server).await?;
            merged.push(id);
        }
    }
    Ok(merged)
}

async fn apply_resolutions(
    conn: &Connection,
    state: &mut LocalState,
    plan: Vec<(SyncConflict, Resolution)>,
    events: &mut Vec<SyncEvent>,
) -> Result<()> {
    let mut merged: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
    let mut deleted: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();

    for (conflict, resolution) in &plan {
        let outcome = match conflict.kind {
            EntityKind::Goal => {
                resolve_one::<Goal>(conn, &mut state.queue, conflict, *resolution).await?
            }
            EntityKind::Habit => {
                resolve_one::<Habit>(conn, &mut state.queue, conflict, *resolution).await?
            }
            EntityKind::GlobalGoal => {
                resolve_one::<GlobalGoal>(conn, &mut state.queue, conflict, *resolution).await?
            }
            EntityKind::Milestone => {
                resolve_one::<Milestone>(conn, &mut state.queue, conflict, *resolution).await?
            }
        };
        match outcome {
            Resolved::Replaced => merged
                .entry(conflict.kind)
                .or_default()
                .push(conflict.id.clone()),
            Resolved::Removed => deleted
                .entry(conflict.kind)
                .or_default()
                .push(conflict.id.clone()),
            Resolved::Requeued => {}
        }
        debug!(kind = %conflict.kind, id = %conflict.id, %resolution, "Resolved conflict");
    }

    MetaRepository::new(conn).delete(CONFLICTS_KEY).await?;
    state.conflicts.clear();

    events.extend(
        merged
            .into_iter()
            .map(|(kind, ids)| SyncEvent::EntitiesMerged { kind, ids }),
    );
    events.extend(
        deleted
            .into_iter()
            .map(|(kind, ids)| SyncEvent::EntitiesDeleted { kind, ids }),
    );
    Ok(())
}

enum Resolved {
    /// Local copy re-enqueued on top of the server version
    Requeued,
    /// Server copy replaced the local one
    Replaced,
    /// Server has no copy, so the local one is gone
    Removed,
}

async fn resolve_one<E: SyncEntity>(
    conn: &Connection,
    queue: &mut ChangeQueue,
    conflict: &SyncConflict,
    resolution: Resolution,
) -> Result<Resolved> {
    let entities = EntityRepository::new(conn);

    match resolution {
        Resolution::Local => {
            let mut entity = match entities.get::<E>(&conflict.id).await? {
                Some(entity) => entity,
                None => {
                    let snapshot = conflict
                        .local_version
                        .clone()
                        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                    E::from_snapshot(snapshot, &conflict.id)?
                }
            };
            entity.set_id(conflict.id.clone());

            let operation = if conflict.local_operation == Some(LocalOperation::Delete)
                || entity.sync().is_deleted()
            {
                LocalOperation::Delete
            } else {
                LocalOperation::Upsert
            };
            let server_version = conflict
                .server_version
                .as_ref()
                .and_then(|server| server.get("version"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let meta = entity.sync_mut();
            meta.version = meta.version.max(server_version);

            let change = stage(queue, &mut entity, operation)?;
            persist_staged(conn, &entity, &change).await?;
            queue.apply(E::KIND, &conflict.id, &change);
            Ok(Resolved::Requeued)
        }
        Resolution::Server => {
            QueueRepository::new(conn)
                .remove(E::KIND, &conflict.id)
                .await?;
            queue.remove(E::KIND, &conflict.id);

            if let Some(snapshot) = conflict.server_version.clone() {
                let mut server = E::from_snapshot(snapshot, &conflict.id)?;
                server.set_id(conflict.id.clone());
                server.sync_mut().strip_local();
                entities.put(&server).await?;
                Ok(Resolved::Replaced)
            } else {
                entities.remove(E::KIND, &conflict.id).await?;
                Ok(Resolved::Removed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::ScriptedTransport;
    use crate::sync::TransportError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    type TestService = SyncService<Arc<ScriptedTransport>>;

    fn settings() -> SyncSettings {
        SyncSettings::new("http://127.0.0.1:9", "u1")
    }

    async fn service(transport: &Arc<ScriptedTransport>) -> TestService {
        let db = Database::open_in_memory().await.unwrap();
        SyncService::open(db, Arc::clone(transport), settings())
            .await
            .unwrap()
    }

    fn goal(id: &str, title: &str) -> Goal {
        let mut goal = Goal::new(title);
        goal.id = id.to_string();
        goal
    }

    async fn stored<E: SyncEntity>(service: &TestService, id: &str) -> Option<E> {
        EntityRepository::new(service.database().connection())
            .get::<E>(id)
            .await
            .unwrap()
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("expected a completed round, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_sends_queue_and_clears_it() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        service
            .record_mutation(goal("g1", "Write report"), LocalOperation::Create)
            .await
            .unwrap();
        transport.push(SyncResponse::accepted(1_000));

        let report = completed(service.request_sync(SyncTrigger::Manual).await.unwrap());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].last_sync_at, 0);
        assert_eq!(requests[0].user_id, "u1");
        let sent = &requests[0].changes[&EntityKind::Goal];
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].operation, LocalOperation::Create);
        assert_eq!(sent[0].payload["title"], "Write report");
        assert_eq!(report.acknowledged, 1);

        assert_eq!(service.pending_changes().await, 0);
        assert_eq!(service.last_sync_at().await, 1_000);
        assert_eq!(service.status(), SyncState::Synced);
        let synced: Goal = stored(&service, "g1").await.unwrap();
        assert_eq!(synced.sync.local_operation, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_delete_is_never_sent() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        let created = service
            .record_mutation(goal("g2", "Temporary"), LocalOperation::Create)
            .await
            .unwrap();
        service
            .record_mutation(created, LocalOperation::Delete)
            .await
            .unwrap();

        assert_eq!(service.pending_changes().await, 0);
        assert!(stored::<Goal>(&service, "g2").await.is_none());

        completed(service.request_sync(SyncTrigger::Manual).await.unwrap());
        let request = &transport.requests()[0];
        assert_eq!(request.change_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_round_keeps_queue_and_watermark() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        let mut events = service.subscribe();
        service
            .record_mutation(goal("g1", "Keep me"), LocalOperation::Create)
            .await
            .unwrap();
        transport.push_error(TransportError::Api("HTTP 503".to_string()));

        let outcome = service.request_sync(SyncTrigger::Manual).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert_eq!(service.pending_changes().await, 1);
        assert_eq!(service.last_sync_at().await, 0);
        assert_eq!(service.status(), SyncState::Error);
        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::SyncFailed { .. }
        ));

        // The same entry goes out again on the next round
        completed(service.request_sync(SyncTrigger::Manual).await.unwrap());
        let requests = transport.requests();
        assert_eq!(requests[1].changes, requests[0].changes);
        assert_eq!(service.pending_changes().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unsuccessful_response_counts_as_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        service
            .record_mutation(goal("g1", "Keep me"), LocalOperation::Create)
            .await
            .unwrap();
        transport.push(SyncResponse::failure("batch too large"));

        let outcome = service.request_sync(SyncTrigger::Manual).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Failed("batch too large".to_string()));
        assert_eq!(service.pending_changes().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_only_entity_is_merged_unchanged() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        let mut events = service.subscribe();
        let snapshot = json!({
            "id": "m1",
            "globalGoalId": "gg1",
            "title": "Ship beta",
            "completed": false,
            "order": 1,
            "createdAt": 10,
            "version": 3
        });
        transport.push(SyncResponse {
            data: Some(BTreeMap::from([(EntityKind::Milestone, vec![snapshot.clone()])])),
            ..SyncResponse::accepted(500)
        });

        let report = completed(service.request_sync(SyncTrigger::AppStart).await.unwrap());

        assert_eq!(report.merged, 1);
        let milestone: Milestone = stored(&service, "m1").await.unwrap();
        assert_eq!(milestone, serde_json::from_value(snapshot).unwrap());
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::EntitiesMerged {
                kind: EntityKind::Milestone,
                ids: vec!["m1".to_string()]
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn older_server_snapshot_does_not_overwrite_newer_local() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        let mut local = goal("g1", "Local v5");
        local.sync.version = 5;
        service
            .record_mutation(local, LocalOperation::Update)
            .await
            .unwrap();
        transport.push(SyncResponse {
            data: Some(BTreeMap::from([(
                EntityKind::Goal,
                vec![json!({"id": "g1", "title": "Server v4", "version": 4})],
            )])),
            ..SyncResponse::accepted(10)
        });

        let report = completed(service.request_sync(SyncTrigger::Manual).await.unwrap());
        assert_eq!(report.merged, 0);
        let kept: Goal = stored(&service, "g1").await.unwrap();
        assert_eq!(kept.title, "Local v5");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_deletions_remove_local_entities() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        let mut habit = Habit::new("Stretch");
        habit.id = "h1".to_string();
        service
            .record_mutation(habit, LocalOperation::Create)
            .await
            .unwrap();
        completed(service.request_sync(SyncTrigger::Manual).await.unwrap());

        transport.push(SyncResponse {
            deleted: BTreeMap::from([(EntityKind::Habit, vec!["h1".to_string()])]),
            ..SyncResponse::accepted(5_000)
        });
        let report = completed(service.request_sync(SyncTrigger::Manual).await.unwrap());

        assert_eq!(report.deleted, 1);
        assert!(stored::<Habit>(&service, "h1").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn acknowledged_delete_drops_tombstone() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        let created = service
            .record_mutation(goal("g1", "Soon gone"), LocalOperation::Create)
            .await
            .unwrap();
        completed(service.request_sync(SyncTrigger::Manual).await.unwrap());

        service
            .record_mutation(created, LocalOperation::Delete)
            .await
            .unwrap();
        let tombstone: Goal = stored(&service, "g1").await.unwrap();
        assert!(!tombstone.is_visible());

        let report = completed(service.request_sync(SyncTrigger::Manual).await.unwrap());
        assert_eq!(report.deleted, 1);
        assert!(stored::<Goal>(&service, "g1").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn review_block_from_server_replaces_local() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        service
            .update_review(|review| {
                review.mark_pending("2026-01-01".parse().unwrap());
            })
            .await
            .unwrap();
        let server_review: ReviewState = serde_json::from_value(json!({
            "pendingReviewDates": ["2026-01-02"],
            "lastActiveDate": "2026-01-02T20:00:00Z"
        }))
        .unwrap();
        transport.push(SyncResponse {
            review: Some(server_review.clone()),
            ..SyncResponse::accepted(1)
        });

        completed(service.request_sync(SyncTrigger::Manual).await.unwrap());

        assert_eq!(transport.requests()[0].review.pending_review_dates.len(), 1);
        assert_eq!(service.review().await, server_review);
    }

    fn habit_conflict() -> SyncConflict {
        SyncConflict {
            kind: EntityKind::Habit,
            id: "h1".to_string(),
            message: "habit edited on another device".to_string(),
            local_version: Some(json!({"title": "A"})),
            server_version: Some(json!({"title": "B", "version": 2})),
            local_operation: Some(LocalOperation::Update),
        }
    }

    async fn conflicted_service(transport: &Arc<ScriptedTransport>) -> TestService {
        let service = service(transport).await;
        let mut habit = Habit::new("A");
        habit.id = "h1".to_string();
        habit.sync.version = 1;
        service
            .record_mutation(habit, LocalOperation::Update)
            .await
            .unwrap();
        transport.push(SyncResponse {
            conflicts: vec![habit_conflict()],
            ..SyncResponse::accepted(2_000)
        });
        let report = completed(service.request_sync(SyncTrigger::Manual).await.unwrap());
        assert_eq!(report.conflicts, 1);
        service
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflicts_block_every_trigger_until_resolved() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = conflicted_service(&transport).await;

        assert_eq!(service.status(), SyncState::Conflicted);
        assert_eq!(service.pending_conflicts().await, vec![habit_conflict()]);
        // Conflicted entry is not acknowledged
        assert_eq!(service.pending_changes().await, 1);
        for trigger in [SyncTrigger::Poll, SyncTrigger::Critical, SyncTrigger::Manual] {
            assert_eq!(
                service.request_sync(trigger).await.unwrap(),
                SyncOutcome::Blocked(BlockReason::PendingConflicts)
            );
        }
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn choosing_server_replaces_local_and_resyncs() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = conflicted_service(&transport).await;
        let mut events = service.subscribe();

        let mut resolver = ConflictResolver::new(service.pending_conflicts().await);
        resolver
            .choose(EntityKind::Habit, "h1", Resolution::Server)
            .unwrap();
        completed(service.resolve_conflicts(resolver).await.unwrap());

        let habit: Habit = stored(&service, "h1").await.unwrap();
        assert_eq!(habit.title, "B");
        assert_eq!(habit.sync.version, 2);
        assert!(service.pending_conflicts().await.is_empty());
        assert_eq!(service.pending_changes().await, 0);
        assert_eq!(transport.request_count(), 2);
        assert_eq!(transport.requests()[1].change_count(), 0);
        assert_eq!(service.status(), SyncState::Synced);

        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::EntitiesMerged {
                kind: EntityKind::Habit,
                ids: vec!["h1".to_string()]
            }
        );
        assert_eq!(events.recv().await.unwrap(), SyncEvent::ConflictsResolved);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn choosing_local_requeues_on_top_of_server_version() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = conflicted_service(&transport).await;

        let mut resolver = ConflictResolver::new(service.pending_conflicts().await);
        resolver.choose_all(Resolution::Local);
        completed(service.resolve_conflicts(resolver).await.unwrap());

        let resent = &transport.requests()[1].changes[&EntityKind::Habit];
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].operation, LocalOperation::Upsert);
        assert_eq!(resent[0].payload["title"], "A");
        assert_eq!(resent[0].payload["version"], 2);
        assert_eq!(service.pending_changes().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn partial_resolution_changes_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = conflicted_service(&transport).await;

        let resolver = ConflictResolver::new(service.pending_conflicts().await);
        let error = service.resolve_conflicts(resolver).await.unwrap_err();

        assert!(matches!(error, Error::Conflict(_)));
        assert_eq!(service.pending_conflicts().await.len(), 1);
        let habit: Habit = stored(&service, "h1").await.unwrap();
        assert_eq!(habit.title, "A");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_callers_share_one_round() {
        let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(200)));
        let service = service(&transport).await;

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.request_sync(SyncTrigger::Manual).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = service.request_sync(SyncTrigger::Poll).await.unwrap();

        assert_eq!(second, SyncOutcome::Joined);
        completed(first.await.unwrap().unwrap());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn waiter_gives_up_after_busy_timeout() {
        let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(500)));
        let db = Database::open_in_memory().await.unwrap();
        let service = SyncService::open(
            db,
            Arc::clone(&transport),
            settings().with_busy_wait_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap();

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.request_sync(SyncTrigger::Manual).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            service.request_sync(SyncTrigger::Manual).await.unwrap(),
            SyncOutcome::TimedOut
        );
        completed(first.await.unwrap().unwrap());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mutation_during_flight_stays_queued() {
        let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(200)));
        let service = service(&transport).await;
        let created = service
            .record_mutation(goal("g1", "First"), LocalOperation::Create)
            .await
            .unwrap();
        transport.push(SyncResponse {
            data: Some(BTreeMap::from([(
                EntityKind::Goal,
                vec![json!({"id": "g1", "title": "First", "version": 1})],
            )])),
            ..SyncResponse::accepted(10)
        });

        let round = tokio::spawn({
            let service = service.clone();
            async move { service.request_sync(SyncTrigger::Manual).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut edited = created;
        edited.title = "Second".to_string();
        service
            .record_mutation(edited, LocalOperation::Update)
            .await
            .unwrap();
        completed(round.await.unwrap().unwrap());

        let queue = service.queue().await;
        let pending = queue.get(EntityKind::Goal, "g1").unwrap();
        assert_eq!(pending.payload["title"], "Second");
        // The server accepted the create, so the edit goes out as an update
        assert_eq!(pending.operation, LocalOperation::Update);
        let local: Goal = stored(&service, "g1").await.unwrap();
        assert_eq!(local.title, "Second");
        assert_eq!(local.sync.local_operation, Some(LocalOperation::Update));
        let persisted = QueueRepository::new(service.database().connection())
            .load_all()
            .await
            .unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].1.operation, LocalOperation::Update);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_after_create_was_accepted_reaches_server() {
        let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(200)));
        let service = service(&transport).await;
        let created = service
            .record_mutation(goal("g1", "First"), LocalOperation::Create)
            .await
            .unwrap();

        let round = tokio::spawn({
            let service = service.clone();
            async move { service.request_sync(SyncTrigger::Manual).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut edited = created;
        edited.title = "Second".to_string();
        let edited = service
            .record_mutation(edited, LocalOperation::Update)
            .await
            .unwrap();
        completed(round.await.unwrap().unwrap());

        service
            .record_mutation(edited, LocalOperation::Delete)
            .await
            .unwrap();
        assert_eq!(service.pending_changes().await, 1);
        completed(service.request_sync(SyncTrigger::Manual).await.unwrap());

        let sent = &transport.requests()[1].changes[&EntityKind::Goal];
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, "g1");
        assert_eq!(sent[0].operation, LocalOperation::Delete);
        assert_eq!(service.pending_changes().await, 0);
        assert!(stored::<Goal>(&service, "g1").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn review_edited_during_round_survives_and_is_sent() {
        let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(200)));
        let service = service(&transport).await;
        let day: chrono::NaiveDate = "2026-01-01".parse().unwrap();
        service
            .update_review(|review| {
                review.mark_pending(day);
            })
            .await
            .unwrap();
        let echoed = service.review().await;
        transport.push(SyncResponse {
            review: Some(echoed),
            ..SyncResponse::accepted(1)
        });

        let round = tokio::spawn({
            let service = service.clone();
            async move { service.request_sync(SyncTrigger::Poll).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        service
            .update_review(|review| {
                review.complete(day);
            })
            .await
            .unwrap();

        // Joins the stale round, then sends the ended day in a round of its own
        let critical = service.request_sync(SyncTrigger::Critical).await.unwrap();
        completed(critical);
        completed(round.await.unwrap().unwrap());

        assert!(service.review().await.pending_review_dates.is_empty());
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].review.pending_review_dates.contains(&day));
        assert!(requests[1].review.pending_review_dates.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn large_queue_is_sent_in_batches() {
        let transport = Arc::new(ScriptedTransport::new());
        let db = Database::open_in_memory().await.unwrap();
        let service = SyncService::open(
            db,
            Arc::clone(&transport),
            settings().with_max_batch_size(2),
        )
        .await
        .unwrap();
        for index in 0..5 {
            service
                .record_mutation(goal(&format!("g{index}"), "Batch"), LocalOperation::Create)
                .await
                .unwrap();
        }

        let report = completed(service.request_sync(SyncTrigger::Manual).await.unwrap());

        let sizes: Vec<usize> = transport
            .requests()
            .iter()
            .map(SyncRequest::change_count)
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(report.sent, 5);
        assert_eq!(report.acknowledged, 5);
        assert_eq!(report.last_sync_at, 3_000);
        assert_eq!(service.pending_changes().await, 0);
        // Later batches build on the watermark of earlier ones
        assert_eq!(transport.requests()[1].last_sync_at, 1_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_batch_keeps_the_rest_queued() {
        let transport = Arc::new(ScriptedTransport::new());
        let db = Database::open_in_memory().await.unwrap();
        let service = SyncService::open(
            db,
            Arc::clone(&transport),
            settings().with_max_batch_size(2),
        )
        .await
        .unwrap();
        for index in 0..3 {
            service
                .record_mutation(goal(&format!("g{index}"), "Batch"), LocalOperation::Create)
                .await
                .unwrap();
        }
        transport.push(SyncResponse::accepted(1_000));
        transport.push_error(TransportError::Api("HTTP 503".to_string()));

        let outcome = service.request_sync(SyncTrigger::Manual).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert_eq!(transport.request_count(), 2);
        assert_eq!(service.pending_changes().await, 1);
        assert_eq!(service.last_sync_at().await, 1_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stopped_polling_blocks_only_poll_trigger() {
        let transport = Arc::new(ScriptedTransport::new());
        let service = service(&transport).await;
        service.stop_polling();

        assert_eq!(
            service.request_sync(SyncTrigger::Poll).await.unwrap(),
            SyncOutcome::Blocked(BlockReason::PollingStopped)
        );
        completed(service.request_sync(SyncTrigger::Manual).await.unwrap());

        service.resume_polling();
        completed(service.request_sync(SyncTrigger::Poll).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_only_client_reports_offline() {
        let db = Database::open_in_memory().await.unwrap();
        let service = SyncService::open(db, None::<ScriptedTransport>, SyncSettings::default())
            .await
            .unwrap();
        service
            .record_mutation(goal("g1", "Offline"), LocalOperation::Create)
            .await
            .unwrap();

        assert_eq!(
            service.request_sync(SyncTrigger::Manual).await.unwrap(),
            SyncOutcome::Offline
        );
        assert_eq!(service.status(), SyncState::Offline);
        assert_eq!(service.pending_changes().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reopening_restores_queue_and_device() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stride.db");
        let transport = Arc::new(ScriptedTransport::new());

        let device_id = {
            let db = Database::open(&path).await.unwrap();
            let service = SyncService::open(db, Arc::clone(&transport), settings())
                .await
                .unwrap();
            service
                .record_mutation(goal("g1", "Durable"), LocalOperation::Create)
                .await
                .unwrap();
            service.device_id().await
        };

        let db = Database::open(&path).await.unwrap();
        let service = SyncService::open(db, transport, settings()).await.unwrap();
        assert_eq!(service.device_id().await, device_id);
        assert_eq!(service.pending_changes().await, 1);
    }
}
