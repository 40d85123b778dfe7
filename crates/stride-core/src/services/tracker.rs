//! Store actions over the local entity store and the sync engine.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::config::SyncSettings;
use crate::db::{Database, EntityRepository};
use crate::error::{Error, Result};
use crate::export::{self, ExportDocument, ImportReport, EXPORT_FORMAT_VERSION};
use crate::models::{
    GlobalGoal, GlobalGoalStatus, Goal, Habit, HabitFrequency, LocalOperation, Milestone,
    ReviewState, SyncConflict, SyncEntity,
};
use crate::sync::{
    ConflictResolver, HttpSyncTransport, SyncOutcome, SyncService, SyncTransport, SyncTrigger,
};
use crate::util::normalize_text_option;

/// Context handle owning the local store and its sync engine.
///
/// Every mutation writes the entity and enqueues it before returning.
/// Deletes leave an invisible tombstone until the server acknowledges them.
pub struct Tracker<T = Option<HttpSyncTransport>> {
    sync: SyncService<T>,
}

impl<T> Clone for Tracker<T> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync.clone(),
        }
    }
}

impl Tracker {
    /// Open the store at `path`, syncing over HTTP when an endpoint is set
    pub async fn open_path(path: impl AsRef<Path>, settings: SyncSettings) -> Result<Self> {
        let db = Database::open(path).await?;
        let transport = HttpSyncTransport::from_settings(&settings)?;
        if transport.is_none() {
            info!("Running in local-only mode (no sync endpoint)");
        }
        Self::open(db, transport, settings).await
    }
}

impl<T: SyncTransport> Tracker<T> {
    pub async fn open(db: Database, transport: T, settings: SyncSettings) -> Result<Self> {
        Ok(Self {
            sync: SyncService::open(db, transport, settings).await?,
        })
    }

    pub const fn sync(&self) -> &SyncService<T> {
        &self.sync
    }

    fn entities(&self) -> EntityRepository<'_> {
        EntityRepository::new(self.sync.database().connection())
    }

    /// Initial round on application start
    pub async fn start(&self) -> Result<SyncOutcome> {
        self.sync.request_sync(SyncTrigger::AppStart).await
    }

    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        self.sync.request_sync(SyncTrigger::Manual).await
    }

    async fn find<E: SyncEntity>(&self, id: &str) -> Result<E> {
        self.entities()
            .get::<E>(id)
            .await?
            .filter(SyncEntity::is_visible)
            .ok_or_else(|| Error::NotFound(format!("{} {id}", E::KIND)))
    }

    async fn save<E: SyncEntity>(&self, entity: E, operation: LocalOperation) -> Result<E> {
        self.sync.record_mutation(entity, operation).await
    }

    async fn delete<E: SyncEntity>(&self, id: &str) -> Result<()> {
        let entity = self.find::<E>(id).await?;
        self.save(entity, LocalOperation::Delete).await?;
        Ok(())
    }

    fn critical(&self) {
        self.sync.request_sync_in_background(SyncTrigger::Critical);
    }

    // Goals

    pub async fn add_goal(&self, title: &str, date: Option<NaiveDate>) -> Result<Goal> {
        let mut goal = Goal::new(required_title(title)?);
        goal.date = date;
        self.save(goal, LocalOperation::Create).await
    }

    pub async fn update_goal(&self, goal: Goal) -> Result<Goal> {
        self.find::<Goal>(&goal.id).await?;
        let mut goal = goal;
        goal.title = required_title(&goal.title)?;
        goal.description = normalize_text_option(goal.description);
        self.save(goal, LocalOperation::Update).await
    }

    pub async fn complete_goal(&self, id: &str) -> Result<Goal> {
        let mut goal = self.find::<Goal>(id).await?;
        goal.completed = true;
        self.save(goal, LocalOperation::Update).await
    }

    /// Move a goal to another day; syncs immediately
    pub async fn reschedule_goal(&self, id: &str, date: NaiveDate) -> Result<Goal> {
        let mut goal = self.find::<Goal>(id).await?;
        goal.reschedule(date);
        let goal = self.save(goal, LocalOperation::Update).await?;
        self.critical();
        Ok(goal)
    }

    pub async fn delete_goal(&self, id: &str) -> Result<()> {
        self.delete::<Goal>(id).await
    }

    pub async fn goal(&self, id: &str) -> Result<Goal> {
        self.find(id).await
    }

    pub async fn goals(&self) -> Result<Vec<Goal>> {
        self.entities().list().await
    }

    pub async fn goals_on(&self, date: NaiveDate) -> Result<Vec<Goal>> {
        let mut goals = self.goals().await?;
        goals.retain(|goal| goal.date == Some(date));
        Ok(goals)
    }

    // Habits

    pub async fn add_habit(&self, title: &str, frequency: HabitFrequency) -> Result<Habit> {
        let mut habit = Habit::new(required_title(title)?);
        habit.frequency = frequency;
        self.save(habit, LocalOperation::Create).await
    }

    /// Record a check-in; checking the same day twice is a no-op
    pub async fn check_habit(&self, id: &str, date: NaiveDate) -> Result<Habit> {
        let mut habit = self.find::<Habit>(id).await?;
        if !habit.check(date) {
            return Ok(habit);
        }
        self.save(habit, LocalOperation::Update).await
    }

    /// Delete a habit; syncs immediately
    pub async fn delete_habit(&self, id: &str) -> Result<()> {
        self.delete::<Habit>(id).await?;
        self.critical();
        Ok(())
    }

    pub async fn habit(&self, id: &str) -> Result<Habit> {
        self.find(id).await
    }

    pub async fn habits(&self) -> Result<Vec<Habit>> {
        self.entities().list().await
    }

    // Global goals

    pub async fn add_global_goal(
        &self,
        title: &str,
        category: Option<String>,
        target_date: Option<NaiveDate>,
    ) -> Result<GlobalGoal> {
        let mut plan = GlobalGoal::new(required_title(title)?);
        plan.category = normalize_text_option(category);
        plan.target_date = target_date;
        self.save(plan, LocalOperation::Create).await
    }

    pub async fn update_global_goal_status(
        &self,
        id: &str,
        status: GlobalGoalStatus,
    ) -> Result<GlobalGoal> {
        let mut plan = self.find::<GlobalGoal>(id).await?;
        if plan.status == status {
            return Ok(plan);
        }
        plan.status = status;
        self.save(plan, LocalOperation::Update).await
    }

    /// Delete a global goal together with its milestones
    pub async fn delete_global_goal(&self, id: &str) -> Result<()> {
        self.find::<GlobalGoal>(id).await?;
        for milestone in self.milestones_for(id).await? {
            self.save(milestone, LocalOperation::Delete).await?;
        }
        self.delete::<GlobalGoal>(id).await
    }

    pub async fn global_goal(&self, id: &str) -> Result<GlobalGoal> {
        self.find(id).await
    }

    pub async fn global_goals(&self) -> Result<Vec<GlobalGoal>> {
        self.entities().list().await
    }

    // Milestones

    pub async fn add_milestone(&self, global_goal_id: &str, title: &str) -> Result<Milestone> {
        self.find::<GlobalGoal>(global_goal_id).await?;
        let siblings = self.milestones_for(global_goal_id).await?;
        let mut milestone = Milestone::new(global_goal_id, required_title(title)?);
        milestone.order = siblings
            .iter()
            .map(|sibling| sibling.order)
            .max()
            .map_or(1, |order| order.saturating_add(1));
        self.save(milestone, LocalOperation::Create).await
    }

    pub async fn complete_milestone(&self, id: &str) -> Result<Milestone> {
        let mut milestone = self.find::<Milestone>(id).await?;
        milestone.completed = true;
        self.save(milestone, LocalOperation::Update).await
    }

    pub async fn delete_milestone(&self, id: &str) -> Result<()> {
        self.delete::<Milestone>(id).await
    }

    pub async fn milestone(&self, id: &str) -> Result<Milestone> {
        self.find(id).await
    }

    pub async fn milestones(&self) -> Result<Vec<Milestone>> {
        self.entities().list().await
    }

    /// Milestones of one global goal in display order
    pub async fn milestones_for(&self, global_goal_id: &str) -> Result<Vec<Milestone>> {
        let mut milestones = self.milestones().await?;
        milestones.retain(|milestone| milestone.global_goal_id == global_goal_id);
        milestones.sort_by_key(|milestone| milestone.order);
        Ok(milestones)
    }

    // Review

    pub async fn review(&self) -> ReviewState {
        self.sync.review().await
    }

    pub async fn mark_day_pending(&self, date: NaiveDate) -> Result<ReviewState> {
        self.sync
            .update_review(|review| {
                review.mark_pending(date);
            })
            .await
    }

    /// Close the review for a day; syncs immediately
    pub async fn end_day(&self, date: NaiveDate) -> Result<ReviewState> {
        let review = self
            .sync
            .update_review(|review| {
                review.complete(date);
                review.touch(Utc::now());
            })
            .await?;
        self.critical();
        Ok(review)
    }

    pub async fn touch_activity(&self) -> Result<ReviewState> {
        self.sync
            .update_review(|review| review.touch(Utc::now()))
            .await
    }

    // Conflicts

    pub async fn pending_conflicts(&self) -> Vec<SyncConflict> {
        self.sync.pending_conflicts().await
    }

    pub async fn resolve_conflicts(&self, resolver: ConflictResolver) -> Result<SyncOutcome> {
        self.sync.resolve_conflicts(resolver).await
    }

    // Export / import

    pub async fn export(&self) -> Result<ExportDocument> {
        Ok(ExportDocument {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at: Utc::now(),
            device_id: self.sync.device_id().await,
            goals: self.goals().await?,
            habits: self.habits().await?,
            global_goals: self.global_goals().await?,
            milestones: self.milestones().await?,
            review: self.review().await,
        })
    }

    /// Merge another replica into local state; winners are queued as upserts
    pub async fn import(&self, document: ExportDocument) -> Result<ImportReport> {
        let report = ImportReport {
            goals: self.import_entities(document.goals).await?,
            habits: self.import_entities(document.habits).await?,
            global_goals: self.import_entities(document.global_goals).await?,
            milestones: self.import_entities(document.milestones).await?,
        };
        let replica_review = document.review;
        self.sync
            .update_review(|review| *review = export::merge_review(review, &replica_review))
            .await?;

        info!(
            imported = report.total(),
            from_device = %document.device_id,
            "Imported replica"
        );
        Ok(report)
    }

    async fn import_entities<E: SyncEntity>(&self, replica: Vec<E>) -> Result<usize> {
        let mut imported = 0;
        for entity in replica {
            if entity.id().trim().is_empty() || !entity.is_visible() {
                continue;
            }
            let local = self.entities().get::<E>(entity.id()).await?;
            if export::replica_wins(local.as_ref(), &entity) {
                self.save(entity, LocalOperation::Upsert).await?;
                imported += 1;
            }
        }
        Ok(imported)
    }
}

fn required_title(title: &str) -> Result<String> {
    normalize_text_option(Some(title.to_string()))
        .ok_or_else(|| Error::InvalidInput("title must not be empty".to_string()))
}
