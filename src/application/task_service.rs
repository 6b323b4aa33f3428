use crate::domain::models::{
    DEFAULT_SOURCE_SYSTEM, Importance, LocalTask, PlanItem, RecurrencePattern, TaskCategory,
    Urgency,
};
use crate::domain::recurrence;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub importance: Option<Importance>,
    pub urgency: Option<Urgency>,
    pub estimated_duration: Option<u32>,
    pub category: Option<TaskCategory>,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub recurrence_pattern: RecurrencePattern,
    pub recurrence_weekdays: Option<Vec<u8>>,
    pub recurrence_month_day: Option<u8>,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub importance: Option<Importance>,
    pub urgency: Option<Urgency>,
    pub estimated_duration: Option<u32>,
    pub category: Option<TaskCategory>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_weekdays: Option<Vec<u8>>,
    pub recurrence_month_day: Option<u8>,
}

/// Task state captured right before a completion so it can be reverted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionSnapshot {
    pub task_id: String,
    pub was_next_up: bool,
    pub assigned_focus_block_id: Option<String>,
    pub created_recurring_instance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub task: LocalTask,
    pub next_instance: Option<LocalTask>,
}

pub struct TaskService<R>
where
    R: TaskRepository,
{
    repository: Arc<R>,
    time_zone: Tz,
    default_duration: u32,
    now_provider: NowProvider,
    last_completion: Mutex<Option<CompletionSnapshot>>,
    undo_file: Option<PathBuf>,
}

impl<R> TaskService<R>
where
    R: TaskRepository,
{
    pub fn new(repository: Arc<R>, time_zone: Tz, default_duration: u32) -> Self {
        Self {
            repository,
            time_zone,
            default_duration,
            now_provider: Arc::new(Utc::now),
            last_completion: Mutex::new(None),
            undo_file: None,
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Keeps the undo snapshot on disk so it survives between processes.
    pub fn with_undo_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.undo_file = Some(path.into());
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn default_duration(&self) -> u32 {
        self.default_duration
    }

    pub fn get_task(&self, task_id: &str) -> Result<LocalTask, InfraError> {
        self.repository
            .get(task_id)?
            .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))
    }

    pub fn plan_item(&self, task: &LocalTask) -> PlanItem {
        PlanItem::from_local_task(task, self.default_duration, self.now(), self.time_zone)
    }

    pub fn create_task(&self, input: NewTask) -> Result<LocalTask, InfraError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(InfraError::SaveFailed("task title must not be empty".to_string()));
        }

        let mut task = LocalTask::new(title, self.now());
        task.sort_order = self.next_sort_order()?;
        task.importance = input.importance;
        task.urgency = input.urgency;
        task.estimated_duration = input.estimated_duration;
        task.category = input.category;
        task.tags = normalize_tags(input.tags);
        task.due_date = input.due_date;
        task.description = normalize_text(input.description);
        task.recurrence_pattern = input.recurrence_pattern;
        task.recurrence_weekdays = input.recurrence_weekdays;
        task.recurrence_month_day = input.recurrence_month_day;
        if task.recurrence_pattern.is_recurring() {
            task.recurrence_group_id = Some(uuid::Uuid::new_v4().to_string());
        }

        self.repository.upsert(&task)?;
        info!(task_id = %task.id, "task created");
        Ok(task)
    }

    pub fn quick_capture(&self, title: &str) -> Result<LocalTask, InfraError> {
        self.create_task(NewTask {
            title: title.to_string(),
            ..NewTask::default()
        })
    }

    /// Open tasks, highest priority score first, then by backlog rank.
    pub fn list_backlog(&self) -> Result<Vec<PlanItem>, InfraError> {
        let mut items = self
            .repository
            .list_all()?
            .iter()
            .filter(|task| !task.is_completed)
            .map(|task| self.plan_item(task))
            .collect::<Vec<_>>();
        items.sort_by(|left, right| {
            right
                .priority_score
                .cmp(&left.priority_score)
                .then_with(|| left.rank.cmp(&right.rank))
        });
        Ok(items)
    }

    /// Tasks completed within the last `days` days, newest first.
    pub fn list_completed(&self, days: u32) -> Result<Vec<PlanItem>, InfraError> {
        let cutoff = self.now() - Duration::days(i64::from(days));
        let mut completed = self
            .repository
            .list_all()?
            .into_iter()
            .filter(|task| task.is_completed)
            .filter(|task| task.completed_at.is_some_and(|at| at >= cutoff))
            .collect::<Vec<_>>();
        completed.sort_by(|left, right| right.completed_at.cmp(&left.completed_at));
        Ok(completed.iter().map(|task| self.plan_item(task)).collect())
    }

    pub fn count_open_tasks(&self) -> Result<usize, InfraError> {
        Ok(self
            .repository
            .list_all()?
            .iter()
            .filter(|task| !task.is_completed)
            .count())
    }

    pub fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<LocalTask, InfraError> {
        let mut task = self.get_task(task_id)?;
        if let Some(title) = update.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(InfraError::SaveFailed("task title must not be empty".to_string()));
            }
            task.title = title.to_string();
        }
        task.safe_set_importance(update.importance);
        task.safe_set_urgency(update.urgency);
        task.safe_set_duration(update.estimated_duration);
        task.safe_set_category(update.category);
        if let Some(tags) = update.tags {
            task.tags = normalize_tags(tags);
        }
        if update.due_date.is_some() {
            task.due_date = update.due_date;
        }
        if let Some(description) = update.description {
            task.description = normalize_text(Some(description));
        }
        if let Some(pattern) = update.recurrence_pattern {
            task.recurrence_pattern = pattern;
            if pattern.is_recurring() && task.recurrence_group_id.is_none() {
                task.recurrence_group_id = Some(uuid::Uuid::new_v4().to_string());
            }
        }
        if update.recurrence_weekdays.is_some() {
            task.recurrence_weekdays = update.recurrence_weekdays;
        }
        if update.recurrence_month_day.is_some() {
            task.recurrence_month_day = update.recurrence_month_day;
        }

        self.repository.upsert(&task)?;
        debug!(task_id = %task.id, "task updated");
        Ok(task)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), InfraError> {
        self.repository.remove(task_id)?;
        info!(task_id = %task_id, "task deleted");
        Ok(())
    }

    /// Completes the task, spawns the next recurring instance and records an
    /// undo snapshot that replaces any earlier one.
    pub fn complete_task(&self, task_id: &str) -> Result<CompletionOutcome, InfraError> {
        let mut task = self.get_task(task_id)?;
        let mut snapshot = CompletionSnapshot {
            task_id: task.id.clone(),
            was_next_up: task.is_next_up,
            assigned_focus_block_id: task.assigned_focus_block_id.clone(),
            created_recurring_instance_id: None,
        };

        let now = self.now();
        task.mark_completed(now);
        let next_instance = recurrence::create_next_instance(&mut task, now, self.time_zone);
        self.repository.upsert(&task)?;
        if let Some(instance) = &next_instance {
            self.repository.upsert(instance)?;
            snapshot.created_recurring_instance_id = Some(instance.id.clone());
        }
        self.store_snapshot(Some(snapshot))?;

        info!(
            task_id = %task.id,
            next_instance_id = next_instance.as_ref().map(|instance| instance.id.as_str()),
            "task completed"
        );
        Ok(CompletionOutcome {
            task,
            next_instance,
        })
    }

    pub fn uncomplete_task(&self, task_id: &str) -> Result<LocalTask, InfraError> {
        let mut task = self.get_task(task_id)?;
        task.mark_incomplete();
        self.repository.upsert(&task)?;
        Ok(task)
    }

    pub fn can_undo(&self) -> Result<bool, InfraError> {
        Ok(self.load_snapshot()?.is_some())
    }

    /// Reverts the last completion. Returns `None` when there is nothing to
    /// undo or the task no longer exists.
    pub fn undo_last_completion(&self) -> Result<Option<LocalTask>, InfraError> {
        let Some(snapshot) = self.load_snapshot()? else {
            return Ok(None);
        };
        self.store_snapshot(None)?;

        let Some(mut task) = self.repository.get(&snapshot.task_id)? else {
            return Ok(None);
        };
        task.mark_incomplete();
        task.is_next_up = snapshot.was_next_up;
        task.assigned_focus_block_id = snapshot.assigned_focus_block_id;
        self.repository.upsert(&task)?;

        if let Some(instance_id) = snapshot.created_recurring_instance_id {
            self.repository.remove(&instance_id)?;
        }
        info!(task_id = %task.id, "task completion undone");
        Ok(Some(task))
    }

    pub fn set_next_up(&self, task_id: &str, is_next_up: bool) -> Result<LocalTask, InfraError> {
        let mut task = self.get_task(task_id)?;
        task.set_next_up(is_next_up);
        self.repository.upsert(&task)?;
        Ok(task)
    }

    /// Open Next Up tasks in their staging order; unordered ones go last.
    pub fn list_next_up(&self) -> Result<Vec<LocalTask>, InfraError> {
        let mut tasks = self
            .repository
            .list_all()?
            .into_iter()
            .filter(|task| task.is_next_up && !task.is_completed)
            .collect::<Vec<_>>();
        tasks.sort_by(|left, right| {
            left.next_up_sort_order
                .unwrap_or(i64::MAX)
                .cmp(&right.next_up_sort_order.unwrap_or(i64::MAX))
                .then_with(|| left.sort_order.cmp(&right.sort_order))
        });
        Ok(tasks)
    }

    pub fn reorder_next_up(&self, ordered_ids: &[String]) -> Result<(), InfraError> {
        for (index, task_id) in ordered_ids.iter().enumerate() {
            if let Some(mut task) = self.repository.get(task_id)? {
                task.next_up_sort_order = Some(index as i64);
                self.repository.upsert(&task)?;
            }
        }
        Ok(())
    }

    pub fn reorder_backlog(&self, ordered_ids: &[String]) -> Result<(), InfraError> {
        for (index, task_id) in ordered_ids.iter().enumerate() {
            if let Some(mut task) = self.repository.get(task_id)? {
                task.sort_order = index as i64;
                self.repository.upsert(&task)?;
            }
        }
        Ok(())
    }

    pub fn set_duration(&self, task_id: &str, minutes: Option<u32>) -> Result<LocalTask, InfraError> {
        let mut task = self.get_task(task_id)?;
        task.estimated_duration = minutes;
        self.repository.upsert(&task)?;
        Ok(task)
    }

    pub fn assign_focus_block(
        &self,
        task_id: &str,
        focus_block_id: Option<String>,
    ) -> Result<LocalTask, InfraError> {
        let mut task = self.get_task(task_id)?;
        task.assign_focus_block(focus_block_id);
        self.repository.upsert(&task)?;
        Ok(task)
    }

    /// Detaches every task still pointing at a removed block.
    pub fn clear_block_assignments(&self, focus_block_id: &str) -> Result<usize, InfraError> {
        let mut cleared = 0;
        for mut task in self.repository.list_all()? {
            if task.assigned_focus_block_id.as_deref() == Some(focus_block_id) {
                task.assigned_focus_block_id = None;
                self.repository.upsert(&task)?;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    pub fn list_all(&self) -> Result<Vec<LocalTask>, InfraError> {
        self.repository.list_all()
    }

    /// Rewrites tasks still owned by `source_system` as plain local tasks.
    /// Running it again finds nothing to change.
    pub fn migrate_source_system(&self, source_system: &str) -> Result<usize, InfraError> {
        let mut migrated = 0;
        for mut task in self.repository.list_all()? {
            if task.source_system != source_system {
                continue;
            }
            task.source_system = DEFAULT_SOURCE_SYSTEM.to_string();
            task.external_id = None;
            self.repository.upsert(&task)?;
            migrated += 1;
        }
        if migrated > 0 {
            info!(source_system = %source_system, migrated, "tasks migrated to local source");
        }
        Ok(migrated)
    }

    fn next_sort_order(&self) -> Result<i64, InfraError> {
        Ok(self
            .repository
            .list_all()?
            .iter()
            .map(|task| task.sort_order)
            .max()
            .map_or(0, |max| max.saturating_add(1)))
    }

    fn load_snapshot(&self) -> Result<Option<CompletionSnapshot>, InfraError> {
        if let Some(path) = &self.undo_file {
            if !path.exists() {
                return Ok(None);
            }
            let raw = fs::read_to_string(path)?;
            return Ok(Some(serde_json::from_str(&raw)?));
        }
        Ok(self.snapshot_slot()?.clone())
    }

    fn store_snapshot(&self, snapshot: Option<CompletionSnapshot>) -> Result<(), InfraError> {
        if let Some(path) = &self.undo_file {
            match &snapshot {
                Some(snapshot) => fs::write(path, serde_json::to_string_pretty(snapshot)?)?,
                None if path.exists() => fs::remove_file(path)?,
                None => {}
            }
        }
        *self.snapshot_slot()? = snapshot;
        Ok(())
    }

    fn snapshot_slot(&self) -> Result<std::sync::MutexGuard<'_, Option<CompletionSnapshot>>, InfraError> {
        self.last_completion
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("undo snapshot lock poisoned: {error}")))
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !normalized.iter().any(|existing: &String| existing == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tempfile::TempDir;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn service() -> TaskService<InMemoryTaskRepository> {
        let now = fixed_time("2026-02-16T12:00:00Z");
        TaskService::new(Arc::new(InMemoryTaskRepository::default()), Tz::UTC, 15)
            .with_now_provider(Arc::new(move || now))
    }

    fn full_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            importance: Some(Importance::High),
            urgency: Some(Urgency::Urgent),
            estimated_duration: Some(30),
            category: Some(TaskCategory::Income),
            ..NewTask::default()
        }
    }

    #[test]
    fn create_trims_and_rejects_empty_titles() {
        let service = service();
        let task = service
            .create_task(NewTask {
                title: "  Draft proposal  ".to_string(),
                tags: vec![" work ".to_string(), "work".to_string(), "".to_string()],
                description: Some("   ".to_string()),
                ..NewTask::default()
            })
            .expect("create");
        assert_eq!(task.title, "Draft proposal");
        assert_eq!(task.tags, vec!["work".to_string()]);
        assert!(task.description.is_none());
        assert!(task.is_tbd());

        assert!(matches!(service.quick_capture("   "), Err(InfraError::SaveFailed(_))));
    }

    #[test]
    fn backlog_orders_by_score_then_rank() {
        let service = service();
        let low = service.quick_capture("Someday idea").expect("create");
        let high = service.create_task(full_task("Ship release")).expect("create");
        let also_low = service.quick_capture("Another idea").expect("create");
        let done = service.quick_capture("Done already").expect("create");
        service.complete_task(&done.id).expect("complete");

        let backlog = service.list_backlog().expect("backlog");
        assert_eq!(
            backlog.iter().map(|item| item.id.as_str()).collect::<Vec<_>>(),
            vec![high.id.as_str(), low.id.as_str(), also_low.id.as_str()]
        );
        assert_eq!(service.count_open_tasks().expect("count"), 3);
    }

    #[test]
    fn update_keeps_unset_fields() {
        let service = service();
        let task = service.create_task(full_task("Write docs")).expect("create");
        let updated = service
            .update_task(
                &task.id,
                TaskUpdate {
                    title: Some("Write API docs".to_string()),
                    urgency: Some(Urgency::NotUrgent),
                    ..TaskUpdate::default()
                },
            )
            .expect("update");
        assert_eq!(updated.title, "Write API docs");
        assert_eq!(updated.urgency, Some(Urgency::NotUrgent));
        assert_eq!(updated.importance, Some(Importance::High));
        assert_eq!(updated.estimated_duration, Some(30));
        assert_eq!(updated.category, Some(TaskCategory::Income));

        assert!(matches!(
            service.update_task("missing", TaskUpdate::default()),
            Err(InfraError::NotFound(_))
        ));
    }

    #[test]
    fn delete_is_silent_for_missing_tasks() {
        let service = service();
        let task = service.quick_capture("Temp").expect("create");
        service.delete_task(&task.id).expect("delete");
        service.delete_task(&task.id).expect("delete again");
        assert_eq!(service.count_open_tasks().expect("count"), 0);
    }

    #[test]
    fn undo_restores_staging_and_removes_recurring_instance() {
        let service = service();
        let task = service
            .create_task(NewTask {
                recurrence_pattern: RecurrencePattern::Daily,
                ..full_task("Daily review")
            })
            .expect("create");
        service.set_next_up(&task.id, true).expect("next up");
        service
            .assign_focus_block(&task.id, Some("fb-1".to_string()))
            .expect("assign");

        let outcome = service.complete_task(&task.id).expect("complete");
        assert!(outcome.task.is_completed);
        assert!(!outcome.task.is_next_up);
        assert!(outcome.task.assigned_focus_block_id.is_none());
        let instance = outcome.next_instance.expect("recurring instance");
        assert_eq!(instance.recurrence_group_id, outcome.task.recurrence_group_id);
        assert!(service.can_undo().expect("can undo"));

        let restored = service
            .undo_last_completion()
            .expect("undo")
            .expect("restored task");
        assert!(!restored.is_completed);
        assert!(restored.completed_at.is_none());
        assert!(restored.is_next_up);
        assert_eq!(restored.assigned_focus_block_id.as_deref(), Some("fb-1"));
        assert!(service.get_task(&instance.id).is_err());
        assert!(service.undo_last_completion().expect("second undo").is_none());
    }

    #[test]
    fn uncompleting_reopens_without_restoring_staging() {
        let service = service();
        let task = service.quick_capture("Reopen me").expect("create");
        service.set_next_up(&task.id, true).expect("next up");
        service
            .assign_focus_block(&task.id, Some("fb-1".to_string()))
            .expect("assign");
        service.complete_task(&task.id).expect("complete");

        let reopened = service.uncomplete_task(&task.id).expect("uncomplete");
        assert!(!reopened.is_completed);
        assert!(reopened.completed_at.is_none());
        assert!(!reopened.is_next_up);
        assert!(reopened.assigned_focus_block_id.is_none());

        let stored = service.get_task(&task.id).expect("stored");
        assert!(!stored.is_completed);
        assert!(stored.completed_at.is_none());
        assert_eq!(service.count_open_tasks().expect("count"), 1);
        assert!(service.uncomplete_task("missing").is_err());
    }

    #[test]
    fn undo_snapshot_survives_service_restart_with_undo_file() {
        let dir = TempDir::new().expect("temp dir");
        let repository = Arc::new(InMemoryTaskRepository::default());
        let undo_path = dir.path().join("undo.json");
        let first = TaskService::new(Arc::clone(&repository), Tz::UTC, 15).with_undo_file(&undo_path);
        let task = first.quick_capture("Persisted").expect("create");
        first.complete_task(&task.id).expect("complete");

        let second = TaskService::new(repository, Tz::UTC, 15).with_undo_file(&undo_path);
        let restored = second.undo_last_completion().expect("undo").expect("task");
        assert_eq!(restored.id, task.id);
        assert!(!undo_path.exists());
    }

    #[test]
    fn completed_list_is_limited_to_recent_days() {
        let clock = Arc::new(AtomicI64::new(fixed_time("2026-02-01T12:00:00Z").timestamp()));
        let provider_clock = Arc::clone(&clock);
        let service = TaskService::new(Arc::new(InMemoryTaskRepository::default()), Tz::UTC, 15)
            .with_now_provider(Arc::new(move || {
                DateTime::from_timestamp(provider_clock.load(Ordering::SeqCst), 0).expect("valid timestamp")
            }));

        let old = service.quick_capture("Old").expect("create");
        service.complete_task(&old.id).expect("complete");
        clock.store(fixed_time("2026-02-15T12:00:00Z").timestamp(), Ordering::SeqCst);
        let older_recent = service.quick_capture("Yesterday").expect("create");
        service.complete_task(&older_recent.id).expect("complete");
        clock.store(fixed_time("2026-02-16T09:00:00Z").timestamp(), Ordering::SeqCst);
        let newest = service.quick_capture("Today").expect("create");
        service.complete_task(&newest.id).expect("complete");

        let completed = service.list_completed(7).expect("completed");
        assert_eq!(
            completed.iter().map(|item| item.title.as_str()).collect::<Vec<_>>(),
            vec!["Today", "Yesterday"]
        );
    }

    #[test]
    fn next_up_ordering_and_removal() {
        let service = service();
        let first = service.quick_capture("First").expect("create");
        let second = service.quick_capture("Second").expect("create");
        let third = service.quick_capture("Third").expect("create");
        for task in [&first, &second, &third] {
            service.set_next_up(&task.id, true).expect("next up");
        }
        service
            .reorder_next_up(&[third.id.clone(), first.id.clone()])
            .expect("reorder");

        let next_up = service.list_next_up().expect("next up");
        assert_eq!(
            next_up.iter().map(|task| task.title.as_str()).collect::<Vec<_>>(),
            vec!["Third", "First", "Second"]
        );

        service
            .assign_focus_block(&third.id, Some("fb-1".to_string()))
            .expect("assign");
        let removed = service.set_next_up(&third.id, false).expect("remove");
        assert!(removed.next_up_sort_order.is_none());
        assert!(removed.assigned_focus_block_id.is_none());
        assert_eq!(service.list_next_up().expect("next up").len(), 2);
    }

    #[test]
    fn reassigning_blocks_counts_reschedules_and_clearing_detaches() {
        let service = service();
        let task = service.quick_capture("Move me").expect("create");
        service
            .assign_focus_block(&task.id, Some("fb-1".to_string()))
            .expect("assign");
        let moved = service
            .assign_focus_block(&task.id, Some("fb-2".to_string()))
            .expect("reassign");
        assert_eq!(moved.reschedule_count, 1);

        assert_eq!(service.clear_block_assignments("fb-2").expect("clear"), 1);
        assert!(service
            .get_task(&task.id)
            .expect("task")
            .assigned_focus_block_id
            .is_none());
    }

    #[test]
    fn backlog_reorder_and_duration() {
        let service = service();
        let a = service.quick_capture("A").expect("create");
        let b = service.quick_capture("B").expect("create");
        service.reorder_backlog(&[b.id.clone(), a.id.clone()]).expect("reorder");
        assert_eq!(service.get_task(&b.id).expect("task").sort_order, 0);
        assert_eq!(service.get_task(&a.id).expect("task").sort_order, 1);

        let updated = service.set_duration(&a.id, Some(45)).expect("duration");
        assert_eq!(updated.estimated_duration, Some(45));
        assert_eq!(service.plan_item(&updated).effective_duration, 45);
    }

    #[test]
    fn migrating_reminder_sourced_tasks_is_idempotent() {
        let repository = Arc::new(InMemoryTaskRepository::default());
        let service = TaskService::new(Arc::clone(&repository), Tz::UTC, 15);
        let mut legacy = LocalTask::new("Legacy", fixed_time("2026-01-01T08:00:00Z"));
        legacy.source_system = "reminders".to_string();
        legacy.external_id = Some("x-apple-reminder://1".to_string());
        repository.upsert(&legacy).expect("seed");
        service.quick_capture("Native").expect("create");

        assert_eq!(service.migrate_source_system("reminders").expect("migrate"), 1);
        let migrated = service.get_task(&legacy.id).expect("task");
        assert_eq!(migrated.source_system, DEFAULT_SOURCE_SYSTEM);
        assert!(migrated.external_id.is_none());
        assert_eq!(service.migrate_source_system("reminders").expect("migrate again"), 0);
    }
}
