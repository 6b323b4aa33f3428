use crate::application::task_service::{NewTask, TaskService};
use crate::domain::models::{Importance, LocalTask, ReminderData};
use crate::infrastructure::calendar_store::{AccessStatus, CalendarStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::TaskRepository;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Source system written by older builds that synced reminders in place.
pub const LEGACY_REMINDERS_SOURCE: &str = "reminders";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: Vec<LocalTask>,
    pub skipped_duplicates: usize,
    pub marked_complete: usize,
}

/// One-way import of open reminders into the local backlog.
pub struct RemindersImportService<C, R>
where
    C: CalendarStore,
    R: TaskRepository,
{
    store: Arc<C>,
    tasks: Arc<TaskService<R>>,
    visible_list_ids: Option<Vec<String>>,
}

impl<C, R> RemindersImportService<C, R>
where
    C: CalendarStore,
    R: TaskRepository,
{
    pub fn new(store: Arc<C>, tasks: Arc<TaskService<R>>) -> Self {
        Self {
            store,
            tasks,
            visible_list_ids: None,
        }
    }

    /// `None` treats every list as visible.
    pub fn with_visible_lists(mut self, visible_list_ids: Option<Vec<String>>) -> Self {
        self.visible_list_ids = visible_list_ids;
        self
    }

    pub async fn ensure_access(&self) -> Result<(), InfraError> {
        let granted = match self.store.reminders_access().await {
            AccessStatus::Authorized => true,
            AccessStatus::NotDetermined => self.store.request_reminders_access().await?,
            AccessStatus::Denied => false,
        };
        if granted {
            Ok(())
        } else {
            Err(InfraError::NotAuthorized)
        }
    }

    /// Imports every visible open reminder whose title is not already a task.
    /// With `mark_complete`, imported reminders and skipped duplicates are
    /// closed afterwards; failures there are logged and skipped. Reminders
    /// that could not be imported stay open.
    pub async fn import_all(&self, mark_complete: bool) -> Result<ImportSummary, InfraError> {
        self.ensure_access().await?;
        let reminders = self
            .store
            .fetch_incomplete_reminders()
            .await?
            .into_iter()
            .filter(|reminder| self.is_visible(reminder))
            .collect::<Vec<_>>();

        let mut known_titles = self
            .tasks
            .list_all()?
            .into_iter()
            .map(|task| task.title)
            .collect::<HashSet<_>>();

        let mut imported = Vec::new();
        let mut skipped_duplicates = 0;
        let mut handled_ids = Vec::new();
        for reminder in &reminders {
            if known_titles.contains(&reminder.title) {
                skipped_duplicates += 1;
                handled_ids.push(reminder.id.as_str());
                continue;
            }
            if reminder.title.trim().is_empty() {
                warn!(reminder_id = %reminder.id, "skipping reminder without title");
                continue;
            }
            let task = self.tasks.create_task(NewTask {
                title: reminder.title.clone(),
                importance: Importance::from_reminder_priority(reminder.priority),
                due_date: reminder.due_date,
                description: reminder.notes.clone(),
                ..NewTask::default()
            })?;
            known_titles.insert(reminder.title.clone());
            handled_ids.push(reminder.id.as_str());
            imported.push(task);
        }

        let mut marked_complete = 0;
        if mark_complete {
            for reminder_id in handled_ids {
                match self.store.mark_reminder_complete(reminder_id).await {
                    Ok(()) => marked_complete += 1,
                    Err(error) => {
                        warn!(reminder_id = %reminder_id, error = %error, "failed to mark reminder complete");
                    }
                }
            }
        }

        info!(
            imported = imported.len(),
            skipped_duplicates,
            marked_complete,
            "reminders imported"
        );
        Ok(ImportSummary {
            imported,
            skipped_duplicates,
            marked_complete,
        })
    }

    pub fn migrate_legacy_tasks(&self) -> Result<usize, InfraError> {
        self.tasks.migrate_source_system(LEGACY_REMINDERS_SOURCE)
    }

    fn is_visible(&self, reminder: &ReminderData) -> bool {
        match (&reminder.list_id, &self.visible_list_ids) {
            (None, _) | (_, None) => true,
            (Some(list_id), Some(visible)) => visible.iter().any(|id| id == list_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::calendar_store::InMemoryCalendarStore;
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use chrono::{DateTime, Utc};
    use chrono_tz::Tz;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn tasks() -> Arc<TaskService<InMemoryTaskRepository>> {
        let now = fixed_time("2026-02-16T12:00:00Z");
        Arc::new(
            TaskService::new(Arc::new(InMemoryTaskRepository::default()), Tz::UTC, 15)
                .with_now_provider(Arc::new(move || now)),
        )
    }

    fn sample_reminder(id: &str, title: &str, priority: u8, list_id: Option<&str>) -> ReminderData {
        let mut reminder = ReminderData::new(id, title);
        reminder.priority = priority;
        reminder.list_id = list_id.map(str::to_string);
        reminder
    }

    async fn seed(store: &InMemoryCalendarStore, reminders: Vec<ReminderData>) {
        for reminder in reminders {
            store.create_reminder(reminder).await.expect("seed reminder");
        }
    }

    #[tokio::test]
    async fn imports_visible_reminders_and_maps_priority() {
        let store = Arc::new(InMemoryCalendarStore::default());
        let mut with_details = sample_reminder("r-1", "File taxes", 1, Some("work"));
        with_details.due_date = Some(fixed_time("2026-04-15T09:00:00Z"));
        with_details.notes = Some("Bring receipts".to_string());
        seed(
            &store,
            vec![
                with_details,
                sample_reminder("r-2", "Water plants", 5, None),
                sample_reminder("r-3", "Hidden", 9, Some("private")),
                sample_reminder("r-4", "Read paper", 7, Some("work")),
                sample_reminder("r-5", "Someday", 0, Some("work")),
            ],
        )
        .await;
        let tasks = tasks();
        let service = RemindersImportService::new(Arc::clone(&store), Arc::clone(&tasks))
            .with_visible_lists(Some(vec!["work".to_string()]));

        let summary = service.import_all(false).await.expect("import");
        assert_eq!(summary.skipped_duplicates, 0);
        assert_eq!(summary.marked_complete, 0);
        let imported = summary
            .imported
            .iter()
            .map(|task| (task.title.as_str(), task.importance))
            .collect::<Vec<_>>();
        assert_eq!(
            imported,
            vec![
                ("File taxes", Some(Importance::High)),
                ("Water plants", Some(Importance::Medium)),
                ("Read paper", Some(Importance::Low)),
                ("Someday", None),
            ]
        );

        let taxes = &summary.imported[0];
        assert_eq!(taxes.due_date, Some(fixed_time("2026-04-15T09:00:00Z")));
        assert_eq!(taxes.description.as_deref(), Some("Bring receipts"));
        assert_eq!(taxes.source_system, "local");
        assert!(taxes.external_id.is_none());
        assert!(!store.reminder("r-1").expect("lookup").expect("reminder").is_completed);
    }

    #[tokio::test]
    async fn duplicates_are_skipped_but_still_marked_complete() {
        let store = Arc::new(InMemoryCalendarStore::default());
        seed(
            &store,
            vec![
                sample_reminder("r-1", "Existing", 0, None),
                sample_reminder("r-2", "Fresh", 0, None),
            ],
        )
        .await;
        let tasks = tasks();
        tasks.quick_capture("Existing").expect("create");
        let service = RemindersImportService::new(Arc::clone(&store), Arc::clone(&tasks));

        let summary = service.import_all(true).await.expect("import");
        assert_eq!(summary.imported.len(), 1);
        assert_eq!(summary.skipped_duplicates, 1);
        assert_eq!(summary.marked_complete, 2);
        for id in ["r-1", "r-2"] {
            assert!(store.reminder(id).expect("lookup").expect("reminder").is_completed);
        }

        let again = service.import_all(false).await.expect("second import");
        assert!(again.imported.is_empty());
        assert_eq!(tasks.count_open_tasks().expect("count"), 2);
    }

    #[tokio::test]
    async fn untitled_reminders_stay_open() {
        let store = Arc::new(InMemoryCalendarStore::default());
        let mut untitled = sample_reminder("r-1", "   ", 0, None);
        untitled.notes = Some("Call the plumber".to_string());
        seed(&store, vec![untitled, sample_reminder("r-2", "Titled", 0, None)]).await;
        let service = RemindersImportService::new(Arc::clone(&store), tasks());

        let summary = service.import_all(true).await.expect("import");
        assert_eq!(summary.imported.len(), 1);
        assert_eq!(summary.skipped_duplicates, 0);
        assert_eq!(summary.marked_complete, 1);
        let untitled = store.reminder("r-1").expect("lookup").expect("reminder");
        assert!(!untitled.is_completed);
        assert_eq!(untitled.notes.as_deref(), Some("Call the plumber"));
        assert!(store.reminder("r-2").expect("lookup").expect("reminder").is_completed);
    }

    #[tokio::test]
    async fn mark_complete_failures_do_not_fail_import() {
        let store = Arc::new(InMemoryCalendarStore::default().with_failing_reminder_updates());
        seed(&store, vec![sample_reminder("r-1", "Fragile", 0, None)]).await;
        let service = RemindersImportService::new(Arc::clone(&store), tasks());

        let summary = service.import_all(true).await.expect("import");
        assert_eq!(summary.imported.len(), 1);
        assert_eq!(summary.marked_complete, 0);
    }

    #[tokio::test]
    async fn denied_access_is_reported() {
        let store = Arc::new(InMemoryCalendarStore::with_access(
            AccessStatus::Authorized,
            AccessStatus::NotDetermined,
            false,
        ));
        let service = RemindersImportService::new(store, tasks());
        assert!(matches!(
            service.import_all(false).await,
            Err(InfraError::NotAuthorized)
        ));
    }
}
