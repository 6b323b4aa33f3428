use crate::domain::models::{Importance, LocalTask, RecurrencePattern, TaskCategory, Urgency};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{parse_optional_rfc3339_utc, parse_rfc3339_utc};
use crate::infrastructure::storage::open_connection;
use rusqlite::{OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait TaskRepository: Send + Sync {
    fn get(&self, task_id: &str) -> Result<Option<LocalTask>, InfraError>;
    fn list_all(&self) -> Result<Vec<LocalTask>, InfraError>;
    fn upsert(&self, task: &LocalTask) -> Result<(), InfraError>;
    /// Removing an unknown id is not an error.
    fn remove(&self, task_id: &str) -> Result<(), InfraError>;
}

const TASK_COLUMNS: &str = "id, title, is_completed, tags, due_date, created_at, sort_order, \
     importance, urgency, estimated_duration, category, recurrence_pattern, recurrence_weekdays, \
     recurrence_month_day, recurrence_group_id, description, is_next_up, next_up_sort_order, \
     assigned_focus_block_id, reschedule_count, completed_at, external_id, source_system";

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn get(&self, task_id: &str) -> Result<Option<LocalTask>, InfraError> {
        let connection = open_connection(&self.db_path)?;
        let row = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM local_tasks WHERE id = ?1"),
                params![task_id.trim()],
                TaskRow::read,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    fn list_all(&self) -> Result<Vec<LocalTask>, InfraError> {
        let connection = open_connection(&self.db_path)?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM local_tasks ORDER BY sort_order ASC, created_at ASC"
        ))?;
        let rows = statement
            .query_map([], TaskRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    fn upsert(&self, task: &LocalTask) -> Result<(), InfraError> {
        task.validate().map_err(InfraError::SaveFailed)?;
        let connection = open_connection(&self.db_path)?;
        let tags = serde_json::to_string(&task.tags)?;
        let weekdays = task
            .recurrence_weekdays
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        connection.execute(
            &format!(
                "INSERT INTO local_tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19, ?20, ?21, ?22, ?23)
                 ON CONFLICT(id) DO UPDATE SET
                   title = excluded.title,
                   is_completed = excluded.is_completed,
                   tags = excluded.tags,
                   due_date = excluded.due_date,
                   created_at = excluded.created_at,
                   sort_order = excluded.sort_order,
                   importance = excluded.importance,
                   urgency = excluded.urgency,
                   estimated_duration = excluded.estimated_duration,
                   category = excluded.category,
                   recurrence_pattern = excluded.recurrence_pattern,
                   recurrence_weekdays = excluded.recurrence_weekdays,
                   recurrence_month_day = excluded.recurrence_month_day,
                   recurrence_group_id = excluded.recurrence_group_id,
                   description = excluded.description,
                   is_next_up = excluded.is_next_up,
                   next_up_sort_order = excluded.next_up_sort_order,
                   assigned_focus_block_id = excluded.assigned_focus_block_id,
                   reschedule_count = excluded.reschedule_count,
                   completed_at = excluded.completed_at,
                   external_id = excluded.external_id,
                   source_system = excluded.source_system"
            ),
            params![
                task.id,
                task.title,
                task.is_completed,
                tags,
                task.due_date.map(|value| value.to_rfc3339()),
                task.created_at.to_rfc3339(),
                task.sort_order,
                task.importance.map(Importance::level),
                task.urgency.map(Urgency::as_str),
                task.estimated_duration,
                task.category.map(TaskCategory::as_str),
                task.recurrence_pattern.as_str(),
                weekdays,
                task.recurrence_month_day,
                task.recurrence_group_id,
                task.description,
                task.is_next_up,
                task.next_up_sort_order,
                task.assigned_focus_block_id,
                task.reschedule_count,
                task.completed_at.map(|value| value.to_rfc3339()),
                task.external_id,
                task.source_system,
            ],
        )?;
        Ok(())
    }

    fn remove(&self, task_id: &str) -> Result<(), InfraError> {
        let connection = open_connection(&self.db_path)?;
        connection.execute("DELETE FROM local_tasks WHERE id = ?1", params![task_id.trim()])?;
        Ok(())
    }
}

/// Raw column values, converted outside the rusqlite row callback so that
/// decoding failures surface as `InfraError`.
struct TaskRow {
    id: String,
    title: String,
    is_completed: bool,
    tags: String,
    due_date: Option<String>,
    created_at: String,
    sort_order: i64,
    importance: Option<i64>,
    urgency: Option<String>,
    estimated_duration: Option<u32>,
    category: Option<String>,
    recurrence_pattern: String,
    recurrence_weekdays: Option<String>,
    recurrence_month_day: Option<u8>,
    recurrence_group_id: Option<String>,
    description: Option<String>,
    is_next_up: bool,
    next_up_sort_order: Option<i64>,
    assigned_focus_block_id: Option<String>,
    reschedule_count: u32,
    completed_at: Option<String>,
    external_id: Option<String>,
    source_system: String,
}

impl TaskRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            is_completed: row.get(2)?,
            tags: row.get(3)?,
            due_date: row.get(4)?,
            created_at: row.get(5)?,
            sort_order: row.get(6)?,
            importance: row.get(7)?,
            urgency: row.get(8)?,
            estimated_duration: row.get(9)?,
            category: row.get(10)?,
            recurrence_pattern: row.get(11)?,
            recurrence_weekdays: row.get(12)?,
            recurrence_month_day: row.get(13)?,
            recurrence_group_id: row.get(14)?,
            description: row.get(15)?,
            is_next_up: row.get(16)?,
            next_up_sort_order: row.get(17)?,
            assigned_focus_block_id: row.get(18)?,
            reschedule_count: row.get(19)?,
            completed_at: row.get(20)?,
            external_id: row.get(21)?,
            source_system: row.get(22)?,
        })
    }

    fn into_task(self) -> Result<LocalTask, InfraError> {
        let recurrence_pattern = RecurrencePattern::parse(&self.recurrence_pattern).ok_or_else(|| {
            InfraError::FetchFailed(format!(
                "task {} has unknown recurrence pattern {}",
                self.id, self.recurrence_pattern
            ))
        })?;
        let recurrence_weekdays = self
            .recurrence_weekdays
            .as_deref()
            .map(serde_json::from_str::<Vec<u8>>)
            .transpose()?;

        Ok(LocalTask {
            tags: serde_json::from_str(&self.tags)?,
            due_date: parse_optional_rfc3339_utc(self.due_date, "local_tasks.due_date")?,
            created_at: parse_rfc3339_utc(&self.created_at, "local_tasks.created_at")?,
            importance: self.importance.and_then(Importance::from_level),
            urgency: self.urgency.as_deref().and_then(Urgency::parse),
            category: self.category.as_deref().and_then(TaskCategory::parse),
            completed_at: parse_optional_rfc3339_utc(self.completed_at, "local_tasks.completed_at")?,
            recurrence_pattern,
            recurrence_weekdays,
            id: self.id,
            title: self.title,
            is_completed: self.is_completed,
            sort_order: self.sort_order,
            estimated_duration: self.estimated_duration,
            recurrence_month_day: self.recurrence_month_day,
            recurrence_group_id: self.recurrence_group_id,
            description: self.description,
            is_next_up: self.is_next_up,
            next_up_sort_order: self.next_up_sort_order,
            assigned_focus_block_id: self.assigned_focus_block_id,
            reschedule_count: self.reschedule_count,
            external_id: self.external_id,
            source_system: self.source_system,
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, LocalTask>>,
}

impl InMemoryTaskRepository {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, LocalTask>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task store lock poisoned: {error}")))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn get(&self, task_id: &str) -> Result<Option<LocalTask>, InfraError> {
        Ok(self.lock()?.get(task_id.trim()).cloned())
    }

    fn list_all(&self) -> Result<Vec<LocalTask>, InfraError> {
        let mut tasks = self.lock()?.values().cloned().collect::<Vec<_>>();
        tasks.sort_by(|left, right| {
            left.sort_order
                .cmp(&right.sort_order)
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        Ok(tasks)
    }

    fn upsert(&self, task: &LocalTask) -> Result<(), InfraError> {
        task.validate().map_err(InfraError::SaveFailed)?;
        self.lock()?.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn remove(&self, task_id: &str) -> Result<(), InfraError> {
        self.lock()?.remove(task_id.trim());
        Ok(())
    }
}
