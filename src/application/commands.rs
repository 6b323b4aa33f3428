use crate::application::bootstrap::bootstrap_workspace;
use crate::application::focus_block_service::{
    DayPlan, FocusBlockService, PlannedTaskEnd, TaskActionResult,
};
use crate::application::reminders_import::{ImportSummary, RemindersImportService};
use crate::application::task_service::{CompletionOutcome, NewTask, TaskService};
use crate::domain::calendar::{CalendarEvent, FocusBlock};
use crate::domain::gap_finder::TimeSlot;
use crate::domain::models::{
    Importance, LocalTask, PlanItem, RecurrencePattern, ReminderData, TaskCategory, Urgency,
};
use crate::domain::notes;
use crate::domain::review::{self, PlanningAccuracyStats};
use crate::infrastructure::calendar_store::{CalendarStore, SqliteCalendarStore};
use crate::infrastructure::config::ConfigBundle;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::task_repository::SqliteTaskRepository;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_REVIEW_DAYS: u32 = 7;

type Tasks = TaskService<SqliteTaskRepository>;
type Blocks = FocusBlockService<SqliteCalendarStore, SqliteTaskRepository>;
type Reminders = RemindersImportService<SqliteCalendarStore, SqliteTaskRepository>;

pub struct AppState {
    configs: ConfigBundle,
    store: Arc<SqliteCalendarStore>,
    tasks: Arc<Tasks>,
    blocks: Blocks,
    reminders: Reminders,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        init_logging(&bootstrap.logs_dir, &bootstrap.configs.app.log_level)?;

        let configs = bootstrap.configs;
        let time_zone = configs.app.time_zone()?;
        let store = Arc::new(SqliteCalendarStore::new(&bootstrap.database_path));
        let tasks = Arc::new(
            TaskService::new(
                Arc::new(SqliteTaskRepository::new(&bootstrap.database_path)),
                time_zone,
                configs.settings.default_task_duration,
            )
            .with_undo_file(bootstrap.undo_path),
        );
        let blocks = FocusBlockService::new(
            Arc::clone(&store),
            Arc::clone(&tasks),
            configs.settings.planning.clone(),
        )
        .with_calendars(
            configs.app.calendar_name.clone(),
            configs.app.visible_calendar_ids.clone(),
        );
        let reminders = RemindersImportService::new(Arc::clone(&store), Arc::clone(&tasks))
            .with_visible_lists(configs.app.visible_reminder_list_ids.clone());

        info!(workspace = %workspace_root.display(), "workspace ready");
        Ok(Self {
            configs,
            store,
            tasks,
            blocks,
            reminders,
        })
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        info!(command = %command, "{message}");
    }

    pub fn log_error(&self, command: &str, message: &str) {
        error!(command = %command, "{message}");
    }
}

/// Raw task fields as typed on the command line.
#[derive(Debug, Clone, Default)]
pub struct TaskInput {
    pub title: String,
    pub importance: Option<String>,
    pub urgency: Option<String>,
    pub duration: Option<u32>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub due: Option<String>,
    pub description: Option<String>,
    pub recurrence: Option<String>,
    pub weekdays: Vec<u8>,
    pub month_day: Option<u8>,
}

/// A plain calendar event as typed on the command line.
#[derive(Debug, Clone, Default)]
pub struct EventInput {
    pub title: String,
    pub start_at: String,
    pub end_at: String,
    pub category: Option<String>,
    pub all_day: bool,
    pub calendar: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReminderInput {
    pub title: String,
    /// 0 = none, 1-9 as in reminder lists (1 highest)
    pub priority: Option<u8>,
    pub due: Option<String>,
    pub notes: Option<String>,
    pub list: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBlockResponse {
    pub block: FocusBlock,
    pub remaining_task_ids: Vec<String>,
    pub planned_task_ends: Vec<PlannedTaskEnd>,
    pub warning_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub start: String,
    pub end: String,
    pub completed_count: usize,
    pub category_minutes: BTreeMap<String, i64>,
    pub accuracy: PlanningAccuracyStats,
    pub accuracy_label: Option<String>,
}

pub fn create_task_impl(state: &AppState, input: TaskInput) -> Result<LocalTask, InfraError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(InfraError::InvalidConfig(
            "title must not be empty".to_string(),
        ));
    }
    let recurrence_pattern = match input.recurrence.as_deref() {
        Some(raw) => parse_enum_input(raw, "recurrence", RecurrencePattern::parse)?,
        None => RecurrencePattern::None,
    };
    if recurrence_pattern.requires_weekdays() && input.weekdays.is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "{} recurrence needs at least one weekday",
            recurrence_pattern.as_str()
        )));
    }
    if input.month_day.is_some() && !recurrence_pattern.requires_month_day() {
        return Err(InfraError::InvalidConfig(
            "month_day only applies to monthly recurrence".to_string(),
        ));
    }
    if let Some(day) = input.weekdays.iter().find(|day| !(1..=7).contains(*day)) {
        return Err(InfraError::InvalidConfig(format!(
            "weekday must be 1 (Monday) to 7 (Sunday), got {day}"
        )));
    }

    let task = state.tasks.create_task(NewTask {
        title: title.to_string(),
        importance: input
            .importance
            .as_deref()
            .map(|raw| parse_enum_input(raw, "importance", Importance::parse))
            .transpose()?,
        urgency: input
            .urgency
            .as_deref()
            .map(|raw| parse_enum_input(raw, "urgency", Urgency::parse))
            .transpose()?,
        estimated_duration: input.duration,
        category: input
            .category
            .as_deref()
            .map(|raw| parse_enum_input(raw, "category", TaskCategory::parse))
            .transpose()?,
        tags: input.tags,
        due_date: input
            .due
            .as_deref()
            .map(|raw| parse_datetime_input(raw, "due"))
            .transpose()?,
        description: input.description,
        recurrence_pattern,
        recurrence_weekdays: (!input.weekdays.is_empty()).then_some(input.weekdays),
        recurrence_month_day: input.month_day,
    })?;

    state.log_info("create_task", &format!("created task_id={}", task.id));
    Ok(task)
}

pub fn list_tasks_impl(
    state: &AppState,
    completed: bool,
    days: Option<u32>,
) -> Result<Vec<PlanItem>, InfraError> {
    if completed {
        state
            .tasks
            .list_completed(days.unwrap_or(DEFAULT_REVIEW_DAYS))
    } else {
        state.tasks.list_backlog()
    }
}

pub fn complete_task_impl(state: &AppState, task_id: String) -> Result<CompletionOutcome, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let outcome = state.tasks.complete_task(task_id)?;
    state.log_info("complete_task", &format!("completed task_id={task_id}"));
    Ok(outcome)
}

pub fn undo_completion_impl(state: &AppState) -> Result<Option<LocalTask>, InfraError> {
    let restored = state.tasks.undo_last_completion()?;
    if let Some(task) = &restored {
        state.log_info("undo_completion", &format!("restored task_id={}", task.id));
    }
    Ok(restored)
}

/// Without a task id this lists the Next Up queue.
pub fn next_up_impl(
    state: &AppState,
    task_id: Option<String>,
    remove: bool,
) -> Result<Vec<LocalTask>, InfraError> {
    if let Some(task_id) = task_id {
        let task_id = required_id(&task_id, "task_id")?;
        state.tasks.set_next_up(task_id, !remove)?;
    }
    state.tasks.list_next_up()
}

pub fn count_open_tasks_impl(state: &AppState) -> Result<usize, InfraError> {
    state.tasks.count_open_tasks()
}

pub async fn create_block_impl(
    state: &AppState,
    start_at: String,
    end_at: String,
) -> Result<FocusBlock, InfraError> {
    let start = parse_rfc3339_input(&start_at, "start_at")?;
    let end = parse_rfc3339_input(&end_at, "end_at")?;
    if end <= start {
        return Err(InfraError::InvalidConfig(
            "end_at must be after start_at".to_string(),
        ));
    }
    let block = state.blocks.create_block(start, end).await?;
    state.log_info("create_block", &format!("created block_id={}", block.id));
    Ok(block)
}

pub async fn list_blocks_impl(state: &AppState, date: Option<String>) -> Result<DayPlan, InfraError> {
    let date = resolve_date(state, date.as_deref())?;
    state.blocks.day_plan(date).await
}

pub async fn active_block_impl(state: &AppState) -> Result<Option<ActiveBlockResponse>, InfraError> {
    let Some(block) = state.blocks.active_block().await? else {
        return Ok(None);
    };
    let settings = &state.configs.settings;
    let warning_at = settings
        .warning_enabled
        .then(|| state.blocks.warning_instant(&block, settings.warning_timing));
    Ok(Some(ActiveBlockResponse {
        remaining_task_ids: block.remaining_task_ids(),
        planned_task_ends: state.blocks.planned_task_ends(&block),
        warning_at,
        block,
    }))
}

pub async fn assign_task_impl(
    state: &AppState,
    block_id: String,
    task_id: String,
    remove: bool,
) -> Result<FocusBlock, InfraError> {
    let block_id = required_id(&block_id, "block_id")?;
    let task_id = required_id(&task_id, "task_id")?;
    let block = if remove {
        state.blocks.remove_task(block_id, task_id).await?
    } else {
        state.blocks.assign_task(block_id, task_id).await?
    };
    state.log_info(
        "assign_task",
        &format!("block_id={block_id} task_id={task_id} remove={remove}"),
    );
    Ok(block)
}

pub async fn complete_block_task_impl(
    state: &AppState,
    block_id: String,
    task_id: String,
    started_at: Option<String>,
) -> Result<TaskActionResult, InfraError> {
    let block_id = required_id(&block_id, "block_id")?;
    let task_id = required_id(&task_id, "task_id")?;
    let started_at = started_at
        .as_deref()
        .map(|raw| parse_rfc3339_input(raw, "started_at"))
        .transpose()?;
    state.blocks.complete_task(block_id, task_id, started_at).await
}

pub async fn skip_block_task_impl(
    state: &AppState,
    block_id: String,
    task_id: String,
    started_at: Option<String>,
) -> Result<TaskActionResult, InfraError> {
    let block_id = required_id(&block_id, "block_id")?;
    let task_id = required_id(&task_id, "task_id")?;
    let started_at = started_at
        .as_deref()
        .map(|raw| parse_rfc3339_input(raw, "started_at"))
        .transpose()?;
    state.blocks.skip_task(block_id, task_id, started_at).await
}

pub async fn delete_block_impl(state: &AppState, block_id: String) -> Result<bool, InfraError> {
    let block_id = required_id(&block_id, "block_id")?;
    state.blocks.delete_block(block_id).await?;
    state.log_info("delete_block", &format!("deleted block_id={block_id}"));
    Ok(true)
}

pub async fn find_gaps_impl(state: &AppState, date: Option<String>) -> Result<Vec<TimeSlot>, InfraError> {
    let date = resolve_date(state, date.as_deref())?;
    state.blocks.free_slots(date).await
}

pub async fn review_impl(state: &AppState, days: Option<u32>) -> Result<ReviewResponse, InfraError> {
    let days = days.unwrap_or(DEFAULT_REVIEW_DAYS);
    if days == 0 {
        return Err(InfraError::InvalidConfig(
            "days must be greater than zero".to_string(),
        ));
    }
    let end = state.tasks.now();
    let start = end - Duration::days(i64::from(days));

    let completed = state.tasks.list_completed(days)?;
    let mut task_minutes = BTreeMap::new();
    for item in &completed {
        if let Some(category) = item.category {
            *task_minutes.entry(category.as_str().to_string()).or_insert(0) +=
                i64::from(item.effective_duration);
        }
    }
    let events = state.blocks.visible_events(start, end).await?;
    let category_minutes = review::category_minutes(task_minutes, &events);

    let blocks = state.store.fetch_focus_blocks(start, end).await?;
    let items = state
        .tasks
        .list_all()?
        .iter()
        .map(|task| state.tasks.plan_item(task))
        .collect::<Vec<_>>();
    let accuracy = review::planning_accuracy(&blocks, &items);
    let accuracy_label = accuracy
        .has_data()
        .then(|| accuracy.average_deviation_label());

    Ok(ReviewResponse {
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        completed_count: completed.len(),
        category_minutes,
        accuracy,
        accuracy_label,
    })
}

pub async fn import_reminders_impl(
    state: &AppState,
    mark_complete: bool,
) -> Result<ImportSummary, InfraError> {
    state.reminders.migrate_legacy_tasks()?;
    let summary = state.reminders.import_all(mark_complete).await?;
    state.log_info(
        "import_reminders",
        &format!(
            "imported={} skipped_duplicates={}",
            summary.imported.len(),
            summary.skipped_duplicates
        ),
    );
    Ok(summary)
}

pub async fn add_event_impl(state: &AppState, input: EventInput) -> Result<CalendarEvent, InfraError> {
    let title = required_id(&input.title, "title")?;
    let start = parse_rfc3339_input(&input.start_at, "start_at")?;
    let end = parse_rfc3339_input(&input.end_at, "end_at")?;
    if end <= start {
        return Err(InfraError::InvalidConfig(
            "end_at must be after start_at".to_string(),
        ));
    }

    let mut event = CalendarEvent::new(String::new(), title, start, end);
    if let Some(raw) = input.category.as_deref() {
        let category = parse_enum_input(raw, "category", TaskCategory::parse)?;
        event = event.with_notes(notes::encode_category_notes(category.as_str()));
    }
    if input.all_day {
        event = event.all_day();
    }
    if let Some(calendar) = normalize_input(input.calendar) {
        event = event.with_calendar(calendar);
    }

    let event_id = state.store.insert_event(event).await?;
    state.log_info("add_event", &format!("created event_id={event_id}"));
    state
        .store
        .fetch_event(&event_id)
        .await?
        .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))
}

pub async fn add_reminder_impl(
    state: &AppState,
    input: ReminderInput,
) -> Result<ReminderData, InfraError> {
    let title = required_id(&input.title, "title")?;
    let priority = input.priority.unwrap_or(0);
    if priority > 9 {
        return Err(InfraError::InvalidConfig(format!(
            "priority must be 0-9, got {priority}"
        )));
    }

    let mut reminder = ReminderData::new(String::new(), title);
    reminder.priority = priority;
    reminder.due_date = input
        .due
        .as_deref()
        .map(|raw| parse_datetime_input(raw, "due"))
        .transpose()?;
    reminder.notes = normalize_input(input.notes);
    reminder.list_id = normalize_input(input.list);

    reminder.id = state.store.create_reminder(reminder.clone()).await?;
    state.log_info("add_reminder", &format!("created reminder_id={}", reminder.id));
    Ok(reminder)
}

fn normalize_input(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required_id<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(value)
}

fn parse_enum_input<T>(
    value: &str,
    field_name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, InfraError> {
    parse(value).ok_or_else(|| {
        InfraError::InvalidConfig(format!("unsupported {field_name}: {}", value.trim()))
    })
}

fn resolve_date(state: &AppState, value: Option<&str>) -> Result<NaiveDate, InfraError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| InfraError::InvalidConfig("date must be YYYY-MM-DD".to_string())),
        None => Ok(state.blocks.today()),
    }
}

/// A bare `YYYY-MM-DD` is read as 00:00 UTC that day.
fn parse_datetime_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(InfraError::InvalidConfig(format!(
        "{field_name} must be RFC3339 or YYYY-MM-DD"
    )))
}

fn parse_rfc3339_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::InvalidConfig(format!(
                "{field_name} must be RFC3339 date-time: {error}"
            ))
        })
}
