use crate::application::task_service::{NowProvider, TaskService};
use crate::domain::calendar::{CalendarEvent, FocusBlock};
use crate::domain::gap_finder::{GapFinder, TimeSlot};
use crate::domain::timer::{self, WarningTiming};
use crate::infrastructure::calendar_store::CalendarStore;
use crate::infrastructure::config::PlanningSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::focus_block_title;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskActionResult {
    Completed,
    Skipped,
    /// The skipped task was the last one left, so the block is finished.
    SkippedLast,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub events: Vec<CalendarEvent>,
    pub blocks: Vec<FocusBlock>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlannedTaskEnd {
    pub task_id: String,
    pub duration_minutes: u32,
    pub planned_end: DateTime<Utc>,
}

pub struct FocusBlockService<C, R>
where
    C: CalendarStore,
    R: TaskRepository,
{
    store: Arc<C>,
    tasks: Arc<TaskService<R>>,
    planning: PlanningSettings,
    target_calendar: Option<String>,
    visible_calendar_ids: Option<Vec<String>>,
    now_provider: NowProvider,
}

impl<C, R> FocusBlockService<C, R>
where
    C: CalendarStore,
    R: TaskRepository,
{
    pub fn new(store: Arc<C>, tasks: Arc<TaskService<R>>, planning: PlanningSettings) -> Self {
        Self {
            store,
            tasks,
            planning,
            target_calendar: None,
            visible_calendar_ids: None,
            now_provider: Arc::new(Utc::now),
        }
    }

    /// New blocks go to `target`; regular events outside `visible` are
    /// ignored (`None` shows every calendar).
    pub fn with_calendars(mut self, target: impl Into<String>, visible: Option<Vec<String>>) -> Self {
        self.target_calendar = Some(target.into());
        self.visible_calendar_ids = visible;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    /// Local midnight to midnight of `date` in the configured zone.
    pub fn day_range(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), InfraError> {
        let time_zone = self.tasks.time_zone();
        let local_midnight = |date: NaiveDate| {
            date.and_hms_opt(0, 0, 0)
                .and_then(|naive| time_zone.from_local_datetime(&naive).earliest())
                .map(|value| value.with_timezone(&Utc))
                .ok_or_else(|| InfraError::InvalidConfig(format!("no local midnight for {date}")))
        };
        let next_day = date
            .succ_opt()
            .ok_or_else(|| InfraError::InvalidConfig(format!("date out of range: {date}")))?;
        Ok((local_midnight(date)?, local_midnight(next_day)?))
    }

    pub fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.tasks.time_zone()).date_naive()
    }

    /// Regular events from visible calendars overlapping the range, ordered by start.
    pub async fn visible_events(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let visible = self.visible_calendar_ids.as_deref();
        Ok(self
            .store
            .fetch_calendar_events(start_at, end_at)
            .await?
            .into_iter()
            .filter(|event| !event.is_focus_block() && event.is_in_visible_calendar(visible))
            .collect())
    }

    /// Regular events and focus blocks of one day, each ordered by start.
    pub async fn day_plan(&self, date: NaiveDate) -> Result<DayPlan, InfraError> {
        let (start_at, end_at) = self.day_range(date)?;
        let events = self.visible_events(start_at, end_at).await?;
        let blocks = self.store.fetch_focus_blocks(start_at, end_at).await?;
        Ok(DayPlan {
            date,
            events,
            blocks,
        })
    }

    pub async fn create_block(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<FocusBlock, InfraError> {
        let title = focus_block_title(start_at, self.tasks.time_zone());
        let block_id = self
            .store
            .create_focus_block(&title, start_at, end_at, self.target_calendar.as_deref())
            .await?;
        info!(block_id = %block_id, start_at = %start_at, end_at = %end_at, "focus block created");
        self.get_block(&block_id).await
    }

    pub async fn get_block(&self, block_id: &str) -> Result<FocusBlock, InfraError> {
        self.store
            .fetch_focus_block(block_id)
            .await?
            .ok_or_else(|| InfraError::NotFound(format!("focus block {block_id}")))
    }

    /// Removes the block and detaches the tasks that were assigned to it.
    pub async fn delete_block(&self, block_id: &str) -> Result<(), InfraError> {
        self.store.delete_focus_block(block_id).await?;
        let cleared = self.tasks.clear_block_assignments(block_id)?;
        info!(block_id = %block_id, cleared_tasks = cleared, "focus block deleted");
        Ok(())
    }

    pub async fn update_block_time(
        &self,
        block_id: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        self.store
            .update_focus_block_time(block_id, start_at, end_at)
            .await
    }

    pub async fn assign_task(&self, block_id: &str, task_id: &str) -> Result<FocusBlock, InfraError> {
        let mut block = self.get_block(block_id).await?;
        self.tasks.get_task(task_id)?;
        if !block.task_ids.iter().any(|id| id == task_id) {
            block.task_ids.push(task_id.to_string());
            self.store.update_focus_block(block_id, &block.notes()).await?;
        }
        self.tasks
            .assign_focus_block(task_id, Some(block_id.to_string()))?;
        Ok(block)
    }

    pub async fn remove_task(&self, block_id: &str, task_id: &str) -> Result<FocusBlock, InfraError> {
        let mut block = self.get_block(block_id).await?;
        block.task_ids.retain(|id| id != task_id);
        block.completed_task_ids.retain(|id| id != task_id);
        block.task_times.remove(task_id);
        self.store.update_focus_block(block_id, &block.notes()).await?;

        match self.tasks.assign_focus_block(task_id, None) {
            Ok(_) | Err(InfraError::NotFound(_)) => Ok(block),
            Err(error) => Err(error),
        }
    }

    /// Marks the task done inside the block, books the time spent since
    /// `task_started_at`, then completes the local task (spawning recurrences).
    pub async fn complete_task(
        &self,
        block_id: &str,
        task_id: &str,
        task_started_at: Option<DateTime<Utc>>,
    ) -> Result<TaskActionResult, InfraError> {
        let mut block = self.get_block(block_id).await?;
        self.book_elapsed_time(&mut block, task_id, task_started_at);
        if !block.is_completed(task_id) {
            block.completed_task_ids.push(task_id.to_string());
        }
        self.store.update_focus_block(block_id, &block.notes()).await?;

        match self.tasks.get_task(task_id) {
            Ok(task) if task.is_completed => {}
            Ok(_) => {
                self.tasks.complete_task(task_id)?;
            }
            Err(InfraError::NotFound(_)) => {
                warn!(block_id = %block_id, task_id = %task_id, "completed task has no local record");
            }
            Err(error) => return Err(error),
        }
        info!(block_id = %block_id, task_id = %task_id, "task completed in focus block");
        Ok(TaskActionResult::Completed)
    }

    /// Moves the task to the back of the queue. When it is the only task
    /// left it is marked done in the block instead.
    pub async fn skip_task(
        &self,
        block_id: &str,
        task_id: &str,
        task_started_at: Option<DateTime<Utc>>,
    ) -> Result<TaskActionResult, InfraError> {
        let mut block = self.get_block(block_id).await?;
        self.book_elapsed_time(&mut block, task_id, task_started_at);

        let remaining = block.remaining_task_ids();
        let result = if remaining.len() == 1 && remaining[0] == task_id {
            block.completed_task_ids.push(task_id.to_string());
            TaskActionResult::SkippedLast
        } else {
            if let Some(position) = block.task_ids.iter().position(|id| id == task_id) {
                let skipped = block.task_ids.remove(position);
                block.task_ids.push(skipped);
            }
            TaskActionResult::Skipped
        };
        self.store.update_focus_block(block_id, &block.notes()).await?;
        info!(block_id = %block_id, task_id = %task_id, result = ?result, "task skipped in focus block");
        Ok(result)
    }

    pub async fn free_slots(&self, date: NaiveDate) -> Result<Vec<TimeSlot>, InfraError> {
        let plan = self.day_plan(date).await?;
        let finder = GapFinder::new(date, self.tasks.time_zone(), self.now())
            .with_day_window(self.planning.day_start_hour, self.planning.day_end_hour);
        Ok(finder.find_free_slots(
            &plan.events,
            &plan.blocks,
            self.planning.min_slot_minutes,
            self.planning.max_slot_minutes,
        ))
    }

    pub async fn active_block(&self) -> Result<Option<FocusBlock>, InfraError> {
        let now = self.now();
        let blocks = self
            .store
            .fetch_focus_blocks(now - Duration::days(1), now + Duration::days(1))
            .await?;
        Ok(blocks.into_iter().find(|block| block.is_active(now)))
    }

    /// Planned end for every task in queue order, from the tasks' effective durations.
    pub fn planned_task_ends(&self, block: &FocusBlock) -> Vec<PlannedTaskEnd> {
        let durations = block
            .task_ids
            .iter()
            .map(|task_id| {
                let minutes = match self.tasks.get_task(task_id) {
                    Ok(task) => task.effective_duration(self.tasks.default_duration()).0,
                    Err(_) => self.tasks.default_duration(),
                };
                (task_id.clone(), minutes)
            })
            .collect::<Vec<_>>();
        durations
            .iter()
            .map(|(task_id, minutes)| PlannedTaskEnd {
                task_id: task_id.clone(),
                duration_minutes: *minutes,
                planned_end: timer::planned_task_end(
                    block.start_at,
                    block.end_at,
                    &durations,
                    task_id,
                ),
            })
            .collect()
    }

    pub fn warning_instant(&self, block: &FocusBlock, timing: WarningTiming) -> DateTime<Utc> {
        timer::warning_instant(block.start_at, block.end_at, timing)
    }

    fn book_elapsed_time(
        &self,
        block: &mut FocusBlock,
        task_id: &str,
        task_started_at: Option<DateTime<Utc>>,
    ) {
        let Some(started_at) = task_started_at else {
            return;
        };
        let elapsed = (self.now() - started_at).num_seconds();
        if elapsed <= 0 {
            return;
        }
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        let total = block.task_times.entry(task_id.to_string()).or_insert(0);
        *total = total.saturating_add(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::task_service::NewTask;
    use crate::domain::models::RecurrencePattern;
    use crate::infrastructure::calendar_store::InMemoryCalendarStore;
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use chrono_tz::Tz;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    struct Fixture {
        store: Arc<InMemoryCalendarStore>,
        tasks: Arc<TaskService<InMemoryTaskRepository>>,
        service: FocusBlockService<InMemoryCalendarStore, InMemoryTaskRepository>,
    }

    fn fixture(now: &str) -> Fixture {
        let now = fixed_time(now);
        let store = Arc::new(InMemoryCalendarStore::default());
        let tasks = Arc::new(
            TaskService::new(Arc::new(InMemoryTaskRepository::default()), Tz::UTC, 15)
                .with_now_provider(Arc::new(move || now)),
        );
        let service = FocusBlockService::new(
            Arc::clone(&store),
            Arc::clone(&tasks),
            PlanningSettings::default(),
        )
        .with_now_provider(Arc::new(move || now));
        Fixture {
            store,
            tasks,
            service,
        }
    }

    fn task_with_duration(tasks: &TaskService<InMemoryTaskRepository>, title: &str, minutes: u32) -> String {
        tasks
            .create_task(NewTask {
                title: title.to_string(),
                estimated_duration: Some(minutes),
                ..NewTask::default()
            })
            .expect("create task")
            .id
    }

    #[tokio::test]
    async fn create_block_uses_time_based_title_and_empty_payload() {
        let fixture = fixture("2026-02-16T08:00:00Z");
        let block = fixture
            .service
            .create_block(fixed_time("2026-02-16T09:30:00Z"), fixed_time("2026-02-16T10:30:00Z"))
            .await
            .expect("create block");
        assert_eq!(block.title, "Focus Block 09:30");
        assert!(block.task_ids.is_empty());
        let event = fixture.store.event(&block.id).expect("lookup").expect("event");
        assert_eq!(event.notes.as_deref(), Some("focusBlock:true"));
    }

    #[tokio::test]
    async fn complete_books_time_and_completes_local_task() {
        let fixture = fixture("2026-02-16T09:25:00Z");
        let task_id = fixture
            .tasks
            .create_task(NewTask {
                title: "Daily plan".to_string(),
                recurrence_pattern: RecurrencePattern::Daily,
                ..NewTask::default()
            })
            .expect("create")
            .id;
        let block = fixture
            .service
            .create_block(fixed_time("2026-02-16T09:00:00Z"), fixed_time("2026-02-16T10:00:00Z"))
            .await
            .expect("create block");
        fixture.service.assign_task(&block.id, &task_id).await.expect("assign");

        let result = fixture
            .service
            .complete_task(&block.id, &task_id, Some(fixed_time("2026-02-16T09:05:00Z")))
            .await
            .expect("complete");
        assert_eq!(result, TaskActionResult::Completed);

        let stored = fixture.service.get_block(&block.id).await.expect("block");
        assert_eq!(stored.completed_task_ids, vec![task_id.clone()]);
        assert_eq!(stored.task_times.get(&task_id), Some(&1200));

        let task = fixture.tasks.get_task(&task_id).expect("task");
        assert!(task.is_completed);
        assert!(task.assigned_focus_block_id.is_none());
        assert_eq!(fixture.tasks.count_open_tasks().expect("count"), 1);

        // Completing twice keeps a single completion entry and spawns no extra instance.
        fixture
            .service
            .complete_task(&block.id, &task_id, None)
            .await
            .expect("complete again");
        let stored = fixture.service.get_block(&block.id).await.expect("block");
        assert_eq!(stored.completed_task_ids.len(), 1);
        assert_eq!(fixture.tasks.count_open_tasks().expect("count"), 1);
    }

    #[tokio::test]
    async fn skip_rotates_queue_until_last_task() {
        let fixture = fixture("2026-02-16T09:10:00Z");
        let first = task_with_duration(&fixture.tasks, "First", 20);
        let second = task_with_duration(&fixture.tasks, "Second", 20);
        let block = fixture
            .service
            .create_block(fixed_time("2026-02-16T09:00:00Z"), fixed_time("2026-02-16T10:00:00Z"))
            .await
            .expect("create block");
        fixture.service.assign_task(&block.id, &first).await.expect("assign");
        fixture.service.assign_task(&block.id, &second).await.expect("assign");

        let result = fixture
            .service
            .skip_task(&block.id, &first, Some(fixed_time("2026-02-16T09:00:00Z")))
            .await
            .expect("skip");
        assert_eq!(result, TaskActionResult::Skipped);
        let stored = fixture.service.get_block(&block.id).await.expect("block");
        assert_eq!(stored.task_ids, vec![second.clone(), first.clone()]);
        assert_eq!(stored.task_times.get(&first), Some(&600));

        fixture
            .service
            .complete_task(&block.id, &second, None)
            .await
            .expect("complete");
        let result = fixture
            .service
            .skip_task(&block.id, &first, None)
            .await
            .expect("skip last");
        assert_eq!(result, TaskActionResult::SkippedLast);
        let stored = fixture.service.get_block(&block.id).await.expect("block");
        assert!(stored.remaining_task_ids().is_empty());
    }

    #[tokio::test]
    async fn delete_block_detaches_assigned_tasks() {
        let fixture = fixture("2026-02-16T08:00:00Z");
        let task_id = task_with_duration(&fixture.tasks, "Assigned", 25);
        let block = fixture
            .service
            .create_block(fixed_time("2026-02-16T09:00:00Z"), fixed_time("2026-02-16T10:00:00Z"))
            .await
            .expect("create block");
        fixture.service.assign_task(&block.id, &task_id).await.expect("assign");
        assert_eq!(
            fixture.tasks.get_task(&task_id).expect("task").assigned_focus_block_id,
            Some(block.id.clone())
        );

        fixture.service.delete_block(&block.id).await.expect("delete");
        assert!(fixture.tasks.get_task(&task_id).expect("task").assigned_focus_block_id.is_none());
        assert!(matches!(
            fixture.service.get_block(&block.id).await,
            Err(InfraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_task_clears_block_payload() {
        let fixture = fixture("2026-02-16T09:20:00Z");
        let task_id = task_with_duration(&fixture.tasks, "Assigned", 25);
        let block = fixture
            .service
            .create_block(fixed_time("2026-02-16T09:00:00Z"), fixed_time("2026-02-16T10:00:00Z"))
            .await
            .expect("create block");
        fixture.service.assign_task(&block.id, &task_id).await.expect("assign");
        fixture
            .service
            .skip_task(&block.id, &task_id, Some(fixed_time("2026-02-16T09:00:00Z")))
            .await
            .expect("skip");

        let updated = fixture.service.remove_task(&block.id, &task_id).await.expect("remove");
        assert!(updated.task_ids.is_empty());
        assert!(updated.completed_task_ids.is_empty());
        assert!(updated.task_times.is_empty());
        assert!(fixture.tasks.get_task(&task_id).expect("task").assigned_focus_block_id.is_none());
    }

    #[tokio::test]
    async fn day_plan_separates_blocks_and_free_slots_avoid_them() {
        let fixture = fixture("2026-02-15T12:00:00Z");
        fixture
            .store
            .create_calendar_event(
                "Offsite",
                fixed_time("2026-02-16T06:00:00Z"),
                fixed_time("2026-02-16T12:00:00Z"),
                None,
            )
            .await
            .expect("event");
        fixture
            .service
            .create_block(fixed_time("2026-02-16T12:00:00Z"), fixed_time("2026-02-16T21:00:00Z"))
            .await
            .expect("block");

        let date = NaiveDate::from_ymd_opt(2026, 2, 16).expect("date");
        let plan = fixture.service.day_plan(date).await.expect("plan");
        assert_eq!(plan.events.len(), 1);
        assert_eq!(plan.blocks.len(), 1);

        let slots = fixture.service.free_slots(date).await.expect("slots");
        assert_eq!(
            slots,
            vec![TimeSlot::new(
                fixed_time("2026-02-16T21:00:00Z"),
                fixed_time("2026-02-16T22:00:00Z")
            )]
        );
    }

    #[tokio::test]
    async fn hidden_calendars_are_ignored_and_blocks_use_target_calendar() {
        let fixture = fixture("2026-02-15T12:00:00Z");
        let now = fixed_time("2026-02-15T12:00:00Z");
        let service = FocusBlockService::new(
            Arc::clone(&fixture.store),
            Arc::clone(&fixture.tasks),
            PlanningSettings::default(),
        )
        .with_calendars("Focus Blocks", Some(vec!["work".to_string()]))
        .with_now_provider(Arc::new(move || now));
        for (title, start, end, calendar) in [
            ("Standup", "2026-02-16T09:00:00Z", "2026-02-16T10:00:00Z", "work"),
            ("Gym", "2026-02-16T06:00:00Z", "2026-02-16T22:00:00Z", "private"),
        ] {
            fixture
                .store
                .insert_event(
                    CalendarEvent::new("", title, fixed_time(start), fixed_time(end))
                        .with_calendar(calendar),
                )
                .await
                .expect("event");
        }
        let block = service
            .create_block(fixed_time("2026-02-16T10:00:00Z"), fixed_time("2026-02-16T11:00:00Z"))
            .await
            .expect("block");
        let event = fixture.store.event(&block.id).expect("lookup").expect("event");
        assert_eq!(event.calendar_id.as_deref(), Some("Focus Blocks"));

        let date = NaiveDate::from_ymd_opt(2026, 2, 16).expect("date");
        let plan = service.day_plan(date).await.expect("plan");
        assert_eq!(
            plan.events.iter().map(|event| event.title.as_str()).collect::<Vec<_>>(),
            vec!["Standup"]
        );
        assert_eq!(plan.blocks.len(), 1);
        assert_eq!(fixture.service.day_plan(date).await.expect("plan").events.len(), 2);

        let slots = service.free_slots(date).await.expect("slots");
        assert_eq!(
            slots,
            vec![
                TimeSlot::new(fixed_time("2026-02-16T06:00:00Z"), fixed_time("2026-02-16T07:00:00Z")),
                TimeSlot::new(fixed_time("2026-02-16T11:00:00Z"), fixed_time("2026-02-16T12:00:00Z")),
            ]
        );
    }

    #[tokio::test]
    async fn active_block_and_planned_ends() {
        let fixture = fixture("2026-02-16T09:30:00Z");
        let first = task_with_duration(&fixture.tasks, "First", 20);
        let second = task_with_duration(&fixture.tasks, "Second #30min", 50);
        let untimed = fixture.tasks.quick_capture("Third #45min").expect("create").id;
        let block = fixture
            .service
            .create_block(fixed_time("2026-02-16T09:00:00Z"), fixed_time("2026-02-16T10:00:00Z"))
            .await
            .expect("create block");
        for task_id in [&first, &second, &untimed] {
            fixture.service.assign_task(&block.id, task_id).await.expect("assign");
        }

        let active = fixture
            .service
            .active_block()
            .await
            .expect("active")
            .expect("a block is running");
        assert_eq!(active.id, block.id);

        let ends = fixture.service.planned_task_ends(&active);
        assert_eq!(
            ends.iter().map(|end| (end.duration_minutes, end.planned_end)).collect::<Vec<_>>(),
            vec![
                (20, fixed_time("2026-02-16T09:20:00Z")),
                (50, fixed_time("2026-02-16T10:00:00Z")),
                (45, fixed_time("2026-02-16T10:00:00Z")),
            ]
        );
        assert_eq!(
            fixture.service.warning_instant(&active, WarningTiming::Standard),
            fixed_time("2026-02-16T09:48:00Z")
        );
    }

    #[tokio::test]
    async fn moving_a_block_keeps_its_payload() {
        let fixture = fixture("2026-02-16T08:00:00Z");
        let task_id = task_with_duration(&fixture.tasks, "Movable", 30);
        let block = fixture
            .service
            .create_block(fixed_time("2026-02-16T09:00:00Z"), fixed_time("2026-02-16T10:00:00Z"))
            .await
            .expect("create block");
        fixture.service.assign_task(&block.id, &task_id).await.expect("assign");

        fixture
            .service
            .update_block_time(&block.id, fixed_time("2026-02-16T14:00:00Z"), fixed_time("2026-02-16T15:30:00Z"))
            .await
            .expect("move");
        let moved = fixture.service.get_block(&block.id).await.expect("block");
        assert_eq!(moved.start_at, fixed_time("2026-02-16T14:00:00Z"));
        assert_eq!(moved.duration_minutes(), 90);
        assert_eq!(moved.task_ids, vec![task_id]);

        assert!(fixture
            .service
            .update_block_time(&block.id, fixed_time("2026-02-16T15:00:00Z"), fixed_time("2026-02-16T15:00:00Z"))
            .await
            .is_err());
    }
}
