use crate::domain::calendar::{CalendarEvent, FocusBlock};
use crate::domain::models::ReminderData;
use crate::domain::notes::{self, FocusBlockNotes};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{
    decode_focus_block_event, parse_optional_rfc3339_utc, parse_rfc3339_utc,
};
use crate::infrastructure::storage::open_connection;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Authorized,
    Denied,
    NotDetermined,
}

/// Calendar and reminder storage. Updates and deletes addressing an unknown
/// id succeed without doing anything.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn calendar_access(&self) -> AccessStatus;
    async fn request_calendar_access(&self) -> Result<bool, InfraError>;
    async fn reminders_access(&self) -> AccessStatus;
    async fn request_reminders_access(&self) -> Result<bool, InfraError>;

    /// Events overlapping `[start_at, end_at)`, ordered by start.
    async fn fetch_calendar_events(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError>;
    async fn fetch_event(&self, event_id: &str) -> Result<Option<CalendarEvent>, InfraError>;
    /// Stores the event under a new id and returns that id.
    async fn insert_event(&self, event: CalendarEvent) -> Result<String, InfraError>;
    async fn update_event_notes(&self, event_id: &str, notes: &str) -> Result<(), InfraError>;
    async fn move_calendar_event(
        &self,
        event_id: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<(), InfraError>;
    async fn delete_calendar_event(&self, event_id: &str) -> Result<(), InfraError>;

    async fn fetch_incomplete_reminders(&self) -> Result<Vec<ReminderData>, InfraError>;
    async fn create_reminder(&self, reminder: ReminderData) -> Result<String, InfraError>;
    async fn delete_reminder(&self, reminder_id: &str) -> Result<(), InfraError>;
    async fn set_reminder_completed(
        &self,
        reminder_id: &str,
        is_completed: bool,
    ) -> Result<(), InfraError>;

    async fn create_calendar_event(
        &self,
        title: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        reminder_id: Option<&str>,
    ) -> Result<String, InfraError> {
        let mut event = CalendarEvent::new(String::new(), title, start_at, end_at);
        event.notes = reminder_id.map(notes::encode_reminder_notes);
        self.insert_event(event).await
    }

    async fn fetch_focus_blocks(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Vec<FocusBlock>, InfraError> {
        let events = self.fetch_calendar_events(start_at, end_at).await?;
        let mut blocks = Vec::new();
        for event in &events {
            if let Some(block) = decode_focus_block_event(event)? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    async fn fetch_focus_block(&self, block_id: &str) -> Result<Option<FocusBlock>, InfraError> {
        match self.fetch_event(block_id).await? {
            Some(event) => decode_focus_block_event(&event),
            None => Ok(None),
        }
    }

    async fn create_focus_block(
        &self,
        title: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        calendar_id: Option<&str>,
    ) -> Result<String, InfraError> {
        if end_at <= start_at {
            return Err(InfraError::SaveFailed(
                "focus block end must be after its start".to_string(),
            ));
        }
        let mut event = CalendarEvent::new(String::new(), title, start_at, end_at)
            .with_notes(FocusBlockNotes::default().encode());
        event.calendar_id = calendar_id.map(str::to_string);
        self.insert_event(event).await
    }

    async fn update_focus_block(
        &self,
        block_id: &str,
        payload: &FocusBlockNotes,
    ) -> Result<(), InfraError> {
        self.update_event_notes(block_id, &payload.encode()).await
    }

    async fn update_focus_block_time(
        &self,
        block_id: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        if end_at <= start_at {
            return Err(InfraError::SaveFailed(
                "focus block end must be after its start".to_string(),
            ));
        }
        self.move_calendar_event(block_id, start_at, end_at).await
    }

    async fn delete_focus_block(&self, block_id: &str) -> Result<(), InfraError> {
        self.delete_calendar_event(block_id).await
    }

    async fn mark_reminder_complete(&self, reminder_id: &str) -> Result<(), InfraError> {
        self.set_reminder_completed(reminder_id, true).await
    }

    async fn mark_reminder_incomplete(&self, reminder_id: &str) -> Result<(), InfraError> {
        self.set_reminder_completed(reminder_id, false).await
    }
}

/// Fixed-width UTC text so range filters can compare stored values as strings.
fn sql_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn new_id(requested: &str) -> String {
    let requested = requested.trim();
    if requested.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        requested.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SqliteCalendarStore {
    db_path: PathBuf,
}

impl SqliteCalendarStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }
}

type EventRow = (
    String,
    String,
    String,
    String,
    bool,
    Option<String>,
    Option<String>,
    bool,
    Option<String>,
);
type ReminderRow = (String, String, bool, u8, Option<String>, Option<String>, Option<String>);

fn event_from_row(row: EventRow) -> Result<CalendarEvent, InfraError> {
    let (id, title, start_at, end_at, is_all_day, calendar_color, notes, has_attendees, calendar_id) =
        row;
    let mut event = CalendarEvent::new(
        id,
        title,
        parse_rfc3339_utc(&start_at, "calendar_events.start_at")?,
        parse_rfc3339_utc(&end_at, "calendar_events.end_at")?,
    )
    .with_attendees(has_attendees);
    event.is_all_day = is_all_day;
    event.calendar_color = calendar_color;
    event.notes = notes;
    event.calendar_id = calendar_id;
    Ok(event)
}

fn reminder_from_row(row: ReminderRow) -> Result<ReminderData, InfraError> {
    let (id, title, is_completed, priority, due_date, notes, list_id) = row;
    Ok(ReminderData {
        id,
        title,
        is_completed,
        priority,
        due_date: parse_optional_rfc3339_utc(due_date, "reminders.due_date")?,
        notes,
        list_id,
    })
}

#[async_trait]
impl CalendarStore for SqliteCalendarStore {
    async fn calendar_access(&self) -> AccessStatus {
        AccessStatus::Authorized
    }

    async fn request_calendar_access(&self) -> Result<bool, InfraError> {
        Ok(true)
    }

    async fn reminders_access(&self) -> AccessStatus {
        AccessStatus::Authorized
    }

    async fn request_reminders_access(&self) -> Result<bool, InfraError> {
        Ok(true)
    }

    async fn fetch_calendar_events(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let connection = open_connection(&self.db_path)?;
        let mut statement = connection.prepare(
            "SELECT id, title, start_at, end_at, is_all_day, calendar_color, notes, has_attendees,
                    calendar_id
             FROM calendar_events
             WHERE start_at < ?2 AND end_at > ?1
             ORDER BY start_at ASC, id ASC",
        )?;
        let rows = statement
            .query_map(params![sql_timestamp(start_at), sql_timestamp(end_at)], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .collect::<Result<Vec<EventRow>, _>>()?;
        rows.into_iter().map(event_from_row).collect()
    }

    async fn fetch_event(&self, event_id: &str) -> Result<Option<CalendarEvent>, InfraError> {
        let connection = open_connection(&self.db_path)?;
        let row: Option<EventRow> = connection
            .query_row(
                "SELECT id, title, start_at, end_at, is_all_day, calendar_color, notes, has_attendees,
                    calendar_id
                 FROM calendar_events WHERE id = ?1",
                params![event_id.trim()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                },
            )
            .optional()?;
        row.map(event_from_row).transpose()
    }

    async fn insert_event(&self, event: CalendarEvent) -> Result<String, InfraError> {
        let event_id = new_id(&event.id);
        let connection = open_connection(&self.db_path)?;
        connection.execute(
            "INSERT INTO calendar_events
               (id, title, start_at, end_at, is_all_day, calendar_color, notes, has_attendees,
                calendar_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event_id,
                event.title,
                sql_timestamp(event.start_at),
                sql_timestamp(event.end_at),
                event.is_all_day,
                event.calendar_color,
                event.notes,
                event.has_attendees,
                event.calendar_id,
            ],
        )?;
        Ok(event_id)
    }

    async fn update_event_notes(&self, event_id: &str, notes: &str) -> Result<(), InfraError> {
        let connection = open_connection(&self.db_path)?;
        connection.execute(
            "UPDATE calendar_events SET notes = ?2 WHERE id = ?1",
            params![event_id.trim(), notes],
        )?;
        Ok(())
    }

    async fn move_calendar_event(
        &self,
        event_id: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let connection = open_connection(&self.db_path)?;
        connection.execute(
            "UPDATE calendar_events SET start_at = ?2, end_at = ?3 WHERE id = ?1",
            params![event_id.trim(), sql_timestamp(start_at), sql_timestamp(end_at)],
        )?;
        Ok(())
    }

    async fn delete_calendar_event(&self, event_id: &str) -> Result<(), InfraError> {
        let connection = open_connection(&self.db_path)?;
        connection.execute(
            "DELETE FROM calendar_events WHERE id = ?1",
            params![event_id.trim()],
        )?;
        Ok(())
    }

    async fn fetch_incomplete_reminders(&self) -> Result<Vec<ReminderData>, InfraError> {
        let connection = open_connection(&self.db_path)?;
        let mut statement = connection.prepare(
            "SELECT id, title, is_completed, priority, due_date, notes, list_id
             FROM reminders
             WHERE is_completed = 0
             ORDER BY rowid ASC",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<Result<Vec<ReminderRow>, _>>()?;
        rows.into_iter().map(reminder_from_row).collect()
    }

    async fn create_reminder(&self, reminder: ReminderData) -> Result<String, InfraError> {
        let reminder_id = new_id(&reminder.id);
        let connection = open_connection(&self.db_path)?;
        let existing: Option<String> = connection
            .query_row(
                "SELECT id FROM reminders WHERE id = ?1",
                params![reminder_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(InfraError::SaveFailed(format!(
                "reminder {reminder_id} already exists"
            )));
        }
        connection.execute(
            "INSERT INTO reminders (id, title, is_completed, priority, due_date, notes, list_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reminder_id,
                reminder.title,
                reminder.is_completed,
                reminder.priority,
                reminder.due_date.map(sql_timestamp),
                reminder.notes,
                reminder.list_id,
            ],
        )?;
        Ok(reminder_id)
    }

    async fn delete_reminder(&self, reminder_id: &str) -> Result<(), InfraError> {
        let connection = open_connection(&self.db_path)?;
        connection.execute("DELETE FROM reminders WHERE id = ?1", params![reminder_id.trim()])?;
        Ok(())
    }

    async fn set_reminder_completed(
        &self,
        reminder_id: &str,
        is_completed: bool,
    ) -> Result<(), InfraError> {
        let connection = open_connection(&self.db_path)?;
        connection.execute(
            "UPDATE reminders SET is_completed = ?2 WHERE id = ?1",
            params![reminder_id.trim(), is_completed],
        )?;
        Ok(())
    }
}

/// Test double with switchable permissions and failure injection.
#[derive(Debug)]
pub struct InMemoryCalendarStore {
    calendar_access: Mutex<AccessStatus>,
    reminders_access: Mutex<AccessStatus>,
    grant_on_request: bool,
    fail_reminder_updates: bool,
    events: Mutex<HashMap<String, CalendarEvent>>,
    reminders: Mutex<Vec<ReminderData>>,
}

impl Default for InMemoryCalendarStore {
    fn default() -> Self {
        Self {
            calendar_access: Mutex::new(AccessStatus::Authorized),
            reminders_access: Mutex::new(AccessStatus::Authorized),
            grant_on_request: true,
            fail_reminder_updates: false,
            events: Mutex::new(HashMap::new()),
            reminders: Mutex::new(Vec::new()),
        }
    }
}

impl InMemoryCalendarStore {
    pub fn with_access(calendar: AccessStatus, reminders: AccessStatus, grant_on_request: bool) -> Self {
        Self {
            calendar_access: Mutex::new(calendar),
            reminders_access: Mutex::new(reminders),
            grant_on_request,
            ..Self::default()
        }
    }

    pub fn with_failing_reminder_updates(mut self) -> Self {
        self.fail_reminder_updates = true;
        self
    }

    pub fn reminder(&self, reminder_id: &str) -> Result<Option<ReminderData>, InfraError> {
        Ok(lock(&self.reminders, "reminders")?
            .iter()
            .find(|reminder| reminder.id == reminder_id)
            .cloned())
    }

    pub fn event(&self, event_id: &str) -> Result<Option<CalendarEvent>, InfraError> {
        Ok(lock(&self.events, "calendar events")?.get(event_id).cloned())
    }

    fn ensure_calendar_access(&self) -> Result<(), InfraError> {
        match *lock(&self.calendar_access, "calendar access")? {
            AccessStatus::Authorized => Ok(()),
            _ => Err(InfraError::NotAuthorized),
        }
    }

    fn ensure_reminders_access(&self) -> Result<(), InfraError> {
        match *lock(&self.reminders_access, "reminders access")? {
            AccessStatus::Authorized => Ok(()),
            _ => Err(InfraError::NotAuthorized),
        }
    }

    fn request(&self, status: &Mutex<AccessStatus>, name: &str) -> Result<bool, InfraError> {
        let mut status = lock(status, name)?;
        if *status == AccessStatus::NotDetermined {
            *status = if self.grant_on_request {
                AccessStatus::Authorized
            } else {
                AccessStatus::Denied
            };
        }
        Ok(*status == AccessStatus::Authorized)
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, InfraError> {
    mutex
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("{name} lock poisoned: {error}")))
}

#[async_trait]
impl CalendarStore for InMemoryCalendarStore {
    async fn calendar_access(&self) -> AccessStatus {
        lock(&self.calendar_access, "calendar access")
            .map(|status| *status)
            .unwrap_or(AccessStatus::Denied)
    }

    async fn request_calendar_access(&self) -> Result<bool, InfraError> {
        self.request(&self.calendar_access, "calendar access")
    }

    async fn reminders_access(&self) -> AccessStatus {
        lock(&self.reminders_access, "reminders access")
            .map(|status| *status)
            .unwrap_or(AccessStatus::Denied)
    }

    async fn request_reminders_access(&self) -> Result<bool, InfraError> {
        self.request(&self.reminders_access, "reminders access")
    }

    async fn fetch_calendar_events(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        self.ensure_calendar_access()?;
        let events = lock(&self.events, "calendar events")?;
        let mut matching = events
            .values()
            .filter(|event| event.start_at < end_at && event.end_at > start_at)
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|left, right| {
            left.start_at
                .cmp(&right.start_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(matching)
    }

    async fn fetch_event(&self, event_id: &str) -> Result<Option<CalendarEvent>, InfraError> {
        self.ensure_calendar_access()?;
        self.event(event_id.trim())
    }

    async fn insert_event(&self, mut event: CalendarEvent) -> Result<String, InfraError> {
        self.ensure_calendar_access()?;
        event.id = new_id(&event.id);
        let event_id = event.id.clone();
        let mut events = lock(&self.events, "calendar events")?;
        if events.contains_key(&event_id) {
            return Err(InfraError::SaveFailed(format!("event {event_id} already exists")));
        }
        events.insert(event_id.clone(), event);
        Ok(event_id)
    }

    async fn update_event_notes(&self, event_id: &str, notes: &str) -> Result<(), InfraError> {
        self.ensure_calendar_access()?;
        if let Some(event) = lock(&self.events, "calendar events")?.get_mut(event_id.trim()) {
            event.notes = Some(notes.to_string());
        }
        Ok(())
    }

    async fn move_calendar_event(
        &self,
        event_id: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        self.ensure_calendar_access()?;
        if let Some(event) = lock(&self.events, "calendar events")?.get_mut(event_id.trim()) {
            event.start_at = start_at;
            event.end_at = end_at;
        }
        Ok(())
    }

    async fn delete_calendar_event(&self, event_id: &str) -> Result<(), InfraError> {
        self.ensure_calendar_access()?;
        lock(&self.events, "calendar events")?.remove(event_id.trim());
        Ok(())
    }

    async fn fetch_incomplete_reminders(&self) -> Result<Vec<ReminderData>, InfraError> {
        self.ensure_reminders_access()?;
        Ok(lock(&self.reminders, "reminders")?
            .iter()
            .filter(|reminder| !reminder.is_completed)
            .cloned()
            .collect())
    }

    async fn create_reminder(&self, mut reminder: ReminderData) -> Result<String, InfraError> {
        self.ensure_reminders_access()?;
        reminder.id = new_id(&reminder.id);
        let reminder_id = reminder.id.clone();
        let mut reminders = lock(&self.reminders, "reminders")?;
        if reminders.iter().any(|existing| existing.id == reminder_id) {
            return Err(InfraError::SaveFailed(format!(
                "reminder {reminder_id} already exists"
            )));
        }
        reminders.push(reminder);
        Ok(reminder_id)
    }

    async fn delete_reminder(&self, reminder_id: &str) -> Result<(), InfraError> {
        self.ensure_reminders_access()?;
        lock(&self.reminders, "reminders")?.retain(|reminder| reminder.id != reminder_id.trim());
        Ok(())
    }

    async fn set_reminder_completed(
        &self,
        reminder_id: &str,
        is_completed: bool,
    ) -> Result<(), InfraError> {
        self.ensure_reminders_access()?;
        if self.fail_reminder_updates {
            return Err(InfraError::SaveFailed(format!(
                "could not update reminder {reminder_id}"
            )));
        }
        let mut reminders = lock(&self.reminders, "reminders")?;
        if let Some(reminder) = reminders
            .iter_mut()
            .find(|reminder| reminder.id == reminder_id.trim())
        {
            reminder.is_completed = is_completed;
        }
        Ok(())
    }
}
