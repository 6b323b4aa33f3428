use crate::domain::notes::{self, FocusBlockNotes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-through projection of an event held by the calendar store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_all_day: bool,
    pub calendar_color: Option<String>,
    pub notes: Option<String>,
    pub has_attendees: bool,
    pub is_read_only: bool,
    #[serde(default)]
    pub calendar_id: Option<String>,
}

impl CalendarEvent {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start_at,
            end_at,
            is_all_day: false,
            calendar_color: None,
            notes: None,
            has_attendees: false,
            is_read_only: false,
            calendar_id: None,
        }
    }

    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    /// `None` shows every calendar; events without a calendar always show.
    pub fn is_in_visible_calendar(&self, visible_calendar_ids: Option<&[String]>) -> bool {
        match (&self.calendar_id, visible_calendar_ids) {
            (None, _) | (_, None) => true,
            (Some(calendar_id), Some(visible)) => visible.iter().any(|id| id == calendar_id),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Events with attendees are owned by someone else and stay read-only.
    pub fn with_attendees(mut self, has_attendees: bool) -> Self {
        self.has_attendees = has_attendees;
        self.is_read_only = has_attendees;
        self
    }

    pub fn all_day(mut self) -> Self {
        self.is_all_day = true;
        self
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }

    pub fn reminder_id(&self) -> Option<&str> {
        self.notes.as_deref().and_then(notes::parse_reminder_id)
    }

    pub fn category(&self) -> Option<&str> {
        self.notes.as_deref().and_then(notes::parse_category)
    }

    pub fn is_focus_block(&self) -> bool {
        self.notes
            .as_deref()
            .map(notes::is_focus_block_notes)
            .unwrap_or(false)
    }

    pub fn focus_block_notes(&self) -> Option<FocusBlockNotes> {
        self.notes.as_deref().and_then(FocusBlockNotes::decode)
    }
}

/// A scheduled focus session. The id is the id of the backing calendar event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FocusBlock {
    pub id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub task_ids: Vec<String>,
    pub completed_task_ids: Vec<String>,
    pub task_times: BTreeMap<String, u32>,
}

impl FocusBlock {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_at && now < self.end_at
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_at
    }

    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        now < self.start_at
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.completed_task_ids.iter().any(|id| id == task_id)
    }

    /// Task ids still waiting in the queue, in queue order.
    pub fn remaining_task_ids(&self) -> Vec<String> {
        self.task_ids
            .iter()
            .filter(|id| !self.is_completed(id))
            .cloned()
            .collect()
    }

    pub fn notes(&self) -> FocusBlockNotes {
        FocusBlockNotes {
            task_ids: self.task_ids.clone(),
            completed_task_ids: self.completed_task_ids.clone(),
            task_times: self.task_times.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("focus_block.id must not be empty".to_string());
        }
        if self.end_at <= self.start_at {
            return Err("focus_block.end_at must be after focus_block.start_at".to_string());
        }
        if let Some(unknown) = self
            .completed_task_ids
            .iter()
            .find(|id| !self.task_ids.contains(id))
        {
            return Err(format!(
                "focus_block.completed_task_ids contains unassigned task {unknown}"
            ));
        }
        Ok(())
    }
}
