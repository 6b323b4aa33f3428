use crate::domain::scoring::{self, PriorityTier};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const DEFAULT_SOURCE_SYSTEM: &str = "local";
pub const FALLBACK_TASK_DURATION_MINUTES: u32 = 15;
pub const LAST_DAY_OF_MONTH: u8 = 32;

static TITLE_DURATION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)#(\d+)min").ok());

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    pub fn level(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    /// Reminder priorities run 1 (highest) to 9 (lowest); 0 means unset.
    pub fn from_reminder_priority(priority: u8) -> Option<Self> {
        match priority {
            1..=4 => Some(Self::High),
            5 => Some(Self::Medium),
            6..=9 => Some(Self::Low),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Some(Self::Low),
            "medium" | "2" => Some(Self::Medium),
            "high" | "3" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Urgent,
    NotUrgent,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::NotUrgent => "not_urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "urgent" => Some(Self::Urgent),
            "not_urgent" | "not-urgent" => Some(Self::NotUrgent),
            _ => None,
        }
    }
}

/// Stored raw values predate the display names, hence the mismatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskCategory {
    #[serde(rename = "income")]
    Income,
    #[serde(rename = "maintenance")]
    Essentials,
    #[serde(rename = "recharge")]
    SelfCare,
    #[serde(rename = "learning")]
    Learn,
    #[serde(rename = "giving_back")]
    Social,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 5] = [
        Self::Income,
        Self::Essentials,
        Self::SelfCare,
        Self::Learn,
        Self::Social,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Essentials => "maintenance",
            Self::SelfCare => "recharge",
            Self::Learn => "learning",
            Self::Social => "giving_back",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Income => "Earn",
            Self::Essentials => "Essentials",
            Self::SelfCare => "Self Care",
            Self::Learn => "Learn",
            Self::Social => "Social",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(value))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    #[default]
    None,
    Daily,
    Weekdays,
    Weekends,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Semiannually,
    Yearly,
}

impl RecurrencePattern {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekdays => "weekdays",
            Self::Weekends => "weekends",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannually => "semiannually",
            Self::Yearly => "yearly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Some(Self::None),
            "daily" => Some(Self::Daily),
            "weekdays" => Some(Self::Weekdays),
            "weekends" => Some(Self::Weekends),
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "semiannually" => Some(Self::Semiannually),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn is_recurring(self) -> bool {
        self != Self::None
    }

    pub fn requires_weekdays(self) -> bool {
        matches!(self, Self::Weekly | Self::Biweekly)
    }

    pub fn requires_month_day(self) -> bool {
        self == Self::Monthly
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    Manual,
    Parsed,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalTask {
    pub id: String,
    pub title: String,
    pub is_completed: bool,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sort_order: i64,
    pub importance: Option<Importance>,
    pub urgency: Option<Urgency>,
    pub estimated_duration: Option<u32>,
    pub category: Option<TaskCategory>,
    pub recurrence_pattern: RecurrencePattern,
    pub recurrence_weekdays: Option<Vec<u8>>,
    pub recurrence_month_day: Option<u8>,
    pub recurrence_group_id: Option<String>,
    pub description: Option<String>,
    pub is_next_up: bool,
    pub next_up_sort_order: Option<i64>,
    pub assigned_focus_block_id: Option<String>,
    pub reschedule_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
    pub source_system: String,
}

impl LocalTask {
    pub fn new(title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            is_completed: false,
            tags: Vec::new(),
            due_date: None,
            created_at,
            sort_order: 0,
            importance: None,
            urgency: None,
            estimated_duration: None,
            category: None,
            recurrence_pattern: RecurrencePattern::None,
            recurrence_weekdays: None,
            recurrence_month_day: None,
            recurrence_group_id: None,
            description: None,
            is_next_up: false,
            next_up_sort_order: None,
            assigned_focus_block_id: None,
            reschedule_count: 0,
            completed_at: None,
            external_id: None,
            source_system: DEFAULT_SOURCE_SYSTEM.to_string(),
        }
    }

    /// A task is TBD while importance, urgency or duration is still unset.
    pub fn is_tbd(&self) -> bool {
        self.importance.is_none() || self.urgency.is_none() || self.estimated_duration.is_none()
    }

    // The safe setters never replace a value that is already set with an unset one.

    pub fn safe_set_importance(&mut self, value: Option<Importance>) {
        if value.is_some() || self.importance.is_none() {
            self.importance = value;
        }
    }

    pub fn safe_set_urgency(&mut self, value: Option<Urgency>) {
        if value.is_some() || self.urgency.is_none() {
            self.urgency = value;
        }
    }

    pub fn safe_set_duration(&mut self, value: Option<u32>) {
        if value.is_some() || self.estimated_duration.is_none() {
            self.estimated_duration = value;
        }
    }

    pub fn safe_set_category(&mut self, value: Option<TaskCategory>) {
        if value.is_some() || self.category.is_none() {
            self.category = value;
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.is_completed = true;
        self.completed_at = Some(now);
        self.assigned_focus_block_id = None;
        self.is_next_up = false;
    }

    pub fn mark_incomplete(&mut self) {
        self.is_completed = false;
        self.completed_at = None;
    }

    pub fn set_next_up(&mut self, is_next_up: bool) {
        self.is_next_up = is_next_up;
        if is_next_up {
            if self.next_up_sort_order.is_none() {
                self.next_up_sort_order = Some(i64::MAX);
            }
        } else {
            self.next_up_sort_order = None;
            self.assigned_focus_block_id = None;
        }
    }

    /// Moving between two different blocks counts as a reschedule.
    pub fn assign_focus_block(&mut self, focus_block_id: Option<String>) {
        if let (Some(previous), Some(next)) = (&self.assigned_focus_block_id, &focus_block_id) {
            if previous != next {
                self.reschedule_count = self.reschedule_count.saturating_add(1);
            }
        }
        self.assigned_focus_block_id = focus_block_id;
    }

    pub fn effective_duration(&self, default_minutes: u32) -> (u32, DurationSource) {
        if let Some(manual) = self.estimated_duration {
            return (manual, DurationSource::Manual);
        }
        if let Some(parsed) = parse_duration_from_title(&self.title) {
            return (parsed, DurationSource::Parsed);
        }
        (default_minutes, DurationSource::Default)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        validate_non_empty(&self.source_system, "task.source_system")?;
        if self.estimated_duration == Some(0) {
            return Err("task.estimated_duration must be > 0".to_string());
        }
        if let Some(weekdays) = &self.recurrence_weekdays {
            if weekdays.iter().any(|day| !(1..=7).contains(day)) {
                return Err("task.recurrence_weekdays must be within 1..=7".to_string());
            }
        }
        if let Some(month_day) = self.recurrence_month_day {
            if !(1..=LAST_DAY_OF_MONTH).contains(&month_day) {
                return Err("task.recurrence_month_day must be within 1..=32".to_string());
            }
        }
        if self.is_completed && self.completed_at.is_none() {
            return Err("task.completed_at must be set for completed tasks".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderData {
    pub id: String,
    pub title: String,
    pub is_completed: bool,
    pub priority: u8,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub list_id: Option<String>,
}

impl ReminderData {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            is_completed: false,
            priority: 0,
            due_date: None,
            notes: None,
            list_id: None,
        }
    }
}

/// Display-oriented projection of a task for planning lists.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlanItem {
    pub id: String,
    pub title: String,
    pub is_completed: bool,
    pub importance: Option<Importance>,
    pub rank: i64,
    pub effective_duration: u32,
    pub duration_source: DurationSource,
    pub tags: Vec<String>,
    pub urgency: Option<Urgency>,
    pub category: Option<TaskCategory>,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub is_next_up: bool,
    pub next_up_sort_order: Option<i64>,
    pub is_tbd: bool,
    pub reschedule_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub priority_score: u8,
    pub priority_tier: PriorityTier,
}

impl PlanItem {
    pub fn from_local_task(
        task: &LocalTask,
        default_duration: u32,
        now: DateTime<Utc>,
        time_zone: Tz,
    ) -> Self {
        let (effective_duration, duration_source) = task.effective_duration(default_duration);
        let priority_score = scoring::calculate_score(task, now, time_zone);
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            is_completed: task.is_completed,
            importance: task.importance,
            rank: task.sort_order,
            effective_duration,
            duration_source,
            tags: task.tags.clone(),
            urgency: task.urgency,
            category: task.category,
            due_date: task.due_date,
            description: task.description.clone(),
            is_next_up: task.is_next_up,
            next_up_sort_order: task.next_up_sort_order,
            is_tbd: task.is_tbd(),
            reschedule_count: task.reschedule_count,
            completed_at: task.completed_at,
            priority_score,
            priority_tier: PriorityTier::from_score(priority_score),
        }
    }
}

/// Reads a `#<minutes>min` token such as `Write report #30min`.
pub fn parse_duration_from_title(title: &str) -> Option<u32> {
    let pattern = TITLE_DURATION_PATTERN.as_ref()?;
    let captures = pattern.captures(title)?;
    captures.get(1)?.as_str().parse::<u32>().ok()
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
