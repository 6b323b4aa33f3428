use crate::domain::models::{Importance, LocalTask, Urgency};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const MAX_SCORE: u8 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    DoNow,
    PlanSoon,
    Eventually,
    Someday,
}

impl PriorityTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            60.. => Self::DoNow,
            35..=59 => Self::PlanSoon,
            10..=34 => Self::Eventually,
            _ => Self::Someday,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::DoNow => "Do now",
            Self::PlanSoon => "Plan soon",
            Self::Eventually => "Eventually",
            Self::Someday => "Someday",
        }
    }
}

pub fn calculate_score(task: &LocalTask, now: DateTime<Utc>, time_zone: Tz) -> u8 {
    let total = u16::from(eisenhower_score(task.importance, task.urgency))
        + u16::from(deadline_score(task.due_date, now, time_zone))
        + u16::from(neglect_score(task.created_at, task.reschedule_count, now, time_zone))
        + u16::from(completeness_score(task))
        + u16::from(next_up_bonus(task.is_next_up));
    total.min(u16::from(MAX_SCORE)) as u8
}

pub fn eisenhower_score(importance: Option<Importance>, urgency: Option<Urgency>) -> u8 {
    match (importance, urgency) {
        (Some(Importance::High), Some(Urgency::Urgent)) => 50,
        (Some(Importance::High), Some(Urgency::NotUrgent)) => 38,
        (Some(Importance::Medium), Some(Urgency::Urgent)) => 35,
        (Some(Importance::Low), Some(Urgency::Urgent)) => 30,
        (Some(Importance::Medium), Some(Urgency::NotUrgent)) => 20,
        (Some(Importance::Low), Some(Urgency::NotUrgent)) => 10,
        (None, Some(Urgency::Urgent)) => 25,
        (None, Some(Urgency::NotUrgent)) => 8,
        (Some(_), None) => 15,
        (None, None) => 0,
    }
}

/// Scored by calendar days in the configured zone, so 23:59 to 00:01 is one day.
pub fn deadline_score(due_date: Option<DateTime<Utc>>, now: DateTime<Utc>, time_zone: Tz) -> u8 {
    let Some(due_date) = due_date else {
        return 0;
    };
    match calendar_days_between(now, due_date, time_zone) {
        i64::MIN..=0 => 25,
        1 => 22,
        2..=3 => 18,
        4..=7 => 12,
        8..=14 => 6,
        15..=30 => 3,
        _ => 0,
    }
}

pub fn neglect_score(
    created_at: DateTime<Utc>,
    reschedule_count: u32,
    now: DateTime<Utc>,
    time_zone: Tz,
) -> u8 {
    let days_old = calendar_days_between(created_at, now, time_zone).max(0);
    let age = (days_old * 10 / 30).min(10) as u8;
    let reschedules = reschedule_count.min(5) as u8;
    age + reschedules
}

pub fn completeness_score(task: &LocalTask) -> u8 {
    let filled = [
        task.importance.is_some(),
        task.urgency.is_some(),
        task.estimated_duration.is_some(),
        task.category.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count() as u8;
    if filled == 4 { filled + 1 } else { filled }
}

pub fn next_up_bonus(is_next_up: bool) -> u8 {
    if is_next_up { 5 } else { 0 }
}

fn calendar_days_between(from: DateTime<Utc>, to: DateTime<Utc>, time_zone: Tz) -> i64 {
    let from_day = from.with_timezone(&time_zone).date_naive();
    let to_day = to.with_timezone(&time_zone).date_naive();
    (to_day - from_day).num_days()
}
