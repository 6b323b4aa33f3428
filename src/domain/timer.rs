use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Share of a block that has elapsed when the end-of-block warning fires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum WarningTiming {
    Short,
    #[default]
    Standard,
    Early,
}

impl WarningTiming {
    pub fn percent(self) -> u8 {
        match self {
            Self::Short => 90,
            Self::Standard => 80,
            Self::Early => 70,
        }
    }
}

impl TryFrom<u8> for WarningTiming {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            90 => Ok(Self::Short),
            80 => Ok(Self::Standard),
            70 => Ok(Self::Early),
            other => Err(format!("warning timing must be 70, 80 or 90, got {other}")),
        }
    }
}

impl From<WarningTiming> for u8 {
    fn from(value: WarningTiming) -> Self {
        value.percent()
    }
}

/// Fraction of the estimate used so far; exceeds 1.0 once the task runs over.
pub fn task_progress(
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    duration_minutes: u32,
) -> f64 {
    let Some(started_at) = started_at else {
        return 0.0;
    };
    let estimated_seconds = f64::from(duration_minutes) * 60.0;
    if estimated_seconds <= 0.0 {
        return 0.0;
    }
    (now - started_at).num_seconds() as f64 / estimated_seconds
}

pub fn remaining_task_minutes(
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    duration_minutes: u32,
) -> u32 {
    let Some(started_at) = started_at else {
        return duration_minutes;
    };
    let remaining_seconds = i64::from(duration_minutes) * 60 - (now - started_at).num_seconds();
    (remaining_seconds / 60).max(0) as u32
}

/// Block start plus the durations of every task up to and including
/// `task_id`, never later than the block end.
pub fn planned_task_end(
    block_start: DateTime<Utc>,
    block_end: DateTime<Utc>,
    task_durations: &[(String, u32)],
    task_id: &str,
) -> DateTime<Utc> {
    let mut cumulative_minutes = 0i64;
    for (id, duration_minutes) in task_durations {
        cumulative_minutes += i64::from(*duration_minutes);
        if id == task_id {
            break;
        }
    }
    (block_start + Duration::minutes(cumulative_minutes)).min(block_end)
}

/// Negative once the planned end has passed.
pub fn remaining_seconds(planned_end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (planned_end - now).num_seconds()
}

pub fn warning_instant(
    block_start: DateTime<Utc>,
    block_end: DateTime<Utc>,
    timing: WarningTiming,
) -> DateTime<Utc> {
    let total_seconds = (block_end - block_start).num_seconds();
    block_start + Duration::seconds(total_seconds * i64::from(timing.percent()) / 100)
}
