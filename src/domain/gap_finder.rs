use crate::domain::calendar::{CalendarEvent, FocusBlock};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DAY_START_HOUR: u32 = 6;
pub const DEFAULT_DAY_END_HOUR: u32 = 22;
pub const DEFAULT_SUGGESTION_HOURS: [u32; 4] = [9, 11, 14, 16];
pub const MOSTLY_FREE_BUSY_MINUTES: i64 = 120;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self { start_at, end_at }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start_at < other.end_at && other.start_at < self.end_at
    }
}

/// Free-slot search over one calendar day in the configured zone.
#[derive(Debug, Clone)]
pub struct GapFinder {
    date: NaiveDate,
    time_zone: Tz,
    day_start_hour: u32,
    day_end_hour: u32,
    now: DateTime<Utc>,
}

impl GapFinder {
    pub fn new(date: NaiveDate, time_zone: Tz, now: DateTime<Utc>) -> Self {
        Self {
            date,
            time_zone,
            day_start_hour: DEFAULT_DAY_START_HOUR,
            day_end_hour: DEFAULT_DAY_END_HOUR,
            now,
        }
    }

    pub fn with_day_window(mut self, day_start_hour: u32, day_end_hour: u32) -> Self {
        self.day_start_hour = day_start_hour;
        self.day_end_hour = day_end_hour;
        self
    }

    /// All-day events and events that are themselves focus blocks are not busy
    /// time; focus blocks are passed separately.
    pub fn find_free_slots(
        &self,
        events: &[CalendarEvent],
        blocks: &[FocusBlock],
        min_minutes: u32,
        max_minutes: u32,
    ) -> Vec<TimeSlot> {
        let busy = events
            .iter()
            .filter(|event| !event.is_all_day && !event.is_focus_block())
            .map(|event| TimeSlot::new(event.start_at, event.end_at))
            .chain(
                blocks
                    .iter()
                    .map(|block| TimeSlot::new(block.start_at, block.end_at)),
            )
            .collect();
        self.find_gaps(busy, min_minutes, max_minutes)
    }

    pub fn find_gaps(
        &self,
        mut busy: Vec<TimeSlot>,
        min_minutes: u32,
        max_minutes: u32,
    ) -> Vec<TimeSlot> {
        let max_minutes = max_minutes.max(min_minutes);
        let Some((day_start, day_end)) = self.day_bounds() else {
            return Vec::new();
        };

        busy.sort_unstable_by(|left, right| left.start_at.cmp(&right.start_at));

        let mut cursor = if self.is_today() {
            day_start.max(self.now)
        } else {
            day_start
        };
        let mut gaps = Vec::new();
        for period in &busy {
            if period.end_at <= day_start || period.start_at >= day_end {
                continue;
            }
            let period_start = period.start_at.max(day_start);
            push_gap(&mut gaps, cursor, period_start, min_minutes, max_minutes);
            cursor = cursor.max(period.end_at.min(day_end));
        }
        push_gap(&mut gaps, cursor, day_end, min_minutes, max_minutes);

        if busy_minutes(busy, day_start, day_end) < MOSTLY_FREE_BUSY_MINUTES {
            return self.default_suggestions(max_minutes);
        }
        gaps
    }

    /// Fixed suggestions for a mostly free day; ones already started today are dropped.
    pub fn default_suggestions(&self, length_minutes: u32) -> Vec<TimeSlot> {
        let is_today = self.is_today();
        DEFAULT_SUGGESTION_HOURS
            .iter()
            .filter_map(|hour| self.local_instant(self.date, *hour))
            .filter(|start_at| !is_today || *start_at >= self.now)
            .map(|start_at| {
                TimeSlot::new(start_at, start_at + Duration::minutes(i64::from(length_minutes)))
            })
            .collect()
    }

    fn is_today(&self) -> bool {
        self.now.with_timezone(&self.time_zone).date_naive() == self.date
    }

    fn day_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.local_instant(self.date, self.day_start_hour)?;
        let end = self.local_instant(self.date, self.day_end_hour)?;
        (end > start).then_some((start, end))
    }

    fn local_instant(&self, date: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
        let (date, hour) = if hour >= 24 {
            (date.succ_opt()?, hour - 24)
        } else {
            (date, hour)
        };
        let naive = date.and_hms_opt(hour, 0, 0)?;
        self.time_zone
            .from_local_datetime(&naive)
            .earliest()
            .map(|value| value.with_timezone(&Utc))
    }
}

fn push_gap(
    gaps: &mut Vec<TimeSlot>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    min_minutes: u32,
    max_minutes: u32,
) {
    if end_at <= start_at {
        return;
    }
    let gap_minutes = (end_at - start_at).num_minutes();
    if gap_minutes < i64::from(min_minutes) {
        return;
    }
    let end_at = if gap_minutes > i64::from(max_minutes) {
        start_at + Duration::minutes(i64::from(max_minutes))
    } else {
        end_at
    };
    gaps.push(TimeSlot::new(start_at, end_at));
}

/// Sum of each period's clipped length; overlapping periods count twice.
fn busy_minutes(busy: Vec<TimeSlot>, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> i64 {
    busy.into_iter()
        .filter_map(|slot| clip_slot(slot, day_start, day_end))
        .map(|slot| slot.duration_minutes())
        .sum()
}

fn clip_slot(
    slot: TimeSlot,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Option<TimeSlot> {
    if slot.end_at <= window_start || slot.start_at >= window_end {
        return None;
    }
    let start_at = slot.start_at.max(window_start);
    let end_at = slot.end_at.min(window_end);
    (end_at > start_at).then_some(TimeSlot::new(start_at, end_at))
}
