use crate::domain::calendar::{CalendarEvent, FocusBlock};
use crate::domain::models::PlanItem;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const ON_TIME_TOLERANCE: f64 = 0.10;
const DEVIATION_LABEL_TOLERANCE: f64 = 0.05;

/// Adds categorized calendar events on top of minutes already tallied from tasks.
/// Focus block events are skipped since their tasks are counted directly.
pub fn category_minutes(
    task_minutes_by_category: BTreeMap<String, i64>,
    events: &[CalendarEvent],
) -> BTreeMap<String, i64> {
    let mut stats = task_minutes_by_category;
    for event in events {
        if event.is_focus_block() {
            continue;
        }
        let Some(category) = event.category() else {
            continue;
        };
        *stats.entry(category.to_string()).or_insert(0) += event.duration_minutes();
    }
    stats
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PlanningAccuracyStats {
    pub faster_count: u32,
    pub slower_count: u32,
    pub on_time_count: u32,
    /// -0.2 means 20% faster than estimated.
    pub average_deviation: f64,
    pub tracked_task_count: u32,
    pub total_reschedules: u32,
    pub rescheduled_task_count: u32,
}

impl PlanningAccuracyStats {
    pub fn has_data(&self) -> bool {
        self.tracked_task_count > 0 || self.total_reschedules > 0
    }

    pub fn average_deviation_label(&self) -> String {
        let percent = (self.average_deviation.abs() * 100.0) as i64;
        if self.average_deviation < -DEVIATION_LABEL_TOLERANCE {
            format!("{percent}% faster")
        } else if self.average_deviation > DEVIATION_LABEL_TOLERANCE {
            format!("{percent}% slower")
        } else {
            "on plan".to_string()
        }
    }
}

pub fn planning_accuracy(blocks: &[FocusBlock], items: &[PlanItem]) -> PlanningAccuracyStats {
    let by_id = items
        .iter()
        .map(|item| (item.id.as_str(), item))
        .collect::<HashMap<_, _>>();
    let mut stats = PlanningAccuracyStats::default();
    let mut total_deviation = 0.0;

    for block in blocks {
        for (task_id, actual_seconds) in &block.task_times {
            let Some(item) = by_id.get(task_id.as_str()) else {
                continue;
            };
            let estimated_seconds = i64::from(item.effective_duration) * 60;
            let actual_seconds = i64::from(*actual_seconds);
            if estimated_seconds <= 0 || actual_seconds <= 0 {
                continue;
            }

            let deviation = (actual_seconds - estimated_seconds) as f64 / estimated_seconds as f64;
            total_deviation += deviation;
            stats.tracked_task_count += 1;
            if deviation < -ON_TIME_TOLERANCE {
                stats.faster_count += 1;
            } else if deviation > ON_TIME_TOLERANCE {
                stats.slower_count += 1;
            } else {
                stats.on_time_count += 1;
            }
        }
    }

    for item in items {
        stats.total_reschedules += item.reschedule_count;
        if item.reschedule_count > 0 {
            stats.rescheduled_task_count += 1;
        }
    }

    if stats.tracked_task_count > 0 {
        stats.average_deviation = total_deviation / f64::from(stats.tracked_task_count);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::LocalTask;
    use chrono::{DateTime, Utc};
    use chrono_tz::Tz;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn item(id: &str, minutes: u32, reschedules: u32) -> PlanItem {
        let now = fixed_time("2026-02-16T12:00:00Z");
        let mut task = LocalTask::new(id, now);
        task.id = id.to_string();
        task.estimated_duration = Some(minutes);
        task.reschedule_count = reschedules;
        PlanItem::from_local_task(&task, 15, now, Tz::UTC)
    }

    fn block(times: &[(&str, u32)]) -> FocusBlock {
        FocusBlock {
            id: "fb".to_string(),
            title: "Focus Block 09:00".to_string(),
            start_at: fixed_time("2026-02-16T09:00:00Z"),
            end_at: fixed_time("2026-02-16T10:00:00Z"),
            task_ids: times.iter().map(|(id, _)| id.to_string()).collect(),
            completed_task_ids: Vec::new(),
            task_times: times
                .iter()
                .map(|(id, seconds)| (id.to_string(), *seconds))
                .collect(),
        }
    }

    #[test]
    fn category_minutes_merge_tasks_and_events() {
        let start = fixed_time("2026-02-16T09:00:00Z");
        let end = fixed_time("2026-02-16T09:30:00Z");
        let events = vec![
            CalendarEvent::new("e1", "Course", start, end).with_notes("category:learning"),
            CalendarEvent::new("e2", "Gym", start, end).with_notes("category:recharge"),
            CalendarEvent::new("e3", "Lunch", start, end),
            CalendarEvent::new("e4", "Block", start, end)
                .with_notes("focusBlock:true\ncategory:learning"),
        ];
        let tasks = BTreeMap::from([("learning".to_string(), 45)]);

        let stats = category_minutes(tasks, &events);
        assert_eq!(stats.get("learning"), Some(&75));
        assert_eq!(stats.get("recharge"), Some(&30));
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn accuracy_buckets_use_ten_percent_tolerance() {
        let items = vec![item("fast", 10, 0), item("slow", 10, 2), item("ok", 10, 0), item("idle", 10, 1)];
        let blocks = vec![
            block(&[("fast", 300), ("slow", 900)]),
            block(&[("ok", 630), ("idle", 0), ("unknown", 600)]),
        ];

        let stats = planning_accuracy(&blocks, &items);
        assert_eq!(stats.faster_count, 1);
        assert_eq!(stats.slower_count, 1);
        assert_eq!(stats.on_time_count, 1);
        assert_eq!(stats.tracked_task_count, 3);
        assert_eq!(stats.total_reschedules, 3);
        assert_eq!(stats.rescheduled_task_count, 2);
        // (-0.5 + 0.5 + 0.05) / 3
        assert!((stats.average_deviation - 0.05 / 3.0).abs() < 1e-9);
        assert_eq!(stats.average_deviation_label(), "on plan");
        assert!(stats.has_data());
    }

    #[test]
    fn deviation_label_reports_direction() {
        let faster = PlanningAccuracyStats {
            average_deviation: -0.25,
            ..PlanningAccuracyStats::default()
        };
        assert_eq!(faster.average_deviation_label(), "25% faster");
        let slower = PlanningAccuracyStats {
            average_deviation: 0.3,
            ..PlanningAccuracyStats::default()
        };
        assert_eq!(slower.average_deviation_label(), "30% slower");
        assert!(!PlanningAccuracyStats::default().has_data());
    }
}
