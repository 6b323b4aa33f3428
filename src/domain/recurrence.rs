use crate::domain::models::{LAST_DAY_OF_MONTH, LocalTask, RecurrencePattern};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Next due date for a recurring series, computed on local calendar days.
/// Weekdays are numbered 1 (Monday) to 7 (Sunday).
pub fn next_due_date(
    pattern: RecurrencePattern,
    weekdays: Option<&[u8]>,
    month_day: Option<u8>,
    base: DateTime<Utc>,
    time_zone: Tz,
) -> Option<DateTime<Utc>> {
    let local = base.with_timezone(&time_zone).naive_local();
    let date = local.date();
    let next_date = match pattern {
        RecurrencePattern::None => return None,
        RecurrencePattern::Daily => date.checked_add_days(Days::new(1))?,
        RecurrencePattern::Weekdays => next_matching_day(date, |day| {
            !matches!(day, Weekday::Sat | Weekday::Sun)
        })?,
        RecurrencePattern::Weekends => {
            next_matching_day(date, |day| matches!(day, Weekday::Sat | Weekday::Sun))?
        }
        RecurrencePattern::Weekly => match next_selected_weekday(date, weekdays, 0) {
            Some(next) => next,
            None => date.checked_add_days(Days::new(7))?,
        },
        RecurrencePattern::Biweekly => match next_selected_weekday(date, weekdays, 1) {
            Some(next) => next,
            None => date.checked_add_days(Days::new(14))?,
        },
        RecurrencePattern::Monthly => next_monthly_date(date, month_day)?,
        RecurrencePattern::Quarterly => add_months_clamped(date, 3)?,
        RecurrencePattern::Semiannually => add_months_clamped(date, 6)?,
        RecurrencePattern::Yearly => add_months_clamped(date, 12)?,
    };
    to_utc(next_date.and_time(local.time()), time_zone)
}

/// Builds the follow-up instance for a completed recurring task. A task
/// without a group id gets one, written back so the series stays linked.
pub fn create_next_instance(
    completed: &mut LocalTask,
    now: DateTime<Utc>,
    time_zone: Tz,
) -> Option<LocalTask> {
    if !completed.recurrence_pattern.is_recurring() {
        return None;
    }

    let base = completed.due_date.unwrap_or(now);
    let due_date = next_due_date(
        completed.recurrence_pattern,
        completed.recurrence_weekdays.as_deref(),
        completed.recurrence_month_day,
        base,
        time_zone,
    );

    let group_id = completed
        .recurrence_group_id
        .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
        .clone();

    let mut instance = LocalTask::new(completed.title.clone(), now);
    instance.importance = completed.importance;
    instance.tags = completed.tags.clone();
    instance.due_date = due_date;
    instance.estimated_duration = completed.estimated_duration;
    instance.urgency = completed.urgency;
    instance.category = completed.category;
    instance.recurrence_pattern = completed.recurrence_pattern;
    instance.recurrence_weekdays = completed.recurrence_weekdays.clone();
    instance.recurrence_month_day = completed.recurrence_month_day;
    instance.recurrence_group_id = Some(group_id);
    instance.description = completed.description.clone();
    instance.sort_order = completed.sort_order;
    Some(instance)
}

fn next_matching_day(date: NaiveDate, accept: impl Fn(Weekday) -> bool) -> Option<NaiveDate> {
    (1..=7)
        .filter_map(|offset| date.checked_add_days(Days::new(offset)))
        .find(|candidate| accept(candidate.weekday()))
}

fn next_selected_weekday(
    date: NaiveDate,
    weekdays: Option<&[u8]>,
    extra_weeks: u64,
) -> Option<NaiveDate> {
    let mut selected = weekdays?
        .iter()
        .copied()
        .filter(|day| (1..=7).contains(day))
        .collect::<Vec<_>>();
    selected.sort_unstable();
    let first = *selected.first()?;
    let current = date.weekday().number_from_monday() as u64;

    let days_ahead = match selected.iter().find(|day| u64::from(**day) > current) {
        Some(later) => u64::from(*later) - current,
        None => 7 - current + u64::from(first),
    };
    date.checked_add_days(Days::new(days_ahead + extra_weeks * 7))
}

fn next_monthly_date(date: NaiveDate, month_day: Option<u8>) -> Option<NaiveDate> {
    let first_of_next = date.with_day(1)?.checked_add_months(Months::new(1))?;
    let length = days_in_month(first_of_next)?;
    let day = match month_day {
        Some(LAST_DAY_OF_MONTH) => length,
        Some(day) => u32::from(day).min(length),
        None => date.day().min(length),
    };
    first_of_next.with_day(day)
}

/// chrono clamps to the last valid day of the target month.
fn add_months_clamped(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

fn days_in_month(first_of_month: NaiveDate) -> Option<u32> {
    let first_of_following = first_of_month.checked_add_months(Months::new(1))?;
    Some(first_of_following.pred_opt()?.day())
}

fn to_utc(local: NaiveDateTime, time_zone: Tz) -> Option<DateTime<Utc>> {
    time_zone
        .from_local_datetime(&local)
        .earliest()
        .map(|value| value.with_timezone(&Utc))
}
