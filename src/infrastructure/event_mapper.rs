use crate::domain::calendar::{CalendarEvent, FocusBlock};
use crate::domain::notes::FocusBlockNotes;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

const FOCUS_BLOCK_TITLE_PREFIX: &str = "Focus Block";

/// `Focus Block HH:MM`, with the start rendered in the configured zone.
pub fn focus_block_title(start_at: DateTime<Utc>, time_zone: Tz) -> String {
    format!(
        "{FOCUS_BLOCK_TITLE_PREFIX} {}",
        start_at.with_timezone(&time_zone).format("%H:%M")
    )
}

pub fn encode_focus_block_event(block: &FocusBlock) -> CalendarEvent {
    CalendarEvent::new(
        block.id.clone(),
        block.title.clone(),
        block.start_at,
        block.end_at,
    )
    .with_notes(block.notes().encode())
}

/// Returns `Ok(None)` for events that are not focus blocks.
pub fn decode_focus_block_event(event: &CalendarEvent) -> Result<Option<FocusBlock>, InfraError> {
    let Some(notes) = event.focus_block_notes() else {
        return Ok(None);
    };
    if event.end_at <= event.start_at {
        return Err(InfraError::FetchFailed(format!(
            "invalid focus block event {}: end is not after start",
            event.id
        )));
    }

    let FocusBlockNotes {
        task_ids,
        completed_task_ids,
        task_times,
    } = notes;
    Ok(Some(FocusBlock {
        id: event.id.clone(),
        title: event.title.clone(),
        start_at: event.start_at,
        end_at: event.end_at,
        task_ids,
        completed_task_ids,
        task_times,
    }))
}

pub fn parse_rfc3339_utc(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::FetchFailed(format!("invalid stored {field_name} '{value}': {error}"))
        })
}

pub fn parse_optional_rfc3339_utc(
    value: Option<String>,
    field_name: &str,
) -> Result<Option<DateTime<Utc>>, InfraError> {
    value
        .as_deref()
        .map(|value| parse_rfc3339_utc(value, field_name))
        .transpose()
}
