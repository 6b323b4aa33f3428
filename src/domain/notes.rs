use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FOCUS_BLOCK_MARKER: &str = "focusBlock:true";
const TASKS_PREFIX: &str = "tasks:";
const COMPLETED_PREFIX: &str = "completed:";
const TIMES_PREFIX: &str = "times:";
const REMINDER_PREFIX: &str = "reminderID:";
const CATEGORY_PREFIX: &str = "category:";
const LIST_SEPARATOR: char = '|';
const PAIR_SEPARATOR: char = '=';

/// Structured payload a focus block keeps inside its calendar event notes.
///
/// ```text
/// focusBlock:true
/// tasks:id1|id2|id3
/// completed:id1
/// times:id1=120|id2=90
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusBlockNotes {
    pub task_ids: Vec<String>,
    pub completed_task_ids: Vec<String>,
    pub task_times: BTreeMap<String, u32>,
}

impl FocusBlockNotes {
    pub fn encode(&self) -> String {
        let mut lines = vec![FOCUS_BLOCK_MARKER.to_string()];
        if !self.task_ids.is_empty() {
            lines.push(format!("{TASKS_PREFIX}{}", join_list(&self.task_ids)));
        }
        if !self.completed_task_ids.is_empty() {
            lines.push(format!(
                "{COMPLETED_PREFIX}{}",
                join_list(&self.completed_task_ids)
            ));
        }
        if !self.task_times.is_empty() {
            let pairs = self
                .task_times
                .iter()
                .map(|(task_id, seconds)| format!("{task_id}{PAIR_SEPARATOR}{seconds}"))
                .collect::<Vec<_>>();
            lines.push(format!("{TIMES_PREFIX}{}", join_list(&pairs)));
        }
        lines.join("\n")
    }

    /// Returns `None` when the notes do not carry the focus block marker.
    pub fn decode(notes: &str) -> Option<Self> {
        if !is_focus_block_notes(notes) {
            return None;
        }
        Some(Self {
            task_ids: parse_list(notes, TASKS_PREFIX),
            completed_task_ids: parse_list(notes, COMPLETED_PREFIX),
            task_times: parse_times(notes),
        })
    }
}

pub fn is_focus_block_notes(notes: &str) -> bool {
    notes.contains(FOCUS_BLOCK_MARKER)
}

pub fn encode_reminder_notes(reminder_id: &str) -> String {
    format!("{REMINDER_PREFIX}{reminder_id}")
}

pub fn parse_reminder_id(notes: &str) -> Option<&str> {
    let rest = notes.strip_prefix(REMINDER_PREFIX)?;
    let value = rest.lines().next().unwrap_or_default().trim();
    (!value.is_empty()).then_some(value)
}

pub fn encode_category_notes(category: &str) -> String {
    format!("{CATEGORY_PREFIX}{category}")
}

pub fn parse_category(notes: &str) -> Option<&str> {
    find_line(notes, CATEGORY_PREFIX).filter(|value| !value.is_empty())
}

fn find_line<'a>(notes: &'a str, prefix: &str) -> Option<&'a str> {
    notes.lines().find_map(|line| line.strip_prefix(prefix))
}

fn join_list(values: &[String]) -> String {
    values.join(&LIST_SEPARATOR.to_string())
}

fn parse_list(notes: &str, prefix: &str) -> Vec<String> {
    let Some(value) = find_line(notes, prefix) else {
        return Vec::new();
    };
    value
        .split(LIST_SEPARATOR)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_times(notes: &str) -> BTreeMap<String, u32> {
    let Some(value) = find_line(notes, TIMES_PREFIX) else {
        return BTreeMap::new();
    };
    value
        .split(LIST_SEPARATOR)
        .filter_map(|pair| {
            let mut parts = pair.split(PAIR_SEPARATOR);
            let task_id = parts.next()?;
            let seconds = parts.next()?;
            if parts.next().is_some() {
                return None;
            }
            let seconds = seconds.trim().parse::<u32>().ok()?;
            Some((task_id.to_string(), seconds))
        })
        .collect()
}
