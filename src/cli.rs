use crate::application::commands::{
    AppState, EventInput, ReminderInput, TaskInput, active_block_impl, add_event_impl,
    add_reminder_impl, assign_task_impl, complete_block_task_impl, complete_task_impl,
    count_open_tasks_impl, create_block_impl, create_task_impl, delete_block_impl,
    find_gaps_impl, import_reminders_impl, list_blocks_impl, list_tasks_impl, next_up_impl,
    review_impl, skip_block_task_impl, undo_completion_impl,
};
use crate::infrastructure::error::InfraError;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "focusblox", version)]
#[command(about = "Plan tasks into calendar focus blocks")]
pub struct Cli {
    /// Workspace holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backlog tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Focus blocks in the calendar
    #[command(subcommand)]
    Block(BlockCommand),
    /// Plain calendar events
    #[command(subcommand)]
    Event(EventCommand),
    /// Open reminders waiting to be imported
    #[command(subcommand)]
    Reminder(ReminderCommand),
    /// Free slots for a day
    Gaps {
        /// Day to inspect (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Time per category and planning accuracy
    Review {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Copy open reminders into the backlog
    ImportReminders {
        /// Close the reminders once imported
        #[arg(long)]
        mark_complete: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Add {
        title: String,
        #[arg(long)]
        importance: Option<String>,
        #[arg(long)]
        urgency: Option<String>,
        /// Estimated minutes
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// RFC3339 or YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        recurrence: Option<String>,
        /// 1 = Monday .. 7 = Sunday
        #[arg(long = "weekday")]
        weekdays: Vec<u8>,
        /// 1-31, 32 for the last day of the month
        #[arg(long)]
        month_day: Option<u8>,
    },
    List {
        #[arg(long)]
        completed: bool,
        #[arg(long)]
        days: Option<u32>,
    },
    Done {
        task_id: String,
    },
    /// Revert the most recent completion
    Undo,
    /// List the Next Up queue, or add/remove a task
    NextUp {
        task_id: Option<String>,
        #[arg(long)]
        remove: bool,
    },
    /// Number of open tasks
    Count,
}

#[derive(Subcommand, Debug)]
pub enum BlockCommand {
    Create {
        /// RFC3339 start
        start_at: String,
        /// RFC3339 end
        end_at: String,
    },
    List {
        #[arg(long)]
        date: Option<String>,
    },
    /// The running block with planned task ends
    Active,
    Assign {
        block_id: String,
        task_id: String,
        #[arg(long)]
        remove: bool,
    },
    Complete {
        block_id: String,
        task_id: String,
        /// When work on the task started (RFC3339)
        #[arg(long)]
        started_at: Option<String>,
    },
    Skip {
        block_id: String,
        task_id: String,
        #[arg(long)]
        started_at: Option<String>,
    },
    Delete {
        block_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    Add {
        title: String,
        /// RFC3339 start
        start_at: String,
        /// RFC3339 end
        end_at: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        all_day: bool,
        /// Calendar id the event belongs to
        #[arg(long)]
        calendar: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReminderCommand {
    Add {
        title: String,
        /// 0 = none, 1 (highest) to 9
        #[arg(long)]
        priority: Option<u8>,
        /// RFC3339 or YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Reminder list id
        #[arg(long)]
        list: Option<String>,
    },
}

/// Parses arguments, runs one command and returns its JSON output.
pub async fn run() -> Result<Value, String> {
    let cli = Cli::parse();
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    let state = AppState::new(workspace_root).map_err(|error| error.to_string())?;
    dispatch(&state, cli.command).await
}

pub async fn dispatch(state: &AppState, command: Command) -> Result<Value, String> {
    match command {
        Command::Task(command) => dispatch_task(state, command),
        Command::Block(command) => dispatch_block(state, command).await,
        Command::Event(EventCommand::Add {
            title,
            start_at,
            end_at,
            category,
            all_day,
            calendar,
        }) => {
            let input = EventInput {
                title,
                start_at,
                end_at,
                category,
                all_day,
                calendar,
            };
            respond(state, "add_event", add_event_impl(state, input).await)
        }
        Command::Reminder(ReminderCommand::Add {
            title,
            priority,
            due,
            notes,
            list,
        }) => {
            let input = ReminderInput {
                title,
                priority,
                due,
                notes,
                list,
            };
            respond(state, "add_reminder", add_reminder_impl(state, input).await)
        }
        Command::Gaps { date } => respond(state, "find_gaps", find_gaps_impl(state, date).await),
        Command::Review { days } => respond(state, "review", review_impl(state, days).await),
        Command::ImportReminders { mark_complete } => respond(
            state,
            "import_reminders",
            import_reminders_impl(state, mark_complete).await,
        ),
    }
}

fn dispatch_task(state: &AppState, command: TaskCommand) -> Result<Value, String> {
    match command {
        TaskCommand::Add {
            title,
            importance,
            urgency,
            duration,
            category,
            tags,
            due,
            description,
            recurrence,
            weekdays,
            month_day,
        } => {
            let input = TaskInput {
                title,
                importance,
                urgency,
                duration,
                category,
                tags,
                due,
                description,
                recurrence,
                weekdays,
                month_day,
            };
            respond(state, "create_task", create_task_impl(state, input))
        }
        TaskCommand::List { completed, days } => {
            respond(state, "list_tasks", list_tasks_impl(state, completed, days))
        }
        TaskCommand::Done { task_id } => {
            respond(state, "complete_task", complete_task_impl(state, task_id))
        }
        TaskCommand::Undo => respond(state, "undo_completion", undo_completion_impl(state)),
        TaskCommand::NextUp { task_id, remove } => {
            respond(state, "next_up", next_up_impl(state, task_id, remove))
        }
        TaskCommand::Count => respond(state, "count_tasks", count_open_tasks_impl(state)),
    }
}

async fn dispatch_block(state: &AppState, command: BlockCommand) -> Result<Value, String> {
    match command {
        BlockCommand::Create { start_at, end_at } => respond(
            state,
            "create_block",
            create_block_impl(state, start_at, end_at).await,
        ),
        BlockCommand::List { date } => {
            respond(state, "list_blocks", list_blocks_impl(state, date).await)
        }
        BlockCommand::Active => respond(state, "active_block", active_block_impl(state).await),
        BlockCommand::Assign {
            block_id,
            task_id,
            remove,
        } => respond(
            state,
            "assign_task",
            assign_task_impl(state, block_id, task_id, remove).await,
        ),
        BlockCommand::Complete {
            block_id,
            task_id,
            started_at,
        } => respond(
            state,
            "complete_block_task",
            complete_block_task_impl(state, block_id, task_id, started_at).await,
        ),
        BlockCommand::Skip {
            block_id,
            task_id,
            started_at,
        } => respond(
            state,
            "skip_block_task",
            skip_block_task_impl(state, block_id, task_id, started_at).await,
        ),
        BlockCommand::Delete { block_id } => {
            respond(state, "delete_block", delete_block_impl(state, block_id).await)
        }
    }
}

fn respond<T: Serialize>(
    state: &AppState,
    command: &str,
    result: Result<T, InfraError>,
) -> Result<Value, String> {
    let value = result.map_err(|error| state.command_error(command, &error))?;
    serde_json::to_value(value).map_err(|error| state.command_error(command, &error.into()))
}
