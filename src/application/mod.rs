pub mod bootstrap;
pub mod commands;
pub mod focus_block_service;
pub mod reminders_import;
pub mod task_service;
