pub mod calendar_store;
pub mod config;
pub mod error;
pub mod event_mapper;
pub mod logging;
pub mod storage;
pub mod task_repository;
