pub mod calendar;
pub mod gap_finder;
pub mod models;
pub mod notes;
pub mod recurrence;
pub mod review;
pub mod scoring;
pub mod timer;
