//! SeaORM entity definitions for the job queue tables

pub mod prelude;

pub mod job_history;
pub mod jobs;
