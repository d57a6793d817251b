//! Centralized error handling for the job queue
//!
//! The queue distinguishes three caller-visible outcomes: a value, the
//! absence of a value (`Ok(None)`, covering both "not found" and "lost a
//! claim race"), and a hard failure. Only the last one is an error.
//!
//! # Error Categories
//!
//! - **Validation Errors**: malformed create/update input, rejected before any write
//! - **Storage Errors**: genuine backend failures, always tagged with the operation name
//! - **Corrupt Rows**: persisted values that no longer map onto the domain enums
//! - **Configuration Errors**: unreadable or inconsistent configuration
//!
//! # Usage
//!
//! ```rust
//! use m3u_job_queue::errors::{JobQueueError, JobQueueResult};
//!
//! fn check_worker(worker_id: &str) -> JobQueueResult<()> {
//!     if worker_id.trim().is_empty() {
//!         return Err(JobQueueError::validation("worker_id must not be empty"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using JobQueueError
pub type JobQueueResult<T> = Result<T, JobQueueError>;
