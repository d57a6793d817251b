//! Job scheduling subsystem for m3u-proxy
//!
//! Work items (stream and EPG ingestion, proxy regeneration, encoding,
//! maintenance) live in the `jobs` table and are claimed by any number of
//! worker processes polling the same database.
//!
//! The system is built around four main components:
//! - `JobQueue`: durable store, claim protocol, deduplication and history
//! - `ClaimStrategy`: the backend-specific atomic claim
//! - `JobQueueRunner`: polling workers that execute registered handlers
//! - `RetentionSweeper`: periodic purge of finished jobs and old history

pub mod claim;
pub mod handlers;
pub mod job_queue;
pub mod job_queue_runner;
pub mod retention;

pub use claim::{AtomicUpdateClaim, ClaimStrategy, RowLockingClaim};
pub use handlers::{HandlerRegistry, JobHandler};
pub use job_queue::JobQueue;
pub use job_queue_runner::JobQueueRunner;
pub use retention::{RetentionSweeper, SweepReport};
