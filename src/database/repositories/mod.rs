//! SeaORM repository implementations
//!
//! Repositories work unchanged across SQLite, PostgreSQL and MySQL; the only
//! backend-specific path (claiming) is handled by `job_scheduling::claim`.

pub mod job;
pub mod job_history;

pub use job::JobSeaOrmRepository;
pub use job_history::JobHistorySeaOrmRepository;
