pub mod backoff;
pub mod datetime;
pub mod ids;
pub mod jitter;

pub use backoff::PollBackoff;
pub use datetime::now_utc;
pub use ids::new_job_id;
