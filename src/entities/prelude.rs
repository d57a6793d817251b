pub use super::job_history::Entity as JobHistory;
pub use super::jobs::Entity as Jobs;
