use sea_orm::entity::prelude::*;

/// Append-only record of one terminal job attempt.
///
/// `job_id` references `jobs.id` logically only, so history outlives the
/// retention purge of its job row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "job_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub job_id: String,
    pub job_type: String,
    pub target_id: String,
    pub target_name: Option<String>,
    pub status: String,
    pub worker_id: Option<String>,
    pub attempt_number: i32,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: DateTimeUtc,
    pub duration_ms: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub result: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
