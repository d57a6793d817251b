use sea_orm::entity::prelude::*;

/// One row per job; ownership is carried by `locked_by` / `locked_at`
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub job_type: String,
    pub target_id: String,
    pub target_name: Option<String>,
    pub status: String,
    pub priority: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub payload: Option<String>,
    pub next_run_at: Option<DateTimeUtc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTimeUtc>,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub attempt_count: i32,
    pub max_attempts: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub result: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
