//! SeaORM migrations for multi-database support
//!
//! Migrations are database-agnostic and run against SQLite, PostgreSQL and
//! MySQL. Column types that differ per backend are chosen inside the
//! migration helpers.

use sea_orm_migration::prelude::*;

pub mod m20251019_000001_create_job_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20251019_000001_create_job_tables::Migration)]
    }
}
