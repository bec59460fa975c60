pub use sea_orm_migration::prelude::*;

mod m20250301_000000_enable_pgvector;
mod m20250301_000001_create_highlight;
mod m20250301_000002_create_sync_state;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000000_enable_pgvector::Migration),
            Box::new(m20250301_000001_create_highlight::Migration),
            Box::new(m20250301_000002_create_sync_state::Migration),
        ]
    }
}
