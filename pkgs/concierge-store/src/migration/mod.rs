//! Sea-ORM migrations for concierge-store database schema

pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_guest_conversation_table;
mod m20250301_000002_create_guest_messages_table;
mod m20250302_000001_create_service_requests_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_guest_conversation_table::Migration),
            Box::new(m20250301_000002_create_guest_messages_table::Migration),
            Box::new(m20250302_000001_create_service_requests_table::Migration),
        ]
    }
}
