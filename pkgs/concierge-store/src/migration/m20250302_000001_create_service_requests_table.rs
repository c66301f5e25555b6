use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum ServiceRequests {
    Table,
    Id,
    GuestId,
    HotelId,
    RequestType,
    Description,
    Status,
    CreatedAt,
    UpdatedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250302_000001_create_service_requests_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceRequests::Table)
                    .col(
                        ColumnDef::new(ServiceRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ServiceRequests::GuestId).string().not_null())
                    .col(ColumnDef::new(ServiceRequests::HotelId).string().not_null())
                    .col(
                        ColumnDef::new(ServiceRequests::RequestType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ServiceRequests::Description).string())
                    .col(
                        ColumnDef::new(ServiceRequests::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ServiceRequests::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceRequests::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_requests_guest_status")
                    .table(ServiceRequests::Table)
                    .col(ServiceRequests::GuestId)
                    .col(ServiceRequests::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceRequests::Table).to_owned())
            .await
    }
}
