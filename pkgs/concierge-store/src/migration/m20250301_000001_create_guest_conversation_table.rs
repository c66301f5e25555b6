use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum GuestConversation {
    Table,
    Id,
    GuestId,
    HotelId,
    CreatedAt,
    LastMessageAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000001_create_guest_conversation_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GuestConversation::Table)
                    .col(
                        ColumnDef::new(GuestConversation::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GuestConversation::GuestId).string().not_null())
                    .col(ColumnDef::new(GuestConversation::HotelId).string().not_null())
                    .col(
                        ColumnDef::new(GuestConversation::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GuestConversation::LastMessageAt).big_integer())
                    .to_owned(),
            )
            .await?;

        // One conversation per guest and hotel; concurrent creates collide here.
        manager
            .create_index(
                Index::create()
                    .name("idx_guest_conversation_guest_hotel")
                    .table(GuestConversation::Table)
                    .col(GuestConversation::GuestId)
                    .col(GuestConversation::HotelId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GuestConversation::Table).to_owned())
            .await
    }
}
