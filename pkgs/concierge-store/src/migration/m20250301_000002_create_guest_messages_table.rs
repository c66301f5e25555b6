use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum GuestMessages {
    Table,
    Id,
    ConversationId,
    GuestId,
    HotelId,
    SenderType,
    MessageText,
    TranslatedText,
    IsTranslated,
    OriginalLanguage,
    TargetLanguage,
    Sentiment,
    Urgency,
    Topic,
    Subtopic,
    IsRead,
    CreatedAt,
    CreatedBy,
}

#[derive(DeriveIden)]
enum GuestConversation {
    Table,
    Id,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000002_create_guest_messages_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GuestMessages::Table)
                    .col(
                        ColumnDef::new(GuestMessages::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GuestMessages::ConversationId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GuestMessages::GuestId).string().not_null())
                    .col(ColumnDef::new(GuestMessages::HotelId).string().not_null())
                    .col(ColumnDef::new(GuestMessages::SenderType).string().not_null())
                    .col(ColumnDef::new(GuestMessages::MessageText).string().not_null())
                    .col(ColumnDef::new(GuestMessages::TranslatedText).string())
                    .col(
                        ColumnDef::new(GuestMessages::IsTranslated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(GuestMessages::OriginalLanguage)
                            .string()
                            .not_null()
                            .default("en"),
                    )
                    .col(ColumnDef::new(GuestMessages::TargetLanguage).string())
                    .col(ColumnDef::new(GuestMessages::Sentiment).string())
                    .col(ColumnDef::new(GuestMessages::Urgency).string())
                    .col(ColumnDef::new(GuestMessages::Topic).string())
                    .col(ColumnDef::new(GuestMessages::Subtopic).string())
                    .col(
                        ColumnDef::new(GuestMessages::IsRead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(GuestMessages::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GuestMessages::CreatedBy).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_guest_messages_conversation")
                            .from(GuestMessages::Table, GuestMessages::ConversationId)
                            .to(GuestConversation::Table, GuestConversation::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_guest_messages_conversation_created")
                    .table(GuestMessages::Table)
                    .col(GuestMessages::ConversationId)
                    .col(GuestMessages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_guest_messages_guest_unread")
                    .table(GuestMessages::Table)
                    .col(GuestMessages::GuestId)
                    .col(GuestMessages::IsRead)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GuestMessages::Table).to_owned())
            .await
    }
}
