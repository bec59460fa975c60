use sea_orm_migration::{prelude::*, schema::*};

/// Embedding width of the provider model (text-embedding-3-large)
const EMBEDDING_DIMENSIONS: u32 = 3072;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Highlight::Table)
                    .if_not_exists()
                    .col(big_integer(Highlight::Id).primary_key())
                    .col(text(Highlight::Text))
                    .col(text_null(Highlight::SourceType))
                    .col(text_null(Highlight::SourceId))
                    .col(text_null(Highlight::SourceAuthor))
                    .col(text_null(Highlight::SourceTitle))
                    .col(text_null(Highlight::SourceUrl))
                    .col(text_null(Highlight::Category))
                    .col(text_null(Highlight::Note))
                    .col(integer_null(Highlight::Location))
                    .col(timestamp_with_time_zone_null(Highlight::HighlightedAt))
                    .col(timestamp_with_time_zone_null(Highlight::UpdatedAt))
                    .col(ColumnDef::new(Highlight::Tags).array(ColumnType::Text).null())
                    .col(
                        ColumnDef::new(Highlight::Embedding)
                            .custom(Alias::new(format!("vector({EMBEDDING_DIMENSIONS})")))
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_highlight_source_type")
                    .table(Highlight::Table)
                    .col(Highlight::SourceType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_highlight_source_author")
                    .table(Highlight::Table)
                    .col(Highlight::SourceAuthor)
                    .to_owned(),
            )
            .await?;

        // GIN index backs the `tags && $n` overlap filter
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_highlight_tags ON highlight USING GIN (tags)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Highlight::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Highlight {
    Table,
    Id,
    Text,
    SourceType,
    SourceId,
    SourceAuthor,
    SourceTitle,
    SourceUrl,
    Category,
    Note,
    Location,
    HighlightedAt,
    UpdatedAt,
    Tags,
    Embedding,
}
