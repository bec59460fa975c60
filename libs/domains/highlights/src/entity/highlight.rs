use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

use crate::models::Highlight;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "highlight")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    #[sea_orm(column_type = "Text")]
    pub text: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub source_type: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub source_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub source_author: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub source_title: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub source_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub category: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    pub location: Option<i32>,
    pub highlighted_at: Option<DateTimeUtc>,
    pub updated_at: Option<DateTimeUtc>,
    pub tags: Option<Vec<String>>,
    #[sea_orm(column_type = "Vector(None)", nullable)]
    pub embedding: Option<PgVector>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Highlight {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            text: model.text,
            source_type: model.source_type,
            source_id: model.source_id,
            source_author: model.source_author,
            source_title: model.source_title,
            source_url: model.source_url,
            category: model.category,
            note: model.note,
            location: model.location,
            highlighted_at: model.highlighted_at,
            updated_at: model.updated_at,
            tags: model.tags.unwrap_or_default(),
            embedding: model.embedding.map(|v| v.to_vec()),
        }
    }
}

impl From<&Highlight> for ActiveModel {
    fn from(highlight: &Highlight) -> Self {
        ActiveModel {
            id: Set(highlight.id),
            text: Set(highlight.text.clone()),
            source_type: Set(highlight.source_type.clone()),
            source_id: Set(highlight.source_id.clone()),
            source_author: Set(highlight.source_author.clone()),
            source_title: Set(highlight.source_title.clone()),
            source_url: Set(highlight.source_url.clone()),
            category: Set(highlight.category.clone()),
            note: Set(highlight.note.clone()),
            location: Set(highlight.location),
            highlighted_at: Set(highlight.highlighted_at),
            updated_at: Set(highlight.updated_at),
            tags: Set(Some(highlight.tags.clone())),
            embedding: Set(highlight.embedding.clone().map(PgVector::from)),
        }
    }
}

/// Every column the upsert overwrites on conflict
pub const MUTABLE_COLUMNS: [Column; 13] = [
    Column::Text,
    Column::SourceType,
    Column::SourceId,
    Column::SourceAuthor,
    Column::SourceTitle,
    Column::SourceUrl,
    Column::Category,
    Column::Note,
    Column::Location,
    Column::HighlightedAt,
    Column::UpdatedAt,
    Column::Tags,
    Column::Embedding,
];
