use sea_orm::entity::prelude::*;

use crate::models::SyncState;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub service: String,
    pub last_synced_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for SyncState {
    fn from(model: Model) -> Self {
        Self {
            service: model.service,
            last_synced_at: model.last_synced_at,
        }
    }
}
