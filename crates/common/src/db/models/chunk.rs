//! Chunk entity
//!
//! Stored in the `embeddings` table for compatibility with the dashboard,
//! but only passage text is kept. No vector is computed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "embeddings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub knowledge_base_id: Uuid,

    /// Ordinal position within the knowledge base
    pub chunk_index: i32,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Source identifier (url or file name) and chunk index
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::knowledge_base::Entity",
        from = "Column::KnowledgeBaseId",
        to = "super::knowledge_base::Column::Id",
        on_delete = "Cascade"
    )]
    KnowledgeBase,
}

impl Related<super::knowledge_base::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KnowledgeBase.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
