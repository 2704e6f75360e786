//! Knowledge base entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Where a knowledge base's text comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Website,
    Files,
    Text,
    Database,
}

impl From<String> for SourceType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "website" => SourceType::Website,
            "files" => SourceType::Files,
            "database" => SourceType::Database,
            _ => SourceType::Text,
        }
    }
}

impl From<SourceType> for String {
    fn from(source: SourceType) -> Self {
        match source {
            SourceType::Website => "website".to_string(),
            SourceType::Files => "files".to_string(),
            SourceType::Text => "text".to_string(),
            SourceType::Database => "database".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "knowledge_bases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub agent_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// Stored as text; see [`SourceType`]
    #[sea_orm(column_name = "type", column_type = "Text")]
    pub source_type: String,

    /// Full extracted text, populated once processed
    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,

    pub processed: bool,

    /// Timestamps, content length, hash and source identifiers
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::agent::Entity",
        from = "Column::AgentId",
        to = "super::agent::Column::Id",
        on_delete = "Cascade"
    )]
    Agent,

    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunks,
}

impl Related<super::agent::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agent.def()
    }
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Get the source type as an enum
    pub fn source(&self) -> SourceType {
        SourceType::from(self.source_type.clone())
    }
}
