//! Conversation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub agent_id: Uuid,

    /// Client-supplied or generated visitor identifier
    #[sea_orm(column_type = "Text")]
    pub visitor_id: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub visitor_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub visitor_email: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub created_at: DateTimeWithTimeZone,
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

    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::agent::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agent.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
