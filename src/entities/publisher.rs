//! Publisher entity - Book publishers, keyed naturally by name.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Publisher database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "publishers")]
pub struct Model {
    /// Unique identifier for the publisher
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Publisher name
    #[sea_orm(unique)]
    pub name: String,
}

/// Defines relationships between Publisher and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One publisher has many books
    #[sea_orm(has_many = "super::book::Entity")]
    Books,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Books.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
