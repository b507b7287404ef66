//! Inventory adjustment entity - Append-only audit trail of manual quantity sets.
//!
//! Rows are written together with the quantity update they describe and are
//! never updated or deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Inventory adjustment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_adjustments")]
pub struct Model {
    /// Unique identifier for the audit row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Adjusted book
    pub book_id: i64,
    /// Reason code for the correction
    pub reason_id: i64,
    /// Quantity before the correction
    pub previous_quantity: i64,
    /// Quantity after the correction
    pub quantity: i64,
    /// When the correction happened
    pub created_at: DateTimeUtc,
}

/// Defines relationships between InventoryAdjustment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each adjustment targets one book
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id"
    )]
    Book,
    /// Each adjustment cites one reason
    #[sea_orm(
        belongs_to = "super::adjustment_reason::Entity",
        from = "Column::ReasonId",
        to = "super::adjustment_reason::Column::Id"
    )]
    Reason,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl Related<super::adjustment_reason::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reason.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
