//! Invoice entity - A vendor shipment used to restock inventory.
//!
//! Invoices start open (`is_completed = false`). Completing one pushes every
//! item's quantity into the ledger and stamps `date_received`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Invoice database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    /// Unique identifier for the invoice
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Vendor that shipped the invoice
    pub vendor_id: i64,
    /// Set once the shipment has been received into stock
    pub is_completed: bool,
    /// When the shipment was received; only set on completion
    pub date_received: Option<DateTimeUtc>,
    /// Total units across all items
    pub total_quantity: i64,
    /// Total discounted cost across all items, in cents
    pub total_cost: i64,
    /// When the invoice was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Invoice and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each invoice belongs to one vendor
    #[sea_orm(
        belongs_to = "super::vendor::Entity",
        from = "Column::VendorId",
        to = "super::vendor::Column::Id"
    )]
    Vendor,
    /// One invoice has many items
    #[sea_orm(has_many = "super::invoice_item::Entity")]
    Items,
}

impl Related<super::vendor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vendor.def()
    }
}

impl Related<super::invoice_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
