//! Order entity - A customer checkout aggregate.
//!
//! Orders progress `OPEN -> PENDING_TRANSACTION -> PAID`, with a rollback edge
//! from `PENDING_TRANSACTION` back to `OPEN`. Totals are in cents and are
//! recomputed from the items every time an item is added or removed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Items may be added or removed; the order may be deleted
    #[sea_orm(string_value = "OPEN")]
    Open,
    /// Stock has been taken; waiting for the payment terminal
    #[sea_orm(string_value = "PENDING_TRANSACTION")]
    PendingTransaction,
    /// Terminal state
    #[sea_orm(string_value = "PAID")]
    Paid,
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Open => "OPEN",
            Self::PendingTransaction => "PENDING_TRANSACTION",
            Self::Paid => "PAID",
        };
        f.write_str(label)
    }
}

/// Order database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable identifier derived from the creation date and the row id
    #[sea_orm(unique)]
    pub order_uid: String,
    /// Current lifecycle state
    pub state: OrderState,
    /// Sum of item totals, in cents
    pub subtotal: i64,
    /// Tax computed on the subtotal, in cents
    pub tax: i64,
    /// `subtotal + tax`, in cents
    pub total: i64,
    /// When the order was created
    pub created_at: DateTimeUtc,
    /// When the order was paid
    pub closed_at: Option<DateTimeUtc>,
}

/// Defines relationships between Order and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One order has many items
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
    /// Payment transactions opened for the order
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
