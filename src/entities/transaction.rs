//! Transaction entity - One payment-terminal checkout session for an order.
//!
//! An order has at most one transaction that is not `CANCELLED`; a cancelled
//! checkout stays on record and a fresh one may be opened after it.
//! `transaction_uid` doubles as the idempotency key sent to the terminal, and
//! `amount` is the order total at the moment the transaction was opened.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment status; `COMPLETE` and `CANCELLED` are terminal
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Waiting on the customer at the terminal
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Payment captured
    #[sea_orm(string_value = "COMPLETE")]
    Complete,
    /// Checkout cancelled at the terminal
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl TransactionStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Opaque identifier, also the terminal idempotency key
    #[sea_orm(unique)]
    pub transaction_uid: String,
    /// Owning order
    pub order_id: i64,
    /// Current payment status
    pub status: TransactionStatus,
    /// Checkout id returned by the payment terminal
    pub checkout_id: Option<String>,
    /// Payment type reported by the terminal once known (e.g. `CARD_PRESENT`)
    pub payment_type: Option<String>,
    /// Amount requested, in cents
    pub amount: i64,
    /// When the transaction was opened
    pub created_at: DateTimeUtc,
    /// When the status last changed
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
