//! Order item entity - One line of an order.
//!
//! `unit_price` is a snapshot of the book's retail price at the time the item
//! was added and is never updated afterwards.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of product an order line refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    /// A catalog book tracked by the inventory ledger
    #[sea_orm(string_value = "BOOK")]
    Book,
    /// Non-book merchandise; not stock-tracked yet
    #[sea_orm(string_value = "MERCHANDISE")]
    Merchandise,
}

/// Order item database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    /// Unique identifier for the item
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning order
    pub order_id: i64,
    /// What kind of product this line sells
    pub product_type: ProductType,
    /// Referenced book for `BOOK` lines
    pub book_id: Option<i64>,
    /// Units sold
    pub quantity: i64,
    /// Price per unit in cents at the time of addition
    pub unit_price: i64,
    /// `quantity * unit_price`, in cents
    pub total: i64,
}

/// Defines relationships between OrderItem and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each item belongs to one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
    /// Each book line references one book
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id"
    )]
    Book,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
