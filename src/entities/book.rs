//! Book entity - The catalog item whose on-hand quantity the inventory ledger owns.
//!
//! `quantity` is signed: checkout decrements are allowed to push it below zero.
//! Nothing outside `core::inventory` writes to it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Book database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "books")]
pub struct Model {
    /// Unique identifier for the book
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ISBN, the natural key used when restocking from invoices
    #[sea_orm(unique)]
    pub isbn: String,
    /// Title as printed
    pub title: String,
    /// Author of the book
    pub author_id: i64,
    /// Publisher of the book
    pub publisher_id: i64,
    /// Retail price in cents, snapshotted into order items when sold
    pub retail_price: i64,
    /// On-hand quantity, may be negative
    pub quantity: i64,
}

/// Defines relationships between Book and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each book has one author
    #[sea_orm(
        belongs_to = "super::author::Entity",
        from = "Column::AuthorId",
        to = "super::author::Column::Id"
    )]
    Author,
    /// Each book has one publisher
    #[sea_orm(
        belongs_to = "super::publisher::Entity",
        from = "Column::PublisherId",
        to = "super::publisher::Column::Id"
    )]
    Publisher,
    /// Manual quantity corrections recorded for this book
    #[sea_orm(has_many = "super::inventory_adjustment::Entity")]
    Adjustments,
}

impl Related<super::author::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl Related<super::publisher::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Publisher.def()
    }
}

impl Related<super::inventory_adjustment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Adjustments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
