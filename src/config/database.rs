//! Database configuration module.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated with `Schema::create_table_from_entity` so the schema
//! always matches the entity definitions, and are created in foreign-key order.

use crate::config::settings::AdjustmentReasonConfig;
use crate::entities::{
    AdjustmentReason, Author, Book, InventoryAdjustment, Invoice, InvoiceItem, Order, OrderItem,
    Publisher, Transaction, Vendor, adjustment_reason,
};
use crate::errors::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema, Set};
use tracing::info;

/// Establishes a connection to the database at `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates all necessary database tables if they do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut statements = vec![
        schema.create_table_from_entity(Author),
        schema.create_table_from_entity(Publisher),
        schema.create_table_from_entity(Vendor),
        schema.create_table_from_entity(AdjustmentReason),
        schema.create_table_from_entity(Book),
        schema.create_table_from_entity(Order),
        schema.create_table_from_entity(OrderItem),
        schema.create_table_from_entity(Transaction),
        schema.create_table_from_entity(Invoice),
        schema.create_table_from_entity(InvoiceItem),
        schema.create_table_from_entity(InventoryAdjustment),
    ];

    for statement in &mut statements {
        db.execute(builder.build(statement.if_not_exists())).await?;
    }

    info!("Database tables ensured");
    Ok(())
}

/// Inserts configured adjustment reasons, leaving existing codes untouched.
pub async fn seed_adjustment_reasons(
    db: &DatabaseConnection,
    reasons: &[AdjustmentReasonConfig],
) -> Result<()> {
    if reasons.is_empty() {
        return Ok(());
    }

    let rows = reasons.iter().map(|reason| adjustment_reason::ActiveModel {
        id: Set(reason.code),
        label: Set(reason.label.clone()),
    });

    AdjustmentReason::insert_many(rows)
        .on_conflict(
            OnConflict::column(adjustment_reason::Column::Id)
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(db)
        .await?;

    info!(count = reasons.len(), "Adjustment reasons seeded");
    Ok(())
}
