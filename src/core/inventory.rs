//! Inventory ledger - The single writer of per-book on-hand quantity.
//!
//! Two primitives exist. [`adjust_quantity`] applies a signed delta inside the
//! caller's transaction and is what checkout and restocking use; the result may
//! go negative. [`set_quantity`] is a manual correction that must be
//! non-negative and always writes an audit row in the same transaction.

use crate::{
    core::{
        pagination::{Page, PageArgs, paginate},
        storage::begin_serializable,
    },
    entities::{AdjustmentReason, Book, InventoryAdjustment, book, inventory_adjustment},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Parses a user-supplied quantity, rejecting anything that is not a whole number.
pub fn parse_quantity(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Error::validation(format!("Quantity must be a whole number, got '{raw}'")))
}

/// Adds `delta` to a book's quantity with a single `UPDATE`.
///
/// Runs on whatever connection or transaction it is given; the caller owns the
/// transaction boundary. Negative results are accepted.
pub async fn adjust_quantity<C>(db: &C, book_id: i64, delta: i64) -> Result<book::Model>
where
    C: ConnectionTrait,
{
    use sea_orm::sea_query::Expr;

    Book::find_by_id(book_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Book", book_id))?;

    // quantity = quantity + delta
    Book::update_many()
        .col_expr(
            book::Column::Quantity,
            Expr::col(book::Column::Quantity).add(delta),
        )
        .filter(book::Column::Id.eq(book_id))
        .exec(db)
        .await?;

    debug!(book_id, delta, "Adjusted book quantity");

    Book::find_by_id(book_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Book", book_id))
}

/// Applies one delta per book, in ascending book id order.
pub async fn apply_deltas<C>(db: &C, deltas: &BTreeMap<i64, i64>) -> Result<()>
where
    C: ConnectionTrait,
{
    for (&book_id, &delta) in deltas {
        adjust_quantity(db, book_id, delta).await?;
    }
    Ok(())
}

/// Sets a book's quantity to an absolute value and records why.
///
/// The quantity update and the audit row are written in one serializable
/// transaction. An unknown book or reason code aborts the whole operation.
#[instrument(skip(db))]
pub async fn set_quantity(
    db: &DatabaseConnection,
    book_id: i64,
    new_quantity: i64,
    reason_code: i64,
) -> Result<book::Model> {
    if new_quantity < 0 {
        return Err(Error::NegativeQuantity {
            quantity: new_quantity,
        });
    }

    let txn = begin_serializable(db).await?;

    let book = Book::find_by_id(book_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Book", book_id))?;

    AdjustmentReason::find_by_id(reason_code)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("AdjustmentReason", reason_code))?;

    let previous_quantity = book.quantity;
    let mut active_model: book::ActiveModel = book.into();
    active_model.quantity = Set(new_quantity);
    let updated = active_model.update(&txn).await?;

    inventory_adjustment::ActiveModel {
        book_id: Set(book_id),
        reason_id: Set(reason_code),
        previous_quantity: Set(previous_quantity),
        quantity: Set(new_quantity),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
        book_id,
        previous_quantity, new_quantity, reason_code, "Book quantity set manually"
    );
    Ok(updated)
}

/// Lists the audit trail for one book, oldest first.
pub async fn list_adjustments_for_book(
    db: &DatabaseConnection,
    book_id: i64,
    args: &PageArgs,
) -> Result<Page<inventory_adjustment::Model>> {
    let query =
        InventoryAdjustment::find().filter(inventory_adjustment::Column::BookId.eq(book_id));
    paginate(db, query, inventory_adjustment::Column::Id, args).await
}
