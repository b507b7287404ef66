//! Order state machine - Customer checkout from cart to payment.
//!
//! ```text
//! OPEN --move_to_pending_transaction--> PENDING_TRANSACTION --move_to_paid--> PAID
//!   ^                                          |
//!   +-------------move_to_open-----------------+
//! ```
//!
//! Moving to `PENDING_TRANSACTION` takes the order's books out of stock,
//! aggregated so each book receives exactly one update; moving back to `OPEN`
//! puts the same amounts back. Every transition runs in one serializable
//! transaction and checks the source state before writing anything.

use crate::{
    core::{
        inventory::apply_deltas,
        pagination::{Page, PageArgs, paginate},
        storage::begin_serializable,
    },
    entities::{
        Book, Order, OrderItem, OrderState, ProductType, Transaction, order, order_item,
        transaction,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// An order together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    /// The order row
    pub order: order::Model,
    /// Items in insertion order
    pub items: Vec<order_item::Model>,
}

/// Tax on `subtotal` at `tax_rate_bps` basis points, rounded half up to the cent.
#[must_use]
pub fn compute_tax(subtotal: i64, tax_rate_bps: u32) -> i64 {
    let scaled = i128::from(subtotal) * i128::from(tax_rate_bps);
    let rounded = if scaled >= 0 {
        (scaled + 5_000) / 10_000
    } else {
        (scaled - 5_000) / 10_000
    };
    i64::try_from(rounded).unwrap_or(i64::MAX)
}

/// Sums item quantities per book.
///
/// Lines for products the ledger does not track are skipped with a warning.
#[must_use]
pub fn aggregate_book_quantities(items: &[order_item::Model]) -> BTreeMap<i64, i64> {
    let mut totals = BTreeMap::new();
    for item in items {
        match (item.product_type, item.book_id) {
            (ProductType::Book, Some(book_id)) => {
                *totals.entry(book_id).or_insert(0) += item.quantity;
            }
            (ProductType::Book, None) => {
                warn!(item_id = item.id, "Book line without a book reference, skipping");
            }
            (product_type, _) => {
                warn!(
                    item_id = item.id,
                    ?product_type,
                    "Unsupported product type for stock tracking, skipping"
                );
            }
        }
    }
    totals
}

fn ensure_state(order: &order::Model, expected: OrderState, action: &str) -> Result<()> {
    if order.state == expected {
        Ok(())
    } else {
        Err(Error::bad_request(format!(
            "Cannot {action}: order {} is {}, expected {expected}",
            order.order_uid, order.state
        )))
    }
}

pub(crate) async fn find_order_by_uid<C>(db: &C, order_uid: &str) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    Order::find()
        .filter(order::Column::OrderUid.eq(order_uid))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Order", order_uid))
}

async fn load_items<C>(db: &C, order_id: i64) -> Result<Vec<order_item::Model>>
where
    C: ConnectionTrait,
{
    OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Recomputes subtotal, tax and total from the stored items.
async fn recompute_totals<C>(db: &C, order: order::Model, tax_rate_bps: u32) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    let items = load_items(db, order.id).await?;
    let subtotal: i64 = items.iter().map(|item| item.total).sum();
    let tax = compute_tax(subtotal, tax_rate_bps);

    let mut active_model: order::ActiveModel = order.into();
    active_model.subtotal = Set(subtotal);
    active_model.tax = Set(tax);
    active_model.total = Set(subtotal + tax);
    active_model.update(db).await.map_err(Into::into)
}

async fn set_state<C>(db: &C, order: order::Model, state: OrderState) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    let mut active_model: order::ActiveModel = order.into();
    active_model.state = Set(state);
    if state == OrderState::Paid {
        active_model.closed_at = Set(Some(Utc::now()));
    }
    active_model.update(db).await.map_err(Into::into)
}

/// Creates an empty OPEN order.
///
/// The uid is derived from the creation date and the new row id, so the row
/// is inserted first with a placeholder and then renamed in the same
/// transaction.
#[instrument(skip(db))]
pub async fn create_order(db: &DatabaseConnection) -> Result<order::Model> {
    let txn = begin_serializable(db).await?;
    let now = Utc::now();

    let inserted = order::ActiveModel {
        order_uid: Set(uuid::Uuid::new_v4().to_string()),
        state: Set(OrderState::Open),
        subtotal: Set(0),
        tax: Set(0),
        total: Set(0),
        created_at: Set(now),
        closed_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let order_uid = format!("{}-{:04}", now.format("%Y%m%d"), inserted.id);
    let mut active_model: order::ActiveModel = inserted.into();
    active_model.order_uid = Set(order_uid);
    let order = active_model.update(&txn).await?;

    txn.commit().await?;
    info!(order_uid = %order.order_uid, "Order created");
    Ok(order)
}

/// Looks up an order by its uid.
pub async fn get_order_by_uid(
    db: &DatabaseConnection,
    order_uid: &str,
) -> Result<Option<order::Model>> {
    Order::find()
        .filter(order::Column::OrderUid.eq(order_uid))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads an order and all of its items.
pub async fn get_order_details(db: &DatabaseConnection, order_uid: &str) -> Result<OrderDetails> {
    let order = find_order_by_uid(db, order_uid).await?;
    let items = load_items(db, order.id).await?;
    Ok(OrderDetails { order, items })
}

/// Adds `quantity` copies of a book to an OPEN order.
///
/// The book's current retail price is copied onto the item, and the order
/// totals are recomputed in the same transaction.
#[instrument(skip(db))]
pub async fn add_order_item(
    db: &DatabaseConnection,
    tax_rate_bps: u32,
    order_uid: &str,
    book_id: i64,
    quantity: i64,
) -> Result<OrderDetails> {
    if quantity <= 0 {
        return Err(Error::validation("Item quantity must be greater than zero"));
    }

    let txn = begin_serializable(db).await?;

    let order = find_order_by_uid(&txn, order_uid).await?;
    ensure_state(&order, OrderState::Open, "add items")?;

    let book = Book::find_by_id(book_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Book", book_id))?;

    let total = book
        .retail_price
        .checked_mul(quantity)
        .ok_or_else(|| Error::validation("Item total is too large"))?;

    order_item::ActiveModel {
        order_id: Set(order.id),
        product_type: Set(ProductType::Book),
        book_id: Set(Some(book.id)),
        quantity: Set(quantity),
        unit_price: Set(book.retail_price),
        total: Set(total),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let order = recompute_totals(&txn, order, tax_rate_bps).await?;
    let items = load_items(&txn, order.id).await?;
    txn.commit().await?;

    Ok(OrderDetails { order, items })
}

/// Removes one item from an OPEN order and recomputes the totals.
#[instrument(skip(db))]
pub async fn remove_order_item(
    db: &DatabaseConnection,
    tax_rate_bps: u32,
    order_uid: &str,
    item_id: i64,
) -> Result<OrderDetails> {
    let txn = begin_serializable(db).await?;

    let order = find_order_by_uid(&txn, order_uid).await?;
    ensure_state(&order, OrderState::Open, "remove items")?;

    let item = OrderItem::find_by_id(item_id)
        .filter(order_item::Column::OrderId.eq(order.id))
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("OrderItem", item_id))?;
    item.delete(&txn).await?;

    let order = recompute_totals(&txn, order, tax_rate_bps).await?;
    let items = load_items(&txn, order.id).await?;
    txn.commit().await?;

    Ok(OrderDetails { order, items })
}

pub(crate) async fn pending_from_open<C>(db: &C, order: order::Model) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    ensure_state(&order, OrderState::Open, "move to PENDING_TRANSACTION")?;

    let items = load_items(db, order.id).await?;
    let decrements: BTreeMap<i64, i64> = aggregate_book_quantities(&items)
        .into_iter()
        .map(|(book_id, quantity)| (book_id, -quantity))
        .collect();
    apply_deltas(db, &decrements).await?;

    set_state(db, order, OrderState::PendingTransaction).await
}

pub(crate) async fn open_from_pending<C>(db: &C, order: order::Model) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    ensure_state(&order, OrderState::PendingTransaction, "move to OPEN")?;

    let items = load_items(db, order.id).await?;
    let restores = aggregate_book_quantities(&items);
    apply_deltas(db, &restores).await?;

    set_state(db, order, OrderState::Open).await
}

pub(crate) async fn paid_from_pending<C>(db: &C, order: order::Model) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    ensure_state(&order, OrderState::PendingTransaction, "move to PAID")?;
    set_state(db, order, OrderState::Paid).await
}

/// OPEN -> PENDING_TRANSACTION, taking the ordered books out of stock.
///
/// Stock may go negative; selling a book the system thinks is out of stock
/// is allowed.
#[instrument(skip(db))]
pub async fn move_to_pending_transaction(
    db: &DatabaseConnection,
    order_uid: &str,
) -> Result<order::Model> {
    let txn = begin_serializable(db).await?;
    let order = find_order_by_uid(&txn, order_uid).await?;
    let order = pending_from_open(&txn, order).await?;
    txn.commit().await?;

    info!(order_uid, "Order moved to PENDING_TRANSACTION");
    Ok(order)
}

/// PENDING_TRANSACTION -> OPEN, returning the books to stock.
#[instrument(skip(db))]
pub async fn move_to_open(db: &DatabaseConnection, order_uid: &str) -> Result<order::Model> {
    let txn = begin_serializable(db).await?;
    let order = find_order_by_uid(&txn, order_uid).await?;
    let order = open_from_pending(&txn, order).await?;
    txn.commit().await?;

    info!(order_uid, "Order moved back to OPEN");
    Ok(order)
}

/// PENDING_TRANSACTION -> PAID, stamping the closed time.
#[instrument(skip(db))]
pub async fn move_to_paid(db: &DatabaseConnection, order_uid: &str) -> Result<order::Model> {
    let txn = begin_serializable(db).await?;
    let order = find_order_by_uid(&txn, order_uid).await?;
    let order = paid_from_pending(&txn, order).await?;
    txn.commit().await?;

    info!(order_uid, "Order paid");
    Ok(order)
}

/// Deletes an OPEN order with its items and any cancelled transactions.
#[instrument(skip(db))]
pub async fn delete_order(db: &DatabaseConnection, order_uid: &str) -> Result<()> {
    let txn = begin_serializable(db).await?;
    let order = find_order_by_uid(&txn, order_uid).await?;
    ensure_state(&order, OrderState::Open, "delete order")?;

    OrderItem::delete_many()
        .filter(order_item::Column::OrderId.eq(order.id))
        .exec(&txn)
        .await?;
    Transaction::delete_many()
        .filter(transaction::Column::OrderId.eq(order.id))
        .exec(&txn)
        .await?;
    order.delete(&txn).await?;

    txn.commit().await?;
    info!(order_uid, "Order deleted");
    Ok(())
}

/// Lists orders, oldest first.
pub async fn list_orders(db: &DatabaseConnection, args: &PageArgs) -> Result<Page<order::Model>> {
    paginate(db, Order::find(), order::Column::Id, args).await
}

/// Lists one order's items.
pub async fn list_order_items(
    db: &DatabaseConnection,
    order_uid: &str,
    args: &PageArgs,
) -> Result<Page<order_item::Model>> {
    let order = find_order_by_uid(db, order_uid).await?;
    let query = OrderItem::find().filter(order_item::Column::OrderId.eq(order.id));
    paginate(db, query, order_item::Column::Id, args).await
}
