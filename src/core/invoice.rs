//! Invoice workflow - Restocking inventory from vendor shipments.
//!
//! Items can be added to or removed from an invoice while it is open; each
//! change recomputes the invoice totals in the same transaction. Completing an
//! invoice pushes every item's quantity into the ledger, marks it completed
//! and stamps `date_received`. A completed invoice is frozen.

use crate::{
    core::{
        catalog::{BookDetails, upsert_book_by_isbn},
        inventory::apply_deltas,
        pagination::{Page, PageArgs, paginate},
        storage::{DEFAULT_RETRY_ATTEMPTS, begin_serializable, with_retry},
    },
    entities::{Invoice, InvoiceItem, Vendor, invoice, invoice_item},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Largest vendor discount, in basis points (100%).
const MAX_DISCOUNT_BPS: u32 = 10_000;

/// One line of a vendor shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    /// Book as described on the invoice; created if its ISBN is unknown
    pub book: BookDetails,
    /// Units received
    pub quantity: i64,
    /// Vendor discount off retail, in basis points
    pub discount_bps: u32,
}

impl NewInvoiceItem {
    fn validate(&self) -> Result<()> {
        if self.quantity <= 0 {
            return Err(Error::validation("Invoice item quantity must be greater than zero"));
        }
        if self.discount_bps > MAX_DISCOUNT_BPS {
            return Err(Error::validation(format!(
                "Discount of {} bps exceeds 100%",
                self.discount_bps
            )));
        }
        if self.book.retail_price < 0 {
            return Err(Error::validation("Retail price cannot be negative"));
        }
        Ok(())
    }

    /// Per-unit cost after discount, rounded half up to the cent.
    #[must_use]
    pub fn item_cost(&self) -> i64 {
        let kept = i128::from(MAX_DISCOUNT_BPS - self.discount_bps.min(MAX_DISCOUNT_BPS));
        let cost = (i128::from(self.book.retail_price) * kept + 5_000) / 10_000;
        i64::try_from(cost).unwrap_or(i64::MAX)
    }
}

/// An invoice together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDetails {
    /// The invoice row
    pub invoice: invoice::Model,
    /// Items in insertion order
    pub items: Vec<invoice_item::Model>,
}

async fn find_invoice<C>(db: &C, invoice_id: i64) -> Result<invoice::Model>
where
    C: ConnectionTrait,
{
    Invoice::find_by_id(invoice_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Invoice", invoice_id))
}

fn ensure_open(invoice: &invoice::Model) -> Result<()> {
    if invoice.is_completed {
        Err(Error::bad_request(format!(
            "Invoice {} is already completed",
            invoice.id
        )))
    } else {
        Ok(())
    }
}

async fn load_items<C>(db: &C, invoice_id: i64) -> Result<Vec<invoice_item::Model>>
where
    C: ConnectionTrait,
{
    InvoiceItem::find()
        .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(invoice_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn recompute_totals<C>(db: &C, invoice: invoice::Model) -> Result<InvoiceDetails>
where
    C: ConnectionTrait,
{
    let items = load_items(db, invoice.id).await?;
    let mut active_model: invoice::ActiveModel = invoice.into();
    active_model.total_quantity = Set(items.iter().map(|item| item.quantity).sum());
    active_model.total_cost = Set(items.iter().map(|item| item.total_cost).sum());
    let invoice = active_model.update(db).await?;
    Ok(InvoiceDetails { invoice, items })
}

async fn insert_item<C>(db: &C, invoice_id: i64, item: &NewInvoiceItem) -> Result<()>
where
    C: ConnectionTrait,
{
    let book = upsert_book_by_isbn(db, &item.book).await?;
    let item_cost = item.item_cost();
    let total_cost = item_cost
        .checked_mul(item.quantity)
        .ok_or_else(|| Error::validation("Invoice item total is too large"))?;

    invoice_item::ActiveModel {
        invoice_id: Set(invoice_id),
        book_id: Set(book.id),
        quantity: Set(item.quantity),
        item_cost: Set(item_cost),
        total_cost: Set(total_cost),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Opens an empty invoice for a vendor.
#[instrument(skip(db))]
pub async fn create_invoice(db: &DatabaseConnection, vendor_id: i64) -> Result<invoice::Model> {
    Vendor::find_by_id(vendor_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Vendor", vendor_id))?;

    let invoice = invoice::ActiveModel {
        vendor_id: Set(vendor_id),
        is_completed: Set(false),
        date_received: Set(None),
        total_quantity: Set(0),
        total_cost: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(invoice_id = invoice.id, vendor_id, "Invoice created");
    Ok(invoice)
}

/// Looks up an invoice by id.
pub async fn get_invoice(
    db: &DatabaseConnection,
    invoice_id: i64,
) -> Result<Option<invoice::Model>> {
    Invoice::find_by_id(invoice_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads an invoice and all of its items.
pub async fn get_invoice_details(
    db: &DatabaseConnection,
    invoice_id: i64,
) -> Result<InvoiceDetails> {
    let invoice = find_invoice(db, invoice_id).await?;
    let items = load_items(db, invoice.id).await?;
    Ok(InvoiceDetails { invoice, items })
}

/// Adds one line to an open invoice, creating the book if it is new.
#[instrument(skip(db, item), fields(isbn = %item.book.isbn))]
pub async fn add_invoice_item(
    db: &DatabaseConnection,
    invoice_id: i64,
    item: &NewInvoiceItem,
) -> Result<InvoiceDetails> {
    item.validate()?;

    let txn = begin_serializable(db).await?;
    let invoice = find_invoice(&txn, invoice_id).await?;
    ensure_open(&invoice)?;

    insert_item(&txn, invoice.id, item).await?;
    let details = recompute_totals(&txn, invoice).await?;
    txn.commit().await?;
    Ok(details)
}

/// Adds several lines at once, all or nothing.
///
/// Bulk entry contends with other writers on the same authors, publishers and
/// books, so the whole batch is retried on serialization conflicts.
#[instrument(skip(db, items), fields(count = items.len()))]
pub async fn add_invoice_items(
    db: &DatabaseConnection,
    invoice_id: i64,
    items: &[NewInvoiceItem],
) -> Result<InvoiceDetails> {
    for item in items {
        item.validate()?;
    }

    with_retry(DEFAULT_RETRY_ATTEMPTS, move || async move {
        let txn = begin_serializable(db).await?;
        let invoice = find_invoice(&txn, invoice_id).await?;
        ensure_open(&invoice)?;

        for item in items {
            insert_item(&txn, invoice.id, item).await?;
        }
        let details = recompute_totals(&txn, invoice).await?;
        txn.commit().await?;
        Ok(details)
    })
    .await
}

/// Removes one line from an open invoice.
#[instrument(skip(db))]
pub async fn remove_invoice_item(
    db: &DatabaseConnection,
    invoice_id: i64,
    item_id: i64,
) -> Result<InvoiceDetails> {
    let txn = begin_serializable(db).await?;
    let invoice = find_invoice(&txn, invoice_id).await?;
    ensure_open(&invoice)?;

    let item = InvoiceItem::find_by_id(item_id)
        .filter(invoice_item::Column::InvoiceId.eq(invoice.id))
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("InvoiceItem", item_id))?;
    item.delete(&txn).await?;

    let details = recompute_totals(&txn, invoice).await?;
    txn.commit().await?;
    Ok(details)
}

/// Receives an invoice into stock.
///
/// Quantities are summed per book and each book gets one ledger update.
#[instrument(skip(db))]
pub async fn complete_invoice(db: &DatabaseConnection, invoice_id: i64) -> Result<invoice::Model> {
    let txn = begin_serializable(db).await?;
    let invoice = find_invoice(&txn, invoice_id).await?;
    ensure_open(&invoice)?;

    let items = load_items(&txn, invoice.id).await?;
    let mut deltas: BTreeMap<i64, i64> = BTreeMap::new();
    for item in &items {
        *deltas.entry(item.book_id).or_insert(0) += item.quantity;
    }
    apply_deltas(&txn, &deltas).await?;

    let mut active_model: invoice::ActiveModel = invoice.into();
    active_model.is_completed = Set(true);
    active_model.date_received = Set(Some(Utc::now()));
    let completed = active_model.update(&txn).await?;

    txn.commit().await?;
    info!(
        invoice_id,
        books = deltas.len(),
        units = completed.total_quantity,
        "Invoice received into stock"
    );
    Ok(completed)
}

/// Lists invoices, oldest first.
pub async fn list_invoices(
    db: &DatabaseConnection,
    args: &PageArgs,
) -> Result<Page<invoice::Model>> {
    paginate(db, Invoice::find(), invoice::Column::Id, args).await
}

/// Lists one invoice's items.
pub async fn list_invoice_items(
    db: &DatabaseConnection,
    invoice_id: i64,
    args: &PageArgs,
) -> Result<Page<invoice_item::Model>> {
    let invoice = find_invoice(db, invoice_id).await?;
    let query = InvoiceItem::find().filter(invoice_item::Column::InvoiceId.eq(invoice.id));
    paginate(db, query, invoice_item::Column::Id, args).await
}
