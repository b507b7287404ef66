//! Caller-facing entry points.
//!
//! Every operation takes an [`AppContext`] carrying the database, payment
//! terminal and settings handles, and returns an [`ApiResponse`] envelope.
//! Known errors keep their name and message; anything else is logged and
//! reported as a generic internal error.

use crate::{
    config::Settings,
    core::{
        catalog::{self, BookDetails},
        inventory, invoice,
        invoice::{InvoiceDetails, NewInvoiceItem},
        order,
        order::OrderDetails,
        pagination::{Page, PageArgs},
        poller::{self, TransactionSubscription},
        transaction,
    },
    entities::{
        book, inventory_adjustment, invoice as invoice_entity, invoice_item,
        order as order_entity, order_item, transaction as transaction_entity, vendor,
    },
    errors::{Error, Result},
    terminal::PaymentTerminal,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppContext {
    /// Shared database handle
    pub db: Arc<DatabaseConnection>,
    /// Payment terminal client
    pub terminal: Arc<dyn PaymentTerminal>,
    /// Loaded `config.toml`
    pub settings: Arc<Settings>,
}

impl AppContext {
    /// Wraps the handles for sharing across requests.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        terminal: Arc<dyn PaymentTerminal>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            db: Arc::new(db),
            terminal,
            settings,
        }
    }
}

/// Error half of the response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// Stable error name, e.g. `NotFoundError`
    pub name: String,
    /// Human-readable message
    pub message: String,
}

/// Structured `{status, data, error}` result returned by every entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse<T> {
    /// HTTP-style status code
    pub status: u16,
    /// Result on success
    pub data: Option<T>,
    /// Error details on failure
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Converts back into a [`Result`]-like pair, for callers that prefer `?`.
    pub fn into_result(self) -> std::result::Result<T, ApiError> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(ApiError {
                name: "InternalServerError".to_string(),
                message: INTERNAL_ERROR_MESSAGE.to_string(),
            }),
        }
    }
}

impl<T> From<Result<T>> for ApiResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self {
                status: 200,
                data: Some(data),
                error: None,
            },
            Err(err) => {
                let message = if err.is_known() {
                    err.to_string()
                } else {
                    error!(error = %err, "Unhandled error at API boundary");
                    INTERNAL_ERROR_MESSAGE.to_string()
                };
                Self {
                    status: err.status(),
                    data: None,
                    error: Some(ApiError {
                        name: err.name().to_string(),
                        message,
                    }),
                }
            }
        }
    }
}

// Orders

/// Opens a new empty order.
pub async fn create_order(ctx: &AppContext) -> ApiResponse<order_entity::Model> {
    order::create_order(&ctx.db).await.into()
}

/// Order with its items.
pub async fn get_order(ctx: &AppContext, order_uid: &str) -> ApiResponse<OrderDetails> {
    order::get_order_details(&ctx.db, order_uid).await.into()
}

/// Adds copies of a book to an open order.
pub async fn add_order_item(
    ctx: &AppContext,
    order_uid: &str,
    book_id: i64,
    quantity: i64,
) -> ApiResponse<OrderDetails> {
    order::add_order_item(&ctx.db, ctx.settings.tax_rate_bps, order_uid, book_id, quantity)
        .await
        .into()
}

/// Removes one item from an open order.
pub async fn remove_order_item(
    ctx: &AppContext,
    order_uid: &str,
    item_id: i64,
) -> ApiResponse<OrderDetails> {
    order::remove_order_item(&ctx.db, ctx.settings.tax_rate_bps, order_uid, item_id)
        .await
        .into()
}

/// Takes the order's books out of stock and waits for payment.
pub async fn move_to_pending_transaction(
    ctx: &AppContext,
    order_uid: &str,
) -> ApiResponse<order_entity::Model> {
    order::move_to_pending_transaction(&ctx.db, order_uid)
        .await
        .into()
}

/// Puts the order's books back and reopens it.
pub async fn move_to_open(ctx: &AppContext, order_uid: &str) -> ApiResponse<order_entity::Model> {
    order::move_to_open(&ctx.db, order_uid).await.into()
}

/// Closes an order that is waiting for payment.
pub async fn move_to_paid(ctx: &AppContext, order_uid: &str) -> ApiResponse<order_entity::Model> {
    order::move_to_paid(&ctx.db, order_uid).await.into()
}

/// Deletes an open order.
pub async fn delete_order(ctx: &AppContext, order_uid: &str) -> ApiResponse<()> {
    order::delete_order(&ctx.db, order_uid).await.into()
}

/// Lists orders.
pub async fn list_orders(
    ctx: &AppContext,
    args: &PageArgs,
) -> ApiResponse<Page<order_entity::Model>> {
    order::list_orders(&ctx.db, args).await.into()
}

/// Lists one order's items.
pub async fn list_order_items(
    ctx: &AppContext,
    order_uid: &str,
    args: &PageArgs,
) -> ApiResponse<Page<order_item::Model>> {
    order::list_order_items(&ctx.db, order_uid, args)
        .await
        .into()
}

// Transactions

/// Opens a terminal checkout for an order waiting for payment.
pub async fn create_transaction(
    ctx: &AppContext,
    order_uid: &str,
) -> ApiResponse<transaction_entity::Model> {
    transaction::create_transaction(
        &ctx.db,
        ctx.terminal.as_ref(),
        &ctx.settings.terminal,
        order_uid,
    )
    .await
    .into()
}

/// Polls the terminal once for a transaction's status.
///
/// If the terminal cannot be reached the stored state is returned, so a
/// caller polling on its own timer keeps its last known state.
pub async fn sync_transaction_status(
    ctx: &AppContext,
    transaction_uid: &str,
) -> ApiResponse<transaction_entity::Model> {
    let synced = transaction::sync_transaction_status(
        &ctx.db,
        ctx.terminal.as_ref(),
        &ctx.settings.terminal,
        transaction_uid,
    )
    .await;

    let result = match synced {
        Err(Error::ExternalService { message }) => {
            warn!(transaction_uid, error = %message, "Poll failed, returning last known state");
            transaction::get_transaction_by_uid(&ctx.db, transaction_uid)
                .await
                .and_then(|found| {
                    found.ok_or_else(|| Error::not_found("Transaction", transaction_uid))
                })
        }
        other => other,
    };
    result.into()
}

/// Transaction by uid.
pub async fn get_transaction(
    ctx: &AppContext,
    transaction_uid: &str,
) -> ApiResponse<transaction_entity::Model> {
    transaction::get_transaction_by_uid(&ctx.db, transaction_uid)
        .await
        .and_then(|found| found.ok_or_else(|| Error::not_found("Transaction", transaction_uid)))
        .into()
}

/// Latest transaction for an order, if any.
pub async fn get_transaction_for_order(
    ctx: &AppContext,
    order_uid: &str,
) -> ApiResponse<Option<transaction_entity::Model>> {
    transaction::get_transaction_for_order(&ctx.db, order_uid)
        .await
        .into()
}

/// Lists transactions.
pub async fn list_transactions(
    ctx: &AppContext,
    args: &PageArgs,
) -> ApiResponse<Page<transaction_entity::Model>> {
    transaction::list_transactions(&ctx.db, args).await.into()
}

/// Starts polling a transaction at the configured interval.
///
/// Unlike the request/response entry points this hands back a live handle,
/// so errors are returned directly.
pub async fn subscribe_transaction_status(
    ctx: &AppContext,
    transaction_uid: &str,
) -> Result<TransactionSubscription> {
    poller::subscribe_transaction_status(
        Arc::clone(&ctx.db),
        Arc::clone(&ctx.terminal),
        ctx.settings.terminal.clone(),
        transaction_uid.to_string(),
        ctx.settings.poller.interval(),
    )
    .await
}

// Catalog and inventory

/// Creates a book with an initial stock level.
pub async fn create_book(
    ctx: &AppContext,
    details: &BookDetails,
    initial_quantity: i64,
) -> ApiResponse<book::Model> {
    catalog::create_book(&ctx.db, details, initial_quantity)
        .await
        .into()
}

/// Book by ISBN, hyphens and spaces ignored.
pub async fn get_book_by_isbn(ctx: &AppContext, isbn: &str) -> ApiResponse<book::Model> {
    catalog::get_book_by_isbn(&ctx.db, isbn)
        .await
        .and_then(|found| found.ok_or_else(|| Error::not_found("Book", isbn)))
        .into()
}

/// Lists books.
pub async fn list_books(ctx: &AppContext, args: &PageArgs) -> ApiResponse<Page<book::Model>> {
    catalog::list_books(&ctx.db, args).await.into()
}

/// Manual stock correction from raw form input.
pub async fn set_book_quantity(
    ctx: &AppContext,
    book_id: i64,
    raw_quantity: &str,
    reason_code: i64,
) -> ApiResponse<book::Model> {
    let result = match inventory::parse_quantity(raw_quantity) {
        Ok(quantity) => inventory::set_quantity(&ctx.db, book_id, quantity, reason_code).await,
        Err(e) => Err(e),
    };
    result.into()
}

/// Manual stock corrections for one book.
pub async fn list_book_adjustments(
    ctx: &AppContext,
    book_id: i64,
    args: &PageArgs,
) -> ApiResponse<Page<inventory_adjustment::Model>> {
    inventory::list_adjustments_for_book(&ctx.db, book_id, args)
        .await
        .into()
}

/// Creates a vendor.
pub async fn create_vendor(ctx: &AppContext, name: &str) -> ApiResponse<vendor::Model> {
    catalog::create_vendor(&ctx.db, name).await.into()
}

/// Lists vendors.
pub async fn list_vendors(ctx: &AppContext, args: &PageArgs) -> ApiResponse<Page<vendor::Model>> {
    catalog::list_vendors(&ctx.db, args).await.into()
}

// Invoices

/// Opens an empty invoice for a vendor.
pub async fn create_invoice(
    ctx: &AppContext,
    vendor_id: i64,
) -> ApiResponse<invoice_entity::Model> {
    invoice::create_invoice(&ctx.db, vendor_id).await.into()
}

/// Invoice with its items.
pub async fn get_invoice(ctx: &AppContext, invoice_id: i64) -> ApiResponse<InvoiceDetails> {
    invoice::get_invoice_details(&ctx.db, invoice_id)
        .await
        .into()
}

/// Adds shipment lines to an open invoice, all or nothing.
pub async fn add_invoice_items(
    ctx: &AppContext,
    invoice_id: i64,
    items: &[NewInvoiceItem],
) -> ApiResponse<InvoiceDetails> {
    invoice::add_invoice_items(&ctx.db, invoice_id, items)
        .await
        .into()
}

/// Removes one line from an open invoice.
pub async fn remove_invoice_item(
    ctx: &AppContext,
    invoice_id: i64,
    item_id: i64,
) -> ApiResponse<InvoiceDetails> {
    invoice::remove_invoice_item(&ctx.db, invoice_id, item_id)
        .await
        .into()
}

/// Receives an invoice into stock.
pub async fn complete_invoice(
    ctx: &AppContext,
    invoice_id: i64,
) -> ApiResponse<invoice_entity::Model> {
    invoice::complete_invoice(&ctx.db, invoice_id).await.into()
}

/// Lists invoices.
pub async fn list_invoices(
    ctx: &AppContext,
    args: &PageArgs,
) -> ApiResponse<Page<invoice_entity::Model>> {
    invoice::list_invoices(&ctx.db, args).await.into()
}

/// Lists one invoice's items.
pub async fn list_invoice_items(
    ctx: &AppContext,
    invoice_id: i64,
    args: &PageArgs,
) -> ApiResponse<Page<invoice_item::Model>> {
    invoice::list_invoice_items(&ctx.db, invoice_id, args)
        .await
        .into()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::settings::{PollerSettings, parse_settings};
    use crate::entities::OrderState;
    use crate::terminal::CheckoutStatus;
    use crate::test_utils::*;
    use sea_orm::DbErr;
    use std::time::Duration;

    async fn test_context(terminal: Arc<FakeTerminal>) -> Result<AppContext> {
        let db = setup_test_db().await?;
        seed_test_reasons(&db).await?;
        let mut settings = parse_settings(
            r#"
            tax_rate_bps = 825

            [terminal]
            base_url = "http://terminal.invalid"
            device_id = "test-device"
            "#,
        )?;
        settings.poller = PollerSettings { interval_secs: 1 };
        Ok(AppContext::new(db, terminal, Arc::new(settings)))
    }

    #[test]
    fn test_unknown_errors_hide_details() {
        let response: ApiResponse<()> =
            Err(Error::Database(DbErr::Custom("disk I/O error at page 7".into()))).into();
        assert_eq!(response.status, 500);
        let error = response.error.unwrap();
        assert_eq!(error.name, "InternalServerError");
        assert_eq!(error.message, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_envelope_serialization() {
        let response: ApiResponse<i64> = Ok(7).into();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "status": 200, "data": 7, "error": null })
        );
    }

    #[tokio::test]
    async fn test_checkout_flow_through_api() -> Result<()> {
        let terminal = Arc::new(FakeTerminal::default());
        let ctx = test_context(Arc::clone(&terminal)).await?;
        let book = create_test_book(&ctx.db, "9780000000061", 1000, 5).await?;

        let order = create_order(&ctx).await.into_result().unwrap();
        let details = add_order_item(&ctx, &order.order_uid, book.id, 2)
            .await
            .into_result()
            .unwrap();
        // 2000 + 8.25% = 2165
        assert_eq!(details.order.total, 2165);

        let pending = move_to_pending_transaction(&ctx, &order.order_uid).await;
        assert_eq!(pending.data.unwrap().state, OrderState::PendingTransaction);

        let created = create_transaction(&ctx, &order.order_uid)
            .await
            .into_result()
            .unwrap();
        assert_eq!(terminal.created_requests()[0].amount, 2165);

        terminal.push_status(CheckoutStatus::Completed);
        let synced = sync_transaction_status(&ctx, &created.transaction_uid).await;
        assert!(synced.is_ok());

        let order = get_order(&ctx, &order.order_uid)
            .await
            .into_result()
            .unwrap();
        assert_eq!(order.order.state, OrderState::Paid);
        Ok(())
    }

    #[tokio::test]
    async fn test_state_mismatch_maps_to_bad_request() -> Result<()> {
        let ctx = test_context(Arc::new(FakeTerminal::default())).await?;
        let order = create_order(&ctx).await.into_result().unwrap();

        let response = move_to_paid(&ctx, &order.order_uid).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.error.unwrap().name, "BadRequestError");

        let response = get_order(&ctx, "19700101-9999").await;
        assert_eq!(response.status, 404);
        assert_eq!(response.error.unwrap().name, "NotFoundError");
        Ok(())
    }

    #[tokio::test]
    async fn test_set_book_quantity_validates_raw_input() -> Result<()> {
        let ctx = test_context(Arc::new(FakeTerminal::default())).await?;
        let book = create_test_book(&ctx.db, "9780000000062", 1000, 5).await?;

        let response = set_book_quantity(&ctx, book.id, "ten", DAMAGED_REASON).await;
        assert_eq!(response.error.unwrap().name, "ValidationError");

        let response = set_book_quantity(&ctx, book.id, "-1", DAMAGED_REASON).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.error.unwrap().name, "NegativeQuantityError");

        let response = set_book_quantity(&ctx, book.id, " 3 ", RECOUNT_REASON).await;
        assert_eq!(response.data.unwrap().quantity, 3);

        let audit = list_book_adjustments(&ctx, book.id, &PageArgs::default()).await;
        assert_eq!(audit.data.unwrap().items.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_page_args_are_rejected() -> Result<()> {
        let ctx = test_context(Arc::new(FakeTerminal::default())).await?;
        let args = PageArgs::first(2).before("3");
        let response = list_orders(&ctx, &args).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.error.unwrap().name, "ValidationError");
        Ok(())
    }

    #[tokio::test]
    async fn test_restock_through_api() -> Result<()> {
        let ctx = test_context(Arc::new(FakeTerminal::default())).await?;
        let vendor = create_vendor(&ctx, "Baker & Taylor")
            .await
            .into_result()
            .unwrap();
        let invoice = create_invoice(&ctx, vendor.id).await.into_result().unwrap();

        let items = [NewInvoiceItem {
            book: book_details("9780000000063", 1200),
            quantity: 4,
            discount_bps: 0,
        }];
        add_invoice_items(&ctx, invoice.id, &items)
            .await
            .into_result()
            .unwrap();
        let completed = complete_invoice(&ctx, invoice.id)
            .await
            .into_result()
            .unwrap();
        assert!(completed.is_completed);

        let book = get_book_by_isbn(&ctx, "978-0-00-000006-3")
            .await
            .into_result()
            .unwrap();
        assert_eq!(book.quantity, 4);
        Ok(())
    }

    /// Opens a terminal checkout for a one-book order.
    async fn open_checkout(ctx: &AppContext, isbn: &str) -> Result<transaction_entity::Model> {
        let book = create_test_book(&ctx.db, isbn, 500, 1).await?;
        let order = order::create_order(&ctx.db).await?;
        order::add_order_item(&ctx.db, 0, &order.order_uid, book.id, 1).await?;
        order::move_to_pending_transaction(&ctx.db, &order.order_uid).await?;
        transaction::create_transaction(
            &ctx.db,
            ctx.terminal.as_ref(),
            &ctx.settings.terminal,
            &order.order_uid,
        )
        .await
    }

    #[tokio::test]
    async fn test_poll_failure_returns_last_known_state() -> Result<()> {
        let terminal = Arc::new(FakeTerminal::default());
        let ctx = test_context(Arc::clone(&terminal)).await?;
        let created = open_checkout(&ctx, "9780000000065").await?;

        terminal.push_failure("terminal offline");
        let response = sync_transaction_status(&ctx, &created.transaction_uid).await;
        assert_eq!(response.status, 200);
        assert!(response.error.is_none());
        assert_eq!(response.data.unwrap(), created);

        // The next successful poll still applies the outcome
        terminal.push_status(CheckoutStatus::Completed);
        let response = sync_transaction_status(&ctx, &created.transaction_uid).await;
        assert_eq!(
            response.data.unwrap().status,
            crate::entities::TransactionStatus::Complete
        );

        let response = sync_transaction_status(&ctx, "missing").await;
        assert_eq!(response.status, 404);
        Ok(())
    }

    #[tokio::test]
    async fn test_subscription_uses_configured_interval() -> Result<()> {
        let terminal = Arc::new(FakeTerminal::default());
        let ctx = test_context(Arc::clone(&terminal)).await?;
        let created = open_checkout(&ctx, "9780000000064").await?;

        terminal.push_status(CheckoutStatus::Cancelled);
        let mut subscription =
            subscribe_transaction_status(&ctx, &created.transaction_uid).await?;
        let observed = tokio::time::timeout(Duration::from_secs(5), subscription.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(observed.status, crate::entities::TransactionStatus::Cancelled);
        subscription.unsubscribe().await;
        Ok(())
    }
}
