//! Transaction sync - Bridges payment-terminal checkouts into the order state machine.
//!
//! A transaction is opened against an order that is waiting for payment and
//! starts `PENDING`. Its status is then pulled from the terminal by polling
//! [`sync_transaction_status`]; there is no push channel. When the terminal
//! reports a final outcome the transaction becomes `COMPLETE` or `CANCELLED`
//! and the order follows it to `PAID` or back to `OPEN` in the same database
//! transaction. Terminal transactions never change again.

use crate::{
    config::settings::TerminalSettings,
    core::{
        order::{find_order_by_uid, open_from_pending, paid_from_pending},
        pagination::{Page, PageArgs, paginate},
        storage::begin_serializable,
    },
    entities::{Order, OrderState, Transaction, TransactionStatus, order, transaction},
    errors::{Error, Result},
    terminal::{CheckoutRequest, CheckoutStatus, PaymentTerminal},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Bounds a terminal call by `timeout`.
async fn call_terminal<T>(timeout: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| {
            Error::external(format!(
                "Payment terminal did not respond within {timeout:?}"
            ))
        })?
}

/// Maps a terminal checkout status onto a final transaction status.
///
/// Anything that is still in flight maps to `None`.
#[must_use]
pub const fn final_status(status: &CheckoutStatus) -> Option<TransactionStatus> {
    match status {
        CheckoutStatus::Completed => Some(TransactionStatus::Complete),
        CheckoutStatus::Cancelled => Some(TransactionStatus::Cancelled),
        CheckoutStatus::Pending
        | CheckoutStatus::InProgress
        | CheckoutStatus::CancelRequested
        | CheckoutStatus::Unknown => None,
    }
}

async fn find_transaction_by_uid<C>(db: &C, transaction_uid: &str) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    Transaction::find()
        .filter(transaction::Column::TransactionUid.eq(transaction_uid))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Transaction", transaction_uid))
}

/// Opens a terminal checkout for an order that is waiting for payment.
///
/// The row is inserted, the terminal is asked to open a checkout keyed by the
/// new transaction's uid, and the returned checkout id is stored, all inside
/// one database transaction. If the terminal call fails nothing is persisted.
#[instrument(skip(db, terminal, settings))]
pub async fn create_transaction(
    db: &DatabaseConnection,
    terminal: &dyn PaymentTerminal,
    settings: &TerminalSettings,
    order_uid: &str,
) -> Result<transaction::Model> {
    let txn = begin_serializable(db).await?;

    let order = find_order_by_uid(&txn, order_uid).await?;
    if order.state != OrderState::PendingTransaction {
        return Err(Error::bad_request(format!(
            "Cannot open a transaction: order {order_uid} is {}, expected {}",
            order.state,
            OrderState::PendingTransaction
        )));
    }
    if order.total <= 0 {
        return Err(Error::bad_request(format!(
            "Cannot open a transaction: order {order_uid} has nothing to charge"
        )));
    }

    let live = Transaction::find()
        .filter(transaction::Column::OrderId.eq(order.id))
        .filter(transaction::Column::Status.ne(TransactionStatus::Cancelled))
        .one(&txn)
        .await?;
    if let Some(live) = live {
        return Err(Error::bad_request(format!(
            "Order {order_uid} already has transaction {}",
            live.transaction_uid
        )));
    }

    let now = Utc::now();
    let inserted = transaction::ActiveModel {
        transaction_uid: Set(uuid::Uuid::new_v4().to_string()),
        order_id: Set(order.id),
        status: Set(TransactionStatus::Pending),
        checkout_id: Set(None),
        payment_type: Set(None),
        amount: Set(order.total),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let request = CheckoutRequest {
        amount: inserted.amount,
        idempotency_key: inserted.transaction_uid.clone(),
        device_id: settings.device_id.clone(),
    };
    let checkout = call_terminal(settings.timeout(), terminal.create_checkout(request))
        .await
        .inspect_err(|e| {
            error!(order_uid, error = %e, "Terminal rejected checkout, rolling back");
        })?;

    let mut active_model: transaction::ActiveModel = inserted.into();
    active_model.checkout_id = Set(Some(checkout.checkout_id));
    let created = active_model.update(&txn).await?;

    txn.commit().await?;
    info!(
        order_uid,
        transaction_uid = %created.transaction_uid,
        amount = created.amount,
        "Transaction opened"
    );
    Ok(created)
}

/// Pulls the checkout status from the terminal and records a final outcome.
///
/// Already-final transactions are returned as stored without calling the
/// terminal. In-flight checkouts are returned unchanged. Terminal failures are
/// returned as [`Error::ExternalService`]; pollers are expected to log them and
/// keep their last known state.
///
/// The terminal is queried outside any database transaction. Only the status
/// write and the order update run in one, and the write only applies if the
/// row is still `PENDING`, so two overlapping polls cannot both apply the
/// outcome to the order.
#[instrument(skip(db, terminal, settings))]
pub async fn sync_transaction_status(
    db: &DatabaseConnection,
    terminal: &dyn PaymentTerminal,
    settings: &TerminalSettings,
    transaction_uid: &str,
) -> Result<transaction::Model> {
    let current = find_transaction_by_uid(db, transaction_uid).await?;
    if current.status.is_terminal() {
        return Ok(current);
    }

    let checkout_id = current.checkout_id.clone().ok_or_else(|| {
        Error::bad_request(format!(
            "Transaction {transaction_uid} has no terminal checkout"
        ))
    })?;

    let report = call_terminal(settings.timeout(), terminal.get_checkout(&checkout_id)).await?;
    let Some(status) = final_status(&report.status) else {
        return Ok(current);
    };

    let txn = begin_serializable(db).await?;
    let result = Transaction::update_many()
        .col_expr(transaction::Column::Status, Expr::value(status))
        .col_expr(
            transaction::Column::PaymentType,
            Expr::value(report.payment_type.clone()),
        )
        .col_expr(transaction::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(transaction::Column::Id.eq(current.id))
        .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
        .exec(&txn)
        .await?;

    let updated = find_transaction_by_uid(&txn, transaction_uid).await?;
    if result.rows_affected == 0 {
        debug!(transaction_uid, "Transaction already finalised by another poll");
        return Ok(updated);
    }

    link_order(&txn, &updated).await?;
    txn.commit().await?;

    info!(transaction_uid, status = ?updated.status, "Transaction finalised");
    Ok(updated)
}

/// Moves the owning order to follow a final transaction status.
async fn link_order<C>(db: &C, transaction: &transaction::Model) -> Result<()>
where
    C: ConnectionTrait,
{
    let order = Order::find_by_id(transaction.order_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Order", transaction.order_id))?;

    if order.state != OrderState::PendingTransaction {
        warn!(
            order_uid = %order.order_uid,
            state = %order.state,
            transaction_uid = %transaction.transaction_uid,
            "Order is not waiting for payment, leaving it as is"
        );
        return Ok(());
    }

    let order: order::Model = match transaction.status {
        TransactionStatus::Complete => paid_from_pending(db, order).await?,
        TransactionStatus::Cancelled => open_from_pending(db, order).await?,
        TransactionStatus::Pending => return Ok(()),
    };
    info!(order_uid = %order.order_uid, state = %order.state, "Order followed its transaction");
    Ok(())
}

/// Syncs every `PENDING` transaction once. Returns how many became final.
///
/// A failure on one transaction is logged and does not stop the sweep.
pub async fn sync_pending_transactions(
    db: &DatabaseConnection,
    terminal: &dyn PaymentTerminal,
    settings: &TerminalSettings,
) -> Result<usize> {
    let pending = Transaction::find()
        .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await?;

    let mut finalised = 0;
    for transaction in pending {
        match sync_transaction_status(db, terminal, settings, &transaction.transaction_uid).await {
            Ok(synced) if synced.status.is_terminal() => finalised += 1,
            Ok(_) => {}
            Err(e) => warn!(
                transaction_uid = %transaction.transaction_uid,
                error = %e,
                "Failed to sync transaction"
            ),
        }
    }
    Ok(finalised)
}

/// Looks up a transaction by its uid.
pub async fn get_transaction_by_uid(
    db: &DatabaseConnection,
    transaction_uid: &str,
) -> Result<Option<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::TransactionUid.eq(transaction_uid))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Latest transaction opened for an order, if any.
pub async fn get_transaction_for_order(
    db: &DatabaseConnection,
    order_uid: &str,
) -> Result<Option<transaction::Model>> {
    let order = find_order_by_uid(db, order_uid).await?;
    Transaction::find()
        .filter(transaction::Column::OrderId.eq(order.id))
        .order_by_desc(transaction::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists transactions, oldest first.
pub async fn list_transactions(
    db: &DatabaseConnection,
    args: &PageArgs,
) -> Result<Page<transaction::Model>> {
    paginate(db, Transaction::find(), transaction::Column::Id, args).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::order::{add_order_item, create_order, move_to_pending_transaction};
    use crate::entities::Book;
    use crate::test_utils::*;
    use std::time::Instant;

    /// Order for book priced 1082 x 2 = 2164 cents, moved to PENDING_TRANSACTION.
    async fn pending_order(db: &DatabaseConnection, stock: i64) -> Result<(order::Model, i64)> {
        let book = create_test_book(db, "9780000000021", 1082, stock).await?;
        let order = create_order(db).await?;
        add_order_item(db, 0, &order.order_uid, book.id, 2).await?;
        let order = move_to_pending_transaction(db, &order.order_uid).await?;
        Ok((order, book.id))
    }

    async fn quantity_of(db: &DatabaseConnection, book_id: i64) -> Result<i64> {
        Ok(Book::find_by_id(book_id).one(db).await?.unwrap().quantity)
    }

    #[tokio::test]
    async fn test_create_transaction_uses_uid_as_idempotency_key() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::default();
        let (order, _) = pending_order(&db, 5).await?;
        assert_eq!(order.total, 2164);

        let created =
            create_transaction(&db, &terminal, &test_terminal_settings(), &order.order_uid).await?;

        let calls = terminal.created_requests();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].idempotency_key, created.transaction_uid);
        assert_eq!(calls[0].amount, 2164);
        assert_eq!(calls[0].device_id, "test-device");
        assert_eq!(created.amount, 2164);
        assert_eq!(created.status, TransactionStatus::Pending);
        assert_eq!(created.checkout_id.as_deref(), Some("checkout-1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_checkout_persists_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::failing();
        let (order, _) = pending_order(&db, 5).await?;

        let result =
            create_transaction(&db, &terminal, &test_terminal_settings(), &order.order_uid).await;
        assert!(matches!(result, Err(Error::ExternalService { .. })));
        assert!(Transaction::find().all(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_slow_terminal_times_out_and_rolls_back() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::slow(Duration::from_secs(5));
        let (order, _) = pending_order(&db, 5).await?;
        let mut settings = test_terminal_settings();
        settings.timeout_secs = 1;

        let result = create_transaction(&db, &terminal, &settings, &order.order_uid).await;

        assert!(matches!(result, Err(Error::ExternalService { .. })));
        assert!(Transaction::find().all(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_one_live_transaction_per_order() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::default();
        let (order, _) = pending_order(&db, 5).await?;
        let settings = test_terminal_settings();

        create_transaction(&db, &terminal, &settings, &order.order_uid).await?;
        let second = create_transaction(&db, &terminal, &settings, &order.order_uid).await;
        assert!(matches!(second, Err(Error::BadRequest { .. })));
        assert_eq!(terminal.created_requests().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_requires_pending_order() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::default();
        let order = create_order(&db).await?;

        let result =
            create_transaction(&db, &terminal, &test_terminal_settings(), &order.order_uid).await;
        assert!(matches!(result, Err(Error::BadRequest { .. })));
        assert!(terminal.created_requests().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_completed_checkout_marks_order_paid() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::default();
        let settings = test_terminal_settings();
        let (order, _) = pending_order(&db, 5).await?;
        let created = create_transaction(&db, &terminal, &settings, &order.order_uid).await?;

        terminal.push_status(CheckoutStatus::InProgress);
        let still_pending =
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid).await?;
        assert_eq!(still_pending, created);

        terminal.push_status(CheckoutStatus::Completed);
        let completed =
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid).await?;
        assert_eq!(completed.status, TransactionStatus::Complete);
        assert_eq!(completed.payment_type.as_deref(), Some("CARD_PRESENT"));

        let order = Order::find_by_id(order.id).one(&db).await?.unwrap();
        assert_eq!(order.state, OrderState::Paid);
        assert!(order.closed_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_checkout_reopens_order_and_restores_stock() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::default();
        let settings = test_terminal_settings();
        let (order, book_id) = pending_order(&db, 5).await?;
        assert_eq!(quantity_of(&db, book_id).await?, 3);
        let created = create_transaction(&db, &terminal, &settings, &order.order_uid).await?;

        terminal.push_status(CheckoutStatus::Cancelled);
        let cancelled =
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid).await?;
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);

        let order = Order::find_by_id(order.id).one(&db).await?.unwrap();
        assert_eq!(order.state, OrderState::Open);
        assert_eq!(quantity_of(&db, book_id).await?, 5);

        // A new checkout may be opened once the cancelled one is final
        move_to_pending_transaction(&db, &order.order_uid).await?;
        let retry = create_transaction(&db, &terminal, &settings, &order.order_uid).await?;
        assert_ne!(retry.transaction_uid, created.transaction_uid);
        let latest = get_transaction_for_order(&db, &order.order_uid)
            .await?
            .unwrap();
        assert_eq!(latest.id, retry.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_on_terminal_transaction_is_a_no_op() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::default();
        let settings = test_terminal_settings();
        let (order, _) = pending_order(&db, 5).await?;
        let created = create_transaction(&db, &terminal, &settings, &order.order_uid).await?;

        terminal.push_status(CheckoutStatus::Completed);
        let completed =
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid).await?;
        let calls_before = terminal.get_calls();

        // Even if the terminal now claims otherwise, nothing changes
        terminal.push_status(CheckoutStatus::Cancelled);
        let again =
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid).await?;
        assert_eq!(again, completed);
        assert_eq!(terminal.get_calls(), calls_before);

        let order = Order::find_by_id(order.id).one(&db).await?.unwrap();
        assert_eq!(order.state, OrderState::Paid);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_surfaces_terminal_failures() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::default();
        let settings = test_terminal_settings();
        let (order, _) = pending_order(&db, 5).await?;
        let created = create_transaction(&db, &terminal, &settings, &order.order_uid).await?;

        terminal.push_failure("terminal offline");
        let result =
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid).await;
        assert!(matches!(result, Err(Error::ExternalService { .. })));

        let stored = get_transaction_by_uid(&db, &created.transaction_uid)
            .await?
            .unwrap();
        assert_eq!(stored, created);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_pending_transactions_sweep() -> Result<()> {
        let db = setup_test_db().await?;
        let terminal = FakeTerminal::default();
        let settings = test_terminal_settings();
        let (order, _) = pending_order(&db, 5).await?;
        create_transaction(&db, &terminal, &settings, &order.order_uid).await?;

        terminal.push_status(CheckoutStatus::Pending);
        assert_eq!(sync_pending_transactions(&db, &terminal, &settings).await?, 0);

        terminal.push_status(CheckoutStatus::Completed);
        assert_eq!(sync_pending_transactions(&db, &terminal, &settings).await?, 1);
        assert_eq!(sync_pending_transactions(&db, &terminal, &settings).await?, 0);

        let page = list_transactions(&db, &PageArgs::default()).await?;
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].status, TransactionStatus::Complete);
        Ok(())
    }

    #[tokio::test]
    async fn test_terminal_poll_does_not_block_other_writers() -> Result<()> {
        let (db, _dir) = setup_file_test_db().await?;
        let terminal = FakeTerminal::default().with_poll_delay(Duration::from_secs(2));
        let settings = test_terminal_settings();
        let (order, _) = pending_order(&db, 5).await?;
        let created = create_transaction(&db, &terminal, &settings, &order.order_uid).await?;

        let (synced, write_time) = tokio::join!(
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid),
            async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                let started = Instant::now();
                create_order(&db).await.map(|_| started.elapsed())
            }
        );

        assert_eq!(synced?.status, TransactionStatus::Pending);
        assert!(write_time? < Duration::from_secs(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_overlapping_polls_apply_cancellation_once() -> Result<()> {
        let (db, _dir) = setup_file_test_db().await?;
        let terminal = FakeTerminal::default().with_poll_delay(Duration::from_millis(200));
        let settings = test_terminal_settings();
        let (order, book_id) = pending_order(&db, 5).await?;
        assert_eq!(quantity_of(&db, book_id).await?, 3);
        let created = create_transaction(&db, &terminal, &settings, &order.order_uid).await?;

        terminal.push_status(CheckoutStatus::Cancelled);
        terminal.push_status(CheckoutStatus::Cancelled);
        let (first, second) = tokio::join!(
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid),
            sync_transaction_status(&db, &terminal, &settings, &created.transaction_uid),
        );
        let (first, second) = (first?, second?);

        // Both polls reached the terminal while the row was still pending
        assert_eq!(terminal.get_calls(), 2);
        assert_eq!(first.status, TransactionStatus::Cancelled);
        assert_eq!(first, second);

        // Stock is restored once, not twice
        assert_eq!(quantity_of(&db, book_id).await?, 5);
        let order = Order::find_by_id(order.id).one(&db).await?.unwrap();
        assert_eq!(order.state, OrderState::Open);
        Ok(())
    }

    #[test]
    fn test_final_status_mapping() {
        assert_eq!(final_status(&CheckoutStatus::Completed), Some(TransactionStatus::Complete));
        assert_eq!(final_status(&CheckoutStatus::Cancelled), Some(TransactionStatus::Cancelled));
        assert_eq!(final_status(&CheckoutStatus::CancelRequested), None);
        assert_eq!(final_status(&CheckoutStatus::InProgress), None);
        assert_eq!(final_status(&CheckoutStatus::Unknown), None);
    }
}
