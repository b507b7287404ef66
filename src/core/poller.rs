//! Transaction status polling.
//!
//! [`subscribe_transaction_status`] spawns a background task that calls
//! [`sync_transaction_status`] on a fixed interval and publishes each newly
//! observed state through a watch channel. The task stops on its own once the
//! transaction is final.
//!
//! Unsubscribing consumes the subscription, so no state can be observed after
//! it, even from a poll that was already running. A failed poll is logged and
//! the previous state is kept; the subscription keeps going.

use crate::{
    config::settings::TerminalSettings,
    core::transaction::sync_transaction_status,
    entities::{Transaction, transaction},
    errors::{Error, Result},
    terminal::PaymentTerminal,
};
use sea_orm::{DatabaseConnection, prelude::*};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

/// Live view of one transaction's status.
#[derive(Debug)]
pub struct TransactionSubscription {
    receiver: watch::Receiver<transaction::Model>,
    task: JoinHandle<()>,
    cancel_on_drop: DropGuard,
}

impl TransactionSubscription {
    /// Most recently observed state.
    #[must_use]
    pub fn current(&self) -> transaction::Model {
        self.receiver.borrow().clone()
    }

    /// Waits for the next observed change.
    ///
    /// Returns `None` once polling has stopped and no further change can arrive.
    pub async fn changed(&mut self) -> Option<transaction::Model> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Stops polling and waits for the background task to exit.
    pub async fn unsubscribe(self) {
        let Self {
            receiver,
            task,
            cancel_on_drop,
        } = self;
        drop(receiver);
        drop(cancel_on_drop);
        if let Err(e) = task.await {
            warn!(error = %e, "Transaction poller task ended abnormally");
        }
    }
}

/// Starts polling a transaction every `interval`.
///
/// # Errors
/// Returns [`Error::NotFound`] if the transaction does not exist.
pub async fn subscribe_transaction_status(
    db: Arc<DatabaseConnection>,
    terminal: Arc<dyn PaymentTerminal>,
    settings: TerminalSettings,
    transaction_uid: String,
    interval: Duration,
) -> Result<TransactionSubscription> {
    let initial = Transaction::find()
        .filter(transaction::Column::TransactionUid.eq(transaction_uid.as_str()))
        .one(db.as_ref())
        .await?
        .ok_or_else(|| Error::not_found("Transaction", transaction_uid.as_str()))?;

    let finished = initial.status.is_terminal();
    let (sender, receiver) = watch::channel(initial);
    let token = CancellationToken::new();
    let poll_token = token.clone();

    let task = tokio::spawn(async move {
        if finished {
            return;
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = poll_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                () = poll_token.cancelled() => break,
                outcome = sync_transaction_status(
                    &db,
                    terminal.as_ref(),
                    &settings,
                    &transaction_uid,
                ) => outcome,
            };

            if poll_token.is_cancelled() {
                break;
            }

            match outcome {
                Ok(model) => {
                    let done = model.status.is_terminal();
                    sender.send_if_modified(|observed| {
                        if *observed == model {
                            false
                        } else {
                            *observed = model;
                            true
                        }
                    });
                    if done {
                        debug!(transaction_uid, "Transaction final, poller stopping");
                        break;
                    }
                }
                Err(e) => {
                    warn!(transaction_uid, error = %e, "Poll failed, keeping previous state");
                }
            }
        }
    });

    Ok(TransactionSubscription {
        receiver,
        task,
        cancel_on_drop: token.drop_guard(),
    })
}
