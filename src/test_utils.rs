//! Shared test utilities for the bookstore service.
//!
//! This module provides common helper functions for setting up test databases,
//! creating test entities with sensible defaults, and a scripted payment
//! terminal.

#![allow(clippy::unwrap_used)]

use crate::{
    config::settings::{AdjustmentReasonConfig, TerminalSettings},
    core::catalog::{self, BookDetails},
    entities,
    errors::{Error, Result},
    terminal::{Checkout, CheckoutReport, CheckoutRequest, CheckoutStatus, PaymentTerminal},
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Reason code seeded by [`seed_test_reasons`] for damaged stock.
pub const DAMAGED_REASON: i64 = 1;
/// Reason code seeded by [`seed_test_reasons`] for a stock recount.
pub const RECOUNT_REASON: i64 = 2;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database with all tables initialized.
///
/// Use this when a test needs several connections at once, such as
/// concurrent writers. The database lives as long as the returned directory.
pub async fn setup_file_test_db() -> Result<(DatabaseConnection, TempDir)> {
    let dir = tempfile::tempdir()?;
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("bookstore-test.sqlite").display()
    );
    let db = sea_orm::Database::connect(url).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((db, dir))
}

/// Book details with sensible defaults.
///
/// # Defaults
/// * `title`: "Test Book {isbn}"
/// * `author`: "Test Author"
/// * `publisher`: "Test Press"
pub fn book_details(isbn: &str, retail_price: i64) -> BookDetails {
    BookDetails {
        isbn: isbn.to_string(),
        title: format!("Test Book {isbn}"),
        author: "Test Author".to_string(),
        publisher: "Test Press".to_string(),
        retail_price,
    }
}

/// Creates a test book with the given stock level.
pub async fn create_test_book(
    db: &DatabaseConnection,
    isbn: &str,
    retail_price: i64,
    quantity: i64,
) -> Result<entities::book::Model> {
    catalog::create_book(db, &book_details(isbn, retail_price), quantity).await
}

/// Seeds [`DAMAGED_REASON`] and [`RECOUNT_REASON`].
pub async fn seed_test_reasons(db: &DatabaseConnection) -> Result<()> {
    crate::config::database::seed_adjustment_reasons(
        db,
        &[
            AdjustmentReasonConfig {
                code: DAMAGED_REASON,
                label: "Damaged".to_string(),
            },
            AdjustmentReasonConfig {
                code: RECOUNT_REASON,
                label: "Recount".to_string(),
            },
        ],
    )
    .await
}

/// Terminal settings pointing at device `test-device` with a 5s timeout.
pub fn test_terminal_settings() -> TerminalSettings {
    TerminalSettings {
        base_url: "http://terminal.invalid".to_string(),
        device_id: "test-device".to_string(),
        currency: "USD".to_string(),
        timeout_secs: 5,
    }
}

/// Payment terminal double.
///
/// `get_checkout` replays the statuses queued with [`Self::push_status`] and
/// [`Self::push_failure`] in order, then keeps reporting `PENDING`.
#[derive(Debug, Default)]
pub struct FakeTerminal {
    fail_create: bool,
    create_delay: Option<Duration>,
    poll_delay: Option<Duration>,
    created: Mutex<Vec<CheckoutRequest>>,
    scripted: Mutex<VecDeque<std::result::Result<CheckoutStatus, String>>>,
    get_calls: AtomicUsize,
}

impl FakeTerminal {
    /// A terminal that rejects every new checkout.
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// A terminal that takes `delay` to open a checkout.
    pub fn slow(delay: Duration) -> Self {
        Self {
            create_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Makes every `get_checkout` take `delay`.
    #[must_use]
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }

    /// Checkout requests received so far, oldest first.
    pub fn created_requests(&self) -> Vec<CheckoutRequest> {
        self.created.lock().unwrap().clone()
    }

    /// Queues a status for the next `get_checkout`.
    pub fn push_status(&self, status: CheckoutStatus) {
        self.scripted.lock().unwrap().push_back(Ok(status));
    }

    /// Queues a failure for the next `get_checkout`.
    pub fn push_failure(&self, message: &str) {
        self.scripted
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    /// Number of `get_checkout` calls so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentTerminal for FakeTerminal {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<Checkout> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create {
            return Err(Error::external("device unavailable"));
        }

        let mut created = self.created.lock().unwrap();
        created.push(request);
        Ok(Checkout {
            checkout_id: format!("checkout-{}", created.len()),
            status: CheckoutStatus::Pending,
        })
    }

    async fn get_checkout(&self, _checkout_id: &str) -> Result<CheckoutReport> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.poll_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.scripted.lock().unwrap().pop_front();
        match next.unwrap_or(Ok(CheckoutStatus::Pending)) {
            Ok(status) => {
                let payment_type =
                    (status == CheckoutStatus::Completed).then(|| "CARD_PRESENT".to_string());
                Ok(CheckoutReport {
                    status,
                    payment_type,
                })
            }
            Err(message) => Err(Error::external(message)),
        }
    }
}
