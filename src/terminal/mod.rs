//! Payment terminal collaborator.
//!
//! The core only talks to the terminal through [`PaymentTerminal`], which is
//! passed in explicitly so tests can substitute a fake. [`HttpTerminal`] is
//! the production implementation.

mod http;

pub use http::HttpTerminal;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request to open a checkout on a terminal device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    /// Amount to charge, in cents
    pub amount: i64,
    /// Deduplicates retried requests; always the owning transaction's uid
    pub idempotency_key: String,
    /// Device that should display the checkout
    pub device_id: String,
}

/// Checkout status as reported by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
    /// Created, not yet shown on the device
    Pending,
    /// Shown on the device
    InProgress,
    /// Cancellation requested, not yet confirmed
    CancelRequested,
    /// Cancelled on the device or by request
    #[serde(alias = "CANCELED")]
    Cancelled,
    /// Paid
    Completed,
    /// Any status this client does not know about yet
    #[serde(other)]
    Unknown,
}

/// A checkout that was just opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    /// Terminal-side checkout id
    pub checkout_id: String,
    /// Status right after creation
    pub status: CheckoutStatus,
}

/// Current state of an existing checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReport {
    /// Current status
    pub status: CheckoutStatus,
    /// Payment type once the customer has paid (e.g. `CARD_PRESENT`)
    pub payment_type: Option<String>,
}

/// Synchronous RPC surface of the payment terminal service.
///
/// Implementations report every failure, including malformed payloads, as
/// [`crate::errors::Error::ExternalService`].
#[async_trait]
pub trait PaymentTerminal: Send + Sync {
    /// Opens a checkout for `request.amount` on `request.device_id`.
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<Checkout>;

    /// Fetches the current state of a checkout.
    async fn get_checkout(&self, checkout_id: &str) -> Result<CheckoutReport>;
}
