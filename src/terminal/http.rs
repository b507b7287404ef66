//! HTTP client for a Square-style Terminal Checkout REST API.
//!
//! `POST {base}/v2/terminals/checkouts` opens a checkout and
//! `GET {base}/v2/terminals/checkouts/{id}` reads it back. Both are bounded by
//! the configured timeout.

use super::{Checkout, CheckoutReport, CheckoutRequest, CheckoutStatus, PaymentTerminal};
use crate::config::settings::TerminalSettings;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Terminal client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTerminal {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct CreateCheckoutBody<'a> {
    idempotency_key: &'a str,
    checkout: CheckoutBody<'a>,
}

#[derive(Debug, Serialize)]
struct CheckoutBody<'a> {
    amount_money: Money<'a>,
    device_options: DeviceOptions<'a>,
}

#[derive(Debug, Serialize)]
struct Money<'a> {
    amount: i64,
    currency: &'a str,
}

#[derive(Debug, Serialize)]
struct DeviceOptions<'a> {
    device_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckoutEnvelope {
    checkout: Option<CheckoutPayload>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct CheckoutPayload {
    id: String,
    status: CheckoutStatus,
    #[serde(default)]
    payment_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    detail: String,
}

impl HttpTerminal {
    /// Builds a client with the configured timeout applied to every request.
    pub fn new(settings: &TerminalSettings, access_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build terminal HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            access_token,
            currency: settings.currency.clone(),
        })
    }

    async fn read_checkout(response: reqwest::Response) -> Result<CheckoutPayload> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::external(format!("Failed to read terminal response: {e}")))?;

        let envelope: CheckoutEnvelope = serde_json::from_str(&body).map_err(|e| {
            Error::external(format!(
                "Malformed terminal response (HTTP {status}): {e}"
            ))
        })?;

        if !status.is_success() || !envelope.errors.is_empty() {
            let detail = envelope
                .errors
                .iter()
                .map(|err| format!("{}: {}", err.code, err.detail))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::external(format!(
                "Terminal request failed (HTTP {status}) {detail}"
            )));
        }

        envelope
            .checkout
            .ok_or_else(|| Error::external("Terminal response is missing the checkout"))
    }
}

#[async_trait]
impl PaymentTerminal for HttpTerminal {
    #[instrument(skip(self), fields(idempotency_key = %request.idempotency_key))]
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<Checkout> {
        let body = CreateCheckoutBody {
            idempotency_key: &request.idempotency_key,
            checkout: CheckoutBody {
                amount_money: Money {
                    amount: request.amount,
                    currency: &self.currency,
                },
                device_options: DeviceOptions {
                    device_id: &request.device_id,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/v2/terminals/checkouts", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::external(format!("Terminal create_checkout failed: {e}")))?;

        let payload = Self::read_checkout(response).await?;
        debug!(checkout_id = %payload.id, status = ?payload.status, "Terminal checkout created");
        Ok(Checkout {
            checkout_id: payload.id,
            status: payload.status,
        })
    }

    #[instrument(skip(self))]
    async fn get_checkout(&self, checkout_id: &str) -> Result<CheckoutReport> {
        let response = self
            .client
            .get(format!(
                "{}/v2/terminals/checkouts/{checkout_id}",
                self.base_url
            ))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::external(format!("Terminal get_checkout failed: {e}")))?;

        let payload = Self::read_checkout(response).await?;
        Ok(CheckoutReport {
            status: payload.status,
            payment_type: payload.payment_type,
        })
    }
}
