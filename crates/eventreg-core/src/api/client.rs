//! API client for communicating with the events REST API.
//!
//! This module provides the `ApiClient` struct for the calls the
//! registration wizard makes: event listing, team-name checks, team
//! registration, discount validation, payment upload and payment status.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{
    DiscountQuote, Event, IdentifierKind, ModuleName, PaymentConfirmation, PaymentStatus,
    RegistrationConfirmation, RegistrationRequest,
};
use crate::registration::PaymentSubmission;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    available: bool,
}

/// API client for the events service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client for the given base URL (e.g. `http://localhost:8000/api`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot carry a path: {}", base_url);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_base_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL below the base, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a request, backing off and rebuilding it while the server rate limits us.
    ///
    /// Multipart bodies can only be sent once, so the caller hands over a
    /// builder closure rather than a finished request.
    async fn send_with_retry<F>(&self, url: &Url, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()?
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T> {
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .send_with_retry(&url, || Ok(self.client.get(url.clone()).query(query)))
            .await?;
        Self::parse_json(response, &url).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, url: Url, body: &B) -> Result<T> {
        let response = self
            .send_with_retry(&url, || Ok(self.client.post(url.clone()).json(body)))
            .await?;
        Self::parse_json(response, &url).await
    }

    async fn post_form<T, F>(&self, url: Url, build_form: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> Result<Form>,
    {
        let response = self
            .send_with_retry(&url, || Ok(self.client.post(url.clone()).multipart(build_form()?)))
            .await?;
        Self::parse_json(response, &url).await
    }

    // ===== Registration Endpoints =====

    /// Fetch all events, newest first
    pub async fn fetch_events(&self) -> Result<Vec<Event>> {
        let url = self.endpoint(&["events"])?;
        let events: Vec<Event> = self.get(url, &[]).await.context("Failed to fetch events")?;
        debug!(count = events.len(), "Events fetched");
        Ok(events)
    }

    /// Ask whether `team_name` is still free for the event
    pub async fn check_team_name(&self, event_id: &str, team_name: &str) -> Result<bool> {
        let url = self.endpoint(&["events", event_id, "check-team-name"])?;
        let response: AvailabilityResponse = self
            .get(url, &[("team_name", team_name)])
            .await
            .context("Failed to check team name availability")?;
        Ok(response.available)
    }

    /// Persist the team and its module selection as the registration record
    pub async fn register_team(
        &self,
        event_id: &str,
        request: &RegistrationRequest,
    ) -> Result<RegistrationConfirmation> {
        let url = self.endpoint(&["events", event_id, "register"])?;
        debug!(event_id, team = %request.team_name, modules = request.modules.len(), "Registering team");
        self.post(url, request).await.context("Failed to register team")
    }

    /// Price a discount code for one module
    pub async fn validate_discount(
        &self,
        event_id: &str,
        module: &ModuleName,
        code: &str,
    ) -> Result<DiscountQuote> {
        let url = self.endpoint(&["events", event_id, "discount", "validate"])?;
        self.post_form(url, || {
            Ok(Form::new()
                .text("code", code.to_string())
                .text("module", module.to_string()))
        })
        .await
        .context("Failed to validate discount code")
    }

    /// Upload the payment receipt and transaction details
    pub async fn submit_payment(
        &self,
        event_id: &str,
        submission: &PaymentSubmission,
    ) -> Result<PaymentConfirmation> {
        let url = self.endpoint(&["events", event_id, "payment"])?;
        let discount_codes = submission.discount_codes_json()?;
        debug!(
            event_id,
            team = %submission.team_name,
            competition = %submission.competition,
            receipt_bytes = submission.receipt.size(),
            "Submitting payment"
        );

        self.post_form(url, || {
            let receipt = &submission.receipt;
            let part = Part::bytes(receipt.bytes().to_vec())
                .file_name(receipt.file_name().to_string())
                .mime_str(receipt.kind().content_type())?;
            let mut form = Form::new()
                .part("receipt", part)
                .text("transaction_id", submission.transaction_id.clone())
                .text("team_name", submission.team_name.clone())
                .text("competition", submission.competition.to_string());
            if let Some(ref codes) = discount_codes {
                form = form.text("discount_codes", codes.clone());
            }
            Ok(form)
        })
        .await
        .context("Failed to submit payment")
    }

    /// Look up the payment state of a registration by member email or team name
    pub async fn fetch_payment_status(
        &self,
        event_id: &str,
        identifier: &str,
        kind: IdentifierKind,
    ) -> Result<PaymentStatus> {
        let url = self.endpoint(&["events", event_id, "payment-status", identifier])?;
        self.get(url, &[("identifier_type", kind.as_query_value())])
            .await
            .context("Failed to fetch payment status")
    }
}
