use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    DiscountQuote, ModuleName, PaymentConfirmation, RegistrationConfirmation, RegistrationRequest,
};
use crate::registration::PaymentSubmission;

use super::ApiClient;

/// The server calls the registration wizard depends on.
///
/// `ApiClient` is the production implementation; the wizard only sees this
/// trait so its side-processes can be driven by any backend.
#[async_trait]
pub trait RegistrationBackend: Send + Sync + 'static {
    async fn check_team_name(&self, event_id: &str, team_name: &str) -> Result<bool>;

    async fn register_team(
        &self,
        event_id: &str,
        request: &RegistrationRequest,
    ) -> Result<RegistrationConfirmation>;

    async fn validate_discount(
        &self,
        event_id: &str,
        module: &ModuleName,
        code: &str,
    ) -> Result<DiscountQuote>;

    async fn submit_payment(
        &self,
        event_id: &str,
        submission: &PaymentSubmission,
    ) -> Result<PaymentConfirmation>;
}

#[async_trait]
impl RegistrationBackend for ApiClient {
    async fn check_team_name(&self, event_id: &str, team_name: &str) -> Result<bool> {
        ApiClient::check_team_name(self, event_id, team_name).await
    }

    async fn register_team(
        &self,
        event_id: &str,
        request: &RegistrationRequest,
    ) -> Result<RegistrationConfirmation> {
        ApiClient::register_team(self, event_id, request).await
    }

    async fn validate_discount(
        &self,
        event_id: &str,
        module: &ModuleName,
        code: &str,
    ) -> Result<DiscountQuote> {
        ApiClient::validate_discount(self, event_id, module, code).await
    }

    async fn submit_payment(
        &self,
        event_id: &str,
        submission: &PaymentSubmission,
    ) -> Result<PaymentConfirmation> {
        ApiClient::submit_payment(self, event_id, submission).await
    }
}
