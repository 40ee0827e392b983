//! In-memory `RegistrationBackend` for driving the wizard in tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::api::{ApiError, RegistrationBackend};
use crate::models::{
    Amount, DiscountQuote, ModuleName, PaymentConfirmation, RegistrationConfirmation,
    RegistrationRequest,
};
use crate::registration::PaymentSubmission;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CheckTeamName { event_id: String, team_name: String },
    Register { event_id: String, team_name: String, modules: Vec<ModuleName> },
    ValidateDiscount { event_id: String, module: ModuleName, code: String },
    SubmitPayment { event_id: String, team_name: String, transaction_id: String },
}

/// How a scripted call should fail.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Connection-level failure with no server reason.
    Network,
    Rejected(String),
    Conflict(String),
}

impl Failure {
    fn into_error(self) -> anyhow::Error {
        match self {
            Failure::Network => anyhow::anyhow!("connection reset by peer").context("Request failed"),
            Failure::Rejected(reason) => anyhow::Error::new(ApiError::Rejected(reason)),
            Failure::Conflict(reason) => anyhow::Error::new(ApiError::Conflict(reason)),
        }
    }
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    taken: HashSet<String>,
    name_checks_fail: bool,
    name_check_delays: HashMap<String, Duration>,
    discounts: HashMap<(ModuleName, String), Result<Amount, String>>,
    discount_delays: HashMap<(ModuleName, String), Duration>,
    register_failures: VecDeque<Failure>,
    register_delay: Duration,
    payment_failures: VecDeque<Failure>,
    payment_delay: Duration,
}

/// Answers from a script; every name is free and every code unknown unless
/// told otherwise. Locks are never held across an await.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().expect("script lock");
        f(&mut script)
    }

    pub fn set_taken<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        self.with_script(|s| s.taken.extend(names.into_iter().map(str::to_string)));
    }

    pub fn fail_name_checks(&self) {
        self.with_script(|s| s.name_checks_fail = true);
    }

    pub fn recover_name_checks(&self) {
        self.with_script(|s| s.name_checks_fail = false);
    }

    pub fn delay_name_check(&self, name: &str, delay: Duration) {
        self.with_script(|s| s.name_check_delays.insert(name.to_string(), delay));
    }

    pub fn set_discount(&self, module: &str, code: &str, result: Result<Amount, &str>) {
        let result = result.map_err(str::to_string);
        self.with_script(|s| s.discounts.insert((module.into(), code.to_string()), result));
    }

    pub fn delay_discount(&self, module: &str, code: &str, delay: Duration) {
        self.with_script(|s| s.discount_delays.insert((module.into(), code.to_string()), delay));
    }

    pub fn fail_next_register(&self, failure: Failure) {
        self.with_script(|s| s.register_failures.push_back(failure));
    }

    pub fn delay_register(&self, delay: Duration) {
        self.with_script(|s| s.register_delay = delay);
    }

    pub fn fail_next_payment(&self, failure: Failure) {
        self.with_script(|s| s.payment_failures.push_back(failure));
    }

    pub fn delay_payment(&self, delay: Duration) {
        self.with_script(|s| s.payment_delay = delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_script(|s| s.calls.clone())
    }

    pub fn name_checks(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CheckTeamName { .. }))
            .collect()
    }

    pub fn registrations(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Register { .. })).count()
    }

    pub fn payments(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::SubmitPayment { .. })).count()
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl RegistrationBackend for ScriptedBackend {
    async fn check_team_name(&self, event_id: &str, team_name: &str) -> Result<bool> {
        let (delay, fail, taken) = self.with_script(|s| {
            s.calls.push(Call::CheckTeamName {
                event_id: event_id.to_string(),
                team_name: team_name.to_string(),
            });
            (
                s.name_check_delays.get(team_name).copied().unwrap_or_default(),
                s.name_checks_fail,
                s.taken.contains(team_name),
            )
        });
        pause(delay).await;
        if fail {
            return Err(Failure::Network.into_error());
        }
        Ok(!taken)
    }

    async fn register_team(
        &self,
        event_id: &str,
        request: &RegistrationRequest,
    ) -> Result<RegistrationConfirmation> {
        let (delay, failure) = self.with_script(|s| {
            s.calls.push(Call::Register {
                event_id: event_id.to_string(),
                team_name: request.team_name.clone(),
                modules: request.modules.clone(),
            });
            (s.register_delay, s.register_failures.pop_front())
        });
        pause(delay).await;
        match failure {
            Some(failure) => Err(failure.into_error()),
            None => Ok(RegistrationConfirmation {
                message: "Team registered successfully".to_string(),
            }),
        }
    }

    async fn validate_discount(
        &self,
        event_id: &str,
        module: &ModuleName,
        code: &str,
    ) -> Result<DiscountQuote> {
        let key = (module.clone(), code.to_string());
        let (delay, answer) = self.with_script(|s| {
            s.calls.push(Call::ValidateDiscount {
                event_id: event_id.to_string(),
                module: module.clone(),
                code: code.to_string(),
            });
            (
                s.discount_delays.get(&key).copied().unwrap_or_default(),
                s.discounts.get(&key).cloned(),
            )
        });
        pause(delay).await;
        match answer {
            Some(Ok(amount)) => Ok(DiscountQuote {
                amount,
                message: Some(format!("Discount of {} applied", amount)),
            }),
            Some(Err(reason)) => Err(Failure::Rejected(reason).into_error()),
            None => Err(Failure::Rejected(
                "Discount code not found or invalid for selected module".to_string(),
            )
            .into_error()),
        }
    }

    async fn submit_payment(
        &self,
        event_id: &str,
        submission: &PaymentSubmission,
    ) -> Result<PaymentConfirmation> {
        let (delay, failure) = self.with_script(|s| {
            s.calls.push(Call::SubmitPayment {
                event_id: event_id.to_string(),
                team_name: submission.team_name.clone(),
                transaction_id: submission.transaction_id.clone(),
            });
            (s.payment_delay, s.payment_failures.pop_front())
        });
        pause(delay).await;
        match failure {
            Some(failure) => Err(failure.into_error()),
            None => Ok(PaymentConfirmation {
                message: "Payment submitted successfully".to_string(),
                receipt_url: "/uploads/receipts/r.png".to_string(),
                transaction_id: submission.transaction_id.clone(),
            }),
        }
    }
}
