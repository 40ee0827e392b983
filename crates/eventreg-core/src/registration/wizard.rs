//! The registration wizard: draft ownership, step transitions and the
//! background work each step kicks off.
//!
//! The wizard is driven from a single owner. Its methods are synchronous and
//! take `&mut self`; server round-trips run as spawned Tokio tasks that report
//! back over a bounded channel. The owner drains results with
//! [`RegistrationWizard::poll_updates`] (non-blocking, suited to a UI tick)
//! or [`RegistrationWizard::next_event`] (awaits the next result).
//!
//! Every result is tagged with the session it was started in. Cancelling or
//! finishing the wizard starts a new session, so late results for a closed
//! wizard are dropped.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{user_message, RegistrationBackend};
use crate::config::{Config, DEFAULT_MAX_RECEIPT_BYTES, DEFAULT_TEAM_NAME_DEBOUNCE_MS};
use crate::models::{
    Amount, Event, MemberField, ModuleName, PaymentConfirmation, RegistrationConfirmation,
    RegistrationRequest, TeamMember,
};

use super::availability::{ProbeState, TeamNameProber};
use super::discount::{DiscountBook, DiscountOutcome, DiscountValidator, DEFAULT_REJECTED_MESSAGE};
use super::draft::{RegistrationDraft, MAX_TEAM_MEMBERS};
use super::payment::{PaymentForm, PaymentSubmission, Receipt, ReceiptError};
use super::pricing::{self, Quote};
use super::steps::{
    check_edit, transition, EditScope, Gate, Rejection, StepAction, Submission, Transition, WizardStep,
};

/// Buffer size for the background result channel.
/// 32 is plenty: at most one registration or payment plus a handful of
/// discount checks are ever outstanding.
const CHANNEL_BUFFER_SIZE: usize = 32;

const REGISTERED_MESSAGE: &str = "Team registered successfully! Please proceed with payment.";
const PAYMENT_SUBMITTED_MESSAGE: &str = "Registration and payment submitted successfully!";
const ALREADY_REGISTERED_MESSAGE: &str = "Team already registered. Continue with payment.";
const REGISTRATION_FAILED_MESSAGE: &str = "Registration failed";
const PAYMENT_FAILED_MESSAGE: &str = "Payment submission failed. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardSettings {
    pub team_name_debounce: Duration,
    pub max_receipt_bytes: u64,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            team_name_debounce: Duration::from_millis(DEFAULT_TEAM_NAME_DEBOUNCE_MS),
            max_receipt_bytes: DEFAULT_MAX_RECEIPT_BYTES,
        }
    }
}

impl From<&Config> for WizardSettings {
    fn from(config: &Config) -> Self {
        Self {
            team_name_debounce: config.team_name_debounce(),
            max_receipt_bytes: config.max_receipt_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// The single transient message a UI shows for the last action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WizardError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("Unknown module: {0}")]
    UnknownModule(ModuleName),

    #[error("No member slot {0}")]
    NoSuchMember(usize),

    #[error(transparent)]
    Receipt(#[from] ReceiptError),
}

/// What an accepted `advance`, `back` or `cancel` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The wizard is now on this step.
    Moved(WizardStep),
    /// A server write started; the step changes when it succeeds.
    Submitting(Submission),
}

/// Background results, as seen by the owner.
#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    DiscountApplied { module: ModuleName, amount: Amount },
    DiscountRejected { module: ModuleName, message: String },
    Registered(RegistrationConfirmation),
    RegistrationFailed { message: String },
    PaymentSubmitted(PaymentConfirmation),
    PaymentFailed { message: String },
}

/// Result of a spawned task, tagged with the session that started it.
#[derive(Debug)]
enum Update {
    Discount {
        session: u64,
        outcome: DiscountOutcome,
    },
    Registration {
        session: u64,
        request: RegistrationRequest,
        result: Result<RegistrationConfirmation, String>,
    },
    Payment {
        session: u64,
        result: Result<PaymentConfirmation, String>,
    },
}

impl Update {
    fn session(&self) -> u64 {
        match self {
            Update::Discount { session, .. }
            | Update::Registration { session, .. }
            | Update::Payment { session, .. } => *session,
        }
    }
}

async fn send_update(tx: &mpsc::Sender<Update>, update: Update) {
    if let Err(e) = tx.send(update).await {
        error!(error = %e, "Failed to send wizard update - channel closed");
    }
}

pub struct RegistrationWizard<B: RegistrationBackend> {
    backend: Arc<B>,
    settings: WizardSettings,
    step: WizardStep,
    session: u64,
    draft: Option<RegistrationDraft>,
    prober: TeamNameProber<B>,
    discounts: DiscountValidator,
    payment: PaymentForm,
    /// Last request the server accepted in this session.
    registered: Option<RegistrationRequest>,
    in_flight: Option<Submission>,
    notice: Option<Notice>,
    tasks: Vec<JoinHandle<()>>,
    /// Tasks of the current session whose result has not been processed yet.
    outstanding: usize,
    tx: mpsc::Sender<Update>,
    rx: mpsc::Receiver<Update>,
}

impl<B: RegistrationBackend> RegistrationWizard<B> {
    pub fn new(backend: Arc<B>, settings: WizardSettings) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let prober = TeamNameProber::new(Arc::clone(&backend), settings.team_name_debounce);
        Self {
            backend,
            settings,
            step: WizardStep::Closed,
            session: 0,
            draft: None,
            prober,
            discounts: DiscountValidator::default(),
            payment: PaymentForm::default(),
            registered: None,
            in_flight: None,
            notice: None,
            tasks: Vec::new(),
            outstanding: 0,
            tx,
            rx,
        }
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> Option<&RegistrationDraft> {
        self.draft.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn name_check(&self) -> ProbeState {
        self.prober.snapshot()
    }

    pub fn subscribe_name_check(&self) -> watch::Receiver<ProbeState> {
        self.prober.subscribe()
    }

    pub fn discounts(&self) -> &DiscountBook {
        self.discounts.book()
    }

    pub fn is_discount_pending(&self, module: &ModuleName) -> bool {
        self.discounts.is_pending(module)
    }

    pub fn payment(&self) -> &PaymentForm {
        &self.payment
    }

    pub fn submission_in_flight(&self) -> Option<Submission> {
        self.in_flight
    }

    /// Whether results are still expected from background tasks.
    pub fn has_pending_work(&self) -> bool {
        self.outstanding > 0
    }

    /// Current price breakdown, `None` when no registration is open.
    pub fn quote(&self) -> Option<Quote> {
        self.draft.as_ref().map(|draft| {
            pricing::quote(
                draft.selected_modules(),
                &draft.event().module_amounts,
                self.discounts.book(),
            )
        })
    }

    /// Snapshot of the inputs the transition table checks.
    pub fn gate(&self) -> Gate {
        let probe = self.prober.snapshot();
        let draft = self.draft.as_ref();
        Gate {
            registration_open: draft.is_some_and(|d| d.event().registration_open),
            team_name_present: draft.is_some_and(|d| !d.trimmed_team_name().is_empty()),
            filled_members: draft.map_or(0, |d| d.filled_members().len()),
            availability: probe.availability,
            checking: probe.checking,
            modules_selected: draft.map_or(0, |d| d.selected_modules().len()),
            receipt_attached: self.payment.receipt.is_some(),
            transaction_id_present: self.payment.has_transaction_id(),
            submission_in_flight: self.in_flight.is_some(),
        }
    }

    // ------------------------------------------------------------------
    // Step transitions
    // ------------------------------------------------------------------

    /// Start a registration for `event` with an empty draft.
    pub fn open(&mut self, event: Event) -> Result<(), WizardError> {
        self.notice = None;
        let gate = Gate {
            registration_open: event.registration_open,
            ..self.gate()
        };
        if let Err(rejection) = transition(self.step, StepAction::Open, &gate) {
            return Err(self.reject(rejection));
        }

        self.discard();
        info!(event_id = %event.id, title = %event.title, "Opening registration");
        self.draft = Some(RegistrationDraft::new(event));
        self.move_to(WizardStep::TeamDetails);
        Ok(())
    }

    /// Move forward, submitting to the server where the step requires it.
    pub fn advance(&mut self) -> Result<Progress, WizardError> {
        self.notice = None;
        match transition(self.step, StepAction::Advance, &self.gate()) {
            Ok(Transition::Move(step)) => {
                self.move_to(step);
                Ok(Progress::Moved(step))
            }
            Ok(Transition::Submit(Submission::Registration)) => self.submit_registration(),
            Ok(Transition::Submit(Submission::Payment)) => self.submit_payment(),
            Err(rejection) => Err(self.reject(rejection)),
        }
    }

    pub fn back(&mut self) -> Result<Progress, WizardError> {
        self.notice = None;
        match transition(self.step, StepAction::Back, &self.gate()) {
            Ok(Transition::Move(step)) => {
                self.move_to(step);
                Ok(Progress::Moved(step))
            }
            Ok(Transition::Submit(_)) => Err(self.reject(Rejection::NoPreviousStep)),
            Err(rejection) => Err(self.reject(rejection)),
        }
    }

    /// Close the wizard and throw away the draft and all pending work.
    ///
    /// A registration the server already accepted is left in place.
    pub fn cancel(&mut self) -> Progress {
        self.notice = None;
        if self.step.is_open() {
            info!(step = ?self.step, "Registration cancelled");
        }
        self.discard();
        Progress::Moved(WizardStep::Closed)
    }

    fn move_to(&mut self, step: WizardStep) {
        if self.step != step {
            info!(from = ?self.step, to = ?step, "Wizard step changed");
        }
        self.step = step;
    }

    fn discard(&mut self) {
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
        self.session += 1;
        self.outstanding = 0;
        self.prober.reset();
        self.draft = None;
        self.discounts = DiscountValidator::default();
        self.payment = PaymentForm::default();
        self.registered = None;
        self.in_flight = None;
        self.step = WizardStep::Closed;
    }

    fn reject(&mut self, err: impl Into<WizardError>) -> WizardError {
        let err = err.into();
        debug!(step = ?self.step, error = %err, "Wizard action rejected");
        self.notice = Some(Notice::new(NoticeLevel::Error, err.to_string()));
        err
    }

    // ------------------------------------------------------------------
    // Draft edits
    //
    // Each edit is accepted only on the step that owns it, see `EditScope`.
    // ------------------------------------------------------------------

    fn ensure_editable(&mut self, scope: EditScope) -> Result<(), WizardError> {
        self.notice = None;
        if let Err(rejection) = check_edit(self.step, scope, self.in_flight.is_some()) {
            return Err(self.reject(rejection));
        }
        if self.draft.is_none() {
            return Err(self.reject(Rejection::NotOpen));
        }
        Ok(())
    }

    fn draft_mut(&mut self, scope: EditScope) -> Result<&mut RegistrationDraft, WizardError> {
        self.ensure_editable(scope)?;
        self.draft
            .as_mut()
            .ok_or(WizardError::Rejected(Rejection::NotOpen))
    }

    /// Update the team name and (re)schedule its availability check.
    pub fn set_team_name(&mut self, name: &str) -> Result<(), WizardError> {
        let draft = self.draft_mut(EditScope::Team)?;
        draft.set_team_name(name);
        let event_id = draft.event_id().to_string();
        self.prober.update(&event_id, name);
        Ok(())
    }

    pub fn update_member(
        &mut self,
        index: usize,
        field: MemberField,
        value: &str,
    ) -> Result<(), WizardError> {
        if index >= MAX_TEAM_MEMBERS {
            return Err(self.reject(WizardError::NoSuchMember(index)));
        }
        let draft = self.draft_mut(EditScope::Team)?;
        if let Some(member) = draft.member_mut(index) {
            *member.field_mut(field) = value.to_string();
        }
        Ok(())
    }

    pub fn set_member(&mut self, index: usize, member: TeamMember) -> Result<(), WizardError> {
        if index >= MAX_TEAM_MEMBERS {
            return Err(self.reject(WizardError::NoSuchMember(index)));
        }
        self.draft_mut(EditScope::Team)?.set_member(index, member);
        Ok(())
    }

    /// Flip a module's selection; returns whether it is now selected.
    pub fn toggle_module(&mut self, module: &ModuleName) -> Result<bool, WizardError> {
        match self.draft_mut(EditScope::Modules)?.toggle_module(module) {
            Some(selected) => Ok(selected),
            None => Err(self.reject(WizardError::UnknownModule(module.clone()))),
        }
    }

    /// Ask the server to price `code` for `module`. An empty code clears the
    /// module's discount without a request.
    pub fn validate_discount(&mut self, module: &ModuleName, code: &str) -> Result<(), WizardError> {
        let draft = self.draft_mut(EditScope::Modules)?;
        let event_id = draft
            .event()
            .has_module(module)
            .then(|| draft.event_id().to_string());
        let Some(event_id) = event_id else {
            return Err(self.reject(WizardError::UnknownModule(module.clone())));
        };

        let Some(ticket) = self.discounts.begin(module, code) else {
            debug!(module = %module, "Discount code cleared");
            return Ok(());
        };

        debug!(event_id = %event_id, module = %module, "Validating discount code");
        let backend = Arc::clone(&self.backend);
        let session = self.session;
        self.spawn_task(async move {
            let result = backend
                .validate_discount(&event_id, &ticket.module, &ticket.code)
                .await
                .map_err(|e| {
                    warn!(module = %ticket.module, error = %e, "Discount validation failed");
                    user_message(&e, DEFAULT_REJECTED_MESSAGE)
                });
            Update::Discount {
                session,
                outcome: ticket.settle(result),
            }
        });
        Ok(())
    }

    pub fn set_transaction_id(&mut self, transaction_id: &str) -> Result<(), WizardError> {
        self.ensure_editable(EditScope::Payment)?;
        self.payment.transaction_id = transaction_id.to_string();
        Ok(())
    }

    /// Select an already validated receipt.
    pub fn attach_receipt(&mut self, receipt: Receipt) -> Result<(), WizardError> {
        self.ensure_editable(EditScope::Payment)?;
        debug!(file = %receipt.file_name(), size = receipt.size(), "Receipt attached");
        self.payment.receipt = Some(receipt);
        Ok(())
    }

    /// Validate and select an in-memory receipt. A rejected file leaves the
    /// previous selection in place.
    pub fn attach_receipt_bytes(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), WizardError> {
        self.ensure_editable(EditScope::Payment)?;
        match Receipt::from_bytes(file_name, bytes, self.settings.max_receipt_bytes) {
            Ok(receipt) => self.attach_receipt(receipt),
            Err(e) => Err(self.reject(e)),
        }
    }

    pub async fn attach_receipt_from_path(&mut self, path: impl AsRef<Path>) -> Result<(), WizardError> {
        self.ensure_editable(EditScope::Payment)?;
        match Receipt::from_path(path, self.settings.max_receipt_bytes).await {
            Ok(receipt) => self.attach_receipt(receipt),
            Err(e) => Err(self.reject(e)),
        }
    }

    // ------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------

    fn submit_registration(&mut self) -> Result<Progress, WizardError> {
        let (event_id, request) = match self.draft.as_ref() {
            Some(draft) => (draft.event_id().to_string(), draft.registration_request()),
            None => return Err(self.reject(Rejection::NotOpen)),
        };

        if self.registered.as_ref().is_some_and(|r| r.same_registration(&request)) {
            debug!(event_id = %event_id, "Registration unchanged, skipping duplicate write");
            self.notice = Some(Notice::new(NoticeLevel::Info, ALREADY_REGISTERED_MESSAGE));
            self.move_to(WizardStep::Payment);
            return Ok(Progress::Moved(WizardStep::Payment));
        }

        info!(
            event_id = %event_id,
            members = request.members.len(),
            modules = request.modules.len(),
            "Submitting team registration"
        );
        self.in_flight = Some(Submission::Registration);
        let backend = Arc::clone(&self.backend);
        let session = self.session;
        self.spawn_task(async move {
            let result = backend
                .register_team(&event_id, &request)
                .await
                .map_err(|e| {
                    warn!(event_id = %event_id, error = %e, "Team registration failed");
                    user_message(&e, REGISTRATION_FAILED_MESSAGE)
                });
            Update::Registration {
                session,
                request,
                result,
            }
        });
        Ok(Progress::Submitting(Submission::Registration))
    }

    fn submit_payment(&mut self) -> Result<Progress, WizardError> {
        let built = match (self.draft.as_ref(), self.registered.as_ref()) {
            (Some(draft), Some(registered)) => {
                PaymentSubmission::build(registered, &self.payment, self.discounts.book())
                    .map(|submission| (draft.event_id().to_string(), submission))
            }
            (Some(_), None) => Err(Rejection::NotRegistered),
            (None, _) => Err(Rejection::NotOpen),
        };
        let (event_id, submission) = match built {
            Ok(built) => built,
            Err(rejection) => return Err(self.reject(rejection)),
        };

        info!(
            event_id = %event_id,
            competition = %submission.competition,
            discounts = submission.discount_codes.len(),
            "Submitting payment"
        );
        self.in_flight = Some(Submission::Payment);
        let backend = Arc::clone(&self.backend);
        let session = self.session;
        self.spawn_task(async move {
            let result = backend
                .submit_payment(&event_id, &submission)
                .await
                .map_err(|e| {
                    warn!(event_id = %event_id, error = %e, "Payment submission failed");
                    user_message(&e, PAYMENT_FAILED_MESSAGE)
                });
            Update::Payment { session, result }
        });
        Ok(Progress::Submitting(Submission::Payment))
    }

    fn spawn_task<F>(&mut self, task: F)
    where
        F: Future<Output = Update> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.tasks.retain(|handle| !handle.is_finished());
        self.outstanding += 1;
        self.tasks.push(tokio::spawn(async move {
            let update = task.await;
            send_update(&tx, update).await;
        }));
    }

    // ------------------------------------------------------------------
    // Background results
    // ------------------------------------------------------------------

    /// Apply every result that has already arrived, without waiting.
    pub fn poll_updates(&mut self) -> Vec<WizardEvent> {
        // Collect first, then process, so the receiver borrow ends
        let mut updates = Vec::new();
        while let Ok(update) = self.rx.try_recv() {
            updates.push(update);
        }
        updates
            .into_iter()
            .filter_map(|update| self.process_update(update))
            .collect()
    }

    /// Wait for the next result that changes wizard state.
    ///
    /// Returns `None` once nothing from the current session is outstanding.
    pub async fn next_event(&mut self) -> Option<WizardEvent> {
        while self.outstanding > 0 {
            let update = self.rx.recv().await?;
            if let Some(event) = self.process_update(update) {
                return Some(event);
            }
        }
        None
    }

    fn process_update(&mut self, update: Update) -> Option<WizardEvent> {
        if update.session() != self.session {
            debug!(session = update.session(), current = self.session, "Dropping result from closed wizard");
            return None;
        }
        self.outstanding = self.outstanding.saturating_sub(1);

        match update {
            Update::Discount { outcome, .. } => {
                let module = outcome.module().clone();
                let Some(state) = self.discounts.apply(outcome).cloned() else {
                    debug!(module = %module, "Dropping superseded discount result");
                    return None;
                };
                if state.valid {
                    self.notice = Some(Notice::new(NoticeLevel::Success, state.message));
                    Some(WizardEvent::DiscountApplied {
                        module,
                        amount: state.amount,
                    })
                } else {
                    self.notice = Some(Notice::new(NoticeLevel::Error, state.message.clone()));
                    Some(WizardEvent::DiscountRejected {
                        module,
                        message: state.message,
                    })
                }
            }
            Update::Registration { request, result, .. } => {
                self.in_flight = None;
                match result {
                    Ok(confirmation) => {
                        info!(team = %request.team_name, "Team registered");
                        self.registered = Some(request);
                        self.move_to(WizardStep::Payment);
                        self.notice = Some(Notice::new(NoticeLevel::Success, REGISTERED_MESSAGE));
                        Some(WizardEvent::Registered(confirmation))
                    }
                    Err(message) => {
                        self.notice = Some(Notice::new(NoticeLevel::Error, message.clone()));
                        Some(WizardEvent::RegistrationFailed { message })
                    }
                }
            }
            Update::Payment { result, .. } => {
                self.in_flight = None;
                match result {
                    Ok(confirmation) => {
                        info!(transaction_id = %confirmation.transaction_id, "Payment submitted");
                        self.discard();
                        self.notice = Some(Notice::new(NoticeLevel::Success, PAYMENT_SUBMITTED_MESSAGE));
                        Some(WizardEvent::PaymentSubmitted(confirmation))
                    }
                    Err(message) => {
                        self.notice = Some(Notice::new(NoticeLevel::Error, message.clone()));
                        Some(WizardEvent::PaymentFailed { message })
                    }
                }
            }
        }
    }
}

impl<B: RegistrationBackend> Drop for RegistrationWizard<B> {
    fn drop(&mut self) {
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
    }
}
