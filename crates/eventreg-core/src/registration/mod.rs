//! Competition registration wizard.
//!
//! - `steps`: the transition table and its rejections
//! - `draft`: the in-progress registration the wizard owns
//! - `availability`: debounced team-name checks
//! - `discount`: per-module discount codes and their server verdicts
//! - `pricing`: totals for the current selection
//! - `payment`: receipt validation and the final payment submission
//! - `wizard`: ties the above together and runs the server calls

pub mod availability;
pub mod discount;
pub mod draft;
pub mod payment;
pub mod pricing;
pub mod steps;
pub mod wizard;

#[cfg(test)]
pub(crate) mod testing;

pub use availability::{Availability, ProbeState, TeamNameProber};
pub use discount::{DiscountBook, DiscountState};
pub use draft::{RegistrationDraft, MAX_TEAM_MEMBERS};
pub use payment::{PaymentForm, PaymentSubmission, Receipt, ReceiptError, ReceiptKind};
pub use pricing::{quote, LineItem, Quote};
pub use steps::{
    check_edit, EditScope, Gate, Rejection, StepAction, Submission, Transition, WizardStep,
};
pub use wizard::{
    Notice, NoticeLevel, Progress, RegistrationWizard, WizardError, WizardEvent, WizardSettings,
};
