use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::availability::Availability;

/// Where the wizard is. `Closed` means no registration is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum WizardStep {
    #[default]
    Closed,
    TeamDetails,
    ModuleSelection,
    Payment,
}

impl WizardStep {
    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::Closed => "Closed",
            WizardStep::TeamDetails => "Team Details",
            WizardStep::ModuleSelection => "Select Modules",
            WizardStep::Payment => "Payment",
        }
    }

    /// 1-based position shown as "Step n of 3", `None` when closed.
    pub fn number(&self) -> Option<u8> {
        match self {
            WizardStep::Closed => None,
            WizardStep::TeamDetails => Some(1),
            WizardStep::ModuleSelection => Some(2),
            WizardStep::Payment => Some(3),
        }
    }

    pub fn is_open(&self) -> bool {
        *self != WizardStep::Closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Open,
    Advance,
    Back,
    Cancel,
}

/// Server writes a transition has to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// `POST /register`, then `ModuleSelection -> Payment`.
    Registration,
    /// `POST /payment`, then `Payment -> Closed`.
    Payment,
}

impl Submission {
    /// Step the wizard lands on once the write succeeds.
    pub fn target(&self) -> WizardStep {
        match self {
            Submission::Registration => WizardStep::Payment,
            Submission::Payment => WizardStep::Closed,
        }
    }
}

/// The part of the draft an edit touches. Each part belongs to one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// Team name and members.
    Team,
    /// Module selection and discount codes.
    Modules,
    /// Receipt and transaction id.
    Payment,
}

impl EditScope {
    pub fn step(&self) -> WizardStep {
        match self {
            EditScope::Team => WizardStep::TeamDetails,
            EditScope::Modules => WizardStep::ModuleSelection,
            EditScope::Payment => WizardStep::Payment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Move(WizardStep),
    Submit(Submission),
}

/// Snapshot of everything the transition table looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gate {
    pub registration_open: bool,
    pub team_name_present: bool,
    pub filled_members: usize,
    pub availability: Availability,
    pub checking: bool,
    pub modules_selected: usize,
    pub receipt_attached: bool,
    pub transaction_id_present: bool,
    pub submission_in_flight: bool,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("Please enter a team name.")]
    MissingTeamName,

    #[error("Please add at least one member with a name and email.")]
    NoFilledMembers,

    #[error("This team name is already taken for this event.")]
    TeamNameTaken,

    #[error("Still checking team name availability.")]
    TeamNameCheckPending,

    #[error("Please select at least one module")]
    NoModulesSelected,

    #[error("Please attach your payment receipt.")]
    MissingReceipt,

    #[error("Please enter your transaction ID.")]
    MissingTransactionId,

    #[error("A submission is already in progress.")]
    SubmissionInFlight,

    #[error("Registration is closed for this event.")]
    RegistrationClosed,

    #[error("A registration is already in progress.")]
    AlreadyOpen,

    #[error("No registration is in progress.")]
    NotOpen,

    #[error("Already at the first step.")]
    NoPreviousStep,

    #[error("Go back to {} to change this.", .0.title())]
    StepLocked(WizardStep),

    #[error("Please register your team before paying.")]
    NotRegistered,
}

/// The wizard's transition table.
///
/// Every gating rule lives here. `Cancel` always succeeds; anything else
/// is refused while a submission is in flight.
pub fn transition(step: WizardStep, action: StepAction, gate: &Gate) -> Result<Transition, Rejection> {
    use StepAction::*;
    use WizardStep::*;

    if action == Cancel {
        return Ok(Transition::Move(Closed));
    }
    if gate.submission_in_flight {
        return Err(Rejection::SubmissionInFlight);
    }

    match (step, action) {
        (Closed, Open) => {
            if gate.registration_open {
                Ok(Transition::Move(TeamDetails))
            } else {
                Err(Rejection::RegistrationClosed)
            }
        }
        (_, Open) => Err(Rejection::AlreadyOpen),
        (Closed, _) => Err(Rejection::NotOpen),

        (TeamDetails, Advance) => {
            if !gate.team_name_present {
                Err(Rejection::MissingTeamName)
            } else if gate.filled_members == 0 {
                Err(Rejection::NoFilledMembers)
            } else if gate.availability == Availability::Taken {
                Err(Rejection::TeamNameTaken)
            } else if gate.checking {
                Err(Rejection::TeamNameCheckPending)
            } else {
                Ok(Transition::Move(ModuleSelection))
            }
        }
        (ModuleSelection, Advance) => {
            if gate.modules_selected == 0 {
                Err(Rejection::NoModulesSelected)
            } else {
                Ok(Transition::Submit(Submission::Registration))
            }
        }
        (Payment, Advance) => {
            if !gate.receipt_attached {
                Err(Rejection::MissingReceipt)
            } else if !gate.transaction_id_present {
                Err(Rejection::MissingTransactionId)
            } else {
                Ok(Transition::Submit(Submission::Payment))
            }
        }

        (TeamDetails, Back) => Err(Rejection::NoPreviousStep),
        (ModuleSelection, Back) => Ok(Transition::Move(TeamDetails)),
        (Payment, Back) => Ok(Transition::Move(ModuleSelection)),

        (_, Cancel) => Ok(Transition::Move(Closed)),
    }
}

/// Whether `scope` may be edited on `step`.
///
/// Team data is what `POST /register` sent and the payment is matched on, so
/// it only changes on its own step; going Back reopens it.
pub fn check_edit(step: WizardStep, scope: EditScope, submission_in_flight: bool) -> Result<(), Rejection> {
    if submission_in_flight {
        return Err(Rejection::SubmissionInFlight);
    }
    if !step.is_open() {
        return Err(Rejection::NotOpen);
    }
    if step != scope.step() {
        return Err(Rejection::StepLocked(scope.step()));
    }
    Ok(())
}
