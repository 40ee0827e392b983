//! Data models for the event registration API.
//!
//! This module contains the wire types exchanged with the events API:
//!
//! - `Event`, `ModuleName`: Competition listings with per-module pricing
//! - `TeamMember`: A member slot on the team form
//! - Registration and payment types: `RegistrationRequest`, `DiscountQuote`,
//!   `PaymentConfirmation`, `PaymentStatus`

pub mod event;
pub mod registration;
pub mod team;

pub use event::{open_for_registration, Amount, Event, ModuleName};
pub use registration::{
    DiscountQuote, IdentifierKind, PaymentConfirmation, PaymentState, PaymentStatus,
    RegistrationConfirmation, RegistrationRequest,
};
pub use team::{MemberField, TeamMember};
