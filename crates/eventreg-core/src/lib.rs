//! eventreg-core: client library for competition registration.
//!
//! This crate talks to the events API and runs the three-step registration
//! wizard (team details, module selection, payment) on top of it.
//!
//! # Modules
//!
//! - `api`: HTTP client, error mapping and the `RegistrationBackend` trait
//! - `config`: Configuration file and environment overrides
//! - `models`: Wire types for events, teams, registrations and payments
//! - `registration`: The wizard state machine and its side-processes

pub mod api;
pub mod config;
pub mod models;
pub mod registration;

pub use api::{ApiClient, ApiError, RegistrationBackend};
pub use config::Config;
pub use models::{Event, ModuleName, TeamMember};
pub use registration::{RegistrationWizard, WizardEvent, WizardSettings, WizardStep};
