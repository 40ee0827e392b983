//! REST API client module for the events service.
//!
//! This module provides the `ApiClient` for the registration and payment
//! endpoints, the `ApiError` mapping of HTTP failures, and the
//! `RegistrationBackend` trait the wizard is written against.
//!
//! Errors follow FastAPI's `{"detail": ...}` shape; `user_message` turns any
//! client error into text that can be shown to the person registering.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::RegistrationBackend;
pub use client::ApiClient;
pub use error::{user_message, ApiError};
