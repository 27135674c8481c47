//! Denial reasons and login failures.
//!
//! A `DenialReason` is an expected, terminal outcome of a login attempt and is
//! rendered to the caller. A `LoginError` additionally carries the fatal cases
//! (guest lookup failure or timeout, token signing failure) that abort the
//! request instead of denying it.

use std::{net::IpAddr, time::Duration};
use thiserror::Error;

use super::token::TokenError;

/// Message shared by every failure that happens before a secret is proven.
pub const GENERIC_DENIAL: &str = "Invalid username or password";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenialReason {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Access to this guest account has expired")]
    AccessExpired,
    #[error("Failed to read the IP of the calling client")]
    AddressUnavailable,
    #[error("Unauthorized IP address: {0}")]
    AddressNotAllowed(IpAddr),
    #[error("Admin login requires a password but no password hash is configured")]
    ConfigurationError,
}

impl DenialReason {
    /// Text safe to return to an unauthenticated caller.
    ///
    /// `ConfigurationError` is reachable before any secret is verified, so it
    /// renders exactly like `InvalidCredentials`.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials | Self::ConfigurationError => GENERIC_DENIAL.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error(transparent)]
    Denied(#[from] DenialReason),
    #[error("guest lookup timed out after {0:?}")]
    LookupTimeout(Duration),
    #[error(transparent)]
    Lookup(anyhow::Error),
    #[error("failed to issue access token")]
    Token(#[from] TokenError),
}

impl LoginError {
    /// Returns the denial reason when this failure is an expected denial.
    #[must_use]
    pub fn denial(&self) -> Option<&DenialReason> {
        match self {
            Self::Denied(reason) => Some(reason),
            _ => None,
        }
    }
}
