//! Login entry point: classify, authorize, issue.

use super::{
    admin::AdminAccessPolicy,
    error::LoginError,
    guest::GuestAccessPolicy,
    token::{AccessCredential, TokenIssuer, TokenVerifier},
};
use crate::{guests::GuestRepository, settings::SettingsStore};
use std::{fmt, net::IpAddr, sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn, Span};

/// Principal class selected for a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Admin,
    Guest,
}

impl Principal {
    /// The admin flow is chosen by exact identifier match alone.
    #[must_use]
    pub fn classify(identifier: &str, admin_username: &str) -> Self {
        if identifier == admin_username {
            Self::Admin
        } else {
            Self::Guest
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Guest => f.write_str("guest"),
        }
    }
}

pub struct Authenticator {
    settings: SettingsStore,
    guests: Arc<dyn GuestRepository>,
    issuer: TokenIssuer,
    lookup_timeout: Duration,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("issuer", &self.issuer)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    #[must_use]
    pub fn new(
        settings: SettingsStore,
        guests: Arc<dyn GuestRepository>,
        issuer: TokenIssuer,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            guests,
            issuer,
            lookup_timeout,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    #[must_use]
    pub fn verifier(&self) -> TokenVerifier {
        self.issuer.verifier()
    }

    /// Evaluate one login attempt.
    ///
    /// Every call reads a single settings snapshot, so a concurrent reload
    /// never mixes old and new values within one decision. A credential is
    /// only produced after the matching policy has authorized the principal.
    ///
    /// # Errors
    /// Returns `LoginError::Denied` with the denial reason, or a fatal error if
    /// the guest lookup fails or times out, or if signing fails.
    #[instrument(skip(self, secret), fields(principal = tracing::field::Empty))]
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        caller: Option<IpAddr>,
    ) -> Result<AccessCredential, LoginError> {
        let snapshot = self.settings.snapshot();
        let principal = Principal::classify(identifier, &snapshot.admin_username);
        Span::current().record("principal", tracing::field::display(principal));

        let claims = match principal {
            Principal::Admin => AdminAccessPolicy::new(&snapshot)
                .authorize(identifier, secret)
                .map_err(LoginError::from)
                .map(|claims| (claims, snapshot.admin_session_lifetime_hours)),
            Principal::Guest => GuestAccessPolicy::new(self.guests.as_ref(), self.lookup_timeout)
                .authorize(identifier, secret, caller)
                .await
                .map(|claims| (claims, snapshot.guest_session_lifetime_hours)),
        };

        let result = claims.and_then(|(claims, lifetime_hours)| {
            let credential = self.issuer.issue(&claims, lifetime_hours)?;
            info!(
                role = %claims.role(),
                identity = claims.identity(),
                expires_at = %credential.expires_at,
                "Login succeeded"
            );
            Ok(credential)
        });

        match &result {
            Err(LoginError::Denied(reason)) => warn!("Login denied: {reason}"),
            Err(err) => error!("Login failed: {err:#}"),
            Ok(_) => {}
        }

        result
    }
}
