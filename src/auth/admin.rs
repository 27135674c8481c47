//! Authorization of the sole administrative principal.

use super::{claims::ClaimSet, error::DenialReason, verifier};
use crate::settings::AdministrativeConfig;

/// Evaluates admin logins against one settings snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccessPolicy<'a> {
    config: &'a AdministrativeConfig,
}

impl<'a> AdminAccessPolicy<'a> {
    #[must_use]
    pub fn new(config: &'a AdministrativeConfig) -> Self {
        Self { config }
    }

    /// Authorize the admin principal.
    ///
    /// With `require_admin_login` off, any secret (including an empty one) is
    /// accepted even when no hash is configured. The display name is the
    /// identifier as typed by the caller.
    ///
    /// # Errors
    /// - `ConfigurationError` if a secret is required but no hash is configured.
    /// - `InvalidCredentials` if the secret does not verify.
    pub fn authorize(&self, identifier: &str, secret: &str) -> Result<ClaimSet, DenialReason> {
        if !self.config.require_admin_login {
            return Ok(ClaimSet::admin(identifier));
        }

        let hash = match self.config.admin_password_hash.as_deref() {
            Some(hash) if !hash.trim().is_empty() => hash,
            _ => return Err(DenialReason::ConfigurationError),
        };

        if verifier::verify(secret, hash) {
            Ok(ClaimSet::admin(identifier))
        } else {
            Err(DenialReason::InvalidCredentials)
        }
    }
}
