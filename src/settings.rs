//! Administrative security settings.
//!
//! Authentication reads an immutable snapshot. A reload parses the settings
//! file again and publishes a fresh `Arc<AdministrativeConfig>`; snapshots
//! already handed out are never mutated, so concurrent logins need no locks.

use crate::auth::verifier;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_SESSION_LIFETIME_HOURS: i64 = 24;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdministrativeConfig {
    pub admin_username: String,
    pub require_admin_login: bool,
    pub admin_password_hash: Option<String>,
    /// Source value; clamped only when a credential is issued.
    pub admin_session_lifetime_hours: i64,
    /// Source value; clamped only when a credential is issued.
    pub guest_session_lifetime_hours: i64,
}

impl Default for AdministrativeConfig {
    fn default() -> Self {
        Self {
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            require_admin_login: true,
            admin_password_hash: None,
            admin_session_lifetime_hours: DEFAULT_SESSION_LIFETIME_HOURS,
            guest_session_lifetime_hours: DEFAULT_SESSION_LIFETIME_HOURS,
        }
    }
}

impl AdministrativeConfig {
    /// Parse settings JSON. Missing fields take defaults, unknown fields are ignored.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid security settings JSON")
    }

    /// Read and parse a settings file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let config = Self::from_json(&json)?;
        if config.has_malformed_admin_hash() {
            warn!(
                "admin_password_hash in {} is not a valid PHC string; admin logins will be denied",
                path.display()
            );
        }
        Ok(config)
    }

    /// True when a non-blank admin hash is set but cannot be parsed.
    #[must_use]
    pub fn has_malformed_admin_hash(&self) -> bool {
        self.admin_password_hash
            .as_deref()
            .is_some_and(|hash| !hash.trim().is_empty() && !verifier::is_well_formed(hash))
    }
}

/// Publishes immutable settings snapshots.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<Arc<AdministrativeConfig>>>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    #[must_use]
    pub fn new(config: AdministrativeConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self {
            tx: Arc::new(tx),
            path: None,
        }
    }

    /// Load the initial snapshot from `path` and remember it for reloads.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = AdministrativeConfig::load(&path)?;
        let mut store = Self::new(config);
        store.path = Some(path);
        Ok(store)
    }

    /// Current snapshot; cheap to clone and safe to hold across awaits.
    #[must_use]
    pub fn snapshot(&self) -> Arc<AdministrativeConfig> {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, config: AdministrativeConfig) {
        self.tx.send_replace(Arc::new(config));
    }

    /// Re-read the settings file and publish it. On failure the previous
    /// snapshot stays in effect.
    ///
    /// # Errors
    /// Returns an error if the store has no backing file or the file is invalid.
    #[instrument(skip(self))]
    pub fn reload(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .context("settings store has no backing file")?;
        let config = AdministrativeConfig::load(path)?;
        self.publish(config);
        info!("Reloaded security settings from {}", path.display());
        Ok(())
    }

    /// Reload on every `SIGHUP` until the process exits.
    #[cfg(unix)]
    pub fn reload_on_sighup(&self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        let store = self.clone();
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                if let Err(err) = store.reload() {
                    error!("Failed to reload security settings: {err:#}");
                }
            }
        });
        Ok(())
    }
}
