//! Guest account records and the lookup seam used at login.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::{fmt, future::Future, pin::Pin};

pub use memory::MemoryGuests;
pub use postgres::PgGuests;

#[derive(Clone)]
pub struct GuestRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub access_expiration: DateTime<Utc>,
    /// Allow-list patterns; empty means no address restriction.
    pub allowed_addresses: Vec<String>,
}

impl fmt::Debug for GuestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("access_expiration", &self.access_expiration)
            .field("allowed_addresses", &self.allowed_addresses)
            .finish()
    }
}

impl<'r> FromRow<'r, PgRow> for GuestRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            access_expiration: row.try_get("access_expiration")?,
            allowed_addresses: row
                .try_get::<Option<Vec<String>>, _>("allowed_addresses")?
                .unwrap_or_default(),
        })
    }
}

/// Read-only lookup of guest records by exact username.
pub trait GuestRepository: Send + Sync {
    /// `Ok(None)` when no guest has this username. Matching is exact and
    /// case-sensitive.
    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<GuestRecord>>> + Send + 'a>>;
}
