use super::{GuestRecord, GuestRepository};
use anyhow::Context;
use sqlx::PgPool;
use std::{future::Future, pin::Pin};
use tracing::{info_span, Instrument};

const FIND_BY_USERNAME: &str = "SELECT id, username, password_hash, access_expiration, \
    allowed_addresses FROM guests WHERE username = $1";

/// Guest records stored in the `guests` table.
#[derive(Clone, Debug)]
pub struct PgGuests {
    pool: PgPool,
}

impl PgGuests {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, username: &str) -> anyhow::Result<Option<GuestRecord>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = FIND_BY_USERNAME
        );
        sqlx::query_as::<_, GuestRecord>(FIND_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("Failed to look up guest record")
    }
}

impl GuestRepository for PgGuests {
    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<GuestRecord>>> + Send + 'a>> {
        Box::pin(self.fetch(username))
    }
}
