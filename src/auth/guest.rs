//! Authorization of time-boxed guest principals.

use super::{
    address,
    claims::ClaimSet,
    error::{DenialReason, LoginError},
    verifier,
};
use crate::guests::GuestRepository;
use chrono::{DateTime, Utc};
use std::{net::IpAddr, time::Duration};
use tokio::time::timeout;

pub struct GuestAccessPolicy<'a> {
    repository: &'a dyn GuestRepository,
    lookup_timeout: Duration,
}

impl<'a> GuestAccessPolicy<'a> {
    #[must_use]
    pub fn new(repository: &'a dyn GuestRepository, lookup_timeout: Duration) -> Self {
        Self {
            repository,
            lookup_timeout,
        }
    }

    /// Authorize a guest login against the current time.
    ///
    /// # Errors
    /// See [`GuestAccessPolicy::authorize_with_clock`].
    pub async fn authorize(
        &self,
        identifier: &str,
        secret: &str,
        caller: Option<IpAddr>,
    ) -> Result<ClaimSet, LoginError> {
        self.authorize_with_clock(identifier, secret, caller, Utc::now)
            .await
    }

    /// Authorize a guest login, reading `clock` once the record is in hand.
    ///
    /// Checks run in a fixed order and stop at the first failure: lookup,
    /// secret, expiration, caller address, allow-list. Until the secret is
    /// proven, every failure is `InvalidCredentials`, and an unknown identifier
    /// pays for a full secret verification like a known one.
    ///
    /// # Errors
    /// Returns `LoginError::Denied` for the denial reasons above, and
    /// `LookupTimeout` or `Lookup` if the guest store does not answer.
    pub async fn authorize_with_clock(
        &self,
        identifier: &str,
        secret: &str,
        caller: Option<IpAddr>,
        clock: impl Fn() -> DateTime<Utc>,
    ) -> Result<ClaimSet, LoginError> {
        let record = timeout(
            self.lookup_timeout,
            self.repository.find_by_username(identifier),
        )
        .await
        .map_err(|_| LoginError::LookupTimeout(self.lookup_timeout))?
        .map_err(LoginError::Lookup)?;

        let Some(record) = record else {
            verifier::verify_unknown(secret);
            return Err(DenialReason::InvalidCredentials.into());
        };

        if !verifier::verify(secret, &record.password_hash) {
            return Err(DenialReason::InvalidCredentials.into());
        }

        if clock() > record.access_expiration {
            return Err(DenialReason::AccessExpired.into());
        }

        let caller = address::normalize(caller.ok_or(DenialReason::AddressUnavailable)?);

        if !record.allowed_addresses.is_empty()
            && !address::matches(caller, &record.allowed_addresses)
        {
            return Err(DenialReason::AddressNotAllowed(caller).into());
        }

        Ok(ClaimSet::guest(record.id, identifier, caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::claims::Role,
        guests::{GuestRecord, MemoryGuests},
    };
    use chrono::Duration as ChronoDuration;
    use std::{
        future::Future,
        net::Ipv4Addr,
        pin::Pin,
        time::Instant,
    };

    const TIMEOUT: Duration = Duration::from_secs(1);
    const SECRET: &str = "guest-pass";

    fn guests(expiration: DateTime<Utc>, allowed: &[&str]) -> anyhow::Result<MemoryGuests> {
        let guests = MemoryGuests::new();
        guests.insert(GuestRecord {
            id: 42,
            username: "bob".to_string(),
            password_hash: verifier::hash_secret(SECRET)?,
            access_expiration: expiration,
            allowed_addresses: allowed.iter().map(ToString::to_string).collect(),
        });
        Ok(guests)
    }

    fn ip(value: &str) -> Option<IpAddr> {
        value.parse().ok()
    }

    fn tomorrow() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::days(1)
    }

    #[tokio::test]
    async fn success_produces_guest_claims() -> anyhow::Result<()> {
        let repo = guests(tomorrow(), &[])?;
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        let claims = policy
            .authorize("bob", SECRET, ip("203.0.113.9"))
            .await?;
        assert_eq!(claims.identity(), 42);
        assert_eq!(claims.display_name(), "bob");
        assert_eq!(claims.role(), Role::Guest);
        assert_eq!(claims.source_address(), ip("203.0.113.9"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_secret_are_indistinguishable() -> anyhow::Result<()> {
        let repo = guests(tomorrow(), &[])?;
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        let unknown = policy.authorize("alice", SECRET, ip("10.0.0.1")).await;
        let wrong = policy.authorize("bob", "nope", ip("10.0.0.1")).await;
        let cased = policy.authorize("Bob", SECRET, ip("10.0.0.1")).await;

        for result in [unknown, wrong, cased] {
            let err = result.err();
            assert_eq!(
                err.as_ref().and_then(LoginError::denial),
                Some(&DenialReason::InvalidCredentials)
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_pays_for_a_verification() -> anyhow::Result<()> {
        let repo = guests(tomorrow(), &[])?;
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        let started = Instant::now();
        for _ in 0..2 {
            let _ = policy.authorize("mallory", "nope", ip("10.0.0.1")).await;
        }
        let unknown = started.elapsed();

        let started = Instant::now();
        for _ in 0..2 {
            let _ = policy.authorize("bob", "nope", ip("10.0.0.1")).await;
        }
        let wrong = started.elapsed();

        assert!(
            unknown * 4 >= wrong,
            "unknown user took {unknown:?}, wrong secret took {wrong:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_guest_with_correct_secret() -> anyhow::Result<()> {
        let repo = guests(Utc::now() - ChronoDuration::days(1), &[])?;
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        let err = policy.authorize("bob", SECRET, ip("10.0.0.1")).await.err();
        assert_eq!(
            err.as_ref().and_then(LoginError::denial),
            Some(&DenialReason::AccessExpired)
        );

        let err = policy.authorize("bob", "nope", ip("10.0.0.1")).await.err();
        assert_eq!(
            err.as_ref().and_then(LoginError::denial),
            Some(&DenialReason::InvalidCredentials)
        );
        Ok(())
    }

    #[tokio::test]
    async fn expiration_instant_itself_is_still_valid() -> anyhow::Result<()> {
        let expiration = tomorrow();
        let repo = guests(expiration, &[])?;
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        let at_expiration = policy
            .authorize_with_clock("bob", SECRET, ip("10.0.0.1"), || expiration)
            .await;
        assert!(at_expiration.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn missing_caller_address() -> anyhow::Result<()> {
        let repo = guests(tomorrow(), &[])?;
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        let err = policy.authorize("bob", SECRET, None).await.err();
        assert_eq!(
            err.as_ref().and_then(LoginError::denial),
            Some(&DenialReason::AddressUnavailable)
        );
        Ok(())
    }

    #[tokio::test]
    async fn mapped_caller_is_normalized() -> anyhow::Result<()> {
        let repo = guests(tomorrow(), &["10.0.0.5"])?;
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        let claims = policy
            .authorize("bob", SECRET, ip("::ffff:10.0.0.5"))
            .await?;
        assert_eq!(
            claims.source_address(),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
        );
        Ok(())
    }

    #[tokio::test]
    async fn cidr_allow_list() -> anyhow::Result<()> {
        let repo = guests(tomorrow(), &["10.0.0.0/24"])?;
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        assert!(policy.authorize("bob", SECRET, ip("10.0.0.7")).await.is_ok());

        let err = policy.authorize("bob", SECRET, ip("10.0.1.7")).await.err();
        let denial = err.as_ref().and_then(LoginError::denial);
        assert_eq!(
            denial,
            Some(&DenialReason::AddressNotAllowed(IpAddr::V4(Ipv4Addr::new(10, 0, 1, 7))))
        );
        assert_eq!(
            denial.map(DenialReason::public_message).as_deref(),
            Some("Unauthorized IP address: 10.0.1.7")
        );
        Ok(())
    }

    struct FailingGuests;

    impl GuestRepository for FailingGuests {
        fn find_by_username<'a>(
            &'a self,
            _username: &'a str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<GuestRecord>>> + Send + 'a>> {
            Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
        }
    }

    struct StalledGuests;

    impl GuestRepository for StalledGuests {
        fn find_by_username<'a>(
            &'a self,
            _username: &'a str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<GuestRecord>>> + Send + 'a>> {
            Box::pin(std::future::pending())
        }
    }

    struct SlowGuests {
        inner: MemoryGuests,
        delay: Duration,
    }

    impl GuestRepository for SlowGuests {
        fn find_by_username<'a>(
            &'a self,
            username: &'a str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<GuestRecord>>> + Send + 'a>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.inner.find_by_username(username).await
            })
        }
    }

    #[tokio::test]
    async fn expiration_is_checked_after_a_slow_lookup() -> anyhow::Result<()> {
        let repo = SlowGuests {
            inner: guests(Utc::now() + ChronoDuration::milliseconds(100), &[])?,
            delay: Duration::from_millis(300),
        };
        let policy = GuestAccessPolicy::new(&repo, TIMEOUT);

        let err = policy.authorize("bob", SECRET, ip("10.0.0.1")).await.err();
        assert_eq!(
            err.as_ref().and_then(LoginError::denial),
            Some(&DenialReason::AccessExpired)
        );
        Ok(())
    }

    #[tokio::test]
    async fn lookup_failure_is_not_a_denial() {
        let policy = GuestAccessPolicy::new(&FailingGuests, TIMEOUT);
        let err = policy.authorize("bob", SECRET, ip("10.0.0.1")).await.err();
        assert!(matches!(err, Some(LoginError::Lookup(_))));
    }

    #[tokio::test]
    async fn stalled_lookup_times_out() {
        let policy = GuestAccessPolicy::new(&StalledGuests, Duration::from_millis(50));
        let err = policy.authorize("bob", SECRET, ip("10.0.0.1")).await.err();
        assert!(matches!(err, Some(LoginError::LookupTimeout(_))));
    }
}
