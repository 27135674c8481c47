//! Signed, time-bounded access credentials.
//!
//! Flow Overview:
//! 1) Clamp the requested lifetime into `[0, 9999]` hours.
//! 2) Build the payload (issuer, RFC 3339 `iat`/`exp`, `jti`, claim triples).
//! 3) Sign the PASETO pre-auth encoding of header, payload and footer with Ed25519.
//! 4) Emit `v4.public.<payload||signature>.<footer>`; the footer names the key id.
//!
//! Verification is offline: any holder of the public key can check the
//! signature and reject expired credentials without calling back. A lifetime
//! of zero hours produces a credential that is already expired when issued.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::claims::{Claim, ClaimSet, ClaimsError};

const HEADER: &str = "v4.public.";
const SIGNATURE_LEN: usize = 64;

/// Upper bound applied to every credential lifetime.
pub const MAX_LIFETIME_HOURS: i64 = 9999;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("token expired")]
    Expired,
    #[error("invalid claims: {0}")]
    Claims(#[from] ClaimsError),
    #[error("invalid length")]
    InvalidLength,
    #[error("signing seed must be 32 bytes of base64url")]
    InvalidSeed,
}

/// Clamp a configured lifetime into the accepted range.
#[must_use]
pub fn clamp_lifetime_hours(hours: i64) -> i64 {
    hours.clamp(0, MAX_LIFETIME_HOURS)
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    iss: String,
    iat: String,
    exp: String,
    jti: String,
    claims: Vec<Claim>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFooter {
    kid: String,
}

/// An issued bearer credential.
#[derive(Clone)]
pub struct AccessCredential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"***")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Process-wide Ed25519 signing key. Safe for concurrent read-only use.
pub struct TokenSigner {
    signing_key: SigningKey,
    key_id: String,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let key_id = key_id(&signing_key.verifying_key());
        Self {
            signing_key,
            key_id,
        }
    }

    /// Decode a base64url (unpadded) 32-byte seed.
    ///
    /// # Errors
    /// Returns `TokenError::InvalidSeed` if the value is not 32 bytes of base64url.
    pub fn from_base64_seed(seed: &SecretString) -> Result<Self, TokenError> {
        let bytes = Base64UrlUnpadded::decode_vec(seed.expose_secret().trim())
            .map_err(|_| TokenError::InvalidSeed)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| TokenError::InvalidSeed)?;
        Ok(Self::from_seed(&seed))
    }

    /// Build a signer with a random key. Credentials do not survive a restart.
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

/// Principal-agnostic credential issuance.
#[derive(Debug)]
pub struct TokenIssuer {
    signer: TokenSigner,
    issuer: String,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(signer: TokenSigner, issuer: impl Into<String>) -> Self {
        Self {
            signer,
            issuer: issuer.into(),
        }
    }

    /// Issue a credential valid from now for the clamped lifetime.
    ///
    /// # Errors
    /// Returns an error if payload encoding fails.
    pub fn issue(
        &self,
        claims: &ClaimSet,
        lifetime_hours: i64,
    ) -> Result<AccessCredential, TokenError> {
        self.issue_at(claims, lifetime_hours, Utc::now())
    }

    /// Issue a credential as of `now`. Sub-second precision is dropped so the
    /// encoded expiry equals `issued_at + lifetime` exactly.
    ///
    /// # Errors
    /// Returns an error if payload encoding fails.
    pub fn issue_at(
        &self,
        claims: &ClaimSet,
        lifetime_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<AccessCredential, TokenError> {
        let issued_at = now.trunc_subsecs(0);
        let expires_at = issued_at
            .checked_add_signed(Duration::hours(clamp_lifetime_hours(lifetime_hours)))
            .ok_or(TokenError::InvalidTimestamp)?;

        let payload = TokenPayload {
            iss: self.issuer.clone(),
            iat: issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            exp: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            jti: Uuid::new_v4().to_string(),
            claims: claims.to_claims(),
        };
        let footer = TokenFooter {
            kid: self.signer.key_id.clone(),
        };

        let payload = serde_json::to_vec(&payload)?;
        let footer = serde_json::to_vec(&footer)?;
        let pre_auth = pae(&[HEADER.as_bytes(), &payload, &footer, b""])?;
        let signature = self.signer.sign(&pre_auth);

        Ok(AccessCredential {
            token: build_token(&payload, &footer, &signature.to_bytes()),
            issued_at,
            expires_at,
        })
    }

    /// Verifier bound to this issuer's public key.
    #[must_use]
    pub fn verifier(&self) -> TokenVerifier {
        TokenVerifier {
            verifying_key: self.signer.verifying_key(),
            key_id: self.signer.key_id.clone(),
            issuer: self.issuer.clone(),
        }
    }
}

/// A credential whose signature, issuer, expiry and claims have been checked.
#[derive(Debug, Clone)]
pub struct VerifiedCredential {
    pub claims: ClaimSet,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub jti: String,
}

/// Offline verification for downstream authorization layers.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    verifying_key: VerifyingKey,
    key_id: String,
    issuer: String,
}

impl TokenVerifier {
    /// Verify a credential as of `now`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the token is malformed or contains invalid base64/json,
    /// - the footer names an unknown key id,
    /// - the signature is invalid,
    /// - the issuer does not match, or `exp <= now`,
    /// - the claim set violates the one-of-each invariant.
    pub fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedCredential, TokenError> {
        let rest = token.strip_prefix(HEADER).ok_or(TokenError::TokenFormat)?;
        let (body_b64, footer_b64) = rest.split_once('.').ok_or(TokenError::TokenFormat)?;
        if footer_b64.contains('.') {
            return Err(TokenError::TokenFormat);
        }

        let body = Base64UrlUnpadded::decode_vec(body_b64).map_err(|_| TokenError::Base64)?;
        let footer = Base64UrlUnpadded::decode_vec(footer_b64).map_err(|_| TokenError::Base64)?;
        if body.len() < SIGNATURE_LEN {
            return Err(TokenError::TokenFormat);
        }
        let (payload, signature) = body.split_at(body.len() - SIGNATURE_LEN);

        let parsed_footer: TokenFooter = serde_json::from_slice(&footer)?;
        if parsed_footer.kid != self.key_id {
            return Err(TokenError::UnknownKid(parsed_footer.kid));
        }

        let signature: [u8; SIGNATURE_LEN] =
            signature.try_into().map_err(|_| TokenError::InvalidSignature)?;
        let pre_auth = pae(&[HEADER.as_bytes(), payload, &footer, b""])?;
        self.verifying_key
            .verify(&pre_auth, &Signature::from_bytes(&signature))
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload: TokenPayload = serde_json::from_slice(payload)?;
        if payload.iss != self.issuer {
            return Err(TokenError::InvalidIssuer);
        }
        let issued_at = parse_timestamp(&payload.iat)?;
        let expires_at = parse_timestamp(&payload.exp)?;
        if expires_at <= now {
            return Err(TokenError::Expired);
        }

        Ok(VerifiedCredential {
            claims: ClaimSet::try_from(payload.claims)?,
            issued_at,
            expires_at,
            jti: payload.jti,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TokenError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TokenError::InvalidTimestamp)
}

fn key_id(verifying_key: &VerifyingKey) -> String {
    let digest = Sha256::digest(verifying_key.as_bytes());
    Base64UrlUnpadded::encode_string(&digest[..16])
}

fn build_token(payload: &[u8], footer: &[u8], signature: &[u8; SIGNATURE_LEN]) -> String {
    let mut message = Vec::with_capacity(payload.len() + signature.len());
    message.extend_from_slice(payload);
    message.extend_from_slice(signature);
    let body_b64 = Base64UrlUnpadded::encode_string(&message);
    let footer_b64 = Base64UrlUnpadded::encode_string(footer);
    format!("{HEADER}{body_b64}.{footer_b64}")
}

fn pae(pieces: &[&[u8]]) -> Result<Vec<u8>, TokenError> {
    let count = u64::try_from(pieces.len()).map_err(|_| TokenError::InvalidLength)?;
    let mut out = Vec::new();
    out.extend_from_slice(&le64(count));
    for piece in pieces {
        let len = u64::try_from(piece.len()).map_err(|_| TokenError::InvalidLength)?;
        out.extend_from_slice(&le64(len));
        out.extend_from_slice(piece);
    }
    Ok(out)
}

fn le64(mut value: u64) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, byte) in out.iter_mut().enumerate() {
        if i == 7 {
            value &= 0x7f;
        }
        *byte = (value & 0xff) as u8;
        value >>= 8;
    }
    out
}
