//! Typed claims carried by an access credential.
//!
//! Every credential carries exactly one identity, one display name and one
//! role claim. Guest credentials additionally carry the source address the
//! guest authenticated from; admin credentials never do.

use serde::{Deserialize, Serialize};
use std::{fmt, net::IpAddr};
use thiserror::Error;

/// Identity reserved for the sole administrative principal.
pub const ADMIN_IDENTITY: i64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Identity,
    DisplayName,
    Role,
    SourceAddress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    IpAddress,
}

/// An immutable `(kind, value, value kind)` triple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub kind: ClaimKind,
    pub value: String,
    pub value_kind: ValueKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Guest,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Guest => "Guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("missing {0:?} claim")]
    Missing(ClaimKind),
    #[error("duplicate {0:?} claim")]
    Duplicate(ClaimKind),
    #[error("invalid value for {0:?} claim")]
    InvalidValue(ClaimKind),
    #[error("source address claim does not match role {0}")]
    UnexpectedAddress(Role),
}

/// The validated claim set of one authenticated principal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimSet {
    identity: i64,
    display_name: String,
    role: Role,
    source_address: Option<IpAddr>,
}

impl ClaimSet {
    /// Claims for the administrative principal. `display_name` is the
    /// identifier exactly as the caller typed it.
    #[must_use]
    pub fn admin(display_name: &str) -> Self {
        Self {
            identity: ADMIN_IDENTITY,
            display_name: display_name.to_string(),
            role: Role::Admin,
            source_address: None,
        }
    }

    /// Claims for a guest principal, pinned to the address used at login.
    #[must_use]
    pub fn guest(id: i64, display_name: &str, source_address: IpAddr) -> Self {
        Self {
            identity: id,
            display_name: display_name.to_string(),
            role: Role::Guest,
            source_address: Some(source_address),
        }
    }

    #[must_use]
    pub fn identity(&self) -> i64 {
        self.identity
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn source_address(&self) -> Option<IpAddr> {
        self.source_address
    }

    /// Flatten into claim triples, in a stable order.
    #[must_use]
    pub fn to_claims(&self) -> Vec<Claim> {
        let mut claims = vec![
            Claim {
                kind: ClaimKind::Identity,
                value: self.identity.to_string(),
                value_kind: ValueKind::Integer,
            },
            Claim {
                kind: ClaimKind::DisplayName,
                value: self.display_name.clone(),
                value_kind: ValueKind::String,
            },
            Claim {
                kind: ClaimKind::Role,
                value: self.role.as_str().to_string(),
                value_kind: ValueKind::String,
            },
        ];
        if let Some(address) = self.source_address {
            claims.push(Claim {
                kind: ClaimKind::SourceAddress,
                value: address.to_string(),
                value_kind: ValueKind::IpAddress,
            });
        }
        claims
    }
}

impl TryFrom<Vec<Claim>> for ClaimSet {
    type Error = ClaimsError;

    fn try_from(claims: Vec<Claim>) -> Result<Self, Self::Error> {
        let mut identity = None;
        let mut display_name = None;
        let mut role = None;
        let mut source_address = None;

        for claim in claims {
            match claim.kind {
                ClaimKind::Identity => {
                    let value = claim
                        .value
                        .parse::<i64>()
                        .map_err(|_| ClaimsError::InvalidValue(claim.kind))?;
                    set_once(&mut identity, value, claim.kind)?;
                }
                ClaimKind::DisplayName => set_once(&mut display_name, claim.value, claim.kind)?,
                ClaimKind::Role => {
                    let value = match claim.value.as_str() {
                        "Admin" => Role::Admin,
                        "Guest" => Role::Guest,
                        _ => return Err(ClaimsError::InvalidValue(claim.kind)),
                    };
                    set_once(&mut role, value, claim.kind)?;
                }
                ClaimKind::SourceAddress => {
                    let value = claim
                        .value
                        .parse::<IpAddr>()
                        .map_err(|_| ClaimsError::InvalidValue(claim.kind))?;
                    set_once(&mut source_address, value, claim.kind)?;
                }
            }
        }

        let identity = identity.ok_or(ClaimsError::Missing(ClaimKind::Identity))?;
        let display_name = display_name.ok_or(ClaimsError::Missing(ClaimKind::DisplayName))?;
        let role = role.ok_or(ClaimsError::Missing(ClaimKind::Role))?;

        match (role, source_address) {
            (Role::Admin, None) if identity == ADMIN_IDENTITY => {}
            (Role::Admin, None) => return Err(ClaimsError::InvalidValue(ClaimKind::Identity)),
            (Role::Guest, Some(_)) => {}
            (Role::Guest, None) => return Err(ClaimsError::Missing(ClaimKind::SourceAddress)),
            (Role::Admin, Some(_)) => return Err(ClaimsError::UnexpectedAddress(role)),
        }

        Ok(Self {
            identity,
            display_name,
            role,
            source_address,
        })
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, kind: ClaimKind) -> Result<(), ClaimsError> {
    if slot.is_some() {
        return Err(ClaimsError::Duplicate(kind));
    }
    *slot = Some(value);
    Ok(())
}
