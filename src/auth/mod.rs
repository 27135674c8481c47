pub mod address;
pub mod admin;
pub mod claims;
pub mod error;
pub mod guest;
pub mod orchestrator;
pub mod token;
pub mod verifier;

pub use admin::AdminAccessPolicy;
pub use claims::{Claim, ClaimKind, ClaimSet, Role, ValueKind};
pub use error::{DenialReason, LoginError, GENERIC_DENIAL};
pub use guest::GuestAccessPolicy;
pub use orchestrator::{Authenticator, Principal};
pub use token::{AccessCredential, TokenIssuer, TokenSigner, TokenVerifier};
