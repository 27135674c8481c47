//! # Gatehouse
//!
//! Session authentication for two principal classes: a single administrative
//! operator and any number of time-boxed guest accounts.
//!
//! ## Login flow
//!
//! The identifier is compared against the configured admin username. A match
//! runs the admin policy (optional password); anything else runs the guest
//! policy, which checks, in order: the guest exists, the password verifies,
//! access has not expired, the caller address is known and, when the guest has
//! an allow-list, that the address matches it. Only an authorized principal
//! gets a signed, time-bounded access token.
//!
//! Until the password is proven, every failure reads "Invalid username or
//! password" so callers cannot enumerate accounts.
//!
//! ## Settings
//!
//! Security settings are read from a JSON file and published as immutable
//! snapshots; `SIGHUP` reloads the file without affecting logins in flight.

pub mod auth;
pub mod cli;
pub mod gatehouse;
pub mod guests;
pub mod settings;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
