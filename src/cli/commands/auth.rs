use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

pub const ARG_SETTINGS: &str = "settings";
pub const ARG_TOKEN_SEED: &str = "token-seed";
pub const ARG_TOKEN_ISSUER: &str = "token-issuer";
pub const ARG_GUEST_LOOKUP_TIMEOUT_MS: &str = "guest-lookup-timeout-ms";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

#[derive(Debug, Clone)]
pub struct Options {
    pub settings: PathBuf,
    pub token_seed: Option<SecretString>,
    pub token_issuer: String,
    pub guest_lookup_timeout: Duration,
    pub trust_proxy_headers: bool,
}

impl Options {
    /// Parse authentication arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let settings = match matches.get_one::<String>(ARG_SETTINGS) {
            Some(value) if !value.trim().is_empty() => PathBuf::from(value),
            _ => anyhow::bail!("missing required argument: --{ARG_SETTINGS}"),
        };

        let token_seed = matches
            .get_one::<String>(ARG_TOKEN_SEED)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.trim().to_string()));

        Ok(Self {
            settings,
            token_seed,
            token_issuer: matches
                .get_one::<String>(ARG_TOKEN_ISSUER)
                .cloned()
                .unwrap_or_else(|| "gatehouse".to_string()),
            guest_lookup_timeout: Duration::from_millis(
                matches
                    .get_one::<u64>(ARG_GUEST_LOOKUP_TIMEOUT_MS)
                    .copied()
                    .unwrap_or(3000),
            ),
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SETTINGS)
                .short('s')
                .long(ARG_SETTINGS)
                .help("Path to the security settings JSON file")
                .long_help(
                    "Path to the security settings JSON file (admin username, password hash, session lifetimes).\n\nSend SIGHUP to reload it without restarting; an invalid file keeps the previous settings.",
                )
                .env("GATEHOUSE_SETTINGS")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_SEED)
                .long(ARG_TOKEN_SEED)
                .help("Base64url Ed25519 seed (32 bytes) used to sign access tokens")
                .long_help(
                    "Base64url Ed25519 seed (32 bytes) used to sign access tokens.\n\nIf unset, a random key is generated at startup and tokens do not survive a restart.",
                )
                .env("GATEHOUSE_TOKEN_SEED")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_ISSUER)
                .long(ARG_TOKEN_ISSUER)
                .help("Issuer (iss) written into access tokens")
                .env("GATEHOUSE_TOKEN_ISSUER")
                .default_value("gatehouse"),
        )
        .arg(
            Arg::new(ARG_GUEST_LOOKUP_TIMEOUT_MS)
                .long(ARG_GUEST_LOOKUP_TIMEOUT_MS)
                .help("Maximum time to wait for a guest record lookup, in milliseconds")
                .env("GATEHOUSE_GUEST_LOOKUP_TIMEOUT_MS")
                .default_value("3000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Resolve the caller address from the last x-forwarded-for hop or x-real-ip")
                .env("GATEHOUSE_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
}
