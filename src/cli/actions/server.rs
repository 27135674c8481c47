use crate::{
    auth::{Authenticator, TokenIssuer, TokenSigner},
    cli::telemetry,
    gatehouse::{self, ClientAddress},
    guests::PgGuests,
    settings::SettingsStore,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub settings: PathBuf,
    pub token_seed: Option<SecretString>,
    pub token_issuer: String,
    pub guest_lookup_timeout: Duration,
    pub trust_proxy_headers: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the settings file is invalid, the signing seed is
/// malformed, the database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let settings = SettingsStore::from_file(&args.settings)?;
    #[cfg(unix)]
    settings.reload_on_sighup()?;

    let signer = match &args.token_seed {
        Some(seed) => TokenSigner::from_base64_seed(seed).context("Invalid --token-seed")?,
        None => {
            warn!("No token seed configured, using an ephemeral signing key");
            TokenSigner::generate()
        }
    };
    info!("Token signing key id: {}", signer.key_id());

    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let auth = Arc::new(Authenticator::new(
        settings,
        Arc::new(PgGuests::new(pool.clone())),
        TokenIssuer::new(signer, args.token_issuer),
        args.guest_lookup_timeout,
    ));

    let app = gatehouse::router(
        auth,
        ClientAddress {
            trust_proxy_headers: args.trust_proxy_headers,
        },
        Some(pool),
    );

    let result = gatehouse::serve(args.port, app).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("settings", args.settings.display().to_string()),
        ("token_seed_set", args.token_seed.is_some().to_string()),
        ("token_issuer", args.token_issuer.clone()),
        (
            "guest_lookup_timeout_ms",
            args.guest_lookup_timeout.as_millis().to_string(),
        ),
        ("trust_proxy_headers", args.trust_proxy_headers.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
