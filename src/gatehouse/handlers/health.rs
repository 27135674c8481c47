use crate::GIT_COMMIT_HASH;
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Service is healthy", body = Health),
        (status = 503, description = "Database is unreachable", body = Health)
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(pool: Option<Extension<PgPool>>) -> impl IntoResponse {
    let database = match pool {
        Some(Extension(pool)) => ping(&pool).await,
        None => "none",
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
    };

    let short_hash = if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )) {
        headers.insert("X-App", value);
    }

    let status = if database == "error" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, headers, Json(health))
}

async fn ping(pool: &PgPool) -> &'static str {
    let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    let result = async {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    }
    .instrument(span)
    .await;

    match result {
        Ok(()) => "ok",
        Err(err) => {
            error!("Failed to ping database: {}", err);
            "error"
        }
    }
}
