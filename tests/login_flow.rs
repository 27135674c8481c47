use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use gatehouse::{
    auth::{verifier, Authenticator, Role, TokenIssuer, TokenSigner, TokenVerifier},
    gatehouse::{router, ClientAddress},
    guests::{GuestRecord, GuestRepository, MemoryGuests},
    settings::{AdministrativeConfig, SettingsStore},
};
use serde_json::{json, Value};
use std::{
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tower::ServiceExt;

const GENERIC: &str = "Invalid username or password";

struct Harness {
    app: Router,
    verifier: TokenVerifier,
}

fn harness(
    config: AdministrativeConfig,
    guests: Arc<dyn GuestRepository>,
    peer: Option<&str>,
    client: ClientAddress,
) -> Harness {
    let auth = Arc::new(Authenticator::new(
        SettingsStore::new(config),
        guests,
        TokenIssuer::new(TokenSigner::from_seed(&[7u8; 32]), "gatehouse-test"),
        Duration::from_secs(1),
    ));
    let verifier = auth.verifier();
    let app = router(auth, client, None);
    let app = match peer.and_then(|p| p.parse::<SocketAddr>().ok()) {
        Some(addr) => app.layer(MockConnectInfo(addr)),
        None => app,
    };
    Harness { app, verifier }
}

fn permissive() -> AdministrativeConfig {
    AdministrativeConfig {
        require_admin_login: false,
        ..AdministrativeConfig::default()
    }
}

fn guest(
    id: i64,
    username: &str,
    secret: &str,
    days: i64,
    allowed: &[&str],
) -> Result<GuestRecord> {
    Ok(GuestRecord {
        id,
        username: username.to_string(),
        password_hash: verifier::hash_secret(secret)?,
        access_expiration: Utc::now() + ChronoDuration::days(days),
        allowed_addresses: allowed.iter().map(ToString::to_string).collect(),
    })
}

fn guests(records: Vec<GuestRecord>) -> Arc<dyn GuestRepository> {
    Arc::new(records.into_iter().collect::<MemoryGuests>())
}

async fn login(app: &Router, username: &str, password: &str) -> Result<Response> {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/user/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": username, "password": password }).to_string(),
        ))?;
    Ok(app.clone().oneshot(request).await?)
}

async fn body_json(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn denial_message(response: Response) -> Result<String> {
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await?;
    Ok(body["message"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn admin_login_with_empty_password_when_not_required() -> Result<()> {
    let h = harness(permissive(), guests(vec![]), None, ClientAddress::default());

    let response = login(&h.app, "admin", "").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await?;
    let token = body["token"].as_str().unwrap_or_default();
    let verified = h.verifier.verify(token, Utc::now())?;
    assert_eq!(verified.claims.role(), Role::Admin);
    assert_eq!(verified.claims.display_name(), "admin");
    Ok(())
}

#[tokio::test]
async fn admin_and_guest_failures_read_the_same() -> Result<()> {
    let config = AdministrativeConfig {
        admin_password_hash: Some(verifier::hash_secret("admin-pw")?),
        ..AdministrativeConfig::default()
    };
    let h = harness(
        config,
        guests(vec![guest(1, "bob", "bob-pw", 1, &[])?]),
        Some("10.0.0.1:40000"),
        ClientAddress::default(),
    );

    let wrong_admin = denial_message(login(&h.app, "admin", "nope").await?).await?;
    let unknown_guest = denial_message(login(&h.app, "mallory", "bob-pw").await?).await?;
    let wrong_guest = denial_message(login(&h.app, "bob", "nope").await?).await?;

    assert_eq!(wrong_admin, GENERIC);
    assert_eq!(unknown_guest, GENERIC);
    assert_eq!(wrong_guest, GENERIC);
    Ok(())
}

#[tokio::test]
async fn missing_admin_hash_renders_generic_denial() -> Result<()> {
    let h = harness(
        AdministrativeConfig::default(),
        guests(vec![]),
        None,
        ClientAddress::default(),
    );
    assert_eq!(denial_message(login(&h.app, "admin", "x").await?).await?, GENERIC);
    Ok(())
}

#[tokio::test]
async fn expired_guest_is_told_access_expired() -> Result<()> {
    let h = harness(
        permissive(),
        guests(vec![guest(2, "bob", "bob-pw", -1, &[])?]),
        Some("10.0.0.1:40000"),
        ClientAddress::default(),
    );
    assert_eq!(
        denial_message(login(&h.app, "bob", "bob-pw").await?).await?,
        "Access to this guest account has expired"
    );
    Ok(())
}

#[tokio::test]
async fn guest_allow_list_uses_normalized_peer_address() -> Result<()> {
    let records = || -> Result<Vec<GuestRecord>> {
        Ok(vec![guest(3, "carol", "carol-pw", 1, &["10.0.0.0/24"])?])
    };

    let inside = harness(
        permissive(),
        guests(records()?),
        Some("[::ffff:10.0.0.7]:40000"),
        ClientAddress::default(),
    );
    let response = login(&inside.app, "carol", "carol-pw").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    let verified = inside
        .verifier
        .verify(body["token"].as_str().unwrap_or_default(), Utc::now())?;
    assert_eq!(verified.claims.role(), Role::Guest);
    assert_eq!(verified.claims.identity(), 3);
    assert_eq!(verified.claims.source_address(), "10.0.0.7".parse::<IpAddr>().ok());

    let outside = harness(
        permissive(),
        guests(records()?),
        Some("10.0.1.7:40000"),
        ClientAddress::default(),
    );
    assert_eq!(
        denial_message(login(&outside.app, "carol", "carol-pw").await?).await?,
        "Unauthorized IP address: 10.0.1.7"
    );
    Ok(())
}

#[tokio::test]
async fn guest_without_peer_address_is_denied() -> Result<()> {
    let h = harness(
        permissive(),
        guests(vec![guest(4, "dave", "dave-pw", 1, &[])?]),
        None,
        ClientAddress::default(),
    );
    assert_eq!(
        denial_message(login(&h.app, "dave", "dave-pw").await?).await?,
        "Failed to read the IP of the calling client"
    );
    Ok(())
}

fn forwarded_login(forwarded_for: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(Method::POST)
        .uri("/api/v1/user/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(
            json!({ "username": "erin", "password": "erin-pw" }).to_string(),
        ))?)
}

#[tokio::test]
async fn trusted_proxy_header_overrides_peer() -> Result<()> {
    let h = harness(
        permissive(),
        guests(vec![guest(5, "erin", "erin-pw", 1, &["203.0.113.8"])?]),
        Some("10.9.9.9:40000"),
        ClientAddress {
            trust_proxy_headers: true,
        },
    );

    let response = h
        .app
        .clone()
        .oneshot(forwarded_login("198.51.100.1, 203.0.113.8")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn client_supplied_forwarded_entry_cannot_satisfy_allow_list() -> Result<()> {
    let h = harness(
        permissive(),
        guests(vec![guest(5, "erin", "erin-pw", 1, &["203.0.113.8"])?]),
        Some("10.9.9.9:40000"),
        ClientAddress {
            trust_proxy_headers: true,
        },
    );

    let response = h
        .app
        .clone()
        .oneshot(forwarded_login("203.0.113.8, 198.51.100.1")?)
        .await?;
    assert_eq!(
        denial_message(response).await?,
        "Unauthorized IP address: 198.51.100.1"
    );
    Ok(())
}

#[tokio::test]
async fn missing_payload_is_bad_request() -> Result<()> {
    let h = harness(permissive(), guests(vec![]), None, ClientAddress::default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/user/login")
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

struct UnreachableGuests;

impl GuestRepository for UnreachableGuests {
    fn find_by_username<'a>(
        &'a self,
        _username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<GuestRecord>>> + Send + 'a>> {
        Box::pin(async { Err(anyhow::anyhow!("database is down")) })
    }
}

#[tokio::test]
async fn lookup_failure_is_service_unavailable() -> Result<()> {
    let h = harness(
        permissive(),
        Arc::new(UnreachableGuests),
        Some("10.0.0.1:40000"),
        ClientAddress::default(),
    );

    let response = login(&h.app, "bob", "bob-pw").await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // the admin flow never touches the guest store
    let response = login(&h.app, "admin", "").await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn health_reports_build_and_no_database() -> Result<()> {
    let h = harness(permissive(), guests(vec![]), None, ClientAddress::default());

    let request = Request::builder().uri("/health").body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));

    let body = body_json(response).await?;
    assert_eq!(body["name"], "gatehouse");
    assert_eq!(body["database"], "none");
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let h = harness(permissive(), guests(vec![]), None, ClientAddress::default());

    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await?;
    assert!(body["paths"]["/api/v1/user/login"].is_object());
    Ok(())
}
