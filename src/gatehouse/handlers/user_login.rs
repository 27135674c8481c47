use super::ClientAddress;
use crate::auth::{Authenticator, LoginError};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr, sync::Arc};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct UserLogin {
    username: String,
    password: String,
}

impl fmt::Debug for UserLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserLogin")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoggedInUser {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorMessage {
    pub message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorMessage {
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            Self::Denied(reason) => {
                error_response(StatusCode::UNAUTHORIZED, reason.public_message())
            }
            Self::LookupTimeout(_) | Self::Lookup(_) => error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Authentication is temporarily unavailable",
            ),
            Self::Token(_) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to issue access token",
            ),
        }
    }
}

#[utoipa::path(
    post,
    path= "/api/v1/user/login",
    request_body = UserLogin,
    responses (
        (status = 200, description = "Login successful", body = LoggedInUser, content_type = "application/json"),
        (status = 400, description = "Missing or malformed payload", body = ErrorMessage),
        (status = 401, description = "Login denied", body = ErrorMessage),
        (status = 503, description = "Guest lookup failed or timed out", body = ErrorMessage),
    ),
    tag= "user"
)]
// axum handler for login
#[instrument(skip(auth, client, headers, payload))]
pub async fn login(
    auth: Extension<Arc<Authenticator>>,
    client: Extension<ClientAddress>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<UserLogin>>,
) -> Response {
    let user: UserLogin = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let caller = client.resolve(&headers, peer.map(|ConnectInfo(addr)| addr));

    match auth.login(&user.username, &user.password, caller).await {
        Ok(credential) => (
            StatusCode::OK,
            Json(LoggedInUser {
                token: credential.token,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
