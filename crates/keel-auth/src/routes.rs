//! `/api/auth/*` endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use keel_protocol::{ListUsersResponse, Role, SessionView, SignInEmail, SignOutResponse, SignUpEmail};
use keel_rpc::RpcError;

use crate::{
    expired_session_cookie, session_cookie, session_token, AuthError, AuthProvider,
    TrustedOrigins,
};

pub const BASE_PATH: &str = "/api/auth";

#[derive(Clone)]
pub struct AuthState {
    provider: Arc<dyn AuthProvider>,
    trusted: TrustedOrigins,
}

impl AuthState {
    pub fn new(provider: Arc<dyn AuthProvider>, trusted: TrustedOrigins) -> Self {
        Self { provider, trusted }
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }
}

/// Auth routes, already prefixed with [`BASE_PATH`].
pub fn router(state: AuthState) -> Router {
    let routes = Router::new()
        .route("/sign-up/email", post(sign_up_email))
        .route("/sign-in/email", post(sign_in_email))
        .route("/get-session", get(get_session))
        .route("/sign-out", post(sign_out))
        .route("/admin/list-users", get(list_users))
        .with_state(state);
    Router::new().nest(BASE_PATH, routes)
}

fn check_origin(state: &AuthState, headers: &HeaderMap) -> Result<(), AuthError> {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };
    if state.trusted.allows(origin) {
        Ok(())
    } else {
        tracing::warn!(origin, "rejected auth request from untrusted origin");
        Err(AuthError::UntrustedOrigin(origin.to_string()))
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, RpcError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| RpcError::bad_request(rejection.body_text()))
}

/// Map a provider failure; server-side ones are logged with the underlying error first.
fn failure(route: &'static str, err: AuthError) -> RpcError {
    let detail = err.to_string();
    let mapped = RpcError::from(err);
    if mapped.status().is_server_error() {
        tracing::error!(target: "keel::auth", route, error = %detail, "auth request failed");
    }
    mapped
}

async fn current_session(state: &AuthState, headers: &HeaderMap) -> Result<Option<SessionView>, AuthError> {
    match session_token(headers) {
        Some(token) => state.provider.session(&token).await,
        None => Ok(None),
    }
}

async fn sign_up_email(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: Result<Json<SignUpEmail>, JsonRejection>,
) -> Result<Response, RpcError> {
    check_origin(&state, &headers)?;
    let request = json_body(body)?;
    let created = state
        .provider
        .sign_up(request)
        .await
        .map_err(|err| failure("sign-up/email", err))?;
    let cookie = session_cookie(&created.token, Some(state.provider.session_ttl()));
    Ok(([(header::SET_COOKIE, cookie)], Json(created)).into_response())
}

async fn sign_in_email(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: Result<Json<SignInEmail>, JsonRejection>,
) -> Result<Response, RpcError> {
    check_origin(&state, &headers)?;
    let request = json_body(body)?;
    let lifetime = match request.remember_me {
        Some(false) => None,
        _ => Some(state.provider.session_ttl()),
    };
    let signed_in = state
        .provider
        .sign_in(request)
        .await
        .map_err(|err| failure("sign-in/email", err))?;
    let cookie = session_cookie(&signed_in.token, lifetime);
    Ok(([(header::SET_COOKIE, cookie)], Json(signed_in)).into_response())
}

async fn get_session(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<Option<SessionView>>, RpcError> {
    let session = current_session(&state, &headers)
        .await
        .map_err(|err| failure("get-session", err))?;
    Ok(Json(session))
}

async fn sign_out(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Response, RpcError> {
    check_origin(&state, &headers)?;
    if let Some(token) = session_token(&headers) {
        state
            .provider
            .sign_out(&token)
            .await
            .map_err(|err| failure("sign-out", err))?;
    }
    Ok((
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(SignOutResponse { success: true }),
    )
        .into_response())
}

async fn list_users(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<ListUsersResponse>, RpcError> {
    let session = current_session(&state, &headers)
        .await
        .map_err(|err| failure("admin/list-users", err))?
        .ok_or(AuthError::Unauthorized)?;
    if session.role() != Role::Admin {
        return Err(AuthError::Forbidden.into());
    }
    let users = state
        .provider
        .list_users()
        .await
        .map_err(|err| failure("admin/list-users", err))?;
    Ok(Json(ListUsersResponse {
        total: users.len(),
        users,
    }))
}
