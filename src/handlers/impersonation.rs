use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Extension,
};
use tower_cookies::cookie::time::Duration;
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    handlers::{
        auth::{clear_cookie, create_secure_cookie},
        response,
    },
    middleware_layer::auth::IMPERSONATE_COOKIE,
    models::{identity::Identity, role::Role},
    state::AppState,
};

/// Starts viewing the application as another user.
///
/// Gated on the real identity, so an administrator who is already
/// impersonating someone can switch targets but nobody else can start.
pub async fn start(
    State(state): State<AppState>,
    cookies: Cookies,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i32>,
) -> Result<Response> {
    let real = identity.real();
    if real.role != Role::Admin {
        tracing::warn!("User {} ({}) tried to impersonate", real.id, real.role);
        return Ok(response::error_json(
            StatusCode::FORBIDDEN,
            "Only Admin can impersonate users",
        ));
    }

    let target = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    cookies.add(create_secure_cookie(
        IMPERSONATE_COOKIE,
        target.id.to_string(),
        Duration::hours(1),
        state.config.production,
    ));
    tracing::info!("Admin {} now viewing as user {}", real.id, target.id);

    let message = format!("Now viewing as {}", target.display_name);
    response::success(&message)
}

/// Stops impersonating. Always succeeds.
pub async fn stop(cookies: Cookies) -> Result<Response> {
    clear_cookie(&cookies, IMPERSONATE_COOKIE);
    response::success("Stopped impersonation")
}
