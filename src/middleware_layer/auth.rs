use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use tower_cookies::Cookies;

use crate::{
    crypto::token,
    error::Result,
    handlers::response::error_json,
    models::{
        identity::{CurrentUser, Identity, SessionToken},
        role::Role,
    },
    state::AppState,
};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "auth_token";
/// Name of the cookie holding the impersonated user's id.
pub const IMPERSONATE_COOKIE: &str = "impersonate_user";

/// Where pending users are sent.
pub const PENDING_PATH: &str = "/auth/pending";

/// How a request fared at the authentication gate.
#[derive(Debug)]
pub enum GateOutcome {
    /// No usable session.
    Unauthenticated,
    /// Signed in, but the account still awaits approval.
    PendingApproval,
    /// Signed in and allowed through.
    Proceed { identity: Identity, token: String },
}

/// Rejections produced by the gates.
pub enum AuthRejection {
    /// HTML requests without a session go to the login page.
    RedirectToLogin { return_url: String },
    /// API requests without a session get a bare 401.
    Unauthorized,
    /// Pending accounts see the waiting page.
    Pending,
    /// Resolution failed unexpectedly.
    Internal,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin { return_url } => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(return_url.as_bytes()).collect();
                Redirect::to(&format!("/auth/login?returnUrl={}", encoded)).into_response()
            }
            Self::Unauthorized => error_json(StatusCode::UNAUTHORIZED, "Not authenticated"),
            Self::Pending => Redirect::to(PENDING_PATH).into_response(),
            Self::Internal => error_json(StatusCode::INTERNAL_SERVER_ERROR, "Authentication error"),
        }
    }
}

fn is_api(path: &str) -> bool {
    path.starts_with("/api/")
}

/// Resolves the caller of a request.
///
/// Evaluated in order: missing cookie, malformed token, unknown or expired
/// session, impersonation overlay for administrators, pending gate.
pub async fn resolve(state: &AppState, cookies: &Cookies, path: &str) -> Result<GateOutcome> {
    let Some(raw) = cookies.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        tracing::debug!("No session cookie on {}", path);
        return Ok(GateOutcome::Unauthenticated);
    };

    if !token::is_valid_format(&raw) {
        tracing::warn!("Malformed session token rejected on {}", path);
        return Ok(GateOutcome::Unauthenticated);
    }

    let Some(session) = state.sessions.get_session(&raw).await? else {
        tracing::debug!("Session {} not found or expired", token::preview(&raw));
        return Ok(GateOutcome::Unauthenticated);
    };

    let real = CurrentUser::from(&session);
    let identity = impersonation_overlay(state, cookies, real).await?;

    if identity.real().role == Role::Pending && !path.starts_with("/auth/") {
        return Ok(GateOutcome::PendingApproval);
    }

    Ok(GateOutcome::Proceed {
        identity,
        token: raw,
    })
}

/// Swaps in the impersonation target when the real caller is an administrator.
async fn impersonation_overlay(
    state: &AppState,
    cookies: &Cookies,
    real: CurrentUser,
) -> Result<Identity> {
    if real.role != Role::Admin {
        return Ok(Identity::Real(real));
    }

    let Some(target_id) = cookies
        .get(IMPERSONATE_COOKIE)
        .and_then(|c| c.value().trim().parse::<i32>().ok())
    else {
        return Ok(Identity::Real(real));
    };

    if target_id == real.id {
        return Ok(Identity::Real(real));
    }

    match state.users.find_by_id(target_id).await? {
        Some(target) => {
            tracing::debug!("Admin {} acting as user {}", real.id, target.id);
            let effective =
                CurrentUser::impersonating(&target, real.delegated_access_token.clone());
            Ok(Identity::Impersonated { real, effective })
        }
        None => {
            tracing::warn!("Impersonation target {} no longer exists", target_id);
            Ok(Identity::Real(real))
        }
    }
}

/// A middleware that requires a live session.
///
/// On success the request carries an [`Identity`] and the raw [`SessionToken`].
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match resolve(&state, &cookies, &path).await {
        Ok(GateOutcome::Proceed { identity, token }) => {
            request.extensions_mut().insert(identity);
            request.extensions_mut().insert(SessionToken(token));
            next.run(request).await
        }
        Ok(GateOutcome::PendingApproval) => AuthRejection::Pending.into_response(),
        Ok(GateOutcome::Unauthenticated) if is_api(&path) => {
            AuthRejection::Unauthorized.into_response()
        }
        Ok(GateOutcome::Unauthenticated) => {
            let return_url = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or(path);
            AuthRejection::RedirectToLogin { return_url }.into_response()
        }
        Err(e) => {
            tracing::error!("Authentication error: {}", e);
            AuthRejection::Internal.into_response()
        }
    }
}

/// The role set a route group accepts.
#[derive(Clone, Copy, Debug)]
pub struct RequireRole(pub &'static [Role]);

/// A middleware that admits only the listed roles, judged on the effective
/// identity. Must run after [`require_auth`].
pub async fn require_role(
    State(RequireRole(allowed)): State<RequireRole>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(actual) = request
        .extensions()
        .get::<Identity>()
        .map(|i| i.effective().role)
    else {
        tracing::error!("Role check ran without an authenticated identity");
        return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error");
    };

    if actual.is_one_of(allowed) {
        return next.run(request).await;
    }

    let required = Role::describe_set(allowed);
    tracing::warn!(
        "Denied {} to role {} (requires {})",
        request.uri().path(),
        actual,
        required
    );

    if is_api(request.uri().path()) {
        return error_json(
            StatusCode::FORBIDDEN,
            &format!("Access denied. Required role: {}. Your role: {}", required, actual),
        );
    }

    access_denied_page(&required, actual)
}

/// The 403 page shown to browsers.
pub fn access_denied_page(required: &str, actual: Role) -> Response {
    (
        StatusCode::FORBIDDEN,
        Html(format!(
            "<!DOCTYPE html>\n<html><head><title>Access Denied</title></head><body>\
             <h1>Access Denied</h1>\
             <p>You don't have permission to access this page.</p>\
             <p>Required role: {}</p><p>Your role: {}</p>\
             <a href=\"/dashboard\">Back to Dashboard</a></body></html>",
            required, actual
        )),
    )
        .into_response()
}
