use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension,
};
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::{
    error::Result,
    handlers::response,
    middleware_layer::auth::{IMPERSONATE_COOKIE, SESSION_COOKIE},
    models::identity::{CurrentUser, Identity, SessionToken},
    services::auth as auth_service,
    state::AppState,
};

/// Creates an httpOnly cookie scoped to the whole site.
pub fn create_secure_cookie(
    name: &'static str,
    value: String,
    max_age: Duration,
    production: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    if production {
        cookie.set_secure(true);
    }
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(max_age);
    cookie.set_path("/");
    cookie
}

/// Drops a cookie set by [`create_secure_cookie`].
pub fn clear_cookie(cookies: &Cookies, name: &'static str) {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path("/");
    cookies.remove(cookie);
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    pub return_url: Option<String>,
    pub error: Option<String>,
}

/// Sign-in page linking to the identity provider.
pub async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    let return_path = auth_service::safe_return_path(query.return_url.as_deref());
    let authorize_url = state.identity.authorize_url(return_path)?;

    let notice = match query.error.as_deref() {
        Some("no_code") => "<p class=\"error\">Sign-in was cancelled.</p>",
        Some(_) => "<p class=\"error\">Sign-in failed. Please try again.</p>",
        None => "",
    };

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html><head><title>Sign in</title></head><body>\
         <h1>Area Manager Checklist</h1>{}\
         <a href=\"{}\">Sign in with Microsoft</a></body></html>",
        notice,
        html_escape(&authorize_url)
    ))
    .into_response())
}

/// Public identity provider settings for a browser-driven sign-in.
pub async fn auth_config(State(state): State<AppState>) -> Result<Response> {
    response::json(StatusCode::OK, &state.identity.public_config())
}

#[derive(Deserialize, Debug)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Completes the authorization-code flow and issues the session cookie.
///
/// Every failure lands back on the login page with an error flag.
pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    if let Some(error) = &query.error {
        tracing::warn!("Identity provider returned an error: {}", error);
    }

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        tracing::warn!("Callback without an authorization code");
        return Redirect::to("/auth/login?error=no_code");
    };

    let outcome = match auth_service::complete_login(
        state.identity.as_ref(),
        state.users.as_ref(),
        &state.sessions,
        state.config.admin_email.as_deref(),
        code,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Callback failed: {}", e);
            return Redirect::to("/auth/login?error=auth_failed");
        }
    };

    cookies.add(create_secure_cookie(
        SESSION_COOKIE,
        outcome.session.token,
        Duration::hours(state.config.session_duration_hours),
        state.config.production,
    ));
    clear_cookie(&cookies, IMPERSONATE_COOKIE);

    Redirect::to(auth_service::safe_return_path(query.state.as_deref()))
}

/// Ends the session and clears both cookies.
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Redirect {
    if let Err(e) = state.sessions.delete_session(&token).await {
        tracing::error!("Logout could not delete the session: {}", e);
    }
    clear_cookie(&cookies, SESSION_COOKIE);
    clear_cookie(&cookies, IMPERSONATE_COOKIE);
    Redirect::to("/auth/login")
}

/// Shown to signed-in users whose account still awaits approval.
pub async fn pending(Extension(identity): Extension<Identity>) -> Html<String> {
    let user = identity.real();
    Html(format!(
        "<!DOCTYPE html>\n<html><head><title>Awaiting approval</title></head><body>\
         <h1>Awaiting approval</h1>\
         <p>{} ({}) is signed in but has not been approved yet.</p>\
         <p>An administrator will assign your role.</p>\
         <a href=\"/auth/logout\">Sign out</a></body></html>",
        html_escape(&user.display_name),
        html_escape(&user.email)
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo<'a> {
    user: &'a CurrentUser,
    real_user: Option<&'a CurrentUser>,
    is_impersonating: bool,
}

/// Who the browser is signed in as, and who it is acting as.
pub async fn session_info(Extension(identity): Extension<Identity>) -> Result<Response> {
    response::json(
        StatusCode::OK,
        &SessionInfo {
            user: identity.effective(),
            real_user: identity.is_impersonating().then(|| identity.real()),
            is_impersonating: identity.is_impersonating(),
        },
    )
}

/// Minimal escaping for text placed into the status pages.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use tower_cookies::cookie::time::Duration;

    use super::html_escape;
    use crate::models::role::Role;
    use crate::testing::{FakeIdentityProvider, TestApp};

    #[tokio::test]
    async fn callback_creates_pending_user_and_session() {
        let app = TestApp::with_identity(FakeIdentityProvider::returning(
            "sub-1",
            "New.Person@Example.com",
        ));

        let (status, headers, _) = app
            .get("/auth/callback?code=abc&state=%2Fchecklist%2Fview%2F2", None)
            .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers["location"].to_str().unwrap(), "/checklist/view/2");

        let token = TestApp::session_cookie(&headers).unwrap();
        let user = app.backend.user_by_email("new.person@example.com").unwrap();
        assert_eq!(user.role, Role::Pending);
        assert_eq!(app.backend.session_count_for(user.id), 1);

        let (status, headers, _) = app.get("/dashboard", Some(&token)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers["location"].to_str().unwrap(), "/auth/pending");
    }

    #[tokio::test]
    async fn admin_email_signs_in_as_admin() {
        let app = TestApp::with_identity(FakeIdentityProvider::returning(
            "sub-admin",
            "admin@example.com",
        ));

        let (_, headers, _) = app.get("/auth/callback?code=abc", None).await;
        assert_eq!(headers["location"].to_str().unwrap(), "/dashboard");
        let user = app.backend.user_by_email("admin@example.com").unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(user.is_approved);
    }

    #[tokio::test]
    async fn external_return_url_is_ignored() {
        let app = TestApp::with_identity(FakeIdentityProvider::returning("s", "a@example.com"));
        let (_, headers, _) = app
            .get("/auth/callback?code=abc&state=%2F%2Fevil.example", None)
            .await;
        assert_eq!(headers["location"].to_str().unwrap(), "/dashboard");
    }

    #[tokio::test]
    async fn callback_without_code_goes_back_to_login() {
        let app = TestApp::new();
        let (status, headers, _) = app.get("/auth/callback", None).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(
            headers["location"].to_str().unwrap(),
            "/auth/login?error=no_code"
        );
    }

    #[tokio::test]
    async fn provider_failure_goes_back_to_login() {
        let app = TestApp::with_identity(FakeIdentityProvider::failing());
        let (_, headers, _) = app.get("/auth/callback?code=abc", None).await;
        assert_eq!(
            headers["location"].to_str().unwrap(),
            "/auth/login?error=auth_failed"
        );
    }

    #[tokio::test]
    async fn second_login_signs_out_first_browser() {
        let app = TestApp::with_identity(FakeIdentityProvider::returning("s", "am@example.com"));
        let (_, first, _) = app.get("/auth/callback?code=1", None).await;
        let (_, second, _) = app.get("/auth/callback?code=2", None).await;
        let first = TestApp::session_cookie(&first).unwrap();
        let second = TestApp::session_cookie(&second).unwrap();

        let (status, _, _) = app.get("/auth/session", Some(&first)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let (status, _, _) = app.get("/auth/session", Some(&second)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = TestApp::new();
        let user = app.backend.seed_user("am@example.com", Role::AreaManager);
        let token = app.login(&user).await;

        let (status, headers, _) = app.get("/auth/logout", Some(&token)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers["location"].to_str().unwrap(), "/auth/login");
        assert_eq!(app.backend.session_count_for(user.id), 0);

        let (status, _, _) = app.get("/api/questions", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_page_links_to_provider() {
        let app = TestApp::new();
        let (status, _, _) = app.get("/auth/login?returnUrl=%2Fdashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, body) = app.get("/auth/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clientId"], "test-client");
    }

    #[tokio::test]
    async fn session_cookie_is_http_only_for_a_day() {
        let app = TestApp::with_identity(FakeIdentityProvider::returning("s", "am@example.com"));
        let (_, headers, _) = app.get("/auth/callback?code=abc", None).await;

        let cookie = TestApp::set_cookie(&headers, "auth_token").unwrap();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::hours(24)));
        assert_eq!(cookie.path(), Some("/"));
        assert_ne!(cookie.secure(), Some(true));
    }

    #[tokio::test]
    async fn production_session_cookie_is_secure() {
        let app = TestApp::with_config(
            FakeIdentityProvider::returning("s", "am@example.com"),
            |config| config.production = true,
        );
        let (_, headers, _) = app.get("/auth/callback?code=abc", None).await;

        let cookie = TestApp::set_cookie(&headers, "auth_token").unwrap();
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::hours(24)));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(html_escape("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }
}
