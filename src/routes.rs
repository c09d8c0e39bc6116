use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    response::Redirect,
    routing::{delete, get, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    handlers::{admin_sessions, auth, checklists, directory, impersonation},
    middleware_layer::auth::{RequireRole, require_auth, require_role},
    models::role::{ADMIN_ONLY, MANAGEMENT_ROLES},
    services::images::PUBLIC_PREFIX,
    state::AppState,
};

/// Largest accepted request body; a checklist form carries one photo per question.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Builds the application router.
///
/// Rate limiting is applied by the binary, since it needs the peer address.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(|| async { Redirect::to("/auth/login") }))
        .route("/auth/login", get(auth::login_page))
        .route("/auth/config", get(auth::auth_config))
        .route("/auth/callback", get(auth::callback))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout", get(auth::logout))
        .route("/auth/pending", get(auth::pending))
        .route("/auth/session", get(auth::session_info))
        .route("/dashboard", get(checklists::dashboard))
        .route("/checklist/submit", post(checklists::submit_form))
        .route(
            "/checklist/success/{document_number}",
            get(checklists::success_page),
        )
        .route("/checklist/view/{id}", get(checklists::view_page))
        .route(
            "/api/checklists",
            get(checklists::list).post(checklists::submit_json),
        )
        .route("/api/checklists/preview", post(checklists::preview))
        .route("/api/checklists/stats", get(checklists::stats))
        .route("/api/checklists/{id}", get(checklists::get))
        .route("/api/questions", get(directory::list_questions))
        .route("/api/stores", get(directory::list_stores))
        .route("/api/stores/my", get(directory::my_stores))
        .route("/api/impersonate/stop", post(impersonation::stop))
        .route("/api/impersonate/{user_id}", post(impersonation::start))
        .nest_service(
            &format!("/{}", PUBLIC_PREFIX),
            ServeDir::new(&state.config.upload_dir),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let management_routes = Router::new()
        .route("/api/questions", post(directory::save_question))
        .route("/api/questions/{id}/toggle", post(directory::toggle_question))
        .route("/api/stores", post(directory::save_store))
        .route("/api/stores/{id}/toggle", post(directory::toggle_store))
        .route("/api/users", get(directory::list_users))
        .route("/api/users/add", post(directory::add_user))
        .route("/api/users/bulk-import", post(directory::bulk_import_users))
        .route("/api/users/{id}/role", post(directory::change_role))
        .route("/api/users/{id}/toggle", post(directory::toggle_user))
        .route(
            "/api/assignments",
            get(directory::list_assignments).post(directory::assign_store),
        )
        .route("/api/assignments/remove", post(directory::remove_assignment))
        .route_layer(from_fn_with_state(
            RequireRole(MANAGEMENT_ROLES),
            require_role,
        ))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/admin/sessions", get(admin_sessions::list_sessions))
        .route(
            "/api/admin/sessions/by-user",
            get(admin_sessions::sessions_by_user),
        )
        .route("/api/admin/sessions/cleanup", post(admin_sessions::cleanup))
        .route(
            "/api/admin/sessions/user/{user_id}",
            delete(admin_sessions::delete_user_sessions),
        )
        .route(
            "/api/admin/sessions/{session_id}",
            delete(admin_sessions::delete_session),
        )
        .route("/api/checklists/{id}", delete(checklists::delete))
        .route_layer(from_fn_with_state(RequireRole(ADMIN_ONLY), require_role))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(management_routes)
        .merge(admin_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
