use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};

use crate::{error::{AppError, Result}, handlers::response, state::AppState};

/// Lists live sessions with per-user counts.
pub async fn list_sessions(State(state): State<AppState>) -> Result<Response> {
    let sessions = state.sessions.list_active_sessions().await?;
    let total = sessions.len();
    let duplicates = sessions.iter().filter(|s| s.session_count > 1).count();
    response::json(
        StatusCode::OK,
        &sonic_rs::json!({
            "sessions": &sessions,
            "total": total,
            "duplicateSessions": duplicates,
        }),
    )
}

/// Lists live sessions grouped by user.
pub async fn sessions_by_user(State(state): State<AppState>) -> Result<Response> {
    let users = state.sessions.sessions_by_user().await?;
    response::json(StatusCode::OK, &users)
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Response> {
    if !state.sessions.delete_session_by_id(session_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!("Session {} revoked by an administrator", session_id);
    response::success("Session deleted")
}

pub async fn delete_user_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> Result<Response> {
    let deleted = state.sessions.delete_user_sessions(user_id).await?;
    response::json(
        StatusCode::OK,
        &sonic_rs::json!({ "success": true, "deleted": deleted }),
    )
}

/// Runs the expiry sweep on demand.
pub async fn cleanup(State(state): State<AppState>) -> Result<Response> {
    let deleted = state.sessions.cleanup_expired_sessions().await?;
    response::json(
        StatusCode::OK,
        &sonic_rs::json!({ "success": true, "deleted": deleted }),
    )
}
