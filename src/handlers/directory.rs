use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    handlers::response,
    models::{
        identity::Identity,
        role::Role,
        user::{NewUser, User},
    },
    state::AppState,
    validation::directory::{
        AddUserRequest, AssignmentRequest, BulkImportRequest, QuestionRequest, RoleChangeRequest,
        StoreRequest,
    },
};

#[derive(Deserialize, Debug, Default)]
pub struct ListQuery {
    /// Include inactive rows. Honoured for management roles only.
    #[serde(default)]
    pub all: bool,
}

// Questions

pub async fn list_questions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let questions = if query.all && identity.effective().role.sees_everything() {
        state.questions.list_all().await?
    } else {
        state.questions.list_active().await?
    };
    response::json(StatusCode::OK, &questions)
}

/// Creates a question, or updates it when the body carries an `id`.
pub async fn save_question(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Result<Response> {
    let (id, fields) = request.into_fields()?;
    let (status, question) = match id {
        Some(id) => (StatusCode::OK, state.questions.update(id, &fields).await?),
        None => (StatusCode::CREATED, state.questions.create(&fields).await?),
    };
    tracing::info!("Question {} saved", question.id);
    response::json(status, &question)
}

pub async fn toggle_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let question = state.questions.toggle_active(id).await?;
    response::json(StatusCode::OK, &question)
}

// Stores

pub async fn list_stores(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    let stores = if identity.effective().role.sees_everything() {
        state.stores.list_all().await?
    } else {
        state.stores.list_active().await?
    };
    response::json(StatusCode::OK, &stores)
}

/// Stores the caller may submit for.
pub async fn my_stores(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    let viewer = identity.effective();
    let stores = match viewer.role {
        Role::Admin | Role::HeadOfOperations => state.stores.list_active().await?,
        Role::AreaManager => state.stores.stores_for_user(viewer.id).await?,
        Role::Pending => Vec::new(),
    };
    response::json(StatusCode::OK, &stores)
}

pub async fn save_store(
    State(state): State<AppState>,
    Json(request): Json<StoreRequest>,
) -> Result<Response> {
    let (id, fields) = request.into_fields()?;
    let (status, store) = match id {
        Some(id) => (StatusCode::OK, state.stores.update(id, &fields).await?),
        None => (StatusCode::CREATED, state.stores.create(&fields).await?),
    };
    tracing::info!("Store {} saved", store.id);
    response::json(status, &store)
}

pub async fn toggle_store(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let store = state.stores.toggle_active(id).await?;
    response::json(StatusCode::OK, &store)
}

// Users

pub async fn list_users(State(state): State<AppState>) -> Result<Response> {
    let users = state.users.list().await?;
    response::json(StatusCode::OK, &users)
}

/// Pre-provisions a user; their first sign-in links the provider id by email.
/// Creates a user unless the email is taken; `None` means it already exists.
async fn provision_user(state: &AppState, request: AddUserRequest) -> Result<Option<User>> {
    request.check()?;
    let email = request.email.trim().to_lowercase();

    if state.users.find_by_email(&email).await?.is_some() {
        return Ok(None);
    }

    let user = state
        .users
        .create(&NewUser {
            email,
            display_name: request.display_name.trim().to_string(),
            external_id: None,
            role: request.role,
            is_approved: request.role.is_approved(),
        })
        .await?;
    tracing::info!("User {} added with role {}", user.id, user.role);
    Ok(Some(user))
}

pub async fn add_user(
    State(state): State<AppState>,
    Json(request): Json<AddUserRequest>,
) -> Result<Response> {
    let email = request.email.trim().to_lowercase();
    match provision_user(&state, request).await? {
        Some(user) => response::json(StatusCode::CREATED, &user),
        None => Err(AppError::Validation(format!(
            "A user with email {} already exists",
            email
        ))),
    }
}

/// Adds many users at once. Existing emails are skipped and bad rows are
/// reported back instead of aborting the import.
pub async fn bulk_import_users(
    State(state): State<AppState>,
    Json(request): Json<BulkImportRequest>,
) -> Result<Response> {
    if request.users.is_empty() {
        return Err(AppError::Validation("No users provided".to_string()));
    }

    let mut added = 0usize;
    let mut skipped = 0usize;
    let mut errors = Vec::new();

    for (index, row) in request.users.into_iter().enumerate() {
        let request = match row.into_request() {
            Ok(request) => request,
            Err(msg) => {
                errors.push(format!("Row {}: {}", index + 1, msg));
                continue;
            }
        };
        let email = request.email.clone();
        match provision_user(&state, request).await {
            Ok(Some(_)) => added += 1,
            Ok(None) => skipped += 1,
            Err(AppError::Validation(msg)) => errors.push(format!("{}: {}", email, msg)),
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        "Bulk import complete: {} added, {} skipped, {} errors",
        added,
        skipped,
        errors.len()
    );
    response::json(
        StatusCode::OK,
        &sonic_rs::json!({
            "success": true,
            "added": added,
            "skipped": skipped,
            "errors": errors,
        }),
    )
}

pub async fn change_role(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    Json(request): Json<RoleChangeRequest>,
) -> Result<Response> {
    let actor = identity.real();
    // Only an administrator may grant or revoke administrator rights.
    if actor.role != Role::Admin {
        let target = state.users.find_by_id(id).await?.ok_or(AppError::NotFound)?;
        if request.role == Role::Admin || target.role == Role::Admin {
            return Err(AppError::Forbidden {
                required: vec![Role::Admin],
                actual: actor.role,
            });
        }
    }

    let user = state.users.update_role(id, request.role).await?;
    tracing::info!("User {} role set to {} by user {}", user.id, user.role, actor.id);
    response::json(StatusCode::OK, &user)
}

pub async fn toggle_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> Result<Response> {
    if id == identity.real().id {
        return Err(AppError::Validation(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    let user = state.users.toggle_active(id).await?;
    tracing::info!("User {} active = {}", user.id, user.is_active);
    response::json(StatusCode::OK, &user)
}

// Assignments

pub async fn list_assignments(State(state): State<AppState>) -> Result<Response> {
    let assignments = state.stores.list_assignments().await?;
    response::json(StatusCode::OK, &assignments)
}

pub async fn assign_store(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<AssignmentRequest>,
) -> Result<Response> {
    request.check()?;
    state
        .users
        .find_by_id(request.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    state
        .stores
        .find_by_id(request.store_id)
        .await?
        .ok_or(AppError::NotFound)?;

    state
        .stores
        .assign(request.user_id, request.store_id, identity.real().id)
        .await?;
    tracing::info!(
        "Store {} assigned to user {}",
        request.store_id,
        request.user_id
    );
    response::success("Store assigned")
}

pub async fn remove_assignment(
    State(state): State<AppState>,
    Json(request): Json<AssignmentRequest>,
) -> Result<Response> {
    request.check()?;
    if !state
        .stores
        .unassign(request.user_id, request.store_id)
        .await?
    {
        return Err(AppError::NotFound);
    }
    response::success("Assignment removed")
}
