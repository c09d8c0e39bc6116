use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Json,
};
use garde::Validate;

use crate::{
    error::{AppError, Result},
    handlers::{auth::html_escape, response},
    middleware_layer::auth::access_denied_page,
    models::{
        checklist::{ChecklistDetail, ChecklistFilter},
        identity::{CurrentUser, Identity},
        role::{Role, MANAGEMENT_ROLES},
    },
    services::{checklists, scoring},
    state::AppState,
    validation::checklist::{report_to_error, PreviewPayload, SubmissionForm, SubmissionPayload},
};

/// How many checklists the dashboard lists.
const RECENT_LIMIT: i64 = 10;

/// Accepts the browser form, stores any photos, and redirects to the
/// confirmation page.
pub async fn submit_form(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Response> {
    let submitter = identity.effective();
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Multipart(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(question_id) = SubmissionForm::image_field(&name) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Multipart(e.to_string()))?;
            form.add_image(question_id, bytes);
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Multipart(e.to_string()))?;
            form.text_field(&name, value)?;
        }
    }

    let (mut payload, images) = form.finish()?;
    checklists::authorize_submission(
        state.stores.as_ref(),
        state.questions.as_ref(),
        submitter,
        &payload,
    )
    .await?;
    for (_, bytes) in &images {
        state.images.check(bytes)?;
    }

    let mut stored = Vec::with_capacity(images.len());
    for (question_id, bytes) in images {
        let image = match state.images.save(&bytes).await {
            Ok(image) => image,
            Err(e) => {
                state.images.discard(&stored).await;
                return Err(e);
            }
        };
        if let Some(answer) = payload
            .answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        {
            answer.image_path = Some(image.reference.clone());
        }
        stored.push(image);
    }

    let checklist = match checklists::persist(
        state.checklists.as_ref(),
        submitter.id,
        payload,
        &state.config.document_prefix,
    )
    .await
    {
        Ok(checklist) => checklist,
        Err(e) => {
            state.images.discard(&stored).await;
            return Err(e);
        }
    };

    Ok(Redirect::to(&format!("/checklist/success/{}", checklist.document_number)).into_response())
}

/// JSON submission without images.
pub async fn submit_json(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(mut payload): Json<SubmissionPayload>,
) -> Result<Response> {
    payload.normalise();
    let checklist = checklists::submit(
        state.checklists.as_ref(),
        state.stores.as_ref(),
        state.questions.as_ref(),
        identity.effective(),
        payload,
        &state.config.document_prefix,
    )
    .await?;
    response::json(StatusCode::CREATED, &checklist)
}

/// Scores answers without storing anything, using the same engine as submission.
pub async fn preview(Json(payload): Json<PreviewPayload>) -> Result<Response> {
    payload.validate().map_err(report_to_error)?;
    let score = scoring::score(payload.answers.iter().map(|a| (a.coefficient, a.answer)));
    if !score.is_finite() {
        return Err(AppError::Validation(
            "Coefficients are too large to score".to_string(),
        ));
    }
    response::json(
        StatusCode::OK,
        &sonic_rs::json!({
            "totalCoefficient": score.total_coefficient,
            "applicableCoefficient": score.applicable_coefficient,
            "earned": score.earned,
            "percentage": score.rounded_percentage(),
        }),
    )
}

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(filter): Query<ChecklistFilter>,
) -> Result<Response> {
    let filter = checklists::scope_filter(identity.effective(), filter);
    let rows = state.checklists.list(&filter).await?;
    response::json(StatusCode::OK, &rows)
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(filter): Query<ChecklistFilter>,
) -> Result<Response> {
    let filter = checklists::scope_filter(identity.effective(), filter);
    let stats = state.checklists.stats(&filter).await?;
    response::json(StatusCode::OK, &stats)
}

fn ensure_visible(viewer: &CurrentUser, detail: &ChecklistDetail) -> Result<()> {
    if checklists::can_view(viewer, detail.summary.submitted_by) {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            required: MANAGEMENT_ROLES.to_vec(),
            actual: viewer.role,
        })
    }
}

/// Browser-facing counterpart of [`ensure_visible`].
fn denied_page(viewer: &CurrentUser, detail: &ChecklistDetail) -> Option<Response> {
    if checklists::can_view(viewer, detail.summary.submitted_by) {
        None
    } else {
        Some(access_denied_page(
            &Role::describe_set(MANAGEMENT_ROLES),
            viewer.role,
        ))
    }
}

pub async fn get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let detail = state
        .checklists
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_visible(identity.effective(), &detail)?;
    response::json(StatusCode::OK, &detail)
}

/// Administrative removal; checklists are otherwise immutable.
pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> Result<Response> {
    if !state.checklists.delete(id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!("Checklist {} deleted by user {}", id, identity.real().id);
    response::success("Checklist deleted")
}

/// Confirmation shown after a form submission.
pub async fn success_page(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(document_number): Path<String>,
) -> Result<Response> {
    let detail = state
        .checklists
        .find_by_document_number(&document_number)
        .await?
        .ok_or(AppError::NotFound)?;
    if let Some(denied) = denied_page(identity.effective(), &detail) {
        return Ok(denied);
    }
    let s = &detail.summary;

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html><head><title>Checklist submitted</title></head><body>\
         <h1>Checklist submitted</h1>\
         <p>Document number: <strong>{}</strong></p>\
         <p>{} on {}: {:.2}%</p>\
         <a href=\"/checklist/view/{}\">View checklist</a> | <a href=\"/dashboard\">Dashboard</a>\
         </body></html>",
        html_escape(&s.document_number),
        html_escape(&s.store_name),
        s.audit_date,
        s.score_percentage,
        s.id
    ))
    .into_response())
}

/// Read-only page for one checklist.
pub async fn view_page(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let detail = state
        .checklists
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound)?;
    if let Some(denied) = denied_page(identity.effective(), &detail) {
        return Ok(denied);
    }
    let s = &detail.summary;

    let rows: String = detail
        .answers
        .iter()
        .map(|a| {
            let image = a
                .answer
                .image_path
                .as_deref()
                .map(|p| format!("<a href=\"/{}\">photo</a>", html_escape(p)))
                .unwrap_or_default();
            format!(
                "<tr><td>{}</td><td>{:?}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&a.question_text),
                a.answer.answer,
                a.answer.coefficient,
                a.answer.earned_value,
                html_escape(a.answer.comment.as_deref().unwrap_or("")),
                image
            )
        })
        .collect();

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html><head><title>{doc}</title></head><body>\
         <h1>{doc}</h1>\
         <p>Store: {store} | Date: {date} | Submitted by: {by}</p>\
         <p>Score: {earned} / {total} = {pct:.2}%</p>\
         <table><tr><th>Question</th><th>Answer</th><th>Coefficient</th>\
         <th>Earned</th><th>Comment</th><th>Image</th></tr>{rows}</table>\
         <p>{notes}</p></body></html>",
        doc = html_escape(&s.document_number),
        store = html_escape(&s.store_name),
        date = s.audit_date,
        by = html_escape(&s.submitted_by_name),
        earned = s.total_earned,
        total = s.total_coefficient,
        pct = s.score_percentage,
        rows = rows,
        notes = html_escape(s.notes.as_deref().unwrap_or("")),
    ))
    .into_response())
}

/// Landing data for the signed-in user, scoped by role.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    let viewer = identity.effective();
    let scope = checklists::scope_filter(viewer, ChecklistFilter::default());

    let stats = state.checklists.stats(&scope).await?;
    let recent = state
        .checklists
        .list(&ChecklistFilter {
            limit: Some(RECENT_LIMIT),
            ..scope
        })
        .await?;
    let stores = if viewer.role == Role::AreaManager {
        state.stores.stores_for_user(viewer.id).await?
    } else {
        state.stores.list_active().await?
    };

    response::json(
        StatusCode::OK,
        &sonic_rs::json!({
            "user": viewer,
            "isImpersonating": identity.is_impersonating(),
            "stats": stats,
            "recentChecklists": recent,
            "stores": stores,
        }),
    )
}
