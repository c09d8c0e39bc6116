//! Checklist submission and role-scoped reads.

use std::collections::HashSet;

use crate::{
    error::{AppError, Result},
    models::{
        checklist::{Checklist, ChecklistAnswer, ChecklistFilter, NewChecklist},
        identity::CurrentUser,
        role::Role,
    },
    repositories::{ChecklistRepository, QuestionRepository, StoreRepository},
    services::scoring,
    validation::checklist::SubmissionPayload,
};

/// Formats a counter value as a document number, e.g. `AMC-000042`.
pub fn format_document_number(prefix: &str, sequence: i64) -> String {
    format!("{}-{:06}", prefix, sequence)
}

/// Checks that `submitter` may file `payload` and that it covers the live
/// question set. Runs before any image is written.
pub async fn authorize_submission(
    stores: &dyn StoreRepository,
    questions: &dyn QuestionRepository,
    submitter: &CurrentUser,
    payload: &SubmissionPayload,
) -> Result<()> {
    payload.check()?;

    let store = stores
        .find_by_id(payload.store_id)
        .await?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::Validation(format!("Unknown store {}", payload.store_id)))?;

    match submitter.role {
        Role::Admin | Role::HeadOfOperations => {}
        Role::AreaManager => {
            if !stores.is_assigned(submitter.id, store.id).await? {
                return Err(AppError::StoreNotAssigned(store.id));
            }
        }
        Role::Pending => {
            return Err(AppError::Forbidden {
                required: vec![Role::Admin, Role::HeadOfOperations, Role::AreaManager],
                actual: Role::Pending,
            });
        }
    }

    let active: HashSet<i32> = questions
        .list_active()
        .await?
        .into_iter()
        .map(|q| q.id)
        .collect();
    let submitted: HashSet<i32> = payload.answers.iter().map(|a| a.question_id).collect();

    if let Some(unknown) = payload
        .answers
        .iter()
        .map(|a| a.question_id)
        .find(|id| !active.contains(id))
    {
        return Err(AppError::Validation(format!(
            "Question {} is not an active question",
            unknown
        )));
    }
    let mut missing: Vec<i32> = active.difference(&submitted).copied().collect();
    missing.sort_unstable();
    if let Some(first) = missing.first() {
        return Err(AppError::Validation(format!(
            "Question {} was not answered",
            first
        )));
    }

    Ok(())
}

/// Numbers, scores and stores an authorised submission.
///
/// The coefficients are taken from the payload as submitted. Header and
/// answers are written in one transaction.
pub async fn persist(
    checklists: &dyn ChecklistRepository,
    submitted_by: i32,
    payload: SubmissionPayload,
    document_prefix: &str,
) -> Result<Checklist> {
    let score = scoring::score(payload.answers.iter().map(|a| (a.coefficient, a.answer)));
    if !score.is_finite() {
        return Err(AppError::Validation(
            "Coefficients are too large to score".to_string(),
        ));
    }

    let sequence = checklists.next_document_sequence().await?;
    let document_number = format_document_number(document_prefix, sequence);

    let answers = payload
        .answers
        .into_iter()
        .map(|a| ChecklistAnswer {
            question_id: a.question_id,
            answer: a.answer,
            coefficient: a.coefficient,
            earned_value: scoring::earned_value(a.coefficient, a.answer),
            comment: a.comment,
            image_path: a.image_path,
        })
        .collect();

    let checklist = checklists
        .insert(&NewChecklist {
            document_number,
            store_id: payload.store_id,
            audit_date: payload.audit_date,
            submitted_by,
            total_coefficient: score.applicable_coefficient,
            total_earned: score.earned,
            score_percentage: score.rounded_percentage(),
            notes: payload.notes,
            answers,
        })
        .await?;

    tracing::info!(
        "Checklist {} submitted for store {} by user {} ({:.2}%)",
        checklist.document_number,
        checklist.store_id,
        submitted_by,
        checklist.score_percentage
    );
    Ok(checklist)
}

/// Authorises and persists in one step, for submissions without images.
pub async fn submit(
    checklists: &dyn ChecklistRepository,
    stores: &dyn StoreRepository,
    questions: &dyn QuestionRepository,
    submitter: &CurrentUser,
    payload: SubmissionPayload,
    document_prefix: &str,
) -> Result<Checklist> {
    authorize_submission(stores, questions, submitter, &payload).await?;
    persist(checklists, submitter.id, payload, document_prefix).await
}

/// Narrows a listing filter to what `viewer` may see.
pub fn scope_filter(viewer: &CurrentUser, mut filter: ChecklistFilter) -> ChecklistFilter {
    if !viewer.role.sees_everything() {
        filter.submitted_by = Some(viewer.id);
    }
    filter
}

/// Whether `viewer` may open a checklist submitted by `submitted_by`.
pub fn can_view(viewer: &CurrentUser, submitted_by: i32) -> bool {
    viewer.role.sees_everything() || viewer.id == submitted_by
}
