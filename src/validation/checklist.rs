//! Checklist submission input, from JSON or from the multipart form.

use std::collections::{BTreeMap, HashSet};

use axum::body::Bytes;
use chrono::NaiveDate;
use garde::Validate;
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    models::checklist::Answer,
};

/// Longest accepted checklist note, in characters.
pub const MAX_NOTES_CHARS: usize = 4000;
/// Longest accepted per-question comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 2000;
/// Largest weight a single question may carry.
pub const MAX_COEFFICIENT: f64 = 1000.0;

/// A submitted answer. The coefficient is the one shown on the form.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
    #[garde(range(min = 1))]
    pub question_id: i32,
    #[garde(custom(positive_coefficient))]
    pub coefficient: f64,
    #[garde(skip)]
    pub answer: Answer,
    #[garde(length(chars, max = 2000))]
    pub comment: Option<String>,
    /// Filled in by the server once an uploaded image is stored.
    #[serde(skip)]
    #[garde(skip)]
    pub image_path: Option<String>,
}

/// A complete checklist submission.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    #[garde(range(min = 1))]
    pub store_id: i32,
    #[garde(skip)]
    pub audit_date: NaiveDate,
    #[garde(length(chars, max = 4000))]
    pub notes: Option<String>,
    #[garde(length(min = 1), dive)]
    pub answers: Vec<AnswerInput>,
}

/// Answers only, for the live score preview.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPayload {
    #[garde(dive)]
    pub answers: Vec<AnswerInput>,
}

pub(crate) fn positive_coefficient(value: &f64, _ctx: &()) -> garde::Result {
    if !value.is_finite() || *value <= 0.0 {
        return Err(garde::Error::new("coefficient must be a positive number"));
    }
    if *value > MAX_COEFFICIENT {
        return Err(garde::Error::new(format!(
            "coefficient must not exceed {}",
            MAX_COEFFICIENT
        )));
    }
    Ok(())
}

/// Turns a garde report into a 400.
pub fn report_to_error(report: garde::Report) -> AppError {
    AppError::Validation(report.to_string().trim().to_string())
}

impl SubmissionPayload {
    /// Field rules plus the cross-answer rules garde cannot express.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(report_to_error)?;

        let mut seen = HashSet::new();
        for a in &self.answers {
            if !seen.insert(a.question_id) {
                return Err(AppError::Validation(format!(
                    "Question {} is answered more than once",
                    a.question_id
                )));
            }
        }

        Ok(())
    }

    /// Blank notes are stored as absent.
    pub fn normalise(&mut self) {
        self.notes = self.notes.take().filter(|n| !n.trim().is_empty());
        for a in &mut self.answers {
            a.comment = a.comment.take().filter(|c| !c.trim().is_empty());
        }
    }
}

#[derive(Debug, Default)]
struct PartialAnswer {
    id: Option<String>,
    coefficient: Option<String>,
    answer: Option<String>,
    comment: Option<String>,
}

/// Accumulates multipart fields into a [`SubmissionPayload`].
///
/// Answers arrive as `questions[<i>][id|coefficient|answer|comment]`, images
/// as files named `image_<questionId>`.
#[derive(Debug, Default)]
pub struct SubmissionForm {
    store_id: Option<String>,
    audit_date: Option<String>,
    notes: Option<String>,
    questions: BTreeMap<usize, PartialAnswer>,
    images: Vec<(i32, Bytes)>,
}

impl SubmissionForm {
    /// Records a text field. Unknown names are ignored.
    pub fn text_field(&mut self, name: &str, value: String) -> Result<()> {
        match name {
            "storeId" => self.store_id = Some(value),
            "auditDate" => self.audit_date = Some(value),
            "notes" => self.notes = Some(value),
            _ => {
                if let Some((index, key)) = parse_question_field(name) {
                    let entry = self.questions.entry(index).or_default();
                    match key {
                        "id" => entry.id = Some(value),
                        "coefficient" => entry.coefficient = Some(value),
                        "answer" => entry.answer = Some(value),
                        "comment" => entry.comment = Some(value),
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether a field name is an image upload slot, returning its question id.
    pub fn image_field(name: &str) -> Option<i32> {
        let id = name.strip_prefix("image_")?;
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        id.parse().ok()
    }

    /// Keeps an uploaded image. Empty file inputs are skipped.
    pub fn add_image(&mut self, question_id: i32, bytes: Bytes) {
        if !bytes.is_empty() {
            self.images.push((question_id, bytes));
        }
    }

    /// Builds the payload and hands back the images still to be stored.
    pub fn finish(self) -> Result<(SubmissionPayload, Vec<(i32, Bytes)>)> {
        let store_id = required(self.store_id, "storeId")?
            .trim()
            .parse::<i32>()
            .map_err(|_| AppError::Validation("storeId must be a number".to_string()))?;

        let audit_date = parse_date(&required(self.audit_date, "auditDate")?)?;

        let mut answers = Vec::with_capacity(self.questions.len());
        for (index, q) in self.questions {
            let question_id = required(q.id, &format!("questions[{}][id]", index))?
                .trim()
                .parse::<i32>()
                .map_err(|_| {
                    AppError::Validation(format!("questions[{}][id] must be a number", index))
                })?;

            let coefficient = required(q.coefficient, &format!("questions[{}][coefficient]", index))?
                .trim()
                .parse::<f64>()
                .map_err(|_| {
                    AppError::Validation(format!(
                        "questions[{}][coefficient] must be a number",
                        index
                    ))
                })?;

            let raw = q.answer.ok_or_else(|| {
                AppError::Validation(format!("Question {} has no answer", question_id))
            })?;
            let answer = Answer::parse(&raw).ok_or_else(|| {
                AppError::Validation(format!(
                    "Question {} has an invalid answer: {}",
                    question_id, raw
                ))
            })?;

            answers.push(AnswerInput {
                question_id,
                coefficient,
                answer,
                comment: q.comment,
                image_path: None,
            });
        }

        let mut payload = SubmissionPayload {
            store_id,
            audit_date,
            notes: self.notes,
            answers,
        };
        payload.normalise();
        payload.check()?;

        for (question_id, _) in &self.images {
            if !payload.answers.iter().any(|a| a.question_id == *question_id) {
                return Err(AppError::Validation(format!(
                    "Image uploaded for unknown question {}",
                    question_id
                )));
            }
        }

        Ok((payload, self.images))
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", name)))
}

/// Parses a `YYYY-MM-DD` audit date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation("auditDate must be YYYY-MM-DD".to_string()))
}

fn parse_question_field(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix("questions[")?;
    let (index, rest) = rest.split_once("][")?;
    let key = rest.strip_suffix(']')?;
    Some((index.parse().ok()?, key))
}
