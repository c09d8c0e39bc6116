use chrono::{DateTime, NaiveDate, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};

/// An answer to one checklist question.
///
/// Stored as the PostgreSQL enum `checklist_answer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "checklist_answer")]
pub enum Answer {
    #[postgres(name = "Yes")]
    Yes,
    #[postgres(name = "No")]
    No,
    #[postgres(name = "NA")]
    #[serde(alias = "N/A")]
    NA,
}

impl Answer {
    /// Parses the form value of an answer radio button.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Yes" | "yes" => Some(Answer::Yes),
            "No" | "no" => Some(Answer::No),
            "NA" | "na" | "N/A" => Some(Answer::NA),
            _ => None,
        }
    }
}

/// One answer row of a stored checklist.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistAnswer {
    pub question_id: i32,
    pub answer: Answer,
    /// The question's weight frozen at submission time.
    pub coefficient: f64,
    pub earned_value: f64,
    pub comment: Option<String>,
    pub image_path: Option<String>,
}

/// A completed audit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub id: i32,
    pub document_number: String,
    pub store_id: i32,
    pub audit_date: NaiveDate,
    pub submitted_by: i32,
    /// Sum of the non-NA coefficients.
    pub total_coefficient: f64,
    pub total_earned: f64,
    /// Rounded to two decimals.
    pub score_percentage: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub answers: Vec<ChecklistAnswer>,
}

/// A checklist header plus its answer rows, ready to be written in one go.
#[derive(Debug, Clone)]
pub struct NewChecklist {
    pub document_number: String,
    pub store_id: i32,
    pub audit_date: NaiveDate,
    pub submitted_by: i32,
    pub total_coefficient: f64,
    pub total_earned: f64,
    pub score_percentage: f64,
    pub notes: Option<String>,
    pub answers: Vec<ChecklistAnswer>,
}

/// A checklist header joined with store and submitter names, for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistSummary {
    pub id: i32,
    pub document_number: String,
    pub store_id: i32,
    pub store_name: String,
    pub store_code: Option<String>,
    pub audit_date: NaiveDate,
    pub submitted_by: i32,
    pub submitted_by_name: String,
    pub total_coefficient: f64,
    pub total_earned: f64,
    pub score_percentage: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An answer row joined with its question text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDetail {
    #[serde(flatten)]
    pub answer: ChecklistAnswer,
    pub question_text: String,
}

/// A checklist with everything needed to display it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistDetail {
    #[serde(flatten)]
    pub summary: ChecklistSummary,
    pub answers: Vec<AnswerDetail>,
}

/// Optional filters for checklist listings and statistics.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistFilter {
    pub store_id: Option<i32>,
    pub submitted_by: Option<i32>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

impl ChecklistFilter {
    /// Whether a checklist header passes every set filter (limit aside).
    pub fn matches(&self, store_id: i32, submitted_by: i32, audit_date: NaiveDate) -> bool {
        self.store_id.is_none_or(|s| s == store_id)
            && self.submitted_by.is_none_or(|u| u == submitted_by)
            && self.from_date.is_none_or(|d| audit_date >= d)
            && self.to_date.is_none_or(|d| audit_date <= d)
    }
}

/// Aggregate scores over a filtered set of checklists.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistStats {
    pub total_checklists: i64,
    pub average_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}
