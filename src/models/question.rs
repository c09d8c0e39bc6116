use chrono::{DateTime, Utc};
use serde::Serialize;

/// A checklist question and its weight.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i32,
    pub question_text: String,
    pub coefficient: f64,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
