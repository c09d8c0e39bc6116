use chrono::{DateTime, Utc};
use serde::Serialize;

/// A retail store that can be audited.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: i32,
    pub store_name: String,
    pub store_code: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// An active link between an area manager and a store, with names resolved.
///
/// Deactivated links stay in the table for history and are never listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreAssignment {
    pub id: i32,
    pub user_id: i32,
    pub store_id: i32,
    pub assigned_at: DateTime<Utc>,
    pub is_active: bool,
    pub user_name: String,
    pub user_email: String,
    pub store_name: String,
    pub store_code: Option<String>,
    pub assigned_by_name: Option<String>,
}
