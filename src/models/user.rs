use chrono::{DateTime, Utc};
use serde::Serialize;

use super::role::Role;

/// Represents a user in the system.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The unique identifier for the user.
    pub id: i32,
    /// The user's email address, stored lower-cased.
    pub email: String,
    /// The user's display name.
    pub display_name: String,
    /// The identity provider's subject identifier, once the user has signed in.
    pub external_id: Option<String>,
    /// The user's role.
    pub role: Role,
    /// Whether an administrator has approved the user.
    pub is_approved: bool,
    /// Whether the user is active.
    pub is_active: bool,
    /// The timestamp of the user's last sign-in.
    pub last_login_at: Option<DateTime<Utc>>,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}

/// Fields for a user row that does not exist yet.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub external_id: Option<String>,
    pub role: Role,
    pub is_approved: bool,
}

/// The normalised identity returned by the identity provider for a sign-in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginProfile {
    /// Stable subject identifier at the provider.
    pub external_id: String,
    /// Lower-cased email address.
    pub email: String,
    pub display_name: String,
}
