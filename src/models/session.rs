use chrono::{DateTime, Utc};
use serde::Serialize;

use super::role::Role;

/// Credentials issued by the identity provider, kept for delegated calls.
#[derive(Clone, Debug, Default)]
pub struct DelegatedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// A session row about to be written.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub delegated: DelegatedTokens,
}

/// What the caller gets back from session creation; the token goes into the cookie.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A session row joined with its owner.
///
/// Repositories return rows as stored; expiry and owner activity are judged
/// by the session manager.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    /// Internal row identifier, used by administrative deletes.
    pub id: i64,
    pub token: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: Option<DateTime<Utc>>,
    pub delegated_access_token: Option<String>,
    pub delegated_refresh_token: Option<String>,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub is_approved: bool,
    pub is_active: bool,
}

impl SessionRecord {
    /// A live session has not expired and belongs to an active user.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now && self.is_active
    }
}

/// One live session as shown to administrators.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: i64,
    pub user_id: i32,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: Option<DateTime<Utc>>,
    /// First characters of the token, enough to tell sessions apart.
    pub token_preview: String,
    /// How many live sessions the same user holds.
    pub session_count: usize,
}

/// Live sessions grouped under their owner.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSessions {
    pub user_id: i32,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub session_count: usize,
    pub sessions: Vec<SessionSummary>,
}
