use serde::Serialize;

use super::{role::Role, session::SessionRecord, user::User};

/// The identity attached to an authenticated request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: i32,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub is_approved: bool,
    pub is_active: bool,
    /// The session's delegated access token. Never serialised.
    #[serde(skip_serializing)]
    pub delegated_access_token: Option<String>,
}

impl From<&SessionRecord> for CurrentUser {
    fn from(session: &SessionRecord) -> Self {
        Self {
            id: session.user_id,
            email: session.email.clone(),
            display_name: session.display_name.clone(),
            role: session.role,
            is_approved: session.is_approved,
            is_active: session.is_active,
            delegated_access_token: session.delegated_access_token.clone(),
        }
    }
}

impl CurrentUser {
    /// Builds the identity of an impersonation target, carrying over the real
    /// session's delegated token.
    pub fn impersonating(target: &User, delegated_access_token: Option<String>) -> Self {
        Self {
            id: target.id,
            email: target.email.clone(),
            display_name: target.display_name.clone(),
            role: target.role,
            is_approved: target.is_approved,
            is_active: target.is_active,
            delegated_access_token,
        }
    }
}

/// Who is making the request.
///
/// Permission checks must pick a side explicitly: `effective()` for what the
/// request may see and do, `real()` for decisions impersonation must not be
/// able to influence.
#[derive(Clone, Debug)]
pub enum Identity {
    /// The signed-in user acting as themselves.
    Real(CurrentUser),
    /// An administrator viewing the application as another user.
    Impersonated {
        real: CurrentUser,
        effective: CurrentUser,
    },
}

impl Identity {
    /// The user who owns the session cookie.
    pub fn real(&self) -> &CurrentUser {
        match self {
            Identity::Real(user) => user,
            Identity::Impersonated { real, .. } => real,
        }
    }

    /// The user the request acts as.
    pub fn effective(&self) -> &CurrentUser {
        match self {
            Identity::Real(user) => user,
            Identity::Impersonated { effective, .. } => effective,
        }
    }

    pub fn is_impersonating(&self) -> bool {
        matches!(self, Identity::Impersonated { .. })
    }
}

/// The raw session token of the current request, for logout.
#[derive(Clone, Debug)]
pub struct SessionToken(pub String);
