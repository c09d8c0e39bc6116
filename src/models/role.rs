use std::fmt;
use std::str::FromStr;

use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};

/// The closed set of roles a user can hold.
///
/// Stored as the PostgreSQL enum `user_role`; the labels match the variant
/// names exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "user_role")]
pub enum Role {
    /// Full access, including session management and impersonation.
    #[postgres(name = "Admin")]
    Admin,
    /// Manages questions, stores, users and assignments.
    #[postgres(name = "HeadOfOperations")]
    HeadOfOperations,
    /// Submits checklists for assigned stores.
    #[postgres(name = "AreaManager")]
    AreaManager,
    /// Self-registered, waiting for an administrator.
    #[postgres(name = "Pending")]
    Pending,
}

/// Roles allowed through the admin surface.
pub const MANAGEMENT_ROLES: &[Role] = &[Role::Admin, Role::HeadOfOperations];

/// Roles allowed through admin-only endpoints.
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

impl Role {
    /// Every role, in privilege order.
    pub const ALL: [Role; 4] = [
        Role::Admin,
        Role::HeadOfOperations,
        Role::AreaManager,
        Role::Pending,
    ];

    /// The canonical label of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::HeadOfOperations => "HeadOfOperations",
            Role::AreaManager => "AreaManager",
            Role::Pending => "Pending",
        }
    }

    /// Returns `true` if this role is a member of `allowed`.
    pub fn is_one_of(self, allowed: &[Role]) -> bool {
        allowed.contains(&self)
    }

    /// Whether users holding this role count as approved.
    pub fn is_approved(self) -> bool {
        self != Role::Pending
    }

    /// Whether this role sees every store and every checklist.
    pub fn sees_everything(self) -> bool {
        self.is_one_of(MANAGEMENT_ROLES)
    }

    /// Renders a role set as `A or B`, for denial messages.
    pub fn describe_set(roles: &[Role]) -> String {
        roles
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}
