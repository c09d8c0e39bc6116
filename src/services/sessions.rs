//! Server-side sessions.
//!
//! At most one session per user is kept: creating a session removes every
//! earlier one of the same user, so other browsers are signed out on their
//! next request.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::{
    crypto::token,
    error::Result,
    models::session::{
        DelegatedTokens, IssuedSession, NewSession, SessionRecord, SessionSummary, UserSessions,
    },
    repositories::SessionRepository,
};

/// Issues, resolves and revokes sessions.
#[derive(Clone)]
pub struct SessionManager {
    repo: Arc<dyn SessionRepository>,
    ttl: chrono::Duration,
}

impl SessionManager {
    pub fn new(repo: Arc<dyn SessionRepository>, ttl: chrono::Duration) -> Self {
        Self { repo, ttl }
    }

    /// Creates the only session of `user_id`.
    pub async fn create_session(
        &self,
        user_id: i32,
        delegated: DelegatedTokens,
    ) -> Result<IssuedSession> {
        let now = Utc::now();
        let session = NewSession {
            token: token::generate(user_id),
            user_id,
            created_at: now,
            expires_at: now + self.ttl,
            delegated,
        };

        self.repo.replace_for_user(&session).await?;
        tracing::info!(
            "Session {} created for user {}",
            token::preview(&session.token),
            user_id
        );

        Ok(IssuedSession {
            token: session.token,
            expires_at: session.expires_at,
        })
    }

    /// Resolves a token to a live session.
    ///
    /// Unknown, expired and deactivated-owner sessions all come back as `None`.
    /// A live hit schedules a `last_activity` update without waiting for it.
    pub async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        let now = Utc::now();
        let Some(session) = self.repo.find_by_token(token).await? else {
            return Ok(None);
        };
        if !session.is_live(now) {
            return Ok(None);
        }

        let repo = Arc::clone(&self.repo);
        let token = session.token.clone();
        tokio::spawn(async move {
            if let Err(e) = repo.touch(&token, now).await {
                tracing::debug!("Session activity update failed: {}", e);
            }
        });

        Ok(Some(session))
    }

    /// Removes a session. Unknown tokens are not an error.
    pub async fn delete_session(&self, token: &str) -> Result<()> {
        let removed = self.repo.delete_by_token(token).await?;
        tracing::debug!("Deleted {} session(s) for {}", removed, token::preview(token));
        Ok(())
    }

    /// Deletes every expired session, returning how many were removed.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64> {
        let removed = self.repo.delete_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!("Removed {} expired session(s)", removed);
        }
        Ok(removed)
    }

    /// Every live session, each tagged with its owner's live session count.
    pub async fn list_active_sessions(&self) -> Result<Vec<SessionSummary>> {
        let records = self.repo.list_live(Utc::now()).await?;

        let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
        for r in &records {
            *counts.entry(r.user_id).or_default() += 1;
        }

        Ok(records
            .iter()
            .map(|r| summarize(r, counts.get(&r.user_id).copied().unwrap_or(1)))
            .collect())
    }

    /// Live sessions grouped by owner, in the order owners first appear.
    pub async fn sessions_by_user(&self) -> Result<Vec<UserSessions>> {
        let mut groups: Vec<UserSessions> = Vec::new();
        for summary in self.list_active_sessions().await? {
            match groups.iter_mut().find(|g| g.user_id == summary.user_id) {
                Some(group) => group.sessions.push(summary),
                None => groups.push(UserSessions {
                    user_id: summary.user_id,
                    email: summary.email.clone(),
                    display_name: summary.display_name.clone(),
                    role: summary.role,
                    session_count: summary.session_count,
                    sessions: vec![summary],
                }),
            }
        }
        Ok(groups)
    }

    /// Returns whether a session with that row id existed.
    pub async fn delete_session_by_id(&self, id: i64) -> Result<bool> {
        Ok(self.repo.delete_by_id(id).await? > 0)
    }

    /// Signs a user out everywhere.
    pub async fn delete_user_sessions(&self, user_id: i32) -> Result<u64> {
        let removed = self.repo.delete_for_user(user_id).await?;
        tracing::info!("Deleted {} session(s) of user {}", removed, user_id);
        Ok(removed)
    }
}

fn summarize(record: &SessionRecord, session_count: usize) -> SessionSummary {
    SessionSummary {
        id: record.id,
        user_id: record.user_id,
        email: record.email.clone(),
        display_name: record.display_name.clone(),
        role: record.role,
        created_at: record.created_at,
        expires_at: record.expires_at,
        last_activity: record.last_activity,
        token_preview: token::preview(&record.token),
        session_count,
    }
}
