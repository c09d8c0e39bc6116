use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    db::column,
    error::Result,
    models::session::{NewSession, SessionRecord},
};

/// Storage for session rows.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Deletes every session of `session.user_id` and inserts `session`, atomically.
    async fn replace_for_user(&self, session: &NewSession) -> Result<()>;

    /// Finds a session by exact token, joined with its owner. Expiry is not checked.
    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>>;

    /// Records activity on a session.
    async fn touch(&self, token: &str, at: DateTime<Utc>) -> Result<()>;

    /// Deletes a session by token, returning the number of rows removed.
    async fn delete_by_token(&self, token: &str) -> Result<u64>;

    /// Deletes every session that expired before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// All unexpired sessions of active users, grouped by user then newest first.
    async fn list_live(&self, now: DateTime<Utc>) -> Result<Vec<SessionRecord>>;

    /// Deletes one session by its row id.
    async fn delete_by_id(&self, id: i64) -> Result<u64>;

    /// Deletes every session of a user.
    async fn delete_for_user(&self, user_id: i32) -> Result<u64>;
}

const SESSION_COLUMNS: &str = r#"
    s.id, s.token, s.user_id, s.created_at, s.expires_at, s.last_activity,
    s.delegated_access_token, s.delegated_refresh_token,
    u.email, u.display_name, u.role, u.is_approved, u.is_active
"#;

fn row_to_session(row: &Row) -> Result<SessionRecord> {
    Ok(SessionRecord {
        id: column(row, "id")?,
        token: column(row, "token")?,
        user_id: column(row, "user_id")?,
        created_at: column(row, "created_at")?,
        expires_at: column(row, "expires_at")?,
        last_activity: column(row, "last_activity")?,
        delegated_access_token: column(row, "delegated_access_token")?,
        delegated_refresh_token: column(row, "delegated_refresh_token")?,
        email: column(row, "email")?,
        display_name: column(row, "display_name")?,
        role: column(row, "role")?,
        is_approved: column(row, "is_approved")?,
        is_active: column(row, "is_active")?,
    })
}

/// PostgreSQL-backed sessions.
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: Pool,
}

impl PgSessionRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn replace_for_user(&self, session: &NewSession) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Serialises concurrent logins of the same user until commit.
        let lock = tx
            .prepare_cached("SELECT pg_advisory_xact_lock($1::bigint)")
            .await?;
        tx.execute(&lock, &[&i64::from(session.user_id)]).await?;

        let delete = tx
            .prepare_cached("DELETE FROM sessions WHERE user_id = $1")
            .await?;
        let removed = tx.execute(&delete, &[&session.user_id]).await?;

        let insert = tx
            .prepare_cached(
                r#"
                INSERT INTO sessions
                    (token, user_id, created_at, expires_at, last_activity,
                     delegated_access_token, delegated_refresh_token)
                VALUES ($1, $2, $3, $4, $3, $5, $6)
                "#,
            )
            .await?;
        tx.execute(
            &insert,
            &[
                &session.token,
                &session.user_id,
                &session.created_at,
                &session.expires_at,
                &session.delegated.access_token,
                &session.delegated.refresh_token,
            ],
        )
        .await?;

        tx.commit().await?;

        if removed > 0 {
            tracing::info!(
                "Replaced {} earlier session(s) of user {}",
                removed,
                session.user_id
            );
        }
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                SELECT {SESSION_COLUMNS}
                FROM sessions s
                JOIN users u ON u.id = s.user_id
                WHERE s.token = $1
                "#
            ))
            .await?;
        let row = client.query_opt(&stmt, &[&token]).await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn touch(&self, token: &str, at: DateTime<Utc>) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("UPDATE sessions SET last_activity = $2 WHERE token = $1")
            .await?;
        client.execute(&stmt, &[&token, &at]).await?;
        Ok(())
    }

    async fn delete_by_token(&self, token: &str) -> Result<u64> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("DELETE FROM sessions WHERE token = $1")
            .await?;
        Ok(client.execute(&stmt, &[&token]).await?)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("DELETE FROM sessions WHERE expires_at < $1")
            .await?;
        Ok(client.execute(&stmt, &[&now]).await?)
    }

    async fn list_live(&self, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                SELECT {SESSION_COLUMNS}
                FROM sessions s
                JOIN users u ON u.id = s.user_id
                WHERE s.expires_at > $1 AND u.is_active = true
                ORDER BY u.display_name, s.user_id, s.created_at DESC
                "#
            ))
            .await?;
        let rows = client.query(&stmt, &[&now]).await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn delete_by_id(&self, id: i64) -> Result<u64> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("DELETE FROM sessions WHERE id = $1")
            .await?;
        Ok(client.execute(&stmt, &[&id]).await?)
    }

    async fn delete_for_user(&self, user_id: i32) -> Result<u64> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("DELETE FROM sessions WHERE user_id = $1")
            .await?;
        Ok(client.execute(&stmt, &[&user_id]).await?)
    }
}
