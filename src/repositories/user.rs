use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    db::column,
    error::{AppError, Result},
    models::{
        role::Role,
        user::{LoginProfile, NewUser, User},
    },
};

/// Storage for user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<User>>;

    /// Finds a user by identity provider subject.
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>>;

    /// Finds a user by email, ignoring case.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn create(&self, user: &NewUser) -> Result<User>;

    /// Refreshes identity fields from a sign-in and stamps `last_login_at`.
    async fn record_login(&self, id: i32, profile: &LoginProfile) -> Result<User>;

    async fn list(&self) -> Result<Vec<User>>;

    /// Changes the role; approval follows the role.
    async fn update_role(&self, id: i32, role: Role) -> Result<User>;

    /// Flips `is_active`.
    async fn toggle_active(&self, id: i32) -> Result<User>;
}

fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: column(row, "id")?,
        email: column(row, "email")?,
        display_name: column(row, "display_name")?,
        external_id: column(row, "external_id")?,
        role: column(row, "role")?,
        is_approved: column(row, "is_approved")?,
        is_active: column(row, "is_active")?,
        last_login_at: column(row, "last_login_at")?,
        created_at: column(row, "created_at")?,
    })
}

const USER_COLUMNS: &str =
    "id, email, display_name, external_id, role, is_approved, is_active, last_login_at, created_at";

/// PostgreSQL-backed users.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool,
}

impl PgUserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn query_one_user(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(sql).await?;
        let row = client.query_opt(&stmt, params).await?;
        row.map(|r| row_to_user(&r)).transpose()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i32) -> Result<Option<User>> {
        self.query_one_user(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
            &[&id],
        )
        .await
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        self.query_one_user(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = $1"),
            &[&external_id],
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_one_user(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"),
            &[&email],
        )
        .await
    }

    async fn create(&self, user: &NewUser) -> Result<User> {
        self.query_one_user(
            &format!(
                r#"
                INSERT INTO users (email, display_name, external_id, role, is_approved)
                VALUES (LOWER($1), $2, $3, $4, $5)
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[
                &user.email,
                &user.display_name,
                &user.external_id,
                &user.role,
                &user.is_approved,
            ],
        )
        .await?
        .ok_or_else(|| AppError::Internal("Insert returned no user".to_string()))
    }

    async fn record_login(&self, id: i32, profile: &LoginProfile) -> Result<User> {
        self.query_one_user(
            &format!(
                r#"
                UPDATE users
                SET email = LOWER($2),
                    display_name = $3,
                    external_id = $4,
                    last_login_at = NOW()
                WHERE id = $1
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[&id, &profile.email, &profile.display_name, &profile.external_id],
        )
        .await?
        .ok_or(AppError::NotFound)
    }

    async fn list(&self) -> Result<Vec<User>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY display_name, id"
            ))
            .await?;
        let rows = client.query(&stmt, &[]).await?;
        rows.iter().map(row_to_user).collect()
    }

    async fn update_role(&self, id: i32, role: Role) -> Result<User> {
        self.query_one_user(
            &format!(
                r#"
                UPDATE users SET role = $2, is_approved = $3
                WHERE id = $1
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[&id, &role, &role.is_approved()],
        )
        .await?
        .ok_or(AppError::NotFound)
    }

    async fn toggle_active(&self, id: i32) -> Result<User> {
        self.query_one_user(
            &format!(
                "UPDATE users SET is_active = NOT is_active WHERE id = $1 RETURNING {USER_COLUMNS}"
            ),
            &[&id],
        )
        .await?
        .ok_or(AppError::NotFound)
    }
}
