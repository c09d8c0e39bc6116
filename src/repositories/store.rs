use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    db::column,
    error::{AppError, Result},
    models::store::{Store, StoreAssignment},
};

/// Fields an administrator edits on a store.
#[derive(Debug, Clone)]
pub struct StoreFields {
    pub store_name: String,
    pub store_code: Option<String>,
}

/// Stores and the area-manager assignments that scope them.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Store>>;
    async fn list_active(&self) -> Result<Vec<Store>>;
    async fn find_by_id(&self, id: i32) -> Result<Option<Store>>;
    async fn create(&self, fields: &StoreFields) -> Result<Store>;
    async fn update(&self, id: i32, fields: &StoreFields) -> Result<Store>;
    async fn toggle_active(&self, id: i32) -> Result<Store>;

    /// Active stores linked to `user_id` through an active assignment.
    async fn stores_for_user(&self, user_id: i32) -> Result<Vec<Store>>;

    /// Whether `user_id` holds an active assignment to `store_id`.
    async fn is_assigned(&self, user_id: i32, store_id: i32) -> Result<bool>;

    /// Creates the link, or reactivates it if it was removed earlier.
    async fn assign(&self, user_id: i32, store_id: i32, assigned_by: i32) -> Result<()>;

    /// Soft-deactivates the link. Returns whether an active link existed.
    async fn unassign(&self, user_id: i32, store_id: i32) -> Result<bool>;

    /// Every active link with names resolved.
    async fn list_assignments(&self) -> Result<Vec<StoreAssignment>>;
}

fn row_to_store(row: &Row) -> Result<Store> {
    Ok(Store {
        id: column(row, "id")?,
        store_name: column(row, "store_name")?,
        store_code: column(row, "store_code")?,
        is_active: column(row, "is_active")?,
        created_at: column(row, "created_at")?,
    })
}

fn row_to_assignment(row: &Row) -> Result<StoreAssignment> {
    Ok(StoreAssignment {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        store_id: column(row, "store_id")?,
        assigned_at: column(row, "assigned_at")?,
        is_active: column(row, "is_active")?,
        user_name: column(row, "user_name")?,
        user_email: column(row, "user_email")?,
        store_name: column(row, "store_name")?,
        store_code: column(row, "store_code")?,
        assigned_by_name: column(row, "assigned_by_name")?,
    })
}

const STORE_COLUMNS: &str = "id, store_name, store_code, is_active, created_at";

#[derive(Clone)]
pub struct PgStoreRepository {
    pool: Pool,
}

impl PgStoreRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn list_where(&self, filter: &str) -> Result<Vec<Store>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {STORE_COLUMNS} FROM stores {filter} ORDER BY store_name, id"
            ))
            .await?;
        let rows = client.query(&stmt, &[]).await?;
        rows.iter().map(row_to_store).collect()
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn list_all(&self) -> Result<Vec<Store>> {
        self.list_where("").await
    }

    async fn list_active(&self) -> Result<Vec<Store>> {
        self.list_where("WHERE is_active = true").await
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Store>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = $1"))
            .await?;
        let row = client.query_opt(&stmt, &[&id]).await?;
        row.map(|r| row_to_store(&r)).transpose()
    }

    async fn create(&self, fields: &StoreFields) -> Result<Store> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "INSERT INTO stores (store_name, store_code) VALUES ($1, $2) RETURNING {STORE_COLUMNS}"
            ))
            .await?;
        let row = client
            .query_one(&stmt, &[&fields.store_name, &fields.store_code])
            .await?;
        row_to_store(&row)
    }

    async fn update(&self, id: i32, fields: &StoreFields) -> Result<Store> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                UPDATE stores SET store_name = $2, store_code = $3
                WHERE id = $1
                RETURNING {STORE_COLUMNS}
                "#
            ))
            .await?;
        let row = client
            .query_opt(&stmt, &[&id, &fields.store_name, &fields.store_code])
            .await?;
        row.map(|r| row_to_store(&r))
            .transpose()?
            .ok_or(AppError::NotFound)
    }

    async fn toggle_active(&self, id: i32) -> Result<Store> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "UPDATE stores SET is_active = NOT is_active WHERE id = $1 RETURNING {STORE_COLUMNS}"
            ))
            .await?;
        let row = client.query_opt(&stmt, &[&id]).await?;
        row.map(|r| row_to_store(&r))
            .transpose()?
            .ok_or(AppError::NotFound)
    }

    async fn stores_for_user(&self, user_id: i32) -> Result<Vec<Store>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                SELECT s.id, s.store_name, s.store_code, s.is_active, s.created_at
                FROM stores s
                JOIN store_assignments a ON a.store_id = s.id
                WHERE a.user_id = $1 AND a.is_active = true AND s.is_active = true
                ORDER BY s.store_name, s.id
                "#,
            )
            .await?;
        let rows = client.query(&stmt, &[&user_id]).await?;
        rows.iter().map(row_to_store).collect()
    }

    async fn is_assigned(&self, user_id: i32, store_id: i32) -> Result<bool> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM store_assignments
                    WHERE user_id = $1 AND store_id = $2 AND is_active = true
                ) AS assigned
                "#,
            )
            .await?;
        let row = client.query_one(&stmt, &[&user_id, &store_id]).await?;
        column(&row, "assigned")
    }

    async fn assign(&self, user_id: i32, store_id: i32, assigned_by: i32) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                INSERT INTO store_assignments (user_id, store_id, assigned_by)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, store_id) DO UPDATE
                SET is_active = true, assigned_by = EXCLUDED.assigned_by, assigned_at = NOW()
                "#,
            )
            .await?;
        client
            .execute(&stmt, &[&user_id, &store_id, &assigned_by])
            .await?;
        Ok(())
    }

    async fn unassign(&self, user_id: i32, store_id: i32) -> Result<bool> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                UPDATE store_assignments SET is_active = false
                WHERE user_id = $1 AND store_id = $2 AND is_active = true
                "#,
            )
            .await?;
        let changed = client.execute(&stmt, &[&user_id, &store_id]).await?;
        Ok(changed > 0)
    }

    async fn list_assignments(&self) -> Result<Vec<StoreAssignment>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                SELECT a.id, a.user_id, a.store_id, a.assigned_at, a.is_active,
                       u.display_name AS user_name, u.email AS user_email,
                       s.store_name, s.store_code,
                       b.display_name AS assigned_by_name
                FROM store_assignments a
                JOIN users u ON u.id = a.user_id
                JOIN stores s ON s.id = a.store_id
                LEFT JOIN users b ON b.id = a.assigned_by
                WHERE a.is_active = true
                ORDER BY u.display_name, s.store_name
                "#,
            )
            .await?;
        let rows = client.query(&stmt, &[]).await?;
        rows.iter().map(row_to_assignment).collect()
    }
}
