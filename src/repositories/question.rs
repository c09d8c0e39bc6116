use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    db::column,
    error::{AppError, Result},
    models::question::Question,
};

/// Fields an administrator edits on a question.
#[derive(Debug, Clone)]
pub struct QuestionFields {
    pub question_text: String,
    pub coefficient: f64,
    pub sort_order: i32,
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Active questions in display order.
    async fn list_active(&self) -> Result<Vec<Question>>;
    async fn list_all(&self) -> Result<Vec<Question>>;
    async fn create(&self, fields: &QuestionFields) -> Result<Question>;
    async fn update(&self, id: i32, fields: &QuestionFields) -> Result<Question>;
    async fn toggle_active(&self, id: i32) -> Result<Question>;
}

fn row_to_question(row: &Row) -> Result<Question> {
    Ok(Question {
        id: column(row, "id")?,
        question_text: column(row, "question_text")?,
        coefficient: column(row, "coefficient")?,
        sort_order: column(row, "sort_order")?,
        is_active: column(row, "is_active")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

const QUESTION_COLUMNS: &str =
    "id, question_text, coefficient, sort_order, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct PgQuestionRepository {
    pool: Pool,
}

impl PgQuestionRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn list_where(&self, filter: &str) -> Result<Vec<Question>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {QUESTION_COLUMNS} FROM questions {filter} ORDER BY sort_order, id"
            ))
            .await?;
        let rows = client.query(&stmt, &[]).await?;
        rows.iter().map(row_to_question).collect()
    }
}

#[async_trait]
impl QuestionRepository for PgQuestionRepository {
    async fn list_active(&self) -> Result<Vec<Question>> {
        self.list_where("WHERE is_active = true").await
    }

    async fn list_all(&self) -> Result<Vec<Question>> {
        self.list_where("").await
    }

    async fn create(&self, fields: &QuestionFields) -> Result<Question> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                INSERT INTO questions (question_text, coefficient, sort_order)
                VALUES ($1, $2, $3)
                RETURNING {QUESTION_COLUMNS}
                "#
            ))
            .await?;
        let row = client
            .query_one(
                &stmt,
                &[&fields.question_text, &fields.coefficient, &fields.sort_order],
            )
            .await?;
        row_to_question(&row)
    }

    async fn update(&self, id: i32, fields: &QuestionFields) -> Result<Question> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                UPDATE questions
                SET question_text = $2, coefficient = $3, sort_order = $4, updated_at = NOW()
                WHERE id = $1
                RETURNING {QUESTION_COLUMNS}
                "#
            ))
            .await?;
        let row = client
            .query_opt(
                &stmt,
                &[
                    &id,
                    &fields.question_text,
                    &fields.coefficient,
                    &fields.sort_order,
                ],
            )
            .await?;
        row.map(|r| row_to_question(&r))
            .transpose()?
            .ok_or(AppError::NotFound)
    }

    async fn toggle_active(&self, id: i32) -> Result<Question> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                UPDATE questions SET is_active = NOT is_active, updated_at = NOW()
                WHERE id = $1
                RETURNING {QUESTION_COLUMNS}
                "#
            ))
            .await?;
        let row = client.query_opt(&stmt, &[&id]).await?;
        row.map(|r| row_to_question(&r))
            .transpose()?
            .ok_or(AppError::NotFound)
    }
}
