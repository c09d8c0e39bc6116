use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    db::column,
    error::Result,
    models::checklist::{
        AnswerDetail, Checklist, ChecklistAnswer, ChecklistDetail, ChecklistFilter,
        ChecklistStats, ChecklistSummary, NewChecklist,
    },
};

/// Storage for submitted checklists.
#[async_trait]
pub trait ChecklistRepository: Send + Sync {
    /// Draws the next value of the shared document counter.
    ///
    /// Must be atomic across concurrent callers.
    async fn next_document_sequence(&self) -> Result<i64>;

    /// Writes a header and all its answers as one unit.
    async fn insert(&self, checklist: &NewChecklist) -> Result<Checklist>;

    async fn find_by_id(&self, id: i32) -> Result<Option<ChecklistDetail>>;

    async fn find_by_document_number(&self, document_number: &str)
    -> Result<Option<ChecklistDetail>>;

    /// Headers matching `filter`, newest audit first.
    async fn list(&self, filter: &ChecklistFilter) -> Result<Vec<ChecklistSummary>>;

    async fn stats(&self, filter: &ChecklistFilter) -> Result<ChecklistStats>;

    /// Removes a checklist and its answers. Returns whether it existed.
    async fn delete(&self, id: i32) -> Result<bool>;
}

const SUMMARY_SELECT: &str = r#"
    SELECT c.id, c.document_number, c.store_id, s.store_name, s.store_code,
           c.audit_date, c.submitted_by, u.display_name AS submitted_by_name,
           c.total_coefficient, c.total_earned, c.score_percentage, c.notes, c.created_at
    FROM checklists c
    JOIN stores s ON s.id = c.store_id
    JOIN users u ON u.id = c.submitted_by
"#;

const FILTER_CLAUSE: &str = r#"
    WHERE ($1::int IS NULL OR c.store_id = $1)
      AND ($2::int IS NULL OR c.submitted_by = $2)
      AND ($3::date IS NULL OR c.audit_date >= $3)
      AND ($4::date IS NULL OR c.audit_date <= $4)
"#;

fn row_to_summary(row: &Row) -> Result<ChecklistSummary> {
    Ok(ChecklistSummary {
        id: column(row, "id")?,
        document_number: column(row, "document_number")?,
        store_id: column(row, "store_id")?,
        store_name: column(row, "store_name")?,
        store_code: column(row, "store_code")?,
        audit_date: column(row, "audit_date")?,
        submitted_by: column(row, "submitted_by")?,
        submitted_by_name: column(row, "submitted_by_name")?,
        total_coefficient: column(row, "total_coefficient")?,
        total_earned: column(row, "total_earned")?,
        score_percentage: column(row, "score_percentage")?,
        notes: column(row, "notes")?,
        created_at: column(row, "created_at")?,
    })
}

fn row_to_answer_detail(row: &Row) -> Result<AnswerDetail> {
    Ok(AnswerDetail {
        answer: ChecklistAnswer {
            question_id: column(row, "question_id")?,
            answer: column(row, "answer")?,
            coefficient: column(row, "coefficient")?,
            earned_value: column(row, "earned_value")?,
            comment: column(row, "comment")?,
            image_path: column(row, "image_path")?,
        },
        question_text: column(row, "question_text")?,
    })
}

#[derive(Clone)]
pub struct PgChecklistRepository {
    pool: Pool,
}

impl PgChecklistRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn detail(&self, summary: Option<ChecklistSummary>) -> Result<Option<ChecklistDetail>> {
        let Some(summary) = summary else {
            return Ok(None);
        };

        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                SELECT a.question_id, a.answer, a.coefficient, a.earned_value,
                       a.comment, a.image_path, q.question_text
                FROM checklist_answers a
                JOIN questions q ON q.id = a.question_id
                WHERE a.checklist_id = $1
                ORDER BY a.position
                "#,
            )
            .await?;
        let rows = client.query(&stmt, &[&summary.id]).await?;
        let answers = rows
            .iter()
            .map(row_to_answer_detail)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ChecklistDetail { summary, answers }))
    }

    async fn summary_where(
        &self,
        clause: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Option<ChecklistSummary>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!("{SUMMARY_SELECT} {clause}"))
            .await?;
        let row = client.query_opt(&stmt, params).await?;
        row.map(|r| row_to_summary(&r)).transpose()
    }
}

#[async_trait]
impl ChecklistRepository for PgChecklistRepository {
    async fn next_document_sequence(&self) -> Result<i64> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("SELECT nextval('checklist_document_seq') AS seq")
            .await?;
        let row = client.query_one(&stmt, &[]).await?;
        column(&row, "seq")
    }

    async fn insert(&self, checklist: &NewChecklist) -> Result<Checklist> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let header = tx
            .prepare_cached(
                r#"
                INSERT INTO checklists
                    (document_number, store_id, audit_date, submitted_by,
                     total_coefficient, total_earned, score_percentage, notes)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, created_at
                "#,
            )
            .await?;
        let row = tx
            .query_one(
                &header,
                &[
                    &checklist.document_number,
                    &checklist.store_id,
                    &checklist.audit_date,
                    &checklist.submitted_by,
                    &checklist.total_coefficient,
                    &checklist.total_earned,
                    &checklist.score_percentage,
                    &checklist.notes,
                ],
            )
            .await?;
        let id: i32 = column(&row, "id")?;
        let created_at = column(&row, "created_at")?;

        let answer = tx
            .prepare_cached(
                r#"
                INSERT INTO checklist_answers
                    (checklist_id, position, question_id, answer, coefficient,
                     earned_value, comment, image_path)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .await?;
        for (position, a) in checklist.answers.iter().enumerate() {
            let position = position as i32;
            tx.execute(
                &answer,
                &[
                    &id,
                    &position,
                    &a.question_id,
                    &a.answer,
                    &a.coefficient,
                    &a.earned_value,
                    &a.comment,
                    &a.image_path,
                ],
            )
            .await?;
        }

        tx.commit().await?;

        Ok(Checklist {
            id,
            document_number: checklist.document_number.clone(),
            store_id: checklist.store_id,
            audit_date: checklist.audit_date,
            submitted_by: checklist.submitted_by,
            total_coefficient: checklist.total_coefficient,
            total_earned: checklist.total_earned,
            score_percentage: checklist.score_percentage,
            notes: checklist.notes.clone(),
            created_at,
            answers: checklist.answers.clone(),
        })
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<ChecklistDetail>> {
        let summary = self.summary_where("WHERE c.id = $1", &[&id]).await?;
        self.detail(summary).await
    }

    async fn find_by_document_number(
        &self,
        document_number: &str,
    ) -> Result<Option<ChecklistDetail>> {
        let summary = self
            .summary_where("WHERE c.document_number = $1", &[&document_number])
            .await?;
        self.detail(summary).await
    }

    async fn list(&self, filter: &ChecklistFilter) -> Result<Vec<ChecklistSummary>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "{SUMMARY_SELECT} {FILTER_CLAUSE} ORDER BY c.audit_date DESC, c.id DESC LIMIT $5"
            ))
            .await?;
        let rows = client
            .query(
                &stmt,
                &[
                    &filter.store_id,
                    &filter.submitted_by,
                    &filter.from_date,
                    &filter.to_date,
                    &filter.limit,
                ],
            )
            .await?;
        rows.iter().map(row_to_summary).collect()
    }

    async fn stats(&self, filter: &ChecklistFilter) -> Result<ChecklistStats> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                SELECT COUNT(*) AS total_checklists,
                       AVG(c.score_percentage) AS average_score,
                       MIN(c.score_percentage) AS min_score,
                       MAX(c.score_percentage) AS max_score
                FROM checklists c
                {FILTER_CLAUSE}
                "#
            ))
            .await?;
        let row = client
            .query_one(
                &stmt,
                &[
                    &filter.store_id,
                    &filter.submitted_by,
                    &filter.from_date,
                    &filter.to_date,
                ],
            )
            .await?;
        Ok(ChecklistStats {
            total_checklists: column(&row, "total_checklists")?,
            average_score: column(&row, "average_score")?,
            min_score: column(&row, "min_score")?,
            max_score: column(&row, "max_score")?,
        })
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("DELETE FROM checklists WHERE id = $1")
            .await?;
        Ok(client.execute(&stmt, &[&id]).await? > 0)
    }
}
