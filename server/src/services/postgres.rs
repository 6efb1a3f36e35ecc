//! Postgres-backed [`Store`].
//!
//! DESIGN
//! ======
//! Writes that need cross-table checks run in one transaction: the referenced
//! message row is read `FOR SHARE` (or `FOR UPDATE` when it is the row being
//! changed), the span is checked in Rust with the same code the memory store
//! uses, then the row is written. Unique and foreign-key violations that slip
//! past those checks under concurrency still surface as conflicts.
//!
//! Sort keys are spliced into SQL only through `Sorting::column`, which
//! returns a static field name of the record type. Text columns sort with
//! `COLLATE "C"` so the order matches byte order on the client.

#[cfg(test)]
#[path = "postgres_test.rs"]
mod postgres_test;

use records::{
    Annotation, AnnotationWithCode, Code, ListQuery, Message, NewAnnotation, NewCode, NewMessage, RecordId, RecordKind,
    Resource, Validate, Writable,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::store::{Store, StoreError, duplicate_code, referenced_by};

type AnnotationRow = (i64, i64, i64, i64, i64);
type AnnotationWithCodeRow = (i64, i64, i64, i64, i64, String);

const TEXT_COLUMNS: &[&str] = &["content", "code"];

const ANNOTATION_COLUMNS: &str = "a.id, a.start_idx, a.end_idx, a.code_id, a.message_id";

fn annotation_from_row((id, start_idx, end_idx, code_id, message_id): AnnotationRow) -> Annotation {
    Annotation { id, start_idx, end_idx, code_id, message_id }
}

fn with_code_from_row((id, start_idx, end_idx, code_id, message_id, code): AnnotationWithCodeRow) -> AnnotationWithCode {
    AnnotationWithCode { id, start_idx, end_idx, code_id, message_id, code }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            return StoreError::Conflict(db.message().to_owned());
        }
    }
    StoreError::Database(err)
}

fn count_to_usize(count: i64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}

/// Append the message filter, ordering and page window of `query`.
///
/// `qualify` maps a record field name to its SQL column expression.
fn push_window<R: Resource>(
    builder: &mut QueryBuilder<'_, Postgres>,
    query: &ListQuery,
    qualify: impl Fn(&'static str) -> String,
) -> Result<(), StoreError> {
    if let Some(message_id) = query.message_id {
        builder.push(" WHERE ");
        builder.push(qualify("message_id"));
        builder.push(" = ");
        builder.push_bind(message_id);
    }

    builder.push(" ORDER BY ");
    if let Some(sorting) = &query.sorting {
        let column = sorting.column::<R>()?;
        builder.push(qualify(column));
        if TEXT_COLUMNS.contains(&column) {
            builder.push(" COLLATE \"C\"");
        }
        builder.push(" ");
        builder.push(sorting.order.as_str());
        builder.push(", ");
    }
    builder.push(qualify("id"));
    builder.push(" ASC");

    if let Some(page) = query.page {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(page.size));
        builder.push(" OFFSET ");
        builder.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
    }
    Ok(())
}

fn plain(column: &'static str) -> String {
    column.to_owned()
}

fn annotation_column(column: &'static str) -> String {
    format!("a.{column}")
}

fn with_code_column(column: &'static str) -> String {
    if column == "code" { "c.code".to_owned() } else { annotation_column(column) }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn locked_message(
        tx: &mut Transaction<'_, Postgres>,
        id: RecordId,
        lock: &str,
    ) -> Result<Message, StoreError> {
        let sql = format!("SELECT content FROM messages WHERE id = $1 {lock}");
        let content: Option<String> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        let content = content.ok_or(StoreError::NotFound { kind: RecordKind::Message, id })?;
        Ok(Message { id, content })
    }

    async fn code_exists(tx: &mut Transaction<'_, Postgres>, id: RecordId) -> Result<(), StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM codes WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;
        if !exists {
            return Err(StoreError::NotFound { kind: RecordKind::Code, id });
        }
        Ok(())
    }

    /// Check that both references exist and the span fits the message.
    async fn check_annotation(tx: &mut Transaction<'_, Postgres>, draft: &NewAnnotation) -> Result<(), StoreError> {
        draft.validate()?;
        let message = Self::locked_message(tx, draft.message_id, "FOR SHARE").await?;
        Self::code_exists(tx, draft.code_id).await?;
        draft.check_span(&message)?;
        Ok(())
    }

    async fn references(&self, column: &str, id: RecordId) -> Result<usize, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM annotations WHERE {column} = $1");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count_to_usize(count))
    }

    async fn delete_row(&self, kind: RecordKind, table: &str, id: RecordId) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind, id });
        }
        Ok(())
    }

    /// Delete a message or code after checking no annotation refers to it.
    async fn delete_referenced(&self, kind: RecordKind, table: &str, column: &str, id: RecordId) -> Result<(), StoreError> {
        let refs = self.references(column, id).await?;
        if refs > 0 {
            return Err(referenced_by(kind, id, refs));
        }
        self.delete_row(kind, table, id).await
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    async fn list_messages(&self, query: &ListQuery) -> Result<Vec<Message>, StoreError> {
        let mut builder = QueryBuilder::new("SELECT id, content FROM messages");
        push_window::<Message>(&mut builder, query, plain)?;
        let rows = builder
            .build_query_as::<(i64, String)>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, content)| Message { id, content })
            .collect())
    }

    async fn get_message(&self, id: RecordId) -> Result<Message, StoreError> {
        let content: Option<String> = sqlx::query_scalar("SELECT content FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        content
            .map(|content| Message { id, content })
            .ok_or(StoreError::NotFound { kind: RecordKind::Message, id })
    }

    async fn create_message(&self, draft: &NewMessage) -> Result<Message, StoreError> {
        draft.validate()?;
        let id: i64 = sqlx::query_scalar("INSERT INTO messages (content) VALUES ($1) RETURNING id")
            .bind(&draft.content)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(Message::from_draft(id, draft.clone()))
    }

    async fn update_message(&self, id: RecordId, draft: &NewMessage) -> Result<Message, StoreError> {
        draft.validate()?;
        let mut tx = self.pool.begin().await?;
        Self::locked_message(&mut tx, id, "FOR UPDATE").await?;

        let candidate = Message::from_draft(id, draft.clone());
        let spans = sqlx::query_as::<_, AnnotationRow>(
            "SELECT id, start_idx, end_idx, code_id, message_id FROM annotations WHERE message_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        for row in spans {
            annotation_from_row(row).check_span(&candidate)?;
        }

        sqlx::query("UPDATE messages SET content = $1 WHERE id = $2")
            .bind(&draft.content)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        tx.commit().await?;
        Ok(candidate)
    }

    async fn delete_message(&self, id: RecordId) -> Result<(), StoreError> {
        self.delete_referenced(RecordKind::Message, "messages", "message_id", id)
            .await
    }

    async fn count_messages(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // CODES
    // =========================================================================

    async fn list_codes(&self, query: &ListQuery) -> Result<Vec<Code>, StoreError> {
        let mut builder = QueryBuilder::new("SELECT id, code FROM codes");
        push_window::<Code>(&mut builder, query, plain)?;
        let rows = builder
            .build_query_as::<(i64, String)>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, code)| Code { id, code }).collect())
    }

    async fn get_code(&self, id: RecordId) -> Result<Code, StoreError> {
        let code: Option<String> = sqlx::query_scalar("SELECT code FROM codes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        code.map(|code| Code { id, code })
            .ok_or(StoreError::NotFound { kind: RecordKind::Code, id })
    }

    async fn create_code(&self, draft: &NewCode) -> Result<Code, StoreError> {
        draft.validate()?;
        let id: i64 = sqlx::query_scalar("INSERT INTO codes (code) VALUES ($1) RETURNING id")
            .bind(&draft.code)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match map_write_error(err) {
                StoreError::Conflict(_) => duplicate_code(&draft.code),
                other => other,
            })?;
        Ok(Code::from_draft(id, draft.clone()))
    }

    async fn update_code(&self, id: RecordId, draft: &NewCode) -> Result<Code, StoreError> {
        draft.validate()?;
        let result = sqlx::query("UPDATE codes SET code = $1 WHERE id = $2")
            .bind(&draft.code)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| match map_write_error(err) {
                StoreError::Conflict(_) => duplicate_code(&draft.code),
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: RecordKind::Code, id });
        }
        Ok(Code::from_draft(id, draft.clone()))
    }

    async fn delete_code(&self, id: RecordId) -> Result<(), StoreError> {
        self.delete_referenced(RecordKind::Code, "codes", "code_id", id)
            .await
    }

    // =========================================================================
    // ANNOTATIONS
    // =========================================================================

    async fn list_annotations(&self, query: &ListQuery) -> Result<Vec<Annotation>, StoreError> {
        let mut builder = QueryBuilder::new(format!("SELECT {ANNOTATION_COLUMNS} FROM annotations a"));
        push_window::<Annotation>(&mut builder, query, annotation_column)?;
        let rows = builder
            .build_query_as::<AnnotationRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(annotation_from_row).collect())
    }

    async fn get_annotation(&self, id: RecordId) -> Result<Annotation, StoreError> {
        let row = sqlx::query_as::<_, AnnotationRow>(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations a WHERE a.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(annotation_from_row)
            .ok_or(StoreError::NotFound { kind: RecordKind::Annotation, id })
    }

    async fn create_annotation(&self, draft: &NewAnnotation) -> Result<Annotation, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::check_annotation(&mut tx, draft).await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO annotations (start_idx, end_idx, code_id, message_id)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(draft.start_idx)
        .bind(draft.end_idx)
        .bind(draft.code_id)
        .bind(draft.message_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;
        tx.commit().await?;
        Ok(Annotation::from_draft(id, draft.clone()))
    }

    async fn update_annotation(&self, id: RecordId, draft: &NewAnnotation) -> Result<Annotation, StoreError> {
        let mut tx = self.pool.begin().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM annotations WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(StoreError::NotFound { kind: RecordKind::Annotation, id });
        }
        Self::check_annotation(&mut tx, draft).await?;
        sqlx::query(
            "UPDATE annotations
             SET start_idx = $1, end_idx = $2, code_id = $3, message_id = $4
             WHERE id = $5",
        )
        .bind(draft.start_idx)
        .bind(draft.end_idx)
        .bind(draft.code_id)
        .bind(draft.message_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;
        tx.commit().await?;
        Ok(Annotation::from_draft(id, draft.clone()))
    }

    async fn delete_annotation(&self, id: RecordId) -> Result<(), StoreError> {
        self.delete_row(RecordKind::Annotation, "annotations", id)
            .await
    }

    // =========================================================================
    // ANNOTATIONS WITH CODE
    // =========================================================================

    async fn list_annotations_with_code(&self, query: &ListQuery) -> Result<Vec<AnnotationWithCode>, StoreError> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {ANNOTATION_COLUMNS}, c.code FROM annotations a JOIN codes c ON c.id = a.code_id"
        ));
        push_window::<AnnotationWithCode>(&mut builder, query, with_code_column)?;
        let rows = builder
            .build_query_as::<AnnotationWithCodeRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(with_code_from_row).collect())
    }

    async fn get_annotation_with_code(&self, id: RecordId) -> Result<AnnotationWithCode, StoreError> {
        let row = sqlx::query_as::<_, AnnotationWithCodeRow>(&format!(
            "SELECT {ANNOTATION_COLUMNS}, c.code FROM annotations a JOIN codes c ON c.id = a.code_id WHERE a.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(with_code_from_row)
            .ok_or(StoreError::NotFound { kind: RecordKind::AnnotationWithCode, id })
    }
}
