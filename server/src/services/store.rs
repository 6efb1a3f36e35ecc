//! Storage seam for messages, codes and annotations.
//!
//! DESIGN
//! ======
//! Route handlers only see [`Store`]. Two implementations exist: `PgStore`
//! for Postgres and `MemoryStore` for local runs and tests. Both enforce the
//! same rules so the HTTP contract does not depend on the backend:
//!
//! - ids are assigned on insert and never change;
//! - an annotation must reference an existing message and code, and its span
//!   must fit inside the message content (character offsets);
//! - code labels are unique;
//! - a message or code that is still referenced by an annotation cannot be
//!   deleted (`StoreError::Conflict`), there is no cascade;
//! - `AnnotationWithCode::code` is joined from the code table on every read.

use records::{
    Annotation, AnnotationWithCode, Code, ListQuery, Message, NewAnnotation, NewCode, NewMessage, RecordId, RecordKind,
    ValidationError,
};

use crate::routes::error::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: RecordId },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid record: {0}")]
    Invalid(#[from] ValidationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Conflict(_) => "E_CONFLICT",
            Self::Invalid(_) => "E_VALIDATION",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

pub(crate) fn referenced_by(kind: RecordKind, id: RecordId, count: usize) -> StoreError {
    StoreError::Conflict(format!("{kind} {id} is referenced by {count} annotation(s)"))
}

pub(crate) fn duplicate_code(code: &str) -> StoreError {
    StoreError::Conflict(format!("code `{code}` already exists"))
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn list_messages(&self, query: &ListQuery) -> Result<Vec<Message>, StoreError>;
    async fn get_message(&self, id: RecordId) -> Result<Message, StoreError>;
    async fn create_message(&self, draft: &NewMessage) -> Result<Message, StoreError>;
    async fn update_message(&self, id: RecordId, draft: &NewMessage) -> Result<Message, StoreError>;
    async fn delete_message(&self, id: RecordId) -> Result<(), StoreError>;
    async fn count_messages(&self) -> Result<i64, StoreError>;

    async fn list_codes(&self, query: &ListQuery) -> Result<Vec<Code>, StoreError>;
    async fn get_code(&self, id: RecordId) -> Result<Code, StoreError>;
    async fn create_code(&self, draft: &NewCode) -> Result<Code, StoreError>;
    async fn update_code(&self, id: RecordId, draft: &NewCode) -> Result<Code, StoreError>;
    async fn delete_code(&self, id: RecordId) -> Result<(), StoreError>;

    async fn list_annotations(&self, query: &ListQuery) -> Result<Vec<Annotation>, StoreError>;
    async fn get_annotation(&self, id: RecordId) -> Result<Annotation, StoreError>;
    async fn create_annotation(&self, draft: &NewAnnotation) -> Result<Annotation, StoreError>;
    async fn update_annotation(&self, id: RecordId, draft: &NewAnnotation) -> Result<Annotation, StoreError>;
    async fn delete_annotation(&self, id: RecordId) -> Result<(), StoreError>;

    async fn list_annotations_with_code(&self, query: &ListQuery) -> Result<Vec<AnnotationWithCode>, StoreError>;
    async fn get_annotation_with_code(&self, id: RecordId) -> Result<AnnotationWithCode, StoreError>;
}
