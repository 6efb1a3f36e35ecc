//! Shared record model for the annotation CRUD API.
//!
//! This crate owns the JSON representation used by both `server` and
//! `client`: messages, codes, annotations and the read-side
//! annotation-with-code projection, plus the list query (sorting, paging,
//! filtering) that travels as URL parameters.
//!
//! VALIDATION
//! ==========
//! Every record and draft implements [`Validate`]. Callers run it before a
//! create/update is submitted and before a fetched row is handed to the view,
//! so malformed shapes never cross the wire in either direction.

pub mod query;
pub mod types;

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use query::{DEFAULT_PAGE_SIZE, ListParams, ListQuery, MAX_PAGE_SIZE, Page, SortOrder, Sorting, is_ordered, paginate, sort_records};
pub use types::{Annotation, AnnotationWithCode, Code, Message, NewAnnotation, NewCode, NewMessage};

/// Backend-assigned record identity.
pub type RecordId = i64;

/// Reason a record, draft, or list query was rejected before submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{kind} id must be positive, got {id}")]
    InvalidId { kind: RecordKind, id: RecordId },
    #[error("{field} must reference a positive id, got {value}")]
    InvalidReference { field: &'static str, value: RecordId },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("span start {start_idx} must not be negative")]
    NegativeStart { start_idx: i64 },
    #[error("span start {start_idx} is after span end {end_idx}")]
    InvertedSpan { start_idx: i64, end_idx: i64 },
    #[error("span end {end_idx} exceeds message length {len}")]
    SpanOutOfRange { end_idx: i64, len: usize },
    #[error("annotation targets message {expected}, got message {got}")]
    MessageMismatch { expected: RecordId, got: RecordId },
    #[error("annotation references code {expected}, got code {got}")]
    CodeMismatch { expected: RecordId, got: RecordId },
    #[error("unknown sort key `{key}` for {kind}")]
    UnknownSortKey { kind: RecordKind, key: String },
    #[error("sort order given without a sort key")]
    MissingSortKey,
    #[error("unknown sort order `{0}` (expected `asc` or `desc`)")]
    UnknownOrder(String),
    #[error("page size must be between 1 and {max}, got {size}")]
    InvalidPageSize { size: u32, max: u32 },
    #[error("{kind} cannot be filtered by message")]
    UnsupportedFilter { kind: RecordKind },
}

/// The record kinds exposed by the API, one resource path each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Message,
    Code,
    Annotation,
    AnnotationWithCode,
}

impl RecordKind {
    /// Resource path segment under the API base address.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Message => "messages",
            Self::Code => "codes",
            Self::Annotation => "annotations",
            Self::AnnotationWithCode => "annotations-with-code",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Code => "code",
            Self::Annotation => "annotation",
            Self::AnnotationWithCode => "annotation_with_code",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sortable field value. Fields of the same key always share a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue<'a> {
    Int(i64),
    Text(&'a str),
}

/// Structural checks run before a value is submitted or rendered.
pub trait Validate {
    /// # Errors
    ///
    /// Returns the first rule the value breaks.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// A record kind that can be listed and fetched by id.
pub trait Resource: Validate + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: RecordKind;
    /// Field names in declaration order; the only valid sort keys.
    const FIELDS: &'static [&'static str];

    fn id(&self) -> RecordId;

    /// Value of `key` for sorting, `None` if the record has no such field.
    fn field(&self, key: &str) -> Option<FieldValue<'_>>;

    /// Whether list queries for this kind accept a `message_id` filter.
    #[must_use]
    fn filterable_by_message() -> bool {
        Self::FIELDS.contains(&"message_id")
    }
}

/// A record kind that accepts create, update and delete.
pub trait Writable: Resource {
    /// Create/update payload: every field except the backend-assigned id.
    type Draft: Validate + Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn from_draft(id: RecordId, draft: Self::Draft) -> Self;

    fn to_draft(&self) -> Self::Draft;
}

/// Reject non-positive ids before they are used in a request path.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidId`] when `id <= 0`.
pub fn check_id(kind: RecordKind, id: RecordId) -> Result<(), ValidationError> {
    if id <= 0 {
        return Err(ValidationError::InvalidId { kind, id });
    }
    Ok(())
}
