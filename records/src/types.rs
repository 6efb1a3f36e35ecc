//! Record and draft shapes exchanged with the backend.
//!
//! None of the fields are optional: decoding fails on a missing field or a
//! value of the wrong primitive kind.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};

use crate::{FieldValue, RecordId, RecordKind, Resource, Validate, ValidationError, Writable, check_id};

// =============================================================================
// MESSAGE
// =============================================================================

/// A unit of text that annotations are attached to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: RecordId,
    pub content: String,
}

/// Create/update payload for [`Message`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
}

impl Message {
    /// Length of the content in characters, the unit annotation spans use.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

impl Validate for Message {
    fn validate(&self) -> Result<(), ValidationError> {
        check_id(RecordKind::Message, self.id)
    }
}

impl Validate for NewMessage {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Resource for Message {
    const KIND: RecordKind = RecordKind::Message;
    const FIELDS: &'static [&'static str] = &["id", "content"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        match key {
            "id" => Some(FieldValue::Int(self.id)),
            "content" => Some(FieldValue::Text(&self.content)),
            _ => None,
        }
    }
}

impl Writable for Message {
    type Draft = NewMessage;

    fn from_draft(id: RecordId, draft: NewMessage) -> Self {
        Self { id, content: draft.content }
    }

    fn to_draft(&self) -> NewMessage {
        NewMessage { content: self.content.clone() }
    }
}

// =============================================================================
// CODE
// =============================================================================

/// A taxonomy label applied to message spans through annotations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub id: RecordId,
    pub code: String,
}

/// Create/update payload for [`Code`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCode {
    pub code: String,
}

fn check_label(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::Empty { field: "code" });
    }
    Ok(())
}

impl Validate for Code {
    fn validate(&self) -> Result<(), ValidationError> {
        check_id(RecordKind::Code, self.id)?;
        check_label(&self.code)
    }
}

impl Validate for NewCode {
    fn validate(&self) -> Result<(), ValidationError> {
        check_label(&self.code)
    }
}

impl Resource for Code {
    const KIND: RecordKind = RecordKind::Code;
    const FIELDS: &'static [&'static str] = &["id", "code"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        match key {
            "id" => Some(FieldValue::Int(self.id)),
            "code" => Some(FieldValue::Text(&self.code)),
            _ => None,
        }
    }
}

impl Writable for Code {
    type Draft = NewCode;

    fn from_draft(id: RecordId, draft: NewCode) -> Self {
        Self { id, code: draft.code }
    }

    fn to_draft(&self) -> NewCode {
        NewCode { code: self.code.clone() }
    }
}

// =============================================================================
// ANNOTATION
// =============================================================================

/// A half-open character span `[start_idx, end_idx)` of a message tagged with one code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: RecordId,
    pub start_idx: i64,
    pub end_idx: i64,
    pub code_id: RecordId,
    pub message_id: RecordId,
}

/// Create/update payload for [`Annotation`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnnotation {
    pub start_idx: i64,
    pub end_idx: i64,
    pub code_id: RecordId,
    pub message_id: RecordId,
}

fn check_span_shape(start_idx: i64, end_idx: i64) -> Result<(), ValidationError> {
    if start_idx < 0 {
        return Err(ValidationError::NegativeStart { start_idx });
    }
    if start_idx > end_idx {
        return Err(ValidationError::InvertedSpan { start_idx, end_idx });
    }
    Ok(())
}

fn check_references(code_id: RecordId, message_id: RecordId) -> Result<(), ValidationError> {
    if code_id <= 0 {
        return Err(ValidationError::InvalidReference { field: "code_id", value: code_id });
    }
    if message_id <= 0 {
        return Err(ValidationError::InvalidReference { field: "message_id", value: message_id });
    }
    Ok(())
}

fn check_span_within(start_idx: i64, end_idx: i64, content: &str) -> Result<(), ValidationError> {
    check_span_shape(start_idx, end_idx)?;
    let len = content.chars().count();
    let fits = usize::try_from(end_idx).is_ok_and(|end| end <= len);
    if !fits {
        return Err(ValidationError::SpanOutOfRange { end_idx, len });
    }
    Ok(())
}

impl NewAnnotation {
    /// Check the span against the content of the message it targets.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MessageMismatch`] if `message` is not the
    /// referenced message, or a span error if the span does not fit.
    pub fn check_span(&self, message: &Message) -> Result<(), ValidationError> {
        if message.id != self.message_id {
            return Err(ValidationError::MessageMismatch { expected: self.message_id, got: message.id });
        }
        check_span_within(self.start_idx, self.end_idx, &message.content)
    }

    /// The characters of `content` this span covers.
    #[must_use]
    pub fn covered<'a>(&self, content: &'a str) -> Option<&'a str> {
        span_slice(self.start_idx, self.end_idx, content)
    }
}

impl Annotation {
    /// See [`NewAnnotation::check_span`].
    ///
    /// # Errors
    ///
    /// Same as [`NewAnnotation::check_span`].
    pub fn check_span(&self, message: &Message) -> Result<(), ValidationError> {
        self.to_draft().check_span(message)
    }
}

/// Slice `content` by character offsets, `None` when the span does not fit.
fn span_slice(start_idx: i64, end_idx: i64, content: &str) -> Option<&str> {
    check_span_within(start_idx, end_idx, content).ok()?;
    let start = usize::try_from(start_idx).ok()?;
    let end = usize::try_from(end_idx).ok()?;
    let mut offsets = content.char_indices().map(|(i, _)| i).chain(std::iter::once(content.len()));
    let from = offsets.nth(start)?;
    let to = if end == start { from } else { offsets.nth(end - start - 1)? };
    content.get(from..to)
}

impl Validate for Annotation {
    fn validate(&self) -> Result<(), ValidationError> {
        check_id(RecordKind::Annotation, self.id)?;
        check_span_shape(self.start_idx, self.end_idx)?;
        check_references(self.code_id, self.message_id)
    }
}

impl Validate for NewAnnotation {
    fn validate(&self) -> Result<(), ValidationError> {
        check_span_shape(self.start_idx, self.end_idx)?;
        check_references(self.code_id, self.message_id)
    }
}

impl Resource for Annotation {
    const KIND: RecordKind = RecordKind::Annotation;
    const FIELDS: &'static [&'static str] = &["id", "start_idx", "end_idx", "code_id", "message_id"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        match key {
            "id" => Some(FieldValue::Int(self.id)),
            "start_idx" => Some(FieldValue::Int(self.start_idx)),
            "end_idx" => Some(FieldValue::Int(self.end_idx)),
            "code_id" => Some(FieldValue::Int(self.code_id)),
            "message_id" => Some(FieldValue::Int(self.message_id)),
            _ => None,
        }
    }
}

impl Writable for Annotation {
    type Draft = NewAnnotation;

    fn from_draft(id: RecordId, draft: NewAnnotation) -> Self {
        Self {
            id,
            start_idx: draft.start_idx,
            end_idx: draft.end_idx,
            code_id: draft.code_id,
            message_id: draft.message_id,
        }
    }

    fn to_draft(&self) -> NewAnnotation {
        NewAnnotation {
            start_idx: self.start_idx,
            end_idx: self.end_idx,
            code_id: self.code_id,
            message_id: self.message_id,
        }
    }
}

// =============================================================================
// ANNOTATION WITH CODE
// =============================================================================

/// Read-side projection of an [`Annotation`] joined with its [`Code`] label.
///
/// `code` is denormalized: it is derived from the referenced code on every
/// read and never written on its own, so this kind is not [`Writable`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationWithCode {
    pub id: RecordId,
    pub start_idx: i64,
    pub end_idx: i64,
    pub code_id: RecordId,
    pub message_id: RecordId,
    pub code: String,
}

impl AnnotationWithCode {
    /// Join an annotation with the code it references.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CodeMismatch`] if `code` is not the one the
    /// annotation references.
    pub fn join(annotation: &Annotation, code: &Code) -> Result<Self, ValidationError> {
        if annotation.code_id != code.id {
            return Err(ValidationError::CodeMismatch { expected: annotation.code_id, got: code.id });
        }
        Ok(Self {
            id: annotation.id,
            start_idx: annotation.start_idx,
            end_idx: annotation.end_idx,
            code_id: annotation.code_id,
            message_id: annotation.message_id,
            code: code.code.clone(),
        })
    }

    /// Drop the denormalized label.
    #[must_use]
    pub fn annotation(&self) -> Annotation {
        Annotation {
            id: self.id,
            start_idx: self.start_idx,
            end_idx: self.end_idx,
            code_id: self.code_id,
            message_id: self.message_id,
        }
    }
}

impl Validate for AnnotationWithCode {
    fn validate(&self) -> Result<(), ValidationError> {
        self.annotation().validate()?;
        check_label(&self.code)
    }
}

impl Resource for AnnotationWithCode {
    const KIND: RecordKind = RecordKind::AnnotationWithCode;
    const FIELDS: &'static [&'static str] = &["id", "start_idx", "end_idx", "code_id", "message_id", "code"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        match key {
            "code" => Some(FieldValue::Text(&self.code)),
            "id" => Some(FieldValue::Int(self.id)),
            "start_idx" => Some(FieldValue::Int(self.start_idx)),
            "end_idx" => Some(FieldValue::Int(self.end_idx)),
            "code_id" => Some(FieldValue::Int(self.code_id)),
            "message_id" => Some(FieldValue::Int(self.message_id)),
            _ => None,
        }
    }
}
