//! In-memory [`Store`] used when no database is configured, and by tests.
//!
//! All tables sit behind one `RwLock`, so each operation observes and
//! mutates a consistent state, the way a single database transaction would.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::BTreeMap;

use records::{
    Annotation, AnnotationWithCode, Code, ListQuery, Message, NewAnnotation, NewCode, NewMessage, RecordId, RecordKind,
    Resource, Validate, Writable, paginate, sort_records,
};
use tokio::sync::RwLock;

use super::store::{Store, StoreError, duplicate_code, referenced_by};

struct Table<R> {
    rows: BTreeMap<RecordId, R>,
    last_id: RecordId,
}

impl<R: Writable> Table<R> {
    fn new() -> Self {
        Self { rows: BTreeMap::new(), last_id: 0 }
    }

    fn get(&self, id: RecordId) -> Result<&R, StoreError> {
        self.rows
            .get(&id)
            .ok_or(StoreError::NotFound { kind: R::KIND, id })
    }

    fn insert(&mut self, draft: R::Draft) -> Result<R, StoreError> {
        draft.validate()?;
        self.last_id += 1;
        let record = R::from_draft(self.last_id, draft);
        self.rows.insert(record.id(), record.clone());
        Ok(record)
    }

    fn replace(&mut self, id: RecordId, draft: R::Draft) -> Result<R, StoreError> {
        draft.validate()?;
        let slot = self
            .rows
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: R::KIND, id })?;
        *slot = R::from_draft(id, draft);
        Ok(slot.clone())
    }

    fn remove(&mut self, id: RecordId) -> Result<(), StoreError> {
        self.rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { kind: R::KIND, id })
    }
}

fn select<R: Resource>(rows: impl Iterator<Item = R>, query: &ListQuery) -> Vec<R> {
    let mut rows: Vec<R> = rows.collect();
    sort_records(&mut rows, query.sorting.as_ref());
    paginate(rows, query.page)
}

struct Tables {
    messages: Table<Message>,
    codes: Table<Code>,
    annotations: Table<Annotation>,
}

impl Tables {
    fn references_to(&self, kind: RecordKind, id: RecordId) -> usize {
        self.annotations
            .rows
            .values()
            .filter(|a| match kind {
                RecordKind::Message => a.message_id == id,
                RecordKind::Code => a.code_id == id,
                _ => false,
            })
            .count()
    }

    fn check_annotation(&self, draft: &NewAnnotation) -> Result<(), StoreError> {
        draft.validate()?;
        let message = self.messages.get(draft.message_id)?;
        self.codes.get(draft.code_id)?;
        draft.check_span(message)?;
        Ok(())
    }

    fn check_unique_code(&self, code: &str, except: Option<RecordId>) -> Result<(), StoreError> {
        let taken = self
            .codes
            .rows
            .values()
            .any(|c| c.code == code && Some(c.id) != except);
        if taken {
            return Err(duplicate_code(code));
        }
        Ok(())
    }

    fn with_code(&self, annotation: &Annotation) -> Result<AnnotationWithCode, StoreError> {
        let code = self.codes.get(annotation.code_id)?;
        Ok(AnnotationWithCode::join(annotation, code)?)
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables { messages: Table::new(), codes: Table::new(), annotations: Table::new() }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_message(message_id: RecordId, query: &ListQuery) -> bool {
    query.message_id.is_none_or(|wanted| wanted == message_id)
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list_messages(&self, query: &ListQuery) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.read().await;
        Ok(select(tables.messages.rows.values().cloned(), query))
    }

    async fn get_message(&self, id: RecordId) -> Result<Message, StoreError> {
        self.tables.read().await.messages.get(id).cloned()
    }

    async fn create_message(&self, draft: &NewMessage) -> Result<Message, StoreError> {
        self.tables.write().await.messages.insert(draft.clone())
    }

    async fn update_message(&self, id: RecordId, draft: &NewMessage) -> Result<Message, StoreError> {
        draft.validate()?;
        let mut tables = self.tables.write().await;
        tables.messages.get(id)?;
        // Shrinking a message must not strand existing spans past its end.
        let candidate = Message::from_draft(id, draft.clone());
        for annotation in tables.annotations.rows.values().filter(|a| a.message_id == id) {
            annotation.check_span(&candidate)?;
        }
        tables.messages.replace(id, draft.clone())
    }

    async fn delete_message(&self, id: RecordId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.messages.get(id)?;
        let refs = tables.references_to(RecordKind::Message, id);
        if refs > 0 {
            return Err(referenced_by(RecordKind::Message, id, refs));
        }
        tables.messages.remove(id)
    }

    async fn count_messages(&self) -> Result<i64, StoreError> {
        let count = self.tables.read().await.messages.rows.len();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn list_codes(&self, query: &ListQuery) -> Result<Vec<Code>, StoreError> {
        let tables = self.tables.read().await;
        Ok(select(tables.codes.rows.values().cloned(), query))
    }

    async fn get_code(&self, id: RecordId) -> Result<Code, StoreError> {
        self.tables.read().await.codes.get(id).cloned()
    }

    async fn create_code(&self, draft: &NewCode) -> Result<Code, StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_unique_code(&draft.code, None)?;
        tables.codes.insert(draft.clone())
    }

    async fn update_code(&self, id: RecordId, draft: &NewCode) -> Result<Code, StoreError> {
        let mut tables = self.tables.write().await;
        tables.codes.get(id)?;
        tables.check_unique_code(&draft.code, Some(id))?;
        tables.codes.replace(id, draft.clone())
    }

    async fn delete_code(&self, id: RecordId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.codes.get(id)?;
        let refs = tables.references_to(RecordKind::Code, id);
        if refs > 0 {
            return Err(referenced_by(RecordKind::Code, id, refs));
        }
        tables.codes.remove(id)
    }

    async fn list_annotations(&self, query: &ListQuery) -> Result<Vec<Annotation>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .annotations
            .rows
            .values()
            .filter(|a| matches_message(a.message_id, query))
            .cloned();
        Ok(select(rows, query))
    }

    async fn get_annotation(&self, id: RecordId) -> Result<Annotation, StoreError> {
        self.tables.read().await.annotations.get(id).cloned()
    }

    async fn create_annotation(&self, draft: &NewAnnotation) -> Result<Annotation, StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_annotation(draft)?;
        tables.annotations.insert(draft.clone())
    }

    async fn update_annotation(&self, id: RecordId, draft: &NewAnnotation) -> Result<Annotation, StoreError> {
        let mut tables = self.tables.write().await;
        tables.annotations.get(id)?;
        tables.check_annotation(draft)?;
        tables.annotations.replace(id, draft.clone())
    }

    async fn delete_annotation(&self, id: RecordId) -> Result<(), StoreError> {
        self.tables.write().await.annotations.remove(id)
    }

    async fn list_annotations_with_code(&self, query: &ListQuery) -> Result<Vec<AnnotationWithCode>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .annotations
            .rows
            .values()
            .filter(|a| matches_message(a.message_id, query))
            .map(|a| tables.with_code(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(select(rows.into_iter(), query))
    }

    async fn get_annotation_with_code(&self, id: RecordId) -> Result<AnnotationWithCode, StoreError> {
        let tables = self.tables.read().await;
        let annotation = tables.annotations.get(id)?;
        tables.with_code(annotation)
    }
}
