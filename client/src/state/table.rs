//! Cached table view for one record kind.
//!
//! DESIGN
//! ======
//! The view holds a snapshot of the last successful list request. Snapshots
//! are replaced wholesale, never patched, and every mutation is followed by a
//! re-fetch instead of editing rows locally.
//!
//! Requests are not serialized. Each fetch takes a ticket from a monotonically
//! increasing counter; when it completes it is applied only if no newer fetch
//! has been issued since. A superseded fetch changes nothing, whether it
//! succeeded or failed.
//!
//! Query changes build on `TableView::requested`, the query of the newest
//! issued fetch, not on the applied one. A page change issued while a sort
//! change is in flight therefore carries both, and so does the re-fetch after
//! a mutation.
//!
//! ERROR HANDLING
//! ==============
//! Local validation errors are returned straight away and leave the view
//! untouched. Backend and network errors are returned too, but also set
//! `TableView::error` and emit [`TableEvent::Failed`]; the snapshot stays as it
//! was.

#[cfg(test)]
#[path = "table_test.rs"]
mod table_test;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use records::{Annotation, ListQuery, Message, NewAnnotation, Page, RecordId, Resource, Sorting, Writable};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::CrudError;
use crate::net::ApiClient;

const EVENT_CAPACITY: usize = 64;

/// Snapshot of a table as the rendering layer sees it.
#[derive(Clone, Debug)]
pub struct TableView<R> {
    /// Rows of the last applied fetch, in backend order.
    pub rows: Arc<[R]>,
    /// Query that produced `rows`.
    pub query: ListQuery,
    /// Query of the newest issued fetch; equals `query` once it is applied.
    pub requested: ListQuery,
    /// Ticket of the fetch that produced `rows`; 0 before the first fetch.
    pub generation: u64,
    /// True while the newest issued fetch is outstanding.
    pub loading: bool,
    /// Inline error from the last failed call, cleared by the next applied fetch.
    pub error: Option<String>,
}

impl<R> Default for TableView<R> {
    fn default() -> Self {
        Self {
            rows: Arc::from(Vec::new()),
            query: ListQuery::default(),
            requested: ListQuery::default(),
            generation: 0,
            loading: false,
            error: None,
        }
    }
}

/// State-change notification for subscribers.
#[derive(Clone, Debug)]
pub enum TableEvent<R> {
    Updated { generation: u64, rows: Arc<[R]> },
    Failed { message: String },
}

/// Outcome of a fetch that did not fail.
#[derive(Clone, Debug)]
pub enum Refresh<R> {
    /// The fetch was the newest one and its rows are now the view.
    Applied(Arc<[R]>),
    /// A newer fetch was issued before this one completed; nothing changed.
    Superseded,
}

impl<R> Refresh<R> {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

pub struct CrudTable<R: Resource> {
    api: ApiClient,
    issued: AtomicU64,
    view: Mutex<TableView<R>>,
    events: broadcast::Sender<TableEvent<R>>,
}

impl<R: Resource> CrudTable<R> {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self::with_query(api, ListQuery::default())
    }

    /// A table whose first fetch uses `query`. The query is not validated
    /// until that fetch.
    #[must_use]
    pub fn with_query(api: ApiClient, query: ListQuery) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let view = TableView { requested: query.clone(), query, ..TableView::default() };
        Self { api, issued: AtomicU64::new(0), view: Mutex::new(view), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TableEvent<R>> {
        self.events.subscribe()
    }

    /// Clone of the current view.
    #[must_use]
    pub fn view(&self) -> TableView<R> {
        self.lock().clone()
    }

    #[must_use]
    pub fn rows(&self) -> Arc<[R]> {
        self.lock().rows.clone()
    }

    /// Re-fetch with the most recently requested query.
    ///
    /// # Errors
    ///
    /// Returns the fetch error if this fetch was not superseded.
    pub async fn refresh(&self) -> Result<Refresh<R>, CrudError> {
        self.fetch_with(|_| {}).await
    }

    /// Change the sort criterion and fetch. `None` restores backend order.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::Validation`] for a key `R` does not have, before
    /// any request is made.
    pub async fn set_sorting(&self, sorting: Option<Sorting>) -> Result<Refresh<R>, CrudError> {
        self.fetch_with(|query| query.sorting = sorting).await
    }

    /// Change the page window and fetch. `None` lists everything.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::Validation`] for an invalid page size.
    pub async fn set_page(&self, page: Option<Page>) -> Result<Refresh<R>, CrudError> {
        self.fetch_with(|query| query.page = page).await
    }

    /// Restrict rows to one message and fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::Validation`] if `R` has no `message_id`.
    pub async fn set_message_filter(&self, message_id: Option<RecordId>) -> Result<Refresh<R>, CrudError> {
        self.fetch_with(|query| query.message_id = message_id).await
    }

    /// Apply `change` to the requested query and issue a fetch for it. The
    /// read, the change and the ticket are taken under one lock so concurrent
    /// changes compose instead of overwriting each other.
    async fn fetch_with(&self, change: impl FnOnce(&mut ListQuery)) -> Result<Refresh<R>, CrudError> {
        let (ticket, query) = {
            let mut view = self.lock();
            let mut query = view.requested.clone();
            change(&mut query);
            query.validate_for::<R>()?;
            let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            view.requested = query.clone();
            view.loading = true;
            (ticket, query)
        };
        debug!(kind = %R::KIND, ticket, "table fetch issued");

        let result = self.api.list::<R>(&query).await;

        let mut view = self.lock();
        if ticket != self.issued.load(Ordering::SeqCst) {
            debug!(kind = %R::KIND, ticket, "discarding superseded fetch");
            return Ok(Refresh::Superseded);
        }
        view.loading = false;
        match result {
            Ok(rows) => {
                let rows: Arc<[R]> = rows.into();
                view.rows = rows.clone();
                view.query = query;
                view.generation = ticket;
                view.error = None;
                drop(view);
                info!(kind = %R::KIND, generation = ticket, rows = rows.len(), "table updated");
                self.emit(TableEvent::Updated { generation: ticket, rows: rows.clone() });
                Ok(Refresh::Applied(rows))
            }
            Err(err) => {
                drop(view);
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn fail(&self, err: &CrudError) {
        if err.is_local() {
            return;
        }
        let message = err.to_string();
        warn!(kind = %R::KIND, code = err.error_code(), error = %message, "table operation failed");
        self.lock().error = Some(message.clone());
        self.emit(TableEvent::Failed { message });
    }

    fn emit(&self, event: TableEvent<R>) {
        if self.events.send(event).is_err() {
            debug!(kind = %R::KIND, "no table subscribers");
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableView<R>> {
        self.view
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Re-fetch after a mutation. The mutation already succeeded, so a failed
    /// re-fetch only shows up in the view.
    async fn invalidate(&self) {
        if let Err(err) = self.refresh().await {
            debug!(kind = %R::KIND, error = %err, "re-fetch after mutation failed");
        }
    }
}

impl<R: Writable> CrudTable<R> {
    /// Create a record, then re-fetch.
    ///
    /// # Errors
    ///
    /// Returns the create error; the view is left unchanged.
    pub async fn create(&self, draft: &R::Draft) -> Result<R, CrudError> {
        let created = self.api.create::<R>(draft).await.inspect_err(|e| self.fail(e))?;
        self.invalidate().await;
        Ok(created)
    }

    /// Update a record, then re-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::NotFound`] if the record is gone; the view is left unchanged.
    pub async fn update(&self, record: &R) -> Result<R, CrudError> {
        let updated = self.api.update(record).await.inspect_err(|e| self.fail(e))?;
        self.invalidate().await;
        Ok(updated)
    }

    /// Delete a record, then re-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::NotFound`] or [`CrudError::Conflict`]; the view is left unchanged.
    pub async fn delete(&self, id: RecordId) -> Result<(), CrudError> {
        self.api.delete::<R>(id).await.inspect_err(|e| self.fail(e))?;
        self.invalidate().await;
        Ok(())
    }
}

impl CrudTable<Annotation> {
    /// Create an annotation after checking its span against `message`, then
    /// re-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::Validation`] for a span outside `message` before
    /// any request is made; otherwise as [`CrudTable::create`].
    pub async fn create_annotation(&self, message: &Message, draft: &NewAnnotation) -> Result<Annotation, CrudError> {
        let created = self
            .api
            .create_annotation(message, draft)
            .await
            .inspect_err(|e| self.fail(e))?;
        self.invalidate().await;
        Ok(created)
    }

    /// Update an annotation after checking its span against `message`, then
    /// re-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::Validation`] for a span outside `message` before
    /// any request is made; otherwise as [`CrudTable::update`].
    pub async fn update_annotation(&self, message: &Message, record: &Annotation) -> Result<Annotation, CrudError> {
        record.check_span(message)?;
        self.update(record).await
    }
}
