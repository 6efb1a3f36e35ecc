//! Typed CRUD calls against the annotation API.
//!
//! Every operation targets one record kind's resource path under the base
//! address: `GET {kind}/` to list, `GET {kind}/{id}` to fetch, `POST {kind}/`
//! to create, `PUT {kind}/{id}` to update and `DELETE {kind}/{id}` to delete.
//!
//! ERROR HANDLING
//! ==============
//! Drafts, records, ids and list queries are validated before a request is
//! built, so a [`CrudError::Validation`] always means nothing was sent. Rows
//! coming back are validated too; a backend that returns malformed rows
//! produces a [`NetworkError::Decode`] rather than a half-valid view.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::sync::Arc;

use records::{
    Annotation, ListQuery, Message, NewAnnotation, RecordId, RecordKind, Resource, Validate, Writable, check_id,
    is_ordered,
};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::config::ClientConfig;
use crate::error::{CrudError, NetworkError};

/// Cheap to clone; clones share one transport.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Build a client that talks HTTP to `config.api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, CrudError> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// List records of kind `R`, sorted and paged per `query`.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::Validation`] for an invalid query before any
    /// request is made, or a backend/network error.
    pub async fn list<R: Resource>(&self, query: &ListQuery) -> Result<Vec<R>, CrudError> {
        query.validate_for::<R>()?;
        let request = ApiRequest::get(collection_path(R::KIND)).with_query(query.to_params());
        let rows: Vec<R> = self.fetch(request).await?;
        for row in &rows {
            check_row(row)?;
        }
        if let Some(sorting) = &query.sorting {
            if !is_ordered(&rows, sorting) {
                warn!(kind = %R::KIND, key = %sorting.key, order = %sorting.order, "backend returned rows out of order");
            }
        }
        Ok(rows)
    }

    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::NotFound`] if the id does not exist.
    pub async fn get<R: Resource>(&self, id: RecordId) -> Result<R, CrudError> {
        check_id(R::KIND, id)?;
        let record: R = self.fetch(ApiRequest::get(item_path(R::KIND, id))).await?;
        check_row(&record)?;
        Ok(record)
    }

    /// Create a record; the backend assigns the id.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::Validation`] for an invalid draft, or
    /// [`CrudError::NotFound`]/[`CrudError::Conflict`] for broken references.
    pub async fn create<R: Writable>(&self, draft: &R::Draft) -> Result<R, CrudError> {
        draft.validate()?;
        let request = ApiRequest::new(Method::POST, collection_path(R::KIND)).with_body(to_body(draft)?);
        let record: R = self.fetch(request).await?;
        check_row(&record)?;
        Ok(record)
    }

    /// Replace every field of an existing record except its id.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::NotFound`] if the record no longer exists.
    pub async fn update<R: Writable>(&self, record: &R) -> Result<R, CrudError> {
        record.validate()?;
        let request =
            ApiRequest::new(Method::PUT, item_path(R::KIND, record.id())).with_body(to_body(&record.to_draft())?);
        let updated: R = self.fetch(request).await?;
        check_row(&updated)?;
        Ok(updated)
    }

    /// Delete a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::NotFound`] if the id does not exist (including a
    /// repeated delete) and [`CrudError::Conflict`] if other records still
    /// reference it.
    pub async fn delete<R: Writable>(&self, id: RecordId) -> Result<(), CrudError> {
        check_id(R::KIND, id)?;
        self.execute(ApiRequest::new(Method::DELETE, item_path(R::KIND, id)))
            .await?;
        Ok(())
    }

    /// Create an annotation after checking its span against the target message.
    ///
    /// # Errors
    ///
    /// Returns [`CrudError::Validation`] if the span does not fit `message`.
    pub async fn create_annotation(&self, message: &Message, draft: &NewAnnotation) -> Result<Annotation, CrudError> {
        draft.validate()?;
        draft.check_span(message)?;
        self.create::<Annotation>(draft).await
    }

    /// Number of stored messages.
    ///
    /// # Errors
    ///
    /// Returns a backend/network error.
    pub async fn count_messages(&self) -> Result<i64, CrudError> {
        self.fetch(ApiRequest::get(format!("{}/count", RecordKind::Message.path())))
            .await
    }

    /// Insert the demo messages when the backend has none. Returns how many were inserted.
    ///
    /// # Errors
    ///
    /// Returns a backend/network error.
    pub async fn seed(&self) -> Result<u64, CrudError> {
        #[derive(Deserialize)]
        struct SeedResponse {
            inserted: u64,
        }
        let body: SeedResponse = self.fetch(ApiRequest::new(Method::POST, "seed")).await?;
        Ok(body.inserted)
    }

    /// Check that the backend answers.
    ///
    /// # Errors
    ///
    /// Returns a network error if it does not.
    pub async fn health(&self) -> Result<(), CrudError> {
        self.execute(ApiRequest::get("healthz")).await?;
        Ok(())
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, CrudError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }
        let err = status_error(response.status, &response.body);
        warn!(%method, %path, status = response.status, error = %err, "api call failed");
        Err(err)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, CrudError> {
        let response = self.execute(request).await?;
        decode(&response.body)
    }
}

pub(crate) fn collection_path(kind: RecordKind) -> String {
    format!("{}/", kind.path())
}

pub(crate) fn item_path(kind: RecordKind, id: RecordId) -> String {
    format!("{}/{id}", kind.path())
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, CrudError> {
    serde_json::to_value(value).map_err(|e| CrudError::Network(NetworkError::Decode(e.to_string())))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, CrudError> {
    serde_json::from_str(body).map_err(|e| CrudError::Network(NetworkError::Decode(e.to_string())))
}

fn check_row<R: Resource>(row: &R) -> Result<(), CrudError> {
    row.validate()
        .map_err(|e| CrudError::Network(NetworkError::Decode(format!("{} {}: {e}", R::KIND, row.id()))))
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() { format!("status {status}") } else { trimmed.to_owned() }
}

pub(crate) fn status_error(status: u16, body: &str) -> CrudError {
    let message = error_message(status, body);
    match status {
        404 => CrudError::NotFound(message),
        409 => CrudError::Conflict(message),
        _ => CrudError::Network(NetworkError::Status { status, message }),
    }
}
