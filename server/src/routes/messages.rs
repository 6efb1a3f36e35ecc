//! Message routes.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use records::{ListParams, Message, NewMessage, RecordId};

use super::error::ApiError;
use super::{check_draft, list_query};
use crate::state::AppState;

/// `GET /messages/`: list messages.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let query = list_query::<Message>(params)?;
    Ok(Json(state.store.list_messages(&query).await?))
}

/// `GET /messages/count`: number of stored messages, as a bare integer.
pub async fn count(State(state): State<AppState>) -> Result<Json<i64>, ApiError> {
    Ok(Json(state.store.count_messages().await?))
}

/// `GET /messages/:id`
pub async fn get(State(state): State<AppState>, Path(id): Path<RecordId>) -> Result<Json<Message>, ApiError> {
    Ok(Json(state.store.get_message(id).await?))
}

/// `POST /messages/`: create a message.
pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<NewMessage>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    check_draft(&draft)?;
    let message = state.store.create_message(&draft).await?;
    tracing::info!(id = message.id, "message created");
    Ok((StatusCode::CREATED, Json(message)))
}

/// `PUT /messages/:id`: replace a message's content.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(draft): Json<NewMessage>,
) -> Result<Json<Message>, ApiError> {
    check_draft(&draft)?;
    Ok(Json(state.store.update_message(id, &draft).await?))
}

/// `DELETE /messages/:id`: refused while annotations reference the message.
pub async fn delete(State(state): State<AppState>, Path(id): Path<RecordId>) -> Result<StatusCode, ApiError> {
    state.store.delete_message(id).await?;
    tracing::info!(id, "message deleted");
    Ok(StatusCode::NO_CONTENT)
}
