//! Annotation routes, including the read-only joined projection.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use records::{Annotation, AnnotationWithCode, ListParams, NewAnnotation, RecordId};

use super::error::ApiError;
use super::{check_draft, list_query};
use crate::state::AppState;

/// `GET /annotations/`: list annotations, optionally for one `message_id`.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Annotation>>, ApiError> {
    let query = list_query::<Annotation>(params)?;
    Ok(Json(state.store.list_annotations(&query).await?))
}

/// `GET /annotations/:id`
pub async fn get(State(state): State<AppState>, Path(id): Path<RecordId>) -> Result<Json<Annotation>, ApiError> {
    Ok(Json(state.store.get_annotation(id).await?))
}

/// `POST /annotations/`: 404 if the message or code does not exist, 422 if
/// the span does not fit the message.
pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<NewAnnotation>,
) -> Result<(StatusCode, Json<Annotation>), ApiError> {
    check_draft(&draft)?;
    let annotation = state.store.create_annotation(&draft).await?;
    tracing::info!(
        id = annotation.id,
        message_id = annotation.message_id,
        code_id = annotation.code_id,
        "annotation created"
    );
    Ok((StatusCode::CREATED, Json(annotation)))
}

/// `PUT /annotations/:id`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(draft): Json<NewAnnotation>,
) -> Result<Json<Annotation>, ApiError> {
    check_draft(&draft)?;
    Ok(Json(state.store.update_annotation(id, &draft).await?))
}

/// `DELETE /annotations/:id`
pub async fn delete(State(state): State<AppState>, Path(id): Path<RecordId>) -> Result<StatusCode, ApiError> {
    state.store.delete_annotation(id).await?;
    tracing::info!(id, "annotation deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /annotations-with-code/`: annotations joined with their code label.
pub async fn list_with_code(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AnnotationWithCode>>, ApiError> {
    let query = list_query::<AnnotationWithCode>(params)?;
    Ok(Json(state.store.list_annotations_with_code(&query).await?))
}

/// `GET /annotations-with-code/:id`
pub async fn get_with_code(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Json<AnnotationWithCode>, ApiError> {
    Ok(Json(state.store.get_annotation_with_code(id).await?))
}
