//! Code routes.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use records::{Code, ListParams, NewCode, RecordId};

use super::error::ApiError;
use super::{check_draft, list_query};
use crate::state::AppState;

/// `GET /codes/`: list codes.
pub async fn list(State(state): State<AppState>, Query(params): Query<ListParams>) -> Result<Json<Vec<Code>>, ApiError> {
    let query = list_query::<Code>(params)?;
    Ok(Json(state.store.list_codes(&query).await?))
}

/// `GET /codes/:id`
pub async fn get(State(state): State<AppState>, Path(id): Path<RecordId>) -> Result<Json<Code>, ApiError> {
    Ok(Json(state.store.get_code(id).await?))
}

/// `POST /codes/`: create a code; labels are unique.
pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<NewCode>,
) -> Result<(StatusCode, Json<Code>), ApiError> {
    check_draft(&draft)?;
    let code = state.store.create_code(&draft).await?;
    tracing::info!(id = code.id, code = %code.code, "code created");
    Ok((StatusCode::CREATED, Json(code)))
}

/// `PUT /codes/:id`: rename a code.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(draft): Json<NewCode>,
) -> Result<Json<Code>, ApiError> {
    check_draft(&draft)?;
    Ok(Json(state.store.update_code(id, &draft).await?))
}

/// `DELETE /codes/:id`: refused while annotations reference the code.
pub async fn delete(State(state): State<AppState>, Path(id): Path<RecordId>) -> Result<StatusCode, ApiError> {
    state.store.delete_code(id).await?;
    tracing::info!(id, "code deleted");
    Ok(StatusCode::NO_CONTENT)
}
