//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the JSON CRUD endpoints for messages, codes and
//! annotations under a single Axum router. CORS is open to any origin so a
//! browser front end on another port can call it directly.

pub mod annotations;
pub mod codes;
pub mod error;
pub mod messages;


use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use records::{ListParams, ListQuery, Resource, Validate};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::seed;
use crate::state::AppState;
use error::ApiError;

/// Full API router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/messages/", get(messages::list).post(messages::create))
        .route("/messages/count", get(messages::count))
        .route(
            "/messages/{id}",
            get(messages::get)
                .put(messages::update)
                .delete(messages::delete),
        )
        .route("/codes/", get(codes::list).post(codes::create))
        .route("/codes/{id}", get(codes::get).put(codes::update).delete(codes::delete))
        .route("/annotations/", get(annotations::list).post(annotations::create))
        .route(
            "/annotations/{id}",
            get(annotations::get)
                .put(annotations::update)
                .delete(annotations::delete),
        )
        .route("/annotations-with-code/", get(annotations::list_with_code))
        .route("/annotations-with-code/{id}", get(annotations::get_with_code))
        .route("/seed", post(seed_demo))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Validate raw list parameters for `R`; failures are 400s.
pub(crate) fn list_query<R: Resource>(params: ListParams) -> Result<ListQuery, ApiError> {
    params
        .into_query::<R>()
        .map_err(|e| ApiError::bad_query(&e))
}

/// Validate a create/update body; failures are 422s.
pub(crate) fn check_draft(draft: &impl Validate) -> Result<(), ApiError> {
    draft.validate().map_err(|e| ApiError::invalid(&e))
}

#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub inserted: usize,
}

async fn seed_demo(State(state): State<AppState>) -> Result<axum::Json<SeedResponse>, ApiError> {
    let inserted = seed::seed_demo(state.store.as_ref()).await?;
    Ok(axum::Json(SeedResponse { inserted }))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
