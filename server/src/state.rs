//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! only holds the storage backend; everything else a handler needs comes
//! from the request.

use std::sync::Arc;

use crate::services::Store;

/// Clone is required by Axum; the store is shared behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
