//! CRUD table surface for the annotation API.
//!
//! ARCHITECTURE
//! ============
//! `net` talks to the backend (a [`net::Transport`] seam plus the typed
//! [`net::ApiClient`]), `state` holds one cached view per table, and
//! `config` carries the API base address that is injected at construction.
//! Nothing here renders; a UI layer subscribes to [`state::TableEvent`]s.

pub mod config;
pub mod error;
pub mod net;
pub mod state;

pub use config::ClientConfig;
pub use error::{CrudError, NetworkError};
pub use net::{ApiClient, HttpTransport, Transport};
pub use state::{CrudTable, Refresh, TableEvent, TableView};
