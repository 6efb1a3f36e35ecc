//! Persistence services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Route handlers talk to a `dyn Store` and never to a concrete backend, so
//! the same router runs against Postgres in production and against memory in
//! tests and local runs.

pub mod memory;
pub mod postgres;
pub mod seed;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{Store, StoreError};
