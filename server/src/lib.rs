//! Annotation backend: JSON CRUD over messages, codes and annotations.
//!
//! ARCHITECTURE
//! ============
//! `routes` translates HTTP to calls on a `dyn Store` held in [`state::AppState`].
//! `services` holds the Postgres and in-memory stores plus demo seeding.
//! `db` creates the pool and runs migrations when Postgres is configured.

pub mod config;
pub mod db;
pub mod routes;
pub mod services;
pub mod state;
