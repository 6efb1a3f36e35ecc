//! View state for CRUD tables.
//!
//! DESIGN
//! ======
//! One [`CrudTable`] per mounted table. It owns the last fetched snapshot and
//! announces every change through [`TableEvent`]s, so the rendering layer only
//! subscribes and never reaches into fetch logic.

pub mod table;

pub use table::{CrudTable, Refresh, TableEvent, TableView};
