//! Networking modules for the HTTP API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `transport` moves raw requests over HTTP and is the seam tests replace;
//! `api` layers typed CRUD calls, validation, and status mapping on top.

pub mod api;
#[cfg(test)]
pub(crate) mod mock;
pub mod transport;

pub use api::ApiClient;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
