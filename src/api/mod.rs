//! HTTP surface of the worker.
//!
//! - [`dto`] - Response bodies
//! - [`handlers`] - Request handlers
//! - [`middleware`] - Request tracing
//! - [`routes`] - Router composition

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::app_router;
