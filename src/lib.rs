//! # ovenwatch
//!
//! Server wiring for the ovenwatch monitoring core: the axum-backed
//! subscriber transport, the HTTP routes, and engine assembly.

pub mod api;
pub mod app;
pub mod transport;

pub use app::{Engine, build_engine, run_server};
pub use transport::WsTransport;
