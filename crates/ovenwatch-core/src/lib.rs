//! # ovenwatch-core
//!
//! Core crate for the ovenwatch monitoring core. Contains configuration
//! schemas, the unified error system, the initialization state machine,
//! and the traits through which external collaborators are plugged in.
//!
//! This crate has **no** internal dependencies on other ovenwatch crates.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use lifecycle::{InitializationState, Lifecycle, Phase, Stage};
pub use result::AppResult;
