//! HTTP server exposing an AUI tool registry

pub mod rest;
pub mod types;

pub use rest::{AppError, AppState, create_router, serve, serve_on};
pub use types::*;
