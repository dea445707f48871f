//! dentalis access service.
//!
//! This crate exposes the tiered access core over HTTP so that tier checks
//! are enforced server side, not only in the front end:
//! - `auth`: bearer-token identity extraction
//! - `state`: per-identity access contexts over one shared config store
//! - `routes`: the axum router
//! - `config`: environment-driven server configuration

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
