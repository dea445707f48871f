//! Core identity types and utilities for dentalis.
//!
//! This crate holds the pieces shared by every dentalis crate: the
//! rootcause-based `Result` alias and the identity handed over by the
//! upstream authentication provider.

pub mod error;
pub mod identity;

pub use error::Result;
pub use identity::{Identity, UserKey};
