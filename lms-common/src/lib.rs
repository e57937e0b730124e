//! Shared library for the LMS backend
//!
//! Error types, configuration loading, database initialization and the
//! entity enums used by the server crate.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
