//! Service layer
//!
//! Business rules and external collaborators, kept out of the HTTP
//! handlers so they can be unit tested against an in-memory database.

pub mod auth;
pub mod gateway;
pub mod grading;
pub mod mailer;
pub mod payments;
pub mod progress;
pub mod tokens;
