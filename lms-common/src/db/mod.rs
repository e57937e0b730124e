//! Database layer shared across crates

pub mod init;
pub mod settings;
