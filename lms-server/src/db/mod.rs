//! Database query modules, one per entity
//!
//! Plain structs and hand-written SQL; UUIDs are bound as TEXT and
//! timestamps as RFC3339 TEXT.

pub mod announcements;
pub mod attendance;
pub mod contents;
pub mod courses;
pub mod enrollments;
pub mod events;
pub mod grades;
pub mod help;
pub mod payments;
pub mod progress;
pub mod students;
pub mod subjects;
pub mod teachers;
pub mod users;

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

pub(crate) fn parse_ts_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match s {
        Some(s) => Ok(Some(parse_ts(&s)?)),
        None => Ok(None),
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(s)?)
}

pub(crate) fn parse_uuid_opt(s: Option<String>) -> Result<Option<Uuid>> {
    match s {
        Some(s) => Ok(Some(parse_uuid(&s)?)),
        None => Ok(None),
    }
}
