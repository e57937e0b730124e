//! Entity enums shared between the server and its database layer
//!
//! Stored as TEXT in SQLite; each enum round-trips through `as_str` /
//! `parse` so unknown database values surface as errors instead of
//! panics.

use serde::{Deserialize, Serialize};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "STUDENT" => Some(Role::Student),
            "TEACHER" => Some(Role::Teacher),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Payment lifecycle status
///
/// PENDING at checkout initiation, SUCCESS once the gateway callback
/// verifies, CANCELLED for stale sibling attempts demoted when another
/// attempt succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }
}

/// Attendance record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
        }
    }

    pub fn parse(s: &str) -> Option<AttendanceStatus> {
        match s {
            "PRESENT" => Some(AttendanceStatus::Present),
            "ABSENT" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

/// Help request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HelpStatus {
    Pending,
    Resolved,
}

impl HelpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelpStatus::Pending => "PENDING",
            HelpStatus::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<HelpStatus> {
        match s {
            "PENDING" => Some(HelpStatus::Pending),
            "RESOLVED" => Some(HelpStatus::Resolved),
            _ => None,
        }
    }
}

/// Map a grade string to grade points for averaging.
///
/// Accepts plain numbers ("8.5") and letter grades. Returns None for
/// strings that are neither, which are skipped by average calculations.
pub fn grade_points(grade: &str) -> Option<f64> {
    if let Ok(n) = grade.trim().parse::<f64>() {
        return Some(n);
    }
    match grade.trim().to_uppercase().as_str() {
        "A+" | "O" => Some(10.0),
        "A" => Some(9.0),
        "B+" => Some(8.0),
        "B" => Some(7.0),
        "C+" => Some(6.0),
        "C" => Some(5.0),
        "D+" => Some(4.0),
        "D" => Some(3.0),
        "E" => Some(2.0),
        "F" => Some(1.0),
        _ => None,
    }
}

/// Format a minute count as a human duration, e.g. "2 hr 5 min".
pub fn format_duration_minutes(total: i64) -> String {
    let hours = total / 60;
    let minutes = total % 60;
    if hours > 0 && minutes > 0 {
        format!("{} hr {} min", hours, minutes)
    } else if hours > 0 {
        format!("{} hr", hours)
    } else {
        format!("{} min", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("SUPERUSER"), None);
    }

    #[test]
    fn grade_points_letters_and_numbers() {
        assert_eq!(grade_points("A+"), Some(10.0));
        assert_eq!(grade_points("o"), Some(10.0));
        assert_eq!(grade_points("7.5"), Some(7.5));
        assert_eq!(grade_points("excellent"), None);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration_minutes(125), "2 hr 5 min");
        assert_eq!(format_duration_minutes(120), "2 hr");
        assert_eq!(format_duration_minutes(45), "45 min");
        assert_eq!(format_duration_minutes(0), "0 min");
    }
}
