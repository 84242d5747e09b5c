//! Schedule store row types

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Name of the sentinel group used when a lecture has no explicit group mapping
pub const DEFAULT_GROUP: &str = "(DEFAULT)";

/// Highest week number in the pre-seeded calendar
pub const MAX_WEEK: i64 = 53;

/// Semester term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Term {
    Spring,
    Autumn,
}

impl Term {
    /// Value stored in the `semesters.term` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Term::Spring => "spring",
            Term::Autumn => "autumn",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Term {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "spring" | "v" | "vår" => Ok(Term::Spring),
            "autumn" | "fall" | "h" | "høst" => Ok(Term::Autumn),
            other => Err(Error::InvalidInput(format!("Unknown term '{}'", other))),
        }
    }
}

/// Semester record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Semester {
    pub guid: Uuid,
    pub year: i32,
    pub term: Term,
}

/// Course record
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub guid: Uuid,
    pub code: String,
    pub full_name: String,
    pub credit_points: Option<f64>,
}

/// Lecture record (identity columns and display text)
///
/// Groups, rooms, weeks and lecturers live in link tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lecture {
    pub guid: Uuid,
    pub course_id: Uuid,
    pub semester_id: Uuid,
    /// Day ordinal, Monday = 0
    pub day: i64,
    pub start_slot: i64,
    pub end_slot: i64,
    pub type_id: Option<Uuid>,
    /// Clock text as published by the source, e.g. "08:15"
    pub start_text: String,
    pub end_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_parsing() {
        assert_eq!("spring".parse::<Term>().unwrap(), Term::Spring);
        assert_eq!(" Autumn ".parse::<Term>().unwrap(), Term::Autumn);
        assert_eq!("høst".parse::<Term>().unwrap(), Term::Autumn);
        assert!("summer".parse::<Term>().is_err());
    }

    #[test]
    fn test_term_display_matches_column_value() {
        assert_eq!(Term::Spring.to_string(), "spring");
        assert_eq!(Term::Autumn.as_str(), "autumn");
    }
}
