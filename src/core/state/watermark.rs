// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Watermark model for tracking run state
//!
//! The watermark is the last revision whose changes were fully written by a
//! successful run. The next incremental run processes `(watermark, current]`.

use crate::domain::errors::EtlError;
use crate::domain::ids::Revision;
use crate::domain::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last successfully processed revision
///
/// # Examples
///
/// ```
/// use datawh::core::state::watermark::Watermark;
/// use datawh::domain::Revision;
///
/// let watermark = Watermark::parse("12\n").unwrap();
/// assert_eq!(watermark.revision, Revision::new(12).unwrap());
/// assert_eq!(watermark.render(), "12");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Revision of the last successful run
    pub revision: Revision,

    /// When the watermark was written, if the storage knows
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Watermark {
    /// Creates a watermark for `revision`
    pub fn new(revision: Revision) -> Self {
        Self {
            revision,
            recorded_at: None,
        }
    }

    /// Sets the time the watermark was recorded
    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    /// Parses the persisted form: a single integer, surrounding whitespace ignored
    ///
    /// # Errors
    ///
    /// Returns a state error if the content is not a non-negative integer.
    pub fn parse(content: &str) -> Result<Self> {
        let trimmed = content.trim();
        let revision = trimmed
            .parse::<Revision>()
            .map_err(|e| EtlError::State(format!("Invalid watermark '{trimmed}': {e}")))?;
        Ok(Self::new(revision))
    }

    /// Persisted form
    pub fn render(&self) -> String {
        self.revision.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("0", 0 ; "zero")]
    #[test_case("42", 42 ; "plain")]
    #[test_case("  17\n", 17 ; "whitespace")]
    fn test_parse_valid(content: &str, expected: i64) {
        let watermark = Watermark::parse(content).unwrap();
        assert_eq!(watermark.revision.value(), expected);
        assert!(watermark.recorded_at.is_none());
    }

    #[test_case("" ; "empty")]
    #[test_case("-3" ; "negative")]
    #[test_case("12abc" ; "garbage")]
    fn test_parse_invalid(content: &str) {
        let result = Watermark::parse(content);
        assert!(matches!(result, Err(EtlError::State(_))));
    }

    #[test]
    fn test_with_recorded_at() {
        let now = Utc::now();
        let watermark = Watermark::new(Revision::new(3).unwrap()).with_recorded_at(now);
        assert_eq!(watermark.recorded_at, Some(now));
    }
}
