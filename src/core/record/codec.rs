// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Denormalized record encoding
//!
//! Every line starts with the run timestamp and a `T`/`F` delete flag, followed
//! by the record's fields, each followed by the delimiter:
//!
//! ```text
//! 20240301120000,F,5,LCSET-12,T,20240229101500,
//! 20240301120000,T,6,
//! ```
//!
//! Tombstones carry only the entity id. Records that belong to a multi-table
//! stream carry a one-letter tag as their last field (`E`, `A`, `S`); the tag
//! decides which table the line lands in.

use crate::domain::change::{EtlDate, TIMESTAMP_FORMAT};
use crate::domain::ids::EntityId;
use chrono::{DateTime, Utc};
use std::fmt::{self, Display};

/// Field delimiter
pub const DELIMITER: char = ',';

const QUOTE: char = '"';

/// Formats an optional string: empty when absent, newlines flattened, quoted
/// (with embedded quotes doubled) when it contains the delimiter
pub fn format_text(value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let flattened: String = value
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flattened.contains(DELIMITER) {
        let escaped = flattened.replace(QUOTE, "\"\"");
        format!("{QUOTE}{escaped}{QUOTE}")
    } else {
        flattened
    }
}

/// Formats a flag as `T` or `F`
pub fn format_flag(value: bool) -> &'static str {
    if value {
        "T"
    } else {
        "F"
    }
}

/// Formats an optional timestamp as `yyyyMMddHHmmss`
pub fn format_timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// Formats an optional number
pub fn format_number<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Output stream a tagged record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamTag {
    /// Event fact rows
    Event,
    /// Library ancestry rows
    Ancestry,
    /// Facts derived from events, such as sequencing sample facts
    Derived,
}

impl StreamTag {
    /// Suffix letter written as the record's last field
    pub fn suffix(self) -> char {
        match self {
            StreamTag::Event => 'E',
            StreamTag::Ancestry => 'A',
            StreamTag::Derived => 'S',
        }
    }

    /// Inverse of [`StreamTag::suffix`]
    pub fn from_suffix(suffix: char) -> Option<Self> {
        match suffix {
            'E' => Some(StreamTag::Event),
            'A' => Some(StreamTag::Ancestry),
            'S' => Some(StreamTag::Derived),
            _ => None,
        }
    }

    /// Reads the tag back from a rendered line
    pub fn of_line(line: &str) -> Option<Self> {
        let body = line.strip_suffix(DELIMITER).unwrap_or(line);
        let last_field = body.rsplit(DELIMITER).next()?;
        let mut chars = last_field.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_suffix(c),
            _ => None,
        }
    }

    /// Table the tagged stream is written to
    pub fn table(self) -> &'static str {
        match self {
            StreamTag::Event => "event_fact",
            StreamTag::Ancestry => "library_ancestry",
            StreamTag::Derived => "sequencing_sample_fact",
        }
    }
}

/// One output line, before rendering
///
/// # Examples
///
/// ```
/// use datawh::core::record::DenormalizedRecord;
/// use datawh::domain::{EntityId, EtlDate};
/// use std::str::FromStr;
///
/// let etl_date = EtlDate::from_str("20240301120000").unwrap();
/// let record = DenormalizedRecord::upsert(etl_date)
///     .id(EntityId::new(5).unwrap())
///     .text(Some("LCSET, 12"))
///     .flag(true);
/// assert_eq!(record.render(), "20240301120000,F,5,\"LCSET, 12\",T,");
///
/// let tombstone = DenormalizedRecord::tombstone(etl_date, EntityId::new(6).unwrap());
/// assert_eq!(tombstone.render(), "20240301120000,T,6,");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenormalizedRecord {
    etl_date: EtlDate,
    is_delete: bool,
    fields: Vec<String>,
    tag: Option<StreamTag>,
}

impl DenormalizedRecord {
    /// Starts a full record
    pub fn upsert(etl_date: EtlDate) -> Self {
        Self {
            etl_date,
            is_delete: false,
            fields: Vec::new(),
            tag: None,
        }
    }

    /// Builds a tombstone for `id`
    pub fn tombstone(etl_date: EtlDate, id: EntityId) -> Self {
        Self {
            etl_date,
            is_delete: true,
            fields: vec![id.to_string()],
            tag: None,
        }
    }

    /// Appends an entity id
    pub fn id(self, id: EntityId) -> Self {
        self.raw(id.to_string())
    }

    /// Appends an optional entity id
    pub fn opt_id(self, id: Option<EntityId>) -> Self {
        self.raw(format_number(id))
    }

    /// Appends an optional string
    pub fn text(self, value: Option<&str>) -> Self {
        self.raw(format_text(value))
    }

    /// Appends a flag
    pub fn flag(self, value: bool) -> Self {
        self.raw(format_flag(value))
    }

    /// Appends an optional timestamp
    pub fn timestamp(self, value: Option<DateTime<Utc>>) -> Self {
        self.raw(format_timestamp(value))
    }

    /// Appends an optional number
    pub fn number<T: Display>(self, value: Option<T>) -> Self {
        self.raw(format_number(value))
    }

    /// Appends a pre-formatted field; line breaks are flattened
    pub fn raw(mut self, value: impl Into<String>) -> Self {
        let value: String = value.into();
        if value.contains(['\n', '\r']) {
            self.fields.push(value.replace(['\n', '\r'], " "));
        } else {
            self.fields.push(value);
        }
        self
    }

    /// Tags the record for a multi-table stream
    pub fn tagged(mut self, tag: StreamTag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// True for tombstones
    pub fn is_delete(&self) -> bool {
        self.is_delete
    }

    /// Stream tag, if any
    pub fn tag(&self) -> Option<StreamTag> {
        self.tag
    }

    /// Fields after the common prefix
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Renders the record as a single line without the trailing newline
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DenormalizedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}",
            self.etl_date,
            format_flag(self.is_delete)
        )?;
        for field in &self.fields {
            write!(f, "{field}{DELIMITER}")?;
        }
        if let Some(tag) = self.tag {
            write!(f, "{}{DELIMITER}", tag.suffix())?;
        }
        Ok(())
    }
}
