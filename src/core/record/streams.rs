// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Per-run set of output streams, one per logical table

use crate::adapters::filesystem::DataFile;
use crate::core::record::codec::DenormalizedRecord;
use crate::domain::change::EtlDate;
use crate::domain::errors::EtlError;
use crate::domain::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Open streams of one run attempt
///
/// Every stream is either committed or aborted together with the others, so a
/// run never leaves a half-written table behind.
#[derive(Debug)]
pub struct StreamSet {
    dir: PathBuf,
    etl_date: EtlDate,
    files: BTreeMap<String, DataFile>,
}

impl StreamSet {
    /// Creates an empty stream set writing into `dir`
    pub fn new(dir: impl Into<PathBuf>, etl_date: EtlDate) -> Self {
        Self {
            dir: dir.into(),
            etl_date,
            files: BTreeMap::new(),
        }
    }

    /// Directory the streams are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run timestamp of every stream in the set
    pub fn etl_date(&self) -> EtlDate {
        self.etl_date
    }

    /// Appends `record` to the stream for `table`
    pub fn write(&mut self, table: &str, record: &DenormalizedRecord) -> Result<()> {
        let dir = &self.dir;
        let etl_date = &self.etl_date;
        let file = self
            .files
            .entry(table.to_string())
            .or_insert_with(|| DataFile::new(dir, etl_date, table));
        file.write_line(&record.render())
    }

    /// Appends a tagged record to the table its tag names
    ///
    /// # Errors
    ///
    /// Returns a validation error for untagged records.
    pub fn write_tagged(&mut self, record: &DenormalizedRecord) -> Result<()> {
        let tag = record.tag().ok_or_else(|| {
            EtlError::Validation(format!("Record has no stream tag: {}", record.render()))
        })?;
        self.write(tag.table(), record)
    }

    /// Lines written so far to `table`
    pub fn line_count(&self, table: &str) -> usize {
        self.files.get(table).map(DataFile::line_count).unwrap_or(0)
    }

    /// Lines written so far across all tables
    pub fn total_lines(&self) -> usize {
        self.files.values().map(DataFile::line_count).sum()
    }

    /// Publishes every stream
    ///
    /// Every file is flushed and synced before the first one is renamed. If a
    /// rename fails, the files already published are removed again and the
    /// rest are discarded.
    ///
    /// # Returns
    ///
    /// Line count per table that received at least one record.
    pub fn commit_all(mut self) -> Result<BTreeMap<String, usize>> {
        // On error, the partial files are removed as they drop
        for file in self.files.values_mut() {
            file.seal()?;
        }

        let mut counts = BTreeMap::new();
        let mut published: Vec<PathBuf> = Vec::new();
        for (table, file) in self.files {
            let count = file.line_count();
            match file.publish() {
                Ok(Some(path)) => {
                    published.push(path);
                    counts.insert(table, count);
                }
                Ok(None) => {}
                Err(e) => {
                    unpublish(&published);
                    return Err(e);
                }
            }
        }
        Ok(counts)
    }

    /// Discards every stream
    pub fn abort_all(self) {
        for (table, file) in self.files {
            if let Err(e) = file.abort() {
                tracing::warn!(table = %table, error = %e, "Failed to discard stream");
            }
        }
    }
}

fn unpublish(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to withdraw data file");
        }
    }
}
