// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Append-only data file for one table of one run
//!
//! Lines go to `<etl_date>_<table>.dat.partial` and the file is renamed to
//! `<etl_date>_<table>.dat` on commit, so a loader never picks up a half-written
//! stream. The file is created lazily: a table without records leaves no file.

use crate::domain::change::EtlDate;
use crate::domain::errors::EtlError;
use crate::domain::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Suffix of data files still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Writer for one run's data file
#[derive(Debug)]
pub struct DataFile {
    table: String,
    path: PathBuf,
    partial_path: PathBuf,
    writer: Option<BufWriter<File>>,
    line_count: usize,
    sealed: bool,
    finished: bool,
}

impl DataFile {
    /// Prepare a data file; nothing is created until the first line
    pub fn new(dir: &Path, etl_date: &EtlDate, table: &str) -> Self {
        let path = dir.join(Self::filename(etl_date, table));
        let partial_path = dir.join(format!("{}{PARTIAL_SUFFIX}", Self::filename(etl_date, table)));
        Self {
            table: table.to_string(),
            path,
            partial_path,
            writer: None,
            line_count: 0,
            sealed: false,
            finished: false,
        }
    }

    /// File name of a committed data file
    pub fn filename(etl_date: &EtlDate, table: &str) -> String {
        format!("{etl_date}_{table}.dat")
    }

    /// Table this file belongs to
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Final path after commit
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines written so far
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Append one line
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or written.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.partial_path)
                .map_err(|e| {
                    EtlError::Io(format!(
                        "Failed to create {}: {e}",
                        self.partial_path.display()
                    ))
                })?;
            self.writer = Some(BufWriter::new(file));
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        self.line_count += 1;
        Ok(())
    }

    /// Flush, close and publish the file under its final name
    ///
    /// # Returns
    ///
    /// The number of lines in the committed file.
    pub fn commit(self) -> Result<usize> {
        let count = self.line_count;
        self.publish()?;
        Ok(count)
    }

    /// Flush and sync the partial file to disk without publishing it
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the data cannot be flushed; the partial file is
    /// still removed when the `DataFile` drops.
    pub fn seal(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            self.sealed = true;
            let file = writer.into_inner().map_err(|e| {
                EtlError::Io(format!(
                    "Failed to flush {}: {}",
                    self.partial_path.display(),
                    e.error()
                ))
            })?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Rename a sealed file to its final name
    ///
    /// # Returns
    ///
    /// The published path, or `None` when no line was ever written.
    pub fn publish(mut self) -> Result<Option<PathBuf>> {
        if self.writer.is_some() {
            self.seal()?;
        }
        if !self.sealed {
            self.finished = true;
            return Ok(None);
        }
        fs::rename(&self.partial_path, &self.path).map_err(|e| {
            EtlError::Io(format!("Failed to publish {}: {e}", self.path.display()))
        })?;
        self.finished = true;
        tracing::debug!(
            table = %self.table,
            path = %self.path.display(),
            lines = self.line_count,
            "Committed data file"
        );
        Ok(Some(self.path.clone()))
    }

    /// Discard everything written
    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.remove_partial()
    }

    fn remove_partial(&mut self) -> Result<()> {
        self.writer = None;
        match fs::remove_file(&self.partial_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for DataFile {
    fn drop(&mut self) {
        if !self.finished && (self.writer.is_some() || self.sealed) {
            if let Err(e) = self.remove_partial() {
                tracing::warn!(
                    path = %self.partial_path.display(),
                    error = %e,
                    "Failed to remove abandoned data file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn etl_date() -> EtlDate {
        EtlDate::from_str("20240301120000").unwrap()
    }

    #[test]
    fn test_commit_publishes_file() {
        let dir = TempDir::new().unwrap();
        let mut file = DataFile::new(dir.path(), &etl_date(), "lab_batch");
        file.write_line("20240301120000,F,1,LCSET-1,").unwrap();
        file.write_line("20240301120000,T,2,").unwrap();

        let committed = dir.path().join("20240301120000_lab_batch.dat");
        assert!(!committed.exists());

        assert_eq!(file.commit().unwrap(), 2);
        let content = std::fs::read_to_string(committed).unwrap();
        assert_eq!(content, "20240301120000,F,1,LCSET-1,\n20240301120000,T,2,\n");
        assert!(!dir
            .path()
            .join("20240301120000_lab_batch.dat.partial")
            .exists());
    }

    #[test]
    fn test_empty_file_is_never_created() {
        let dir = TempDir::new().unwrap();
        let file = DataFile::new(dir.path(), &etl_date(), "lab_vessel");
        assert_eq!(file.commit().unwrap(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_abort_removes_partial() {
        let dir = TempDir::new().unwrap();
        let mut file = DataFile::new(dir.path(), &etl_date(), "event_fact");
        file.write_line("x").unwrap();
        file.abort().unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sealed_file_is_removed_unless_published() {
        let dir = TempDir::new().unwrap();
        {
            let mut file = DataFile::new(dir.path(), &etl_date(), "event_fact");
            file.write_line("x").unwrap();
            file.seal().unwrap();
            assert!(dir
                .path()
                .join("20240301120000_event_fact.dat.partial")
                .exists());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_drop_without_commit_cleans_up() {
        let dir = TempDir::new().unwrap();
        {
            let mut file = DataFile::new(dir.path(), &etl_date(), "event_fact");
            file.write_line("x").unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
