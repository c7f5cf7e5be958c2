//! CSV archiving
//!
//! An `Archiver` appends flat serde records to a CSV file inside the session's archive
//! directory, one row per call, flushing after every row so that a killed process still leaves a
//! usable file behind.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::path::Path;
use std::fs::{self, File, OpenOptions};
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
pub struct Archiver {
    writer: Writer<File>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while archiving.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Could not create the archive file: {0}")]
    CreateError(std::io::Error),

    #[error("Could not write the record to the archive: {0}")]
    WriteError(csv::Error),

    #[error("Could not flush the archive: {0}")]
    FlushError(std::io::Error)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a path relative to the session's archive root.
    ///
    /// Any missing parent directories are created, and an existing file is truncated.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, ArchiveError> {
        let full_path = session.arch_root.join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(ArchiveError::CreateError)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(full_path)
            .map_err(ArchiveError::CreateError)?;

        Ok(Self::from_file(file))
    }

    /// Create an archiver writing to an already opened file.
    pub fn from_file(file: File) -> Self {
        Self {
            writer: WriterBuilder::new()
                .has_headers(true)
                .from_writer(file)
        }
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), ArchiveError> {
        self.writer.serialize(record).map_err(ArchiveError::WriteError)?;
        self.writer.flush().map_err(ArchiveError::FlushError)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Row {
        index: usize,
        value: f64,
        mse: Option<f64>
    }

    #[test]
    fn test_serialise_rows() {
        let path = std::env::temp_dir().join(format!("util_archive_test_{}.csv", std::process::id()));
        let file = File::create(&path).unwrap();
        let mut arch = Archiver::from_file(file);

        arch.serialise(Row { index: 0, value: 0.5, mse: None }).unwrap();
        arch.serialise(Row { index: 1, value: -0.25, mse: Some(0.25) }).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(contents, "index,value,mse\n0,0.5,\n1,-0.25,0.25\n");
    }
}
