//! Crate-wide error type.
//!
//! Every public operation returns [`Error`].  The variants map one-to-one
//! onto the failure classes a caller can act on: absence (`NotFound`),
//! shape (`DimensionMismatch`, `InvalidOption`), integrity (`Corrupt`,
//! `Checksum`), capacity (`Io`), and state (`AlreadyExists`, `Closed`).
//!
//! Integrity failures are never hidden: a checksum mismatch on read is
//! surfaced to the caller and the record stays in the index so the span can
//! be inspected on disk.  The one deliberate exception is search candidate
//! evaluation, where an unreadable record is skipped and counted rather
//! than failing the whole query — see `Collection::search`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("dimension mismatch: vector has {got} components, collection is {want}-dimensional")]
    DimensionMismatch { got: usize, want: usize },

    /// Structural damage: bad header magic, an impossible span length, a
    /// field outside its domain.  The file cannot be trusted past this point.
    #[error("corrupt collection file: {0}")]
    Corrupt(String),

    /// The span parsed but its SHA-256 did not match the stored tail.
    #[error("checksum mismatch for record {record_id}: stored {stored}, computed {computed}")]
    Checksum {
        record_id: String,
        stored:    String,
        computed:  String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another live handle already owns this collection file.  One active
    /// handle per file; close the other handle first.
    #[error("collection file already open: {0}")]
    AlreadyExists(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("collection is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
