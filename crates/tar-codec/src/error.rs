//! Error types for tar archive processing.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that can occur while reading, writing or extracting an archive.
#[derive(Debug, Error)]
pub enum TarError {
    /// The archive bytes don't follow the tar format.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The stream ended in the middle of an entry.
    #[error("unexpected end of archive at position {pos}")]
    Truncated {
        /// Position in the stream (in bytes) where the data ran out.
        pos: u64,
    },

    /// The API was used in a way the current state doesn't allow.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// An entry would be extracted outside of the destination directory.
    #[error("entry {name:?} would be extracted outside of {destination:?}")]
    PathTraversal {
        /// Name of the offending entry.
        name: String,
        /// The destination directory.
        destination: PathBuf,
    },

    /// An I/O operation failed while doing something specific.
    #[error("{context}: {source}")]
    Archive {
        /// What was being done.
        context: String,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// I/O error from the underlying stream or filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Ways in which archive bytes can be malformed.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A block was handed over that isn't exactly one block long.
    #[error("invalid block length: expected 512 bytes, got {0}")]
    BlockLength(usize),

    /// The stored header checksum doesn't match the header bytes.
    #[error("header checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch {
        /// The checksum value stored in the header.
        stored: u64,
        /// The checksum computed from the header bytes.
        computed: u64,
    },

    /// A numeric field contains invalid characters.
    #[error("invalid octal field: {0:?}")]
    InvalidOctal(Vec<u8>),

    /// A PAX extended header record is malformed.
    #[error("malformed PAX record: {0}")]
    MalformedPax(String),

    /// An entry was closed before its declared size was written.
    #[error("entry {name:?} closed after {written} of {expected} bytes")]
    EntryIncomplete {
        /// Name of the entry.
        name: String,
        /// Bytes actually written.
        written: u64,
        /// Size declared in the header.
        expected: u64,
    },

    /// A GNU long name/link payload exceeds the configured limit.
    #[error("GNU long name/link exceeds limit: {size} bytes > {limit} bytes")]
    GnuLongTooLarge {
        /// Payload size from the header.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// A PAX extended header payload exceeds the configured limit.
    #[error("PAX header exceeds limit: {size} bytes > {limit} bytes")]
    PaxTooLarge {
        /// Payload size from the header.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Too many extension headers in a row without a real entry.
    #[error("too many pending extension headers: {count} > {limit}")]
    TooManyPendingEntries {
        /// Number of extension headers seen.
        count: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Ways in which the API can be misused.
#[derive(Debug, Error)]
pub enum UsageError {
    /// A read was attempted on a buffer opened for writing.
    #[error("buffer was opened for writing")]
    NotReadable,

    /// A write was attempted on a buffer opened for reading.
    #[error("buffer was opened for reading")]
    NotWritable,

    /// The buffer was already closed.
    #[error("buffer is closed")]
    Closed,

    /// A block factor of zero was requested.
    #[error("block factor must be at least 1")]
    InvalidBlockFactor,

    /// More data was written than the current entry declared.
    #[error("request to write {requested} bytes exceeds the {remaining} bytes left in entry {name:?}")]
    WriteBeyondSize {
        /// Name of the entry.
        name: String,
        /// Bytes passed to the write call.
        requested: usize,
        /// Bytes the entry still expects.
        remaining: u64,
    },

    /// A new entry was started while the previous one still expects data.
    #[error("entry {0:?} is still open")]
    EntryStillOpen(String),
}

impl TarError {
    /// Wrap an I/O error with a description of what was being done.
    pub(crate) fn archive(context: impl Into<String>, source: io::Error) -> Self {
        TarError::Archive {
            context: context.into(),
            source,
        }
    }
}

impl From<TarError> for io::Error {
    fn from(err: TarError) -> Self {
        match err {
            TarError::Io(e) => e,
            TarError::Truncated { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            TarError::Usage(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for tar archive operations.
pub type Result<T> = std::result::Result<T, TarError>;
