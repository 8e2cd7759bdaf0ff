use std::io;
use thiserror::Error;

/// Errors returned by [`SyncFile`](crate::SyncFile) operations.
///
/// Nothing is retried internally: every failure reaches the caller, and a
/// write that lands only partially is reported even though some bytes are
/// already in the file.
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be opened or created.
    #[error("failed to open file: {0}")]
    Open(#[source] io::Error),

    /// End of file could not be located before an append.
    #[error("failed to seek to end of file: {0}")]
    Seek(#[source] io::Error),

    /// The positional write itself failed.
    #[error("failed to write at offset {offset}: {source}")]
    Write {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Fewer bytes reached the file than were handed in.
    #[error("short write at offset {offset}: wrote {written} of {expected} bytes")]
    ShortWrite { offset: u64, written: usize, expected: usize },

    /// The bytes are in the file, but flushing them to the device failed.
    #[error("failed to sync file to storage: {0}")]
    Sync(#[source] io::Error),

    /// The positional read failed. A read cut short by end of file has a
    /// source of kind [`io::ErrorKind::UnexpectedEof`].
    #[error("failed to read {size} bytes at offset {offset}: {source}")]
    Read {
        offset: u64,
        size: usize,
        #[source]
        source: io::Error,
    },

    /// The file length could not be queried.
    #[error("failed to query file size: {0}")]
    Stat(#[source] io::Error),

    /// The OS reported an error while closing. The handle is released
    /// regardless.
    #[error("failed to close file: {0}")]
    Close(#[source] io::Error),

    /// The accessor was already closed.
    #[error("file is closed")]
    Closed,
}

impl Error {
    /// Whether this error means the accessor is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }

    /// Whether a read ran into end of file before filling its buffer.
    pub fn is_eof(&self) -> bool {
        match self {
            Error::Read { source, .. } => {
                source.kind() == io::ErrorKind::UnexpectedEof
            },
            _ => false,
        }
    }
}
