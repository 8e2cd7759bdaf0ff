use crate::{sys, Error, SyncFile};
use std::path::Path;

/// Permission bits used when a file is created and no mode is given.
pub const DEFAULT_MODE: u32 = 0o666;

/// How far a flush to the storage device goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// Flush data and metadata (`fsync`).
    All,
    /// Flush data and only the metadata needed to read it back
    /// (`fdatasync`). Falls back to [`SyncMode::All`] where the platform has
    /// no such call.
    Data,
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::All
    }
}

/// Options used to open a [`SyncFile`].
///
/// # Example
/// ```
/// # fn main() -> Result<(), syncfile::Error> {
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("journal.log");
/// use syncfile::{Options, SyncMode};
///
/// let file = Options::new()
///     .mode(0o600)
///     .sync_mode(SyncMode::Data)
///     .open(&path)?;
/// file.append(b"entry\n")?;
///
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    mode: u32,
    sync_mode: SyncMode,
}

impl Default for Options {
    fn default() -> Self {
        Self { mode: DEFAULT_MODE, sync_mode: SyncMode::default() }
    }
}

impl Options {
    /// Default options: mode `0o666`, [`SyncMode::All`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Permission bits for a newly created file. On Unix they are masked by
    /// the process umask. On Windows only the owner-write bit matters:
    /// without it the file is created read-only.
    pub fn mode(&mut self, mode: u32) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Flush used by durable writes and [`SyncFile::sync`].
    pub fn sync_mode(&mut self, sync_mode: SyncMode) -> &mut Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Opens the file at `path` for reading and writing, creating it if it
    /// does not exist. Parent directories are not created.
    pub fn open<P>(&self, path: P) -> Result<SyncFile, Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let native = sys::native_path(path).map_err(Error::Open)?;
        let desc = sys::open(&native, self.mode).map_err(Error::Open)?;
        tracing::debug!(
            path = %path.display(),
            mode = %format!("{:o}", self.mode),
            sync_mode = ?self.sync_mode,
            "opened file"
        );
        Ok(SyncFile::from_desc(desc, path.to_path_buf(), self.sync_mode))
    }
}
