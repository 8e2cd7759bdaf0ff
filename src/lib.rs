//! A file accessor that many threads can append to and read from at once.
//!
//! # Types
//! The main type is [`SyncFile`]. It owns a single OS file handle behind a
//! reader-writer lock: appends, positional writes, syncs and close take the
//! lock exclusively, reads share it. The end-of-file offset is located and
//! written to inside one critical section, so concurrent appends never land
//! on top of each other. Nothing is framed or indexed; callers keep the
//! offsets returned by writes if they need them.
//!
//! # Example
//! ```
//! use syncfile::SyncFile;
//! fn main() -> Result<(), syncfile::Error> {
//! #   let dir = tempfile::tempdir().unwrap();
//! #   let path = dir.path().join("journal.log");
//!
//!     let file = SyncFile::open(&path, 0o644)?;
//!     let first = file.append(b"1234567890")?;
//!     let second = file.append(b"abc")?;
//!     assert_eq!((first.offset, first.len), (0, 10));
//!     assert_eq!((second.offset, second.len), (10, 3));
//!     assert_eq!(file.read_all()?, b"1234567890abc");
//!     file.close()?;
//!
//!     Ok(())
//! }
//! ```

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use crate::unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use crate::windows as sys;

mod error;
mod options;

#[cfg(test)]
mod test;

pub use crate::{
    error::Error,
    options::{Options, SyncMode, DEFAULT_MODE},
};

use parking_lot::RwLock;
use std::{
    convert::TryFrom,
    fmt,
    io,
    path::{Path, PathBuf},
};

/// Where a write landed: `len` bytes starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    /// Byte offset of the first written byte.
    pub offset: u64,
    /// Number of bytes written.
    pub len: usize,
}

impl Extent {
    /// Offset right past the written bytes. Saturates at `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.len as u64)
    }
}

/// A file handle shared between threads. Appends are serialized and reads
/// run concurrently against a stable view of the file. Once closed, every
/// operation fails with [`Error::Closed`].
///
/// Share it with [`std::sync::Arc`].
///
/// # Example
/// ```
/// # fn main() -> Result<(), syncfile::Error> {
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("shared.log");
/// use std::{sync::Arc, thread};
/// use syncfile::SyncFile;
///
/// let file = Arc::new(SyncFile::open(&path, 0o644)?);
/// let handles: Vec<_> = (0 .. 4)
///     .map(|i| {
///         let file = Arc::clone(&file);
///         thread::spawn(move || file.append(format!("<{}>", i).as_bytes()))
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap()?;
/// }
/// assert_eq!(file.len()?, 12);
///
/// # Ok(())
/// # }
/// ```
pub struct SyncFile {
    /// `None` once closed.
    desc: RwLock<Option<sys::FileDesc>>,
    path: PathBuf,
    sync_mode: SyncMode,
}

impl fmt::Debug for SyncFile {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("SyncFile")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SyncFile {
    /// Opens the file at `path` for reading and writing, creating it with
    /// permission bits `mode` if it does not exist. See [`Options`] for more
    /// control.
    ///
    /// # Example
    ///
    /// ```
    /// # fn main() -> Result<(), syncfile::Error> {
    /// # let dir = tempfile::tempdir().unwrap();
    /// # let path = dir.path().join("journal.log");
    /// use syncfile::SyncFile;
    ///
    /// let file = SyncFile::open(&path, 0o600)?;
    ///
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P>(path: P, mode: u32) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Options::new().mode(mode).open(path)
    }

    pub(crate) fn from_desc(
        desc: sys::FileDesc,
        path: PathBuf,
        sync_mode: SyncMode,
    ) -> Self {
        Self { desc: RwLock::new(Some(desc)), path, sync_mode }
    }

    /// Path this file was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether [`SyncFile::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.desc.read().is_none()
    }

    /// Appends `buf` at the current end of file and flushes it to the
    /// storage device before returning. Concurrent appends are serialized:
    /// each one observes a distinct end-of-file offset.
    ///
    /// # Example
    ///
    /// ```
    /// # fn main() -> Result<(), syncfile::Error> {
    /// # let dir = tempfile::tempdir().unwrap();
    /// # let path = dir.path().join("journal.log");
    /// use syncfile::SyncFile;
    ///
    /// let file = SyncFile::open(&path, 0o644)?;
    /// let extent = file.append(b"hello\n")?;
    /// assert_eq!(extent.offset, 0);
    /// assert_eq!(file.append(b"world\n")?.offset, extent.end());
    ///
    /// # Ok(())
    /// # }
    /// ```
    pub fn append(&self, buf: &[u8]) -> Result<Extent, Error> {
        self.write_end(buf, true)
    }

    /// Same as [`SyncFile::append`], but the bytes may still sit in OS
    /// buffers when this returns. Call [`SyncFile::sync`] to make a batch of
    /// these durable.
    pub fn append_no_sync(&self, buf: &[u8]) -> Result<Extent, Error> {
        self.write_end(buf, false)
    }

    /// Writes `buf` at byte `offset` and flushes it to the storage device.
    /// A negative offset means the current end of file. Writing past the
    /// end leaves a hole that reads back as zeros.
    ///
    /// # Example
    ///
    /// ```
    /// # fn main() -> Result<(), syncfile::Error> {
    /// # let dir = tempfile::tempdir().unwrap();
    /// # let path = dir.path().join("journal.log");
    /// use syncfile::SyncFile;
    ///
    /// let file = SyncFile::open(&path, 0o644)?;
    /// file.append(b"AAAA____BBBB")?;
    /// file.write_at(b"XXXX", 4)?;
    /// assert_eq!(file.read_all()?, b"AAAAXXXXBBBB");
    ///
    /// # Ok(())
    /// # }
    /// ```
    pub fn write_at(&self, buf: &[u8], offset: i64) -> Result<Extent, Error> {
        match u64::try_from(offset) {
            Ok(offset) => self.write_pos(buf, offset, true),
            Err(_) => self.write_end(buf, true),
        }
    }

    /// Same as [`SyncFile::write_at`] without the flush.
    pub fn write_at_no_sync(
        &self,
        buf: &[u8],
        offset: i64,
    ) -> Result<Extent, Error> {
        match u64::try_from(offset) {
            Ok(offset) => self.write_pos(buf, offset, false),
            Err(_) => self.write_end(buf, false),
        }
    }

    fn write_end(&self, buf: &[u8], durable: bool) -> Result<Extent, Error> {
        let guard = self.desc.write();
        let desc = (*guard).ok_or(Error::Closed)?;
        let offset = sys::seek_end(desc).map_err(Error::Seek)?;
        self.write_locked(desc, buf, offset, durable)
    }

    fn write_pos(
        &self,
        buf: &[u8],
        offset: u64,
        durable: bool,
    ) -> Result<Extent, Error> {
        let guard = self.desc.write();
        let desc = (*guard).ok_or(Error::Closed)?;
        self.write_locked(desc, buf, offset, durable)
    }

    /// Caller must hold the write lock.
    fn write_locked(
        &self,
        desc: sys::FileDesc,
        buf: &[u8],
        offset: u64,
        durable: bool,
    ) -> Result<Extent, Error> {
        let written = sys::write_at(desc, buf, offset)
            .map_err(|source| Error::Write { offset, source })?;
        if written != buf.len() {
            return Err(Error::ShortWrite {
                offset,
                written,
                expected: buf.len(),
            });
        }
        if durable {
            sys::sync(desc, self.sync_mode).map_err(Error::Sync)?;
        }
        tracing::trace!(offset, len = written, durable, "wrote");
        Ok(Extent { offset, len: written })
    }

    /// Reads exactly `size` bytes starting at `offset`. Readers run
    /// concurrently with each other and wait for any write in progress.
    /// Reading past end of file is an error (see [`Error::is_eof`]).
    ///
    /// # Example
    ///
    /// ```
    /// # fn main() -> Result<(), syncfile::Error> {
    /// # let dir = tempfile::tempdir().unwrap();
    /// # let path = dir.path().join("journal.log");
    /// use syncfile::SyncFile;
    ///
    /// let file = SyncFile::open(&path, 0o644)?;
    /// let extent = file.append(b"key=value")?;
    /// assert_eq!(file.read(5, extent.offset + 4)?, b"value");
    /// assert!(file.read(1, extent.end()).unwrap_err().is_eof());
    ///
    /// # Ok(())
    /// # }
    /// ```
    pub fn read(&self, size: usize, offset: u64) -> Result<Vec<u8>, Error> {
        let guard = self.desc.read();
        let desc = (*guard).ok_or(Error::Closed)?;
        // Must precede the allocation.
        check_in_bounds(desc, size, offset)?;
        let mut buf = vec![0; size];
        read_locked(desc, &mut buf, offset)?;
        Ok(buf)
    }

    /// Fills `buf` with the bytes starting at `offset`, so a caller can
    /// reuse one buffer across reads.
    pub fn read_into(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        let guard = self.desc.read();
        let desc = (*guard).ok_or(Error::Closed)?;
        check_in_bounds(desc, buf.len(), offset)?;
        read_locked(desc, buf, offset)
    }

    /// Reads the whole file. The length is taken and the bytes are read
    /// under one hold of the read lock, so the result never contains part of
    /// a concurrent append. An empty file gives an empty vector.
    pub fn read_all(&self) -> Result<Vec<u8>, Error> {
        let guard = self.desc.read();
        let desc = (*guard).ok_or(Error::Closed)?;
        let size = sys::size(desc).map_err(Error::Stat)?;
        if size == 0 {
            return Ok(Vec::new());
        }
        let size = usize::try_from(size).map_err(|_| {
            Error::Stat(io::Error::new(
                io::ErrorKind::InvalidData,
                "file does not fit in memory",
            ))
        })?;
        let mut buf = vec![0; size];
        read_locked(desc, &mut buf, 0)?;
        Ok(buf)
    }

    /// Current length of the file, i.e. the offset the next append lands
    /// at if nothing else writes first.
    pub fn len(&self) -> Result<u64, Error> {
        let guard = self.desc.read();
        let desc = (*guard).ok_or(Error::Closed)?;
        sys::size(desc).map_err(Error::Stat)
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Flushes everything written so far to the storage device.
    pub fn sync(&self) -> Result<(), Error> {
        let guard = self.desc.write();
        let desc = (*guard).ok_or(Error::Closed)?;
        sys::sync(desc, self.sync_mode).map_err(Error::Sync)?;
        tracing::trace!("synced");
        Ok(())
    }

    /// Closes the handle. Afterwards every operation, including another
    /// `close`, fails with [`Error::Closed`]. If the OS reports an error the
    /// handle is released all the same.
    ///
    /// # Example
    ///
    /// ```
    /// # fn main() -> Result<(), syncfile::Error> {
    /// # let dir = tempfile::tempdir().unwrap();
    /// # let path = dir.path().join("journal.log");
    /// use syncfile::{Error, SyncFile};
    ///
    /// let file = SyncFile::open(&path, 0o644)?;
    /// file.close()?;
    /// assert!(matches!(file.append(b"late"), Err(Error::Closed)));
    ///
    /// # Ok(())
    /// # }
    /// ```
    pub fn close(&self) -> Result<(), Error> {
        let mut guard = self.desc.write();
        let desc = guard.take().ok_or(Error::Closed)?;
        tracing::debug!(path = %self.path.display(), "closing file");
        sys::close(desc).map_err(Error::Close)
    }
}

/// Fails with a short-read error when `size` bytes from `offset` would run
/// past end of file. Caller must hold the lock, in either mode.
fn check_in_bounds(
    desc: sys::FileDesc,
    size: usize,
    offset: u64,
) -> Result<(), Error> {
    if size == 0 {
        return Ok(());
    }
    let len = sys::size(desc).map_err(Error::Stat)?;
    let end = u64::try_from(size)
        .ok()
        .and_then(|size| offset.checked_add(size));
    match end {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::Read {
            offset,
            size,
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range past end of file ({} bytes)", len),
            ),
        }),
    }
}

/// Caller must hold the lock, in either mode.
fn read_locked(
    desc: sys::FileDesc,
    buf: &mut [u8],
    offset: u64,
) -> Result<(), Error> {
    let size = buf.len();
    let read = sys::read_at(desc, buf, offset)
        .map_err(|source| Error::Read { offset, size, source })?;
    if read != size {
        return Err(Error::Read {
            offset,
            size,
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read {} of {} bytes", read, size),
            ),
        });
    }
    Ok(())
}

impl Drop for SyncFile {
    fn drop(&mut self) {
        if let Some(desc) = self.desc.get_mut().take() {
            let _ = sys::close(desc);
        }
    }
}
