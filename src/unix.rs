use crate::SyncMode;
use std::{
    ffi::CString,
    io,
    mem::MaybeUninit,
    os::unix::ffi::OsStrExt,
    path::Path,
};

/// A type representing file descriptor on Unix.
pub type FileDesc = libc::c_int;

/// Path in the form `open(2)` wants it.
pub type NativePath = CString;

/// Converts a path into a nul-terminated C string. Paths containing a
/// nul-byte cannot be represented and are rejected with `InvalidInput`.
pub fn native_path(path: &Path) -> io::Result<NativePath> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "path cannot contain a nul-byte",
        )
    })
}

fn cvt(res: libc::c_int) -> io::Result<libc::c_int> {
    if res == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(res)
    }
}

fn interrupted(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted
}

/// Opens a file for reading and writing. Creates it with the given
/// permission bits if it does not exist.
pub fn open(path: &NativePath, mode: u32) -> io::Result<FileDesc> {
    loop {
        let fd = unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_RDWR | libc::O_CLOEXEC | libc::O_CREAT,
                mode as libc::c_uint,
            )
        };
        match cvt(fd) {
            Err(ref err) if interrupted(err) => continue,
            res => return res,
        }
    }
}

/// Moves the cursor to the end of the file and returns the new position.
pub fn seek_end(fd: FileDesc) -> io::Result<u64> {
    let pos = unsafe { libc::lseek(fd, 0, libc::SEEK_END) };
    if pos < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(pos as u64)
    }
}

/// Writes the whole buffer at `offset` without touching the file cursor.
/// Stops early only if the system accepts zero bytes, in which case the
/// returned count is smaller than the buffer.
pub fn write_at(fd: FileDesc, buf: &[u8], offset: u64) -> io::Result<usize> {
    let mut written = 0;

    while written < buf.len() {
        let rest = &buf[written ..];
        let res = unsafe {
            libc::pwrite(
                fd,
                rest.as_ptr() as *const libc::c_void,
                rest.len(),
                (offset + written as u64) as libc::off_t,
            )
        };
        if res < 0 {
            let err = io::Error::last_os_error();
            if interrupted(&err) {
                continue;
            }
            return Err(err);
        }
        if res == 0 {
            break;
        }
        written += res as usize;
    }

    Ok(written)
}

/// Fills the buffer from `offset` without touching the file cursor. Returns
/// fewer bytes than requested only when end of file is reached.
pub fn read_at(fd: FileDesc, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut read = 0;

    while read < buf.len() {
        let rest = &mut buf[read ..];
        let res = unsafe {
            libc::pread(
                fd,
                rest.as_mut_ptr() as *mut libc::c_void,
                rest.len(),
                (offset + read as u64) as libc::off_t,
            )
        };
        if res < 0 {
            let err = io::Error::last_os_error();
            if interrupted(&err) {
                continue;
            }
            return Err(err);
        }
        if res == 0 {
            break;
        }
        read += res as usize;
    }

    Ok(read)
}

/// Flushes written data down to the storage device.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn sync(fd: FileDesc, _mode: SyncMode) -> io::Result<()> {
    // Plain fsync only reaches the drive cache here.
    cvt(unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) })?;
    Ok(())
}

/// Flushes written data down to the storage device.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn sync(fd: FileDesc, mode: SyncMode) -> io::Result<()> {
    loop {
        let res = match mode {
            SyncMode::All => unsafe { libc::fsync(fd) },
            SyncMode::Data => unsafe { libc::fdatasync(fd) },
        };
        match cvt(res) {
            Err(ref err) if interrupted(err) => continue,
            res => return res.map(drop),
        }
    }
}

/// Flushes written data down to the storage device.
#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android",
)))]
pub fn sync(fd: FileDesc, _mode: SyncMode) -> io::Result<()> {
    loop {
        match cvt(unsafe { libc::fsync(fd) }) {
            Err(ref err) if interrupted(err) => continue,
            res => return res.map(drop),
        }
    }
}

/// Current length of the file in bytes.
pub fn size(fd: FileDesc) -> io::Result<u64> {
    let mut stat = MaybeUninit::<libc::stat>::zeroed();
    cvt(unsafe { libc::fstat(fd, stat.as_mut_ptr()) })?;
    let stat = unsafe { stat.assume_init() };
    Ok(stat.st_size as u64)
}

/// Closes the file. The descriptor is released even if an error is
/// reported, so this must not be retried.
pub fn close(fd: FileDesc) -> io::Result<()> {
    cvt(unsafe { libc::close(fd) })?;
    Ok(())
}
