use crate::SyncMode;
use std::{
    io,
    mem,
    os::windows::ffi::OsStrExt,
    path::Path,
    ptr,
};
use winapi::{
    shared::{
        minwindef::{DWORD, FALSE, LPCVOID, LPDWORD, LPVOID},
        winerror::ERROR_HANDLE_EOF,
    },
    um::{
        errhandlingapi::GetLastError,
        fileapi::{
            CreateFileW,
            FlushFileBuffers,
            GetFileSizeEx,
            ReadFile,
            SetFilePointerEx,
            WriteFile,
            OPEN_ALWAYS,
        },
        handleapi::{CloseHandle, INVALID_HANDLE_VALUE},
        minwinbase::{LPOVERLAPPED, LPSECURITY_ATTRIBUTES, OVERLAPPED},
        winbase::FILE_END,
        winnt::{
            FILE_ATTRIBUTE_NORMAL,
            FILE_ATTRIBUTE_READONLY,
            FILE_SHARE_DELETE,
            FILE_SHARE_READ,
            FILE_SHARE_WRITE,
            GENERIC_READ,
            GENERIC_WRITE,
            HANDLE,
            LARGE_INTEGER,
            WCHAR,
        },
    },
};

/// A type representing a file handle on Windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDesc(HANDLE);

// A file handle may be used from any thread; the accessor's lock serializes
// every use of it.
unsafe impl Send for FileDesc {}
unsafe impl Sync for FileDesc {}

/// Path in the form `CreateFileW` wants it: wide and nul-terminated.
pub type NativePath = Vec<WCHAR>;

/// Converts a path into a nul-terminated wide string. Paths containing a
/// nul-char cannot be represented and are rejected with `InvalidInput`.
pub fn native_path(path: &Path) -> io::Result<NativePath> {
    let mut wide: Vec<WCHAR> = path.as_os_str().encode_wide().collect();
    if wide.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path cannot contain a nul-char",
        ));
    }
    wide.push(0);
    Ok(wide)
}

/// Overlapped struct carrying an explicit offset for a synchronous handle.
fn overlapped_at(offset: u64) -> OVERLAPPED {
    let mut overlapped: OVERLAPPED = unsafe { mem::zeroed() };
    unsafe {
        let refer = overlapped.u.s_mut();
        refer.Offset = offset as DWORD;
        refer.OffsetHigh = (offset >> 32) as DWORD;
    }
    overlapped
}

/// Largest chunk handed to a single `ReadFile`/`WriteFile` call.
fn chunk_len(len: usize) -> DWORD {
    len.min(DWORD::max_value() as usize) as DWORD
}

/// Opens a file for reading and writing. Creates it if it does not exist;
/// without the owner-write bit in `mode` the new file is read-only.
pub fn open(path: &NativePath, mode: u32) -> io::Result<FileDesc> {
    let attributes = if mode & 0o200 == 0 {
        FILE_ATTRIBUTE_READONLY
    } else {
        FILE_ATTRIBUTE_NORMAL
    };
    let handle = unsafe {
        CreateFileW(
            path.as_ptr(),
            GENERIC_READ | GENERIC_WRITE,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            ptr::null_mut() as LPSECURITY_ATTRIBUTES,
            OPEN_ALWAYS,
            attributes,
            ptr::null_mut(),
        )
    };

    if handle != INVALID_HANDLE_VALUE {
        Ok(FileDesc(handle))
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Moves the cursor to the end of the file and returns the new position.
pub fn seek_end(desc: FileDesc) -> io::Result<u64> {
    let mut pos: LARGE_INTEGER = unsafe { mem::zeroed() };
    let distance: LARGE_INTEGER = unsafe { mem::zeroed() };
    let res = unsafe { SetFilePointerEx(desc.0, distance, &mut pos, FILE_END) };
    if res == FALSE {
        Err(io::Error::last_os_error())
    } else {
        Ok(unsafe { *pos.QuadPart() } as u64)
    }
}

/// Writes the whole buffer at `offset`, moving the handle's file pointer
/// as a side effect (see [`read_at`]). Stops early only if the system
/// accepts zero bytes, in which case the returned count is smaller than the
/// buffer.
pub fn write_at(desc: FileDesc, buf: &[u8], offset: u64) -> io::Result<usize> {
    let mut written = 0;

    while written < buf.len() {
        let rest = &buf[written ..];
        let mut overlapped = overlapped_at(offset + written as u64);
        let mut count: DWORD = 0;
        let res = unsafe {
            WriteFile(
                desc.0,
                rest.as_ptr() as LPCVOID,
                chunk_len(rest.len()),
                &mut count as LPDWORD,
                &mut overlapped as LPOVERLAPPED,
            )
        };
        if res == FALSE {
            return Err(io::Error::last_os_error());
        }
        if count == 0 {
            break;
        }
        written += count as usize;
    }

    Ok(written)
}

/// Fills the buffer from `offset`. Returns fewer bytes than requested only
/// when end of file is reached.
///
/// Unlike `pread`, this moves the handle's file pointer. Nothing relies on
/// it: appends locate end of file with [`seek_end`] first.
pub fn read_at(desc: FileDesc, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut read = 0;

    while read < buf.len() {
        let rest = &mut buf[read ..];
        let mut overlapped = overlapped_at(offset + read as u64);
        let mut count: DWORD = 0;
        let res = unsafe {
            ReadFile(
                desc.0,
                rest.as_mut_ptr() as LPVOID,
                chunk_len(rest.len()),
                &mut count as LPDWORD,
                &mut overlapped as LPOVERLAPPED,
            )
        };
        if res == FALSE {
            if unsafe { GetLastError() } == ERROR_HANDLE_EOF {
                break;
            }
            return Err(io::Error::last_os_error());
        }
        if count == 0 {
            break;
        }
        read += count as usize;
    }

    Ok(read)
}

/// Flushes written data down to the storage device. Windows has no
/// data-only flush, so both modes behave the same.
pub fn sync(desc: FileDesc, _mode: SyncMode) -> io::Result<()> {
    let res = unsafe { FlushFileBuffers(desc.0) };
    if res == FALSE {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Current length of the file in bytes.
pub fn size(desc: FileDesc) -> io::Result<u64> {
    let mut size: LARGE_INTEGER = unsafe { mem::zeroed() };
    let res = unsafe { GetFileSizeEx(desc.0, &mut size) };
    if res == FALSE {
        Err(io::Error::last_os_error())
    } else {
        Ok(unsafe { *size.QuadPart() } as u64)
    }
}

/// Closes the file. The handle is released even if an error is reported,
/// so this must not be retried.
pub fn close(desc: FileDesc) -> io::Result<()> {
    let res = unsafe { CloseHandle(desc.0) };
    if res == FALSE {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
