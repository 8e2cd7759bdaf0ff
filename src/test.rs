use crate::{Error, Extent, Options, SyncFile, SyncMode};
use std::{
    collections::HashSet,
    io,
    path::PathBuf,
    sync::{Arc, Barrier},
    thread,
};
use tempfile::TempDir;

fn scratch(name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join(name);
    (dir, path)
}

#[test]
fn append_then_reopen() -> Result<(), Error> {
    let (_dir, path) = scratch("append_then_reopen.log");

    let file = SyncFile::open(&path, 0o666)?;
    assert_eq!(file.append(b"1234567890")?, Extent { offset: 0, len: 10 });
    assert_eq!(file.append(b"abc")?, Extent { offset: 10, len: 3 });
    assert_eq!(file.read_all()?, b"1234567890abc");
    file.close()?;

    let file = SyncFile::open(&path, 0o666)?;
    assert_eq!(file.read_all()?, b"1234567890abc");
    assert_eq!(file.append(b"d")?.offset, 13);
    Ok(())
}

#[test]
fn offsets_follow_appended_lengths() -> Result<(), Error> {
    let (_dir, path) = scratch("offsets.log");
    let file = SyncFile::open(&path, 0o666)?;

    let mut expected = 0;
    for len in [1usize, 7, 0, 128, 3, 4096, 2].iter().copied() {
        let extent = file.append(&vec![b'x'; len])?;
        assert_eq!(extent.offset, expected);
        assert_eq!(extent.len, len);
        expected = extent.end();
    }
    assert_eq!(file.len()?, expected);
    Ok(())
}

#[test]
fn read_all_empty() -> Result<(), Error> {
    let (_dir, path) = scratch("empty.log");
    let file = SyncFile::open(&path, 0o666)?;

    assert_eq!(file.read_all()?, Vec::<u8>::new());
    assert!(file.is_empty()?);
    Ok(())
}

#[test]
fn read_range() -> Result<(), Error> {
    let (_dir, path) = scratch("read_range.log");
    let file = SyncFile::open(&path, 0o666)?;
    file.append(b"first\n")?;
    let second = file.append(b"second\n")?;

    assert_eq!(file.read(second.len, second.offset)?, b"second\n");
    assert_eq!(file.read(0, 1000)?, Vec::<u8>::new());

    let mut buf = [0; 5];
    file.read_into(&mut buf, 0)?;
    assert_eq!(&buf, b"first");
    Ok(())
}

#[test]
fn read_past_end() -> Result<(), Error> {
    let (_dir, path) = scratch("read_past_end.log");
    let file = SyncFile::open(&path, 0o666)?;
    file.append(b"abc")?;

    match file.read(5, 0) {
        Err(Error::Read { offset: 0, size: 5, source }) => {
            assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
        },
        other => panic!("expected a short read, got {:?}", other),
    }
    assert!(file.read(1, 3).unwrap_err().is_eof());
    Ok(())
}

#[test]
fn read_huge_range_is_eof() -> Result<(), Error> {
    let (_dir, path) = scratch("read_huge.log");
    let file = SyncFile::open(&path, 0o666)?;
    file.append(b"abc")?;

    assert!(file.read(usize::MAX, 0).unwrap_err().is_eof());
    assert!(file.read(1 << 40, 0).unwrap_err().is_eof());
    assert!(file.read(2, u64::MAX).unwrap_err().is_eof());
    assert!(file.read(1, 1 << 50).unwrap_err().is_eof());
    assert!(file.read_into(&mut [0u8; 4], u64::MAX - 1).unwrap_err().is_eof());
    assert_eq!(file.read(3, 0)?, b"abc");
    Ok(())
}

#[test]
fn extent_end_saturates() {
    let extent = Extent { offset: u64::MAX - 1, len: 10 };
    assert_eq!(extent.end(), u64::MAX);
    assert_eq!(Extent { offset: 4, len: 3 }.end(), 7);
}

#[test]
fn write_at_overwrites() -> Result<(), Error> {
    let (_dir, path) = scratch("write_at.log");
    let file = SyncFile::open(&path, 0o666)?;
    file.append(b"AAAA____BBBB")?;

    assert_eq!(file.write_at(b"XXXX", 4)?, Extent { offset: 4, len: 4 });
    assert_eq!(file.read_all()?, b"AAAAXXXXBBBB");
    assert_eq!(file.write_at(b"CC", -1)?, Extent { offset: 12, len: 2 });
    assert_eq!(file.read_all()?, b"AAAAXXXXBBBBCC");
    Ok(())
}

#[test]
fn write_at_past_end_fills_zeros() -> Result<(), Error> {
    let (_dir, path) = scratch("hole.log");
    let file = SyncFile::open(&path, 0o666)?;
    file.append(b"ab")?;

    file.write_at_no_sync(b"z", 5)?;
    file.sync()?;
    assert_eq!(file.read_all()?, b"ab\0\0\0z");
    assert_eq!(file.append(b"!")?.offset, 6);
    Ok(())
}

#[test]
fn no_sync_appends_survive_reopen() -> Result<(), Error> {
    let (_dir, path) = scratch("no_sync.log");
    let file = Options::new().sync_mode(SyncMode::Data).open(&path)?;

    for i in 0 .. 10 {
        file.append_no_sync(format!("{}\n", i).as_bytes())?;
    }
    file.sync()?;
    file.close()?;

    let file = SyncFile::open(&path, 0o666)?;
    assert_eq!(file.read_all()?, b"0\n1\n2\n3\n4\n5\n6\n7\n8\n9\n");
    Ok(())
}

#[test]
fn drop_closes() -> Result<(), Error> {
    let (_dir, path) = scratch("drop.log");
    {
        let file = SyncFile::open(&path, 0o666)?;
        file.append(b"kept")?;
    }
    let file = SyncFile::open(&path, 0o666)?;
    assert_eq!(file.read_all()?, b"kept");
    Ok(())
}

#[test]
fn closed_operations_fail() -> Result<(), Error> {
    let (_dir, path) = scratch("closed.log");
    let file = SyncFile::open(&path, 0o666)?;
    file.append(b"data")?;
    assert!(!file.is_closed());
    file.close()?;
    assert!(file.is_closed());

    assert!(matches!(file.append(b"x"), Err(Error::Closed)));
    assert!(matches!(file.append_no_sync(b"x"), Err(Error::Closed)));
    assert!(matches!(file.write_at(b"x", 0), Err(Error::Closed)));
    assert!(matches!(file.write_at(b"x", -1), Err(Error::Closed)));
    assert!(matches!(file.write_at_no_sync(b"x", 0), Err(Error::Closed)));
    assert!(matches!(file.read(1, 0), Err(Error::Closed)));
    assert!(matches!(file.read_into(&mut [0u8; 1], 0), Err(Error::Closed)));
    assert!(matches!(file.read_all(), Err(Error::Closed)));
    assert!(matches!(file.len(), Err(Error::Closed)));
    assert!(matches!(file.sync(), Err(Error::Closed)));
    assert!(file.close().unwrap_err().is_closed());
    Ok(())
}

#[test]
fn open_in_missing_directory() {
    let (_dir, path) = scratch("missing");
    let path = path.join("file.log");

    match SyncFile::open(&path, 0o666) {
        Err(Error::Open(err)) => {
            assert_eq!(err.kind(), io::ErrorKind::NotFound)
        },
        other => panic!("expected an open error, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn open_rejects_nul_in_path() {
    match SyncFile::open("bad\0name.log", 0o666) {
        Err(Error::Open(err)) => {
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput)
        },
        other => panic!("expected an open error, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn open_applies_mode() -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, path) = scratch("mode.log");
    let _file = SyncFile::open(&path, 0o600)?;

    let meta = std::fs::metadata(&path).map_err(Error::Open)?;
    assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    Ok(())
}

#[test]
fn concurrent_appends_do_not_interleave() -> Result<(), Error> {
    const THREADS: usize = 16;
    const PER_THREAD: usize = 50;
    const TAG_LEN: usize = 10;

    let (_dir, path) = scratch("interleave.log");
    let file = Arc::new(SyncFile::open(&path, 0o666)?);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0 .. THREADS)
        .map(|t| {
            let file = Arc::clone(&file);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<Vec<Extent>, Error> {
                barrier.wait();
                let mut extents = Vec::with_capacity(PER_THREAD);
                for i in 0 .. PER_THREAD {
                    let tag = format!("<{:02}:{:05}>", t, i);
                    assert_eq!(tag.len(), TAG_LEN);
                    extents.push(file.append_no_sync(tag.as_bytes())?);
                }
                Ok(extents)
            })
        })
        .collect();

    let mut offsets = HashSet::new();
    for handle in handles {
        for extent in handle.join().expect("appender panicked")? {
            assert_eq!(extent.len, TAG_LEN);
            assert_eq!(extent.offset % TAG_LEN as u64, 0);
            assert!(offsets.insert(extent.offset));
        }
    }
    file.sync()?;

    let data = file.read_all()?;
    assert_eq!(data.len(), THREADS * PER_THREAD * TAG_LEN);

    let mut tags = HashSet::new();
    for chunk in data.chunks(TAG_LEN) {
        let tag = std::str::from_utf8(chunk).expect("tag is not utf-8");
        assert!(tag.starts_with('<') && tag.ends_with('>'), "torn tag {}", tag);
        assert!(tags.insert(tag.to_owned()), "duplicate tag {}", tag);
    }
    for t in 0 .. THREADS {
        for i in 0 .. PER_THREAD {
            assert!(tags.contains(&format!("<{:02}:{:05}>", t, i)));
        }
    }
    Ok(())
}

#[test]
fn reads_stay_stable_during_appends() -> Result<(), Error> {
    const TAG: &[u8] = b" 42 ";
    const PREFIX: &[u8] = b"1234567890";

    let (_dir, path) = scratch("stable.log");
    let file = Arc::new(SyncFile::open(&path, 0o666)?);
    file.append(PREFIX)?;

    let mut handles = Vec::new();
    for _ in 0 .. 8 {
        let writer = Arc::clone(&file);
        handles.push(thread::spawn(move || -> Result<(), Error> {
            for _ in 0 .. 20 {
                writer.append(TAG)?;
            }
            Ok(())
        }));

        let reader = Arc::clone(&file);
        handles.push(thread::spawn(move || -> Result<(), Error> {
            for _ in 0 .. 20 {
                assert_eq!(reader.read(PREFIX.len(), 0)?, PREFIX);

                let data = reader.read_all()?;
                assert!(data.starts_with(PREFIX));
                let rest = &data[PREFIX.len() ..];
                assert_eq!(rest.len() % TAG.len(), 0, "torn append visible");
                assert!(rest.chunks(TAG.len()).all(|chunk| chunk == TAG));
            }
            Ok(())
        }));
    }

    for handle in handles {
        handle.join().expect("worker panicked")?;
    }
    assert_eq!(file.len()?, (PREFIX.len() + 8 * 20 * TAG.len()) as u64);
    Ok(())
}

#[test]
fn close_races_with_appends() -> Result<(), Error> {
    let (_dir, path) = scratch("close_race.log");
    let file = Arc::new(SyncFile::open(&path, 0o666)?);

    let appender = {
        let file = Arc::clone(&file);
        thread::spawn(move || {
            let mut ok = 0u64;
            loop {
                match file.append_no_sync(b"xy") {
                    Ok(extent) => {
                        assert_eq!(extent.offset, ok * 2);
                        ok += 1;
                    },
                    Err(Error::Closed) => return ok,
                    Err(err) => panic!("unexpected error: {}", err),
                }
            }
        })
    };

    thread::yield_now();
    file.close()?;
    let appended = appender.join().expect("appender panicked");

    let file = SyncFile::open(&path, 0o666)?;
    assert_eq!(file.len()?, appended * 2);
    Ok(())
}
