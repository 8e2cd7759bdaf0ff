use std::{env, error::Error, io, sync::Arc, thread};
use syncfile::{Options, SyncMode};
use tracing_subscriber::EnvFilter;

const WRITERS: usize = 8;
const RECORDS: usize = 100;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let path = env::args().nth(1).unwrap_or_else(|| "concurrent.log".into());
    let file = Arc::new(Options::new().sync_mode(SyncMode::Data).open(&path)?);

    let writers: Vec<_> = (0 .. WRITERS)
        .map(|w| {
            let file = Arc::clone(&file);
            thread::spawn(move || -> Result<(), syncfile::Error> {
                for r in 0 .. RECORDS {
                    file.append_no_sync(format!("{} {}\n", w, r).as_bytes())?;
                }
                Ok(())
            })
        })
        .collect();

    for writer in writers {
        writer.join().expect("writer panicked")?;
    }
    file.sync()?;

    let data = file.read_all()?;
    let lines = data.split(|&byte| byte == b'\n').filter(|l| !l.is_empty());
    println!("{} bytes, {} records", data.len(), lines.count());

    file.close()?;
    Ok(())
}
