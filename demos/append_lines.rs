use std::{
    env,
    error::Error,
    io::{self, BufRead},
    process,
};
use syncfile::SyncFile;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut args = env::args();
    args.next();

    let path = match args.next() {
        Some(arg) if args.next().is_none() => arg,
        _ => {
            eprintln!("Expected one argument");
            process::exit(1);
        },
    };

    let file = SyncFile::open(&path, 0o644)?;

    for line in io::stdin().lock().lines() {
        let mut line = line?;
        line.push('\n');
        let extent = file.append(line.as_bytes())?;
        println!("{} {}", extent.offset, extent.len);
    }

    file.close()?;
    Ok(())
}
