use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

static BENCH_FILE: Mutex<Option<File>> = Mutex::new(None);

pub fn init(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    let mut guard = BENCH_FILE.lock().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(file);

    if let Some(f) = guard.as_mut() {
        writeln!(f, "handler,block_height,event_index,message_count,handle_ms")?;
    }

    Ok(())
}

pub fn record(
    handler: &str,
    block_height: u64,
    event_index: u32,
    message_count: usize,
    handle_time: Duration,
) {
    let mut guard = BENCH_FILE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(f) = guard.as_mut() {
        let _ = writeln!(
            f,
            "{},{},{},{},{}",
            handler,
            block_height,
            event_index,
            message_count,
            handle_time.as_millis()
        );
        let _ = f.flush();
    }
}
