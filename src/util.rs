use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .try_init();
    });
}

/// Host parallelism, at least 1.
pub fn host_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Best-effort removal for temporary artifacts; a missing file is fine.
pub fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
    }
}

/// Rename `tmp` over `dest`, retrying briefly on transient sharing errors,
/// then falling back to copy + remove (cross-device spill dirs).
pub fn replace_file_atomic(tmp: &Path, dest: &Path) -> Result<()> {
    let mut last: Option<io::Error> = None;
    for attempt in 0..5u64 {
        match fs::rename(tmp, dest) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                last = Some(e);
                sleep(Duration::from_millis(20 * (attempt + 1)));
            }
            Err(e) => {
                last = Some(e);
                break;
            }
        }
    }
    tracing::debug!(
        "rename {} -> {} failed ({:?}); copying instead",
        tmp.display(),
        dest.display(),
        last
    );
    fs::copy(tmp, dest).with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    remove_quietly(tmp);
    Ok(())
}
