use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Per-asset filesystem mutex. `create_new` is the atomic primitive: whoever
/// creates the lock file owns the asset until the guard drops.
pub struct AssetLock {
    path: PathBuf,
}

impl AssetLock {
    /// Ok(Some) when acquired, Ok(None) when another process holds it.
    pub fn acquire(dir: &Path, asset: &str) -> io::Result<Option<Self>> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.lock", asset));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                debug!(?path, "asset lock acquired");
                Ok(Some(Self { path }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for AssetLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = ?self.path, "failed to release asset lock: {}", e);
        }
    }
}
