//! Scoped temp files for uploads and transcoder output.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

/// Name prefix of every temp file the pipeline creates. [`sweep_stale`]
/// only ever deletes files carrying it.
pub const TEMP_PREFIX: &str = "voicedesc-";

/// A uniquely named audio file removed from disk when dropped.
#[derive(Debug)]
pub struct TempAudio {
    file: NamedTempFile,
}

impl TempAudio {
    /// Creates an empty file in `dir` named `voicedesc-XXXX.<suffix>`.
    pub fn create(dir: &Path, suffix: &str) -> io::Result<Self> {
        let file = Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&format!(".{suffix}"))
            .tempfile_in(dir)?;
        Ok(Self { file })
    }

    /// Writes `bytes` to a new temp file and syncs it to disk before
    /// returning, so the file is complete when read back by path.
    pub fn persist(dir: &Path, suffix: &str, bytes: &[u8]) -> io::Result<Self> {
        let mut temp = Self::create(dir, suffix)?;
        let file = temp.file.as_file_mut();
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
        Ok(temp)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Deletes `voicedesc-*` files in `dir` last modified more than `max_age`
/// ago. Returns how many were removed.
///
/// Per-file failures are logged and skipped.
pub fn sweep_stale(dir: &Path, max_age: Duration) -> io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "sweep: read entry");
                continue;
            }
        };
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        let path: PathBuf = entry.path();
        let modified = match entry.metadata().and_then(|m| {
            if m.is_file() {
                m.modified().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "sweep: stat");
                continue;
            }
        };

        // Files from the future count as fresh.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "sweep: removed stale file");
                removed += 1;
            }
            // Lost a race with the owning request's own cleanup.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "sweep: remove"),
        }
    }
    Ok(removed)
}
