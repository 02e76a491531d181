//! Recorded state files
//!
//! The manager pins its expectations (root partition UUID, default entry) in
//! small plain-text files under the configuration directory. Each file holds a
//! single value followed by a newline.

use crate::{ConfigError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Read a recorded value, `None` if the file does not exist.
///
/// The trailing newline is stripped; any other whitespace is kept so that the
/// comparison against the detected value stays byte-for-byte.
pub fn read_record(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let value = content.strip_suffix('\n').unwrap_or(&content);
            Ok(Some(value.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::io(path, e)),
    }
}

/// Persist a recorded value, replacing any previous one.
pub fn write_record(path: &Path, value: &str) -> Result<()> {
    debug!(path = %path.display(), value, "Writing record");
    write_atomic(path, &format!("{}\n", value))
}

/// Replace `path` with `contents` through a temporary file and a rename.
///
/// The temporary file lives next to the target so the rename never crosses a
/// filesystem. Permissions of an existing target are carried over.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ConfigError::io(dir, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| ConfigError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ConfigError::io(tmp.path(), e))?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions())
            .map_err(|e| ConfigError::io(tmp.path(), e))?;
    }

    tmp.persist(path).map_err(|e| ConfigError::io(path, e.error))?;
    Ok(())
}
