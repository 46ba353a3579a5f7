//! Writing the normalized document to disk.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::Result;

/// Write `content` to `path` as UTF-8, replacing any existing file.
///
/// The text goes to a sibling temp file first and is renamed into place, so
/// a failed write leaves the previous file (or nothing) behind.
pub fn write_output(path: impl AsRef<Path>, content: &str) -> Result<()> {
    let path = path.as_ref();
    let tmp = temp_path(path);
    if let Err(e) = fs::write(&tmp, content) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    info!("wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(".partial");
    path.with_file_name(name)
}
