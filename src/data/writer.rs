//! Output persistence

use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// Write rows as CSV with a header, creating parent directories
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "Wrote table");
    Ok(())
}

/// Write a value as pretty JSON, creating parent directories
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
