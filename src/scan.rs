use std::path::{Path, PathBuf};

use globwalk::{FileType, GlobWalkerBuilder};
use tracing::debug;

use crate::error::{AppError, Result};

/// Files to process: the path itself, or the regular files directly inside a
/// directory sorted by name, starting at the 1-based `start` entry.
pub fn targets(path: &Path, start: usize) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(AppError::PathError(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let walker = GlobWalkerBuilder::new(path, "*")
        .max_depth(1)
        .file_type(FileType::FILE)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .build()?;

    let mut files = Vec::new();
    for entry in walker {
        files.push(entry?.into_path());
    }
    debug!("found {} files in {}", files.len(), path.display());

    Ok(files.into_iter().skip(start.saturating_sub(1)).collect())
}
