//! Common utilities for strata-cmd

use anyhow::Result;
use std::path::Path;

/// Checks if a file exists and is readable
pub fn validate_file_exists(path: &str) -> Result<()> {
    let file_path = Path::new(path);
    if !file_path.exists() {
        anyhow::bail!("File does not exist: {}", path);
    }
    if !file_path.is_file() {
        anyhow::bail!("Path is not a file: {}", path);
    }
    Ok(())
}

/// Checks that an output file may be written: it must not be a directory, and must
/// not exist unless `overwrite` is set.
pub fn validate_output_path(path: &str, overwrite: bool) -> Result<()> {
    let file_path = Path::new(path);
    if file_path.is_dir() {
        anyhow::bail!("Output path is a directory: {}", path);
    }
    if file_path.exists() && !overwrite {
        anyhow::bail!("Output file already exists (use --overwrite): {}", path);
    }
    Ok(())
}
