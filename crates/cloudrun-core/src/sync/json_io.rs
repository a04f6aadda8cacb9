//! Reading and writing JSON files on the local disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ValidationError};
use crate::sync::types::JsonFile;

/// Parse every file as a JSON object. The file name becomes [`JsonFile::name`].
///
/// # Errors
/// Fails on the first file that cannot be read or does not hold a JSON object.
pub fn read_json_files(paths: &[PathBuf]) -> Result<Vec<JsonFile>> {
    paths.iter().map(|path| read_json_file(path)).collect()
}

fn read_json_file(path: &Path) -> Result<JsonFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content = fs::read_to_string(path)?;
    let object: serde_json::Value = serde_json::from_str(&content)?;
    if !object.is_object() {
        return Err(ValidationError::NotAnObject(name).into());
    }
    Ok(JsonFile { name, object })
}

/// Write each file into `dir` as pretty JSON and return the written paths in order.
pub fn write_json_files(dir: &Path, files: &[JsonFile]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = dir.join(&file.name);
        fs::write(&path, serde_json::to_string_pretty(&file.object)?)?;
        written.push(path);
    }
    Ok(written)
}
