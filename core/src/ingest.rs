//! Input discovery and raw record loading.
//!
//! An input path is either one export file or a directory of them. Files
//! are JSON arrays of exporter records; the wrapper key some exports put
//! around each payload is the normalizer's concern, not ours. Unreadable
//! or unparseable files are fatal before any batch is dispatched, while a
//! malformed record inside a well-formed file is a per-record skip later.

use crate::error::{AmlError, AmlResult};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Expand an input path into the ordered list of export files to process.
pub fn discover(input: &Path) -> AmlResult<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(AmlError::Config(format!(
            "input path {} is neither a file nor a directory",
            input.display()
        )));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(AmlError::Config(format!(
            "no .json export files under {}",
            input.display()
        )));
    }
    Ok(files)
}

/// Load one export file into its raw records. Accepts a JSON array of
/// records or, as the source exports occasionally do, a single bare object.
pub fn load_records(path: &Path) -> AmlResult<Vec<Value>> {
    let text = std::fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&text)
        .map_err(|e| AmlError::Config(format!("cannot parse {}: {e}", path.display())))?;
    match parsed {
        Value::Array(records) => Ok(records),
        object @ Value::Object(_) => Ok(vec![object]),
        other => Err(AmlError::Config(format!(
            "{} is not a JSON array of records (found {})",
            path.display(),
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_sorted_json_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "[]").unwrap();
        fs::write(dir.path().join("a.json"), "[]").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let files = discover(dir.path()).unwrap();
        let names: Vec<_> =
            files.iter().map(|p| p.file_name().unwrap().to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn empty_directory_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(discover(dir.path()), Err(AmlError::Config(_))));
    }

    #[test]
    fn loads_array_and_bare_object() {
        let dir = tempfile::tempdir().unwrap();
        let array = dir.path().join("array.json");
        fs::write(&array, r#"[{"a":1},{"a":2}]"#).unwrap();
        assert_eq!(load_records(&array).unwrap().len(), 2);

        let object = dir.path().join("object.json");
        fs::write(&object, r#"{"a":1}"#).unwrap();
        assert_eq!(load_records(&object).unwrap().len(), 1);
    }

    #[test]
    fn scalar_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "42").unwrap();
        assert!(matches!(load_records(&path), Err(AmlError::Config(_))));
    }
}
