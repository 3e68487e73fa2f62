//! Record document loading.
//!
//! A document is either a list of records or a mapping with an `objects`
//! list. `.json` files are parsed as JSON, everything else as YAML.
//! Directories expand to their `.yaml`, `.yml` and `.json` files in name
//! order.

use std::path::{Path, PathBuf};

use serde_json::Value;

use polsync_core::SourceRecord;

use crate::error::CliError;

const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Load every record from `paths`, in argument order.
pub fn load_records(paths: &[PathBuf]) -> Result<Vec<SourceRecord>, CliError> {
    let mut records = Vec::new();
    for path in expand(paths)? {
        let label = path.display().to_string();
        let contents = std::fs::read_to_string(&path).map_err(|e| CliError::Input {
            path: label.clone(),
            reason: e.to_string(),
        })?;
        let entries = parse_document(&path, &contents).map_err(|reason| CliError::Input {
            path: label.clone(),
            reason,
        })?;
        tracing::debug!(path = %label, records = entries.len(), "loaded record document");
        records.extend(
            entries
                .into_iter()
                .enumerate()
                .map(|(index, value)| SourceRecord::new(label.clone(), index, value)),
        );
    }
    Ok(records)
}

fn expand(paths: &[PathBuf]) -> Result<Vec<PathBuf>, CliError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|p| p.is_file() && has_record_extension(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn has_record_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn parse_document(path: &Path, contents: &str) -> Result<Vec<Value>, String> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let document: Value = if is_json {
        serde_json::from_str(contents).map_err(|e| format!("invalid JSON: {e}"))?
    } else {
        serde_yaml::from_str(contents).map_err(|e| format!("invalid YAML: {e}"))?
    };

    match document {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("objects") {
            Some(Value::Array(records)) => Ok(records),
            Some(_) => Err("`objects` must be a list".into()),
            None => Err("expected a list of records or an `objects` list".into()),
        },
        Value::Null => Ok(Vec::new()),
        _ => Err("expected a list of records or an `objects` list".into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn yaml_list_and_objects_mapping_are_accepted() {
        let list = parse_document(
            Path::new("a.yaml"),
            "- kind: tag\n  name: prod\n- kind: address\n  name: web\n  value: 10.0.0.1\n",
        )
        .unwrap();
        assert_eq!(list.len(), 2);

        let wrapped = parse_document(
            Path::new("b.json"),
            r#"{"objects": [{"kind": "tag", "name": "prod"}]}"#,
        )
        .unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0]["name"], "prod");
    }

    #[test]
    fn empty_yaml_document_has_no_records() {
        assert!(parse_document(Path::new("empty.yml"), "").unwrap().is_empty());
    }

    #[test]
    fn scalar_document_is_rejected() {
        let err = parse_document(Path::new("bad.yaml"), "just text").unwrap_err();
        assert!(err.contains("expected a list"));
    }

    #[test]
    fn directories_expand_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20-groups.yaml"), "- kind: tag\n  name: b\n").unwrap();
        std::fs::write(dir.path().join("10-tags.yaml"), "- kind: tag\n  name: a\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let records = load_records(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.value["name"].clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(records[0].position.source.ends_with("10-tags.yaml"));
    }
}
