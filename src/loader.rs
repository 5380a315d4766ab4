//! Document loading.
//!
//! Handles loading CSDL JSON metadata and annotation tables from files and
//! strings, and provides [`JsonSource`], an in-memory [`MetadataSource`].

use std::path::Path;

use serde_json::Value;

use crate::cache::MetadataSource;
use crate::error::LoadError;
use crate::types::json_type_name;

/// Load a document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// `LoadError::InvalidJson` if the file isn't valid JSON, or
/// `LoadError::InvalidDocument` if the top level is not an object.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_document_str(&content)
}

/// Load a document from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON, or
/// `LoadError::InvalidDocument` if the top level is not an object.
pub fn load_document_str(content: &str) -> Result<Value, LoadError> {
    let document: Value =
        serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
    if !document.is_object() {
        return Err(LoadError::InvalidDocument {
            message: format!("expected object, got {}", json_type_name(&document)),
        });
    }
    Ok(document)
}

/// A model held in memory.
#[derive(Debug, Clone)]
pub struct JsonSource {
    identity: String,
    document: Value,
    annotations: Option<Value>,
}

impl JsonSource {
    /// Source whose annotations are embedded in the schema member of `document`.
    pub fn new(identity: impl Into<String>, document: Value) -> Self {
        Self {
            identity: identity.into(),
            document,
            annotations: None,
        }
    }

    /// Use a separate annotation table instead of the embedded one.
    pub fn with_annotations(mut self, annotations: Value) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Load metadata and an optional annotation table from files. The
    /// metadata path becomes the identity.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` if either file cannot be loaded.
    pub fn from_files(metadata: &Path, annotations: Option<&Path>) -> Result<Self, LoadError> {
        let source = Self::new(metadata.display().to_string(), load_document(metadata)?);
        match annotations {
            Some(path) => Ok(source.with_annotations(load_document(path)?)),
            None => Ok(source),
        }
    }
}

impl MetadataSource for JsonSource {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn schema(&self) -> Value {
        self.document.clone()
    }

    fn annotations(&self) -> Option<Value> {
        self.annotations.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_document_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"NS.Product": {{"$kind": "EntityType"}}}}"#).unwrap();

        let document = load_document(file.path()).unwrap();
        assert_eq!(document["NS.Product"]["$kind"], "EntityType");
    }

    #[test]
    fn load_document_file_not_found() {
        let result = load_document(Path::new("/nonexistent/metadata.json"));
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[test]
    fn load_document_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_document(file.path());
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn load_document_str_rejects_non_object() {
        let result = load_document_str("[1, 2]");
        match result {
            Err(LoadError::InvalidDocument { message }) => {
                assert_eq!(message, "expected object, got array")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn json_source_annotations() {
        let source = JsonSource::new("svc", json!({}));
        assert_eq!(source.identity(), "svc");
        assert!(source.annotations().is_none());

        let source = source.with_annotations(json!({ "NS.Product": {} }));
        assert!(source.annotations().unwrap().get("NS.Product").is_some());
    }

    #[test]
    fn json_source_from_files() {
        let mut metadata = NamedTempFile::new().unwrap();
        writeln!(metadata, r#"{{"NS.Product": {{"$kind": "EntityType"}}}}"#).unwrap();
        let mut annotations = NamedTempFile::new().unwrap();
        writeln!(annotations, r#"{{"NS.Product": {{}}}}"#).unwrap();

        let source = JsonSource::from_files(metadata.path(), Some(annotations.path())).unwrap();
        assert_eq!(source.identity(), metadata.path().display().to_string());
        assert!(source.annotations().is_some());

        let missing = JsonSource::from_files(metadata.path(), Some(Path::new("/nonexistent.json")));
        assert!(matches!(missing, Err(LoadError::FileNotFound { .. })));
    }
}
