//! Error types for metadata loading and conversion.
//!
//! Lookups never fail: unresolved paths, bindings and keys degrade to absent
//! values. Only loading a document and linking a converted graph can fail.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading a metadata or annotation document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
}

/// Structural inconsistencies found while linking a schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("duplicate fully qualified name '{name}'")]
    DuplicateName { name: String },

    #[error("'{set}' is typed by unknown entity type '{type_name}'")]
    UnknownEntityType { set: String, type_name: String },

    #[error("navigation property '{navigation}' targets unknown type '{type_name}'")]
    UnresolvedNavigationTarget {
        navigation: String,
        type_name: String,
    },
}

/// Failure of a whole conversion. Failed conversions are never cached.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("conversion of model '{identity}' failed: {source}")]
    Conversion {
        identity: String,
        #[source]
        source: LinkError,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

impl ConvertError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }

    /// The link failure that caused this error.
    pub fn link_error(&self) -> &LinkError {
        match self {
            ConvertError::Conversion { source, .. } => source,
        }
    }
}
