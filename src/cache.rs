//! Conversion caching.
//!
//! A [`ConversionCache`] memoizes one [`ConvertedMetadata`] per model
//! identity. Each conversion reads its inputs through a [`MetadataSource`]
//! and keeps them in a [`RawMetadata`], whose schema and annotation sections
//! are computed on first access only.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde_json::{Map, Value};

use crate::annotations::{AnnotationList, AnnotationListBuilder};
use crate::error::ConvertError;
use crate::metadata::ConvertedMetadata;
use crate::schema::{embedded_annotations, prepare_annotations, RawSchema, SchemaBuilder};
use crate::types::{json_type_name, Capabilities};

/// Supplies the raw inputs of one model.
pub trait MetadataSource: Send + Sync {
    /// Opaque identity used as the cache key.
    fn identity(&self) -> &str;

    /// The raw CSDL JSON member table.
    fn schema(&self) -> Value;

    /// A separate annotation table (target to `@Term` entries). When `None`,
    /// the `$Annotations` of the schema member are used.
    fn annotations(&self) -> Option<Value>;
}

/// Raw inputs of one conversion with lazily computed sections.
pub struct RawMetadata {
    source: Arc<dyn MetadataSource>,
    capabilities: Capabilities,
    document: OnceLock<Value>,
    schema: OnceLock<RawSchema>,
    annotations: OnceLock<Vec<AnnotationList>>,
}

impl fmt::Debug for RawMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMetadata")
            .field("identity", &self.source.identity())
            .field("capabilities", &self.capabilities)
            .field("schema_built", &self.schema.get().is_some())
            .field("annotations_built", &self.annotations.get().is_some())
            .finish()
    }
}

impl RawMetadata {
    pub fn new(source: Arc<dyn MetadataSource>, capabilities: Capabilities) -> Self {
        Self {
            source,
            capabilities,
            document: OnceLock::new(),
            schema: OnceLock::new(),
            annotations: OnceLock::new(),
        }
    }

    pub fn identity(&self) -> &str {
        self.source.identity()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn document(&self) -> &Value {
        self.document.get_or_init(|| self.source.schema())
    }

    /// The normalized schema, built on first access.
    pub fn schema(&self) -> &RawSchema {
        self.schema.get_or_init(|| {
            tracing::debug!(identity = self.identity(), "Building schema");
            SchemaBuilder::build(self.document())
        })
    }

    /// The annotation lists, parsed on first access.
    pub fn annotations(&self) -> &[AnnotationList] {
        self.annotations.get_or_init(|| {
            tracing::debug!(identity = self.identity(), "Building annotation lists");
            let mut table = match self.source.annotations() {
                Some(Value::Object(table)) => table,
                Some(other) => {
                    tracing::warn!(
                        actual = json_type_name(&other),
                        "Annotation table is not an object; ignoring it"
                    );
                    Map::new()
                }
                None => embedded_annotations(self.document())
                    .cloned()
                    .unwrap_or_default(),
            };
            prepare_annotations(self.schema(), &mut table);
            AnnotationListBuilder::build(&table, self.capabilities)
        })
    }
}

/// What a cache hit does when the requested capabilities differ from the ones
/// the cached entry was converted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapabilityPolicy {
    /// Serve the cached entry; capabilities of later requests are ignored.
    #[default]
    FirstConversionWins,
    /// Convert again and replace the entry.
    Reconvert,
}

#[derive(Default)]
struct Slot {
    converted: Mutex<Option<Arc<ConvertedMetadata>>>,
}

/// Per-identity memo of converted models.
#[derive(Default)]
pub struct ConversionCache {
    policy: CapabilityPolicy,
    entries: Mutex<HashMap<String, Arc<Slot>>>,
}

impl ConversionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CapabilityPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> CapabilityPolicy {
        self.policy
    }

    /// Return the cached conversion of `source`, converting it first if needed.
    ///
    /// Concurrent calls for the same identity convert once; calls for other
    /// identities proceed independently.
    ///
    /// # Errors
    ///
    /// Returns `ConvertError` when linking fails. Failures are not cached.
    pub fn get_or_convert(
        &self,
        source: Arc<dyn MetadataSource>,
        capabilities: Capabilities,
    ) -> Result<Arc<ConvertedMetadata>, ConvertError> {
        let identity = source.identity().to_string();
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(identity.clone()).or_default())
        };

        let mut converted = slot
            .converted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = converted.as_ref() {
            if *existing.capabilities() == capabilities {
                tracing::debug!(identity = %identity, "Conversion cache hit");
                return Ok(Arc::clone(existing));
            }
            match self.policy {
                CapabilityPolicy::FirstConversionWins => {
                    tracing::warn!(
                        identity = %identity,
                        "Cached conversion used different capabilities; serving it unchanged"
                    );
                    return Ok(Arc::clone(existing));
                }
                CapabilityPolicy::Reconvert => {
                    tracing::debug!(identity = %identity, "Capabilities changed; converting again");
                }
            }
        }

        tracing::debug!(identity = %identity, "Conversion cache miss");
        let fresh = match convert(source, capabilities) {
            Ok(fresh) => Arc::new(fresh),
            Err(err) => {
                let empty = converted.is_none();
                drop(converted);
                if empty {
                    self.forget_empty(&identity, &slot);
                }
                return Err(err);
            }
        };
        *converted = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    /// Remove `slot` from the map if it is still registered for `identity`
    /// and holds no conversion.
    fn forget_empty(&self, identity: &str, slot: &Arc<Slot>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let registered = entries
            .get(identity)
            .is_some_and(|current| Arc::ptr_eq(current, slot));
        let empty = slot
            .converted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        if registered && empty {
            entries.remove(identity);
        }
    }

    /// Drop the entry for `identity`. Unknown identities are ignored.
    pub fn invalidate(&self, identity: &str) {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity);
        if removed.is_some() {
            tracing::debug!(identity, "Conversion cache entry invalidated");
        }
    }

    /// True when a successful conversion is cached for `identity`.
    pub fn contains(&self, identity: &str) -> bool {
        let slot = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned();
        slot.map(|slot| {
            slot.converted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        })
        .unwrap_or(false)
    }
}

/// Convert `source` without caching.
///
/// # Errors
///
/// Returns `ConvertError` wrapping the link failure.
pub fn convert(
    source: Arc<dyn MetadataSource>,
    capabilities: Capabilities,
) -> Result<ConvertedMetadata, ConvertError> {
    let identity = source.identity().to_string();
    let raw = RawMetadata::new(source, capabilities);
    ConvertedMetadata::link(raw).map_err(|source| ConvertError::Conversion { identity, source })
}
