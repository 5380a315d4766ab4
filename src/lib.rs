//! CSDL Metadata Converter
//!
//! Conversion of OData CSDL JSON metadata and vocabulary annotations into a
//! linked, navigable graph, plus resolution of metadata paths against it.
//!
//! The raw member table is normalized into typed records, navigation property
//! bindings are resolved between entity sets, and annotations are parsed into
//! an expression tree with vocabulary namespaces shortened to their aliases.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use csdl_convert::{resolve_context, Capabilities, ConversionCache, JsonSource};
//! use serde_json::json;
//!
//! let document = json!({
//!     "NS.": {
//!         "$kind": "Schema",
//!         "$Annotations": {
//!             "NS.Product/ID": { "@com.sap.vocabularies.Common.v1.Label": "Identifier" }
//!         }
//!     },
//!     "NS.Product": {
//!         "$kind": "EntityType",
//!         "$Key": ["ID"],
//!         "ID": { "$kind": "Property", "$Type": "Edm.String" }
//!     },
//!     "NS.Container": { "$kind": "EntityContainer" },
//!     "NS.Container/Products": { "$kind": "EntitySet", "$Type": "NS.Product" }
//! });
//!
//! let cache = ConversionCache::new();
//! let source = Arc::new(JsonSource::new("catalog", document));
//! let meta = cache.get_or_convert(source, Capabilities::default()).unwrap();
//!
//! assert_eq!(meta.entity_types()[0].keys[0].name, "ID");
//!
//! // Aliased terms resolve through the entity set
//! let label = resolve_context("/Products/ID@Common.Label", &meta, true);
//! assert_eq!(label.target.unwrap().kind(), "Annotation");
//! ```
//!
//! # Capabilities
//!
//! | Flag | Effect when disabled |
//! |------|----------------------|
//! | `Chart` | `UI.Chart` dropped; chart visualizations removed from presentation variants |
//! | `MicroChart` | Micro chart header facets removed |
//! | `IntentBasedNavigation` | `UI.DataFieldForIntentBasedNavigation` records removed from line items, identification and field groups |
//!
//! Capabilities apply to the conversion that populates a cache entry; see
//! [`CapabilityPolicy`] for later requests with different flags.

mod annotations;
mod cache;
mod error;
mod expression;
mod loader;
mod metadata;
mod path;
mod schema;
mod types;
mod vocabulary;

pub use annotations::{AnnotationKey, AnnotationList, AnnotationListBuilder, NamedAnnotation};
pub use cache::{convert, CapabilityPolicy, ConversionCache, MetadataSource, RawMetadata};
pub use error::{ConvertError, LinkError, LoadError};
pub use expression::{
    infer_collection_kind, parse_expression, parse_value, AnnotationSink, Apply, Collection,
    CollectionKind, DiscardAnnotations, Expression, PropertyValue, Record, ValueKind,
};
pub use loader::{load_document, load_document_str, JsonSource};
pub use metadata::{ConvertedMetadata, MetadataObject, ResolvedTarget};
pub use path::{resolve_context, resolve_data_model_path, DataModelObjectPath};
pub use schema::{
    embedded_annotations, prepare_annotations, Action, ActionImport, ActionParameter,
    ComplexType, EntityContainer, EntitySet, EntitySetRef, EntityType, NavigationProperty,
    Property, RawSchema, ReferentialConstraint, ReturnType, Scale, SchemaBuilder,
    TypeDefinition,
};
pub use types::{split_qualifier, terms, Capabilities, NAVIGATION_BINDING_MARKER, TYPE_MARKER};
pub use vocabulary::{alias, alias_enum_member, alias_for_namespace, VOCABULARY_ALIASES};
