//! The linked metadata graph.
//!
//! Linking takes the schema built from the raw member table, checks its
//! structural invariants and resolves navigation targets to entity type
//! indices. Annotations are merged lazily: the annotation table is parsed and
//! indexed by target the first time any annotation is looked up.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use serde_json::{json, Map, Value};

use crate::annotations::{AnnotationList, NamedAnnotation};
use crate::cache::RawMetadata;
use crate::error::LinkError;
use crate::expression::Expression;
use crate::schema::{
    Action, ActionImport, ActionParameter, ComplexType, EntityContainer, EntitySet,
    EntitySetRef, EntityType, NavigationProperty, Property, RawSchema, TypeDefinition,
};
use crate::types::{split_qualifier, Capabilities, TYPE_MARKER};
use crate::vocabulary::alias;

/// Any object reachable in the converted graph.
#[derive(Debug, Clone, Copy)]
pub enum MetadataObject<'a> {
    EntityContainer(&'a EntityContainer),
    EntitySet(&'a EntitySet),
    Singleton(&'a EntitySet),
    EntityType(&'a EntityType),
    ComplexType(&'a ComplexType),
    TypeDefinition(&'a TypeDefinition),
    Property(&'a Property),
    NavigationProperty(&'a NavigationProperty),
    Action(&'a Action),
    ActionParameter(&'a ActionParameter),
    ActionImport(&'a ActionImport),
    Annotation(&'a NamedAnnotation),
    /// A value inside an annotation (record member or collection item).
    Value(&'a Expression),
}

impl<'a> MetadataObject<'a> {
    pub fn kind(&self) -> &'static str {
        match self {
            MetadataObject::EntityContainer(_) => "EntityContainer",
            MetadataObject::EntitySet(_) => "EntitySet",
            MetadataObject::Singleton(_) => "Singleton",
            MetadataObject::EntityType(_) => "EntityType",
            MetadataObject::ComplexType(_) => "ComplexType",
            MetadataObject::TypeDefinition(_) => "TypeDefinition",
            MetadataObject::Property(_) => "Property",
            MetadataObject::NavigationProperty(_) => "NavigationProperty",
            MetadataObject::Action(_) => "Action",
            MetadataObject::ActionParameter(_) => "ActionParameter",
            MetadataObject::ActionImport(_) => "ActionImport",
            MetadataObject::Annotation(_) => "Annotation",
            MetadataObject::Value(_) => "Value",
        }
    }

    /// Structural elements a binding can point at, as opposed to plain values,
    /// types and container markers.
    pub fn is_service_object(&self) -> bool {
        matches!(
            self,
            MetadataObject::EntitySet(_)
                | MetadataObject::Singleton(_)
                | MetadataObject::NavigationProperty(_)
                | MetadataObject::Property(_)
                | MetadataObject::Action(_)
                | MetadataObject::ActionParameter(_)
        )
    }

    pub fn name(&self) -> Option<&'a str> {
        match *self {
            MetadataObject::EntityContainer(o) => Some(&o.name),
            MetadataObject::EntitySet(o) | MetadataObject::Singleton(o) => Some(&o.name),
            MetadataObject::EntityType(o) => Some(&o.name),
            MetadataObject::ComplexType(o) => Some(&o.name),
            MetadataObject::TypeDefinition(o) => Some(&o.name),
            MetadataObject::Property(o) => Some(&o.name),
            MetadataObject::NavigationProperty(o) => Some(&o.name),
            MetadataObject::Action(o) => Some(&o.name),
            MetadataObject::ActionParameter(o) => Some(&o.name),
            MetadataObject::ActionImport(o) => Some(&o.name),
            MetadataObject::Annotation(o) => Some(&o.term),
            MetadataObject::Value(_) => None,
        }
    }

    /// Fully qualified name; also the annotation target of the object.
    pub fn fully_qualified_name(&self) -> Option<&'a str> {
        match *self {
            MetadataObject::EntityContainer(o) => Some(&o.fully_qualified_name),
            MetadataObject::EntitySet(o) | MetadataObject::Singleton(o) => {
                Some(&o.fully_qualified_name)
            }
            MetadataObject::EntityType(o) => Some(&o.fully_qualified_name),
            MetadataObject::ComplexType(o) => Some(&o.fully_qualified_name),
            MetadataObject::TypeDefinition(o) => Some(&o.fully_qualified_name),
            MetadataObject::Property(o) => Some(&o.fully_qualified_name),
            MetadataObject::NavigationProperty(o) => Some(&o.fully_qualified_name),
            MetadataObject::Action(o) => Some(&o.fully_qualified_name),
            MetadataObject::ActionParameter(o) => Some(&o.fully_qualified_name),
            MetadataObject::ActionImport(o) => Some(&o.fully_qualified_name),
            MetadataObject::Annotation(_) | MetadataObject::Value(_) => None,
        }
    }

    /// Identity comparison: same kind and same fully qualified name, or the
    /// very same value.
    pub fn same(&self, other: &MetadataObject<'_>) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        match (self, other) {
            (MetadataObject::Annotation(a), MetadataObject::Annotation(b)) => std::ptr::eq(*a, *b),
            (MetadataObject::Value(a), MetadataObject::Value(b)) => std::ptr::eq(*a, *b),
            _ => self.fully_qualified_name() == other.fully_qualified_name(),
        }
    }

    pub fn as_entity_set(&self) -> Option<&'a EntitySet> {
        match *self {
            MetadataObject::EntitySet(s) | MetadataObject::Singleton(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&'a Property> {
        match *self {
            MetadataObject::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_navigation_property(&self) -> Option<&'a NavigationProperty> {
        match *self {
            MetadataObject::NavigationProperty(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&'a Action> {
        match *self {
            MetadataObject::Action(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_action_parameter(&self) -> Option<&'a ActionParameter> {
        match *self {
            MetadataObject::ActionParameter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&'a NamedAnnotation> {
        match *self {
            MetadataObject::Annotation(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_entity_type(&self) -> Option<&'a EntityType> {
        match *self {
            MetadataObject::EntityType(t) => Some(t),
            _ => None,
        }
    }
}

/// Result of walking a path: the object found plus everything traversed.
#[derive(Debug, Clone)]
pub struct ResolvedTarget<'a> {
    pub target: Option<MetadataObject<'a>>,
    pub visited_objects: Vec<MetadataObject<'a>>,
}

/// Linked graph for one service definition.
#[derive(Debug)]
pub struct ConvertedMetadata {
    schema: RawSchema,
    raw: RawMetadata,
    annotation_index: OnceLock<HashMap<String, usize>>,
}

impl ConvertedMetadata {
    /// Link the schema of `raw`.
    ///
    /// # Errors
    ///
    /// Returns `LinkError` when a structural invariant does not hold.
    pub fn link(raw: RawMetadata) -> Result<Self, LinkError> {
        let mut schema = raw.schema().clone();
        tracing::debug!(
            identity = raw.identity(),
            entity_types = schema.entity_types.len(),
            entity_sets = schema.entity_sets.len(),
            "Linking schema"
        );

        check_unique_names(&schema)?;

        let type_index: HashMap<String, usize> = schema
            .entity_types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.fully_qualified_name.clone(), i))
            .collect();

        // A set is unusable without its entity type, local or foreign
        for set in schema.entity_sets.iter().chain(schema.singletons.iter()) {
            if !type_index.contains_key(&set.entity_type_name) {
                return Err(LinkError::UnknownEntityType {
                    set: set.fully_qualified_name.clone(),
                    type_name: set.entity_type_name.clone(),
                });
            }
        }

        let namespace = schema.namespace.clone();
        let navigations = schema
            .entity_types
            .iter_mut()
            .flat_map(|t| t.navigation_properties.iter_mut())
            .chain(
                schema
                    .complex_types
                    .iter_mut()
                    .flat_map(|t| t.navigation_properties.iter_mut()),
            );
        for navigation in navigations {
            navigation.target_type = type_index.get(&navigation.target_type_name).copied();
            if navigation.target_type.is_some() {
                continue;
            }
            let target_namespace = navigation
                .target_type_name
                .rsplit_once('.')
                .map(|(ns, _)| ns)
                .unwrap_or("");
            if target_namespace == namespace {
                return Err(LinkError::UnresolvedNavigationTarget {
                    navigation: navigation.fully_qualified_name.clone(),
                    type_name: navigation.target_type_name.clone(),
                });
            }
            tracing::warn!(
                navigation = %navigation.fully_qualified_name,
                type_name = %navigation.target_type_name,
                "Navigation target outside the schema; left unresolved"
            );
        }

        Ok(Self {
            schema,
            raw,
            annotation_index: OnceLock::new(),
        })
    }

    pub fn identity(&self) -> &str {
        self.raw.identity()
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.raw.capabilities()
    }

    pub fn namespace(&self) -> &str {
        &self.schema.namespace
    }

    pub fn entity_container(&self) -> &EntityContainer {
        &self.schema.entity_container
    }

    pub fn entity_types(&self) -> &[EntityType] {
        &self.schema.entity_types
    }

    pub fn complex_types(&self) -> &[ComplexType] {
        &self.schema.complex_types
    }

    pub fn type_definitions(&self) -> &[TypeDefinition] {
        &self.schema.type_definitions
    }

    pub fn entity_sets(&self) -> &[EntitySet] {
        &self.schema.entity_sets
    }

    pub fn singletons(&self) -> &[EntitySet] {
        &self.schema.singletons
    }

    pub fn actions(&self) -> &[Action] {
        &self.schema.actions
    }

    pub fn action_imports(&self) -> &[ActionImport] {
        &self.schema.action_imports
    }

    /// Look up an entity type by fully qualified or short name.
    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.schema
            .entity_types
            .iter()
            .find(|t| t.fully_qualified_name == name)
            .or_else(|| self.schema.entity_types.iter().find(|t| t.name == name))
    }

    pub fn complex_type(&self, name: &str) -> Option<&ComplexType> {
        self.schema
            .complex_types
            .iter()
            .find(|t| t.fully_qualified_name == name || t.name == name)
    }

    pub fn entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.schema.entity_sets.iter().find(|s| s.name == name)
    }

    pub fn singleton(&self, name: &str) -> Option<&EntitySet> {
        self.schema.singletons.iter().find(|s| s.name == name)
    }

    /// Entity set or singleton with the given name, as a graph object.
    pub fn entity_set_object(&self, name: &str) -> Option<MetadataObject<'_>> {
        self.entity_set(name)
            .map(MetadataObject::EntitySet)
            .or_else(|| self.singleton(name).map(MetadataObject::Singleton))
    }

    pub fn set_by_ref(&self, set_ref: EntitySetRef) -> Option<MetadataObject<'_>> {
        match set_ref {
            EntitySetRef::EntitySet(i) => self.schema.entity_sets.get(i).map(MetadataObject::EntitySet),
            EntitySetRef::Singleton(i) => self.schema.singletons.get(i).map(MetadataObject::Singleton),
        }
    }

    /// Entity type of an entity set or singleton.
    pub fn set_entity_type(&self, set: &EntitySet) -> Option<&EntityType> {
        self.entity_type(&set.entity_type_name)
    }

    /// The set bound to `path` on `set`, if the binding resolved.
    pub fn binding(&self, set: &EntitySet, path: &str) -> Option<MetadataObject<'_>> {
        set.navigation_property_binding
            .get(path)
            .and_then(|set_ref| self.set_by_ref(*set_ref))
    }

    /// Resolved target type of a navigation property.
    pub fn navigation_target(&self, navigation: &NavigationProperty) -> Option<&EntityType> {
        navigation
            .target_type
            .and_then(|i| self.schema.entity_types.get(i))
    }

    /// Bound operation of `entity_type` by qualified or short name.
    pub fn bound_action(&self, entity_type: &EntityType, name: &str) -> Option<&Action> {
        let index = entity_type.actions.get(name).or_else(|| {
            entity_type
                .actions
                .iter()
                .find(|(qualified, _)| qualified.rsplit('.').next() == Some(name))
                .map(|(_, index)| index)
        })?;
        self.schema.actions.get(*index)
    }

    /// All parsed annotation lists. Parses the annotation table on first use.
    pub fn annotation_lists(&self) -> &[AnnotationList] {
        self.raw.annotations()
    }

    /// Annotations applied to `target` (a fully qualified name or a derived
    /// annotation target).
    pub fn annotations(&self, target: &str) -> &[NamedAnnotation] {
        let index = self.annotation_index.get_or_init(|| {
            let lists = self.raw.annotations();
            tracing::debug!(lists = lists.len(), "Merging annotations into graph");
            lists
                .iter()
                .enumerate()
                .map(|(i, list)| (list.target.clone(), i))
                .collect()
        });
        index
            .get(target)
            .and_then(|i| self.raw.annotations().get(*i))
            .map(|list| list.annotations.as_slice())
            .unwrap_or(&[])
    }

    /// Find `@Term[#Qualifier]` (full or aliased term) on `target`.
    pub fn annotation(&self, target: &str, key: &str) -> Option<&NamedAnnotation> {
        let bare = key.strip_prefix('@').unwrap_or(key);
        let (term, qualifier) = split_qualifier(bare);
        let term = alias(term);
        self.annotations(target)
            .iter()
            .find(|a| a.term == term && a.qualifier.as_deref() == qualifier)
    }

    /// Resolve an absolute metadata path such as `/Products/Name@Common.Label`.
    pub fn resolve_path(&self, path: &str) -> Option<MetadataObject<'_>> {
        crate::path::resolve_context(path, self, false).target
    }

    /// Walk `path` relative to `start`.
    ///
    /// Returns `None` when any segment does not resolve. The visited list
    /// starts with `start` and records every object crossed.
    pub fn resolve_relative<'a>(
        &'a self,
        start: MetadataObject<'a>,
        path: &str,
    ) -> Option<ResolvedTarget<'a>> {
        let mut visited = vec![start];
        let mut current = start;
        let mut current_target = start.fully_qualified_name().unwrap_or("").to_string();

        for segment in split_segments(path) {
            let (next, next_target) = self.step(current, &current_target, segment, &mut visited)?;
            visited.push(next);
            current = next;
            current_target = next_target;
        }

        Some(ResolvedTarget {
            target: Some(current),
            visited_objects: visited,
        })
    }

    /// Resolve one segment from `current`. Intermediate objects crossed
    /// implicitly (such as a navigation property's target type) are pushed to
    /// `visited`.
    fn step<'a>(
        &'a self,
        current: MetadataObject<'a>,
        current_target: &str,
        segment: &str,
        visited: &mut Vec<MetadataObject<'a>>,
    ) -> Option<(MetadataObject<'a>, String)> {
        if segment.starts_with('@') {
            if let Some(annotation) = self.annotation(current_target, segment) {
                let target = format!("{}@{}", current_target, annotation.qualified_term());
                return Some((MetadataObject::Annotation(annotation), target));
            }
            // Sets and navigation properties also expose the annotations of
            // their entity type
            if !matches!(
                current,
                MetadataObject::EntitySet(_)
                    | MetadataObject::Singleton(_)
                    | MetadataObject::NavigationProperty(_)
            ) {
                return None;
            }
        }

        match current {
            MetadataObject::EntityContainer(_) => {
                let object = self.entity_set_object(segment).or_else(|| {
                    self.schema
                        .action_imports
                        .iter()
                        .find(|i| i.name == segment)
                        .map(MetadataObject::ActionImport)
                })?;
                Some(with_target(object))
            }
            MetadataObject::EntitySet(set) | MetadataObject::Singleton(set) => {
                let entity_type = self.set_entity_type(set)?;
                let implied = MetadataObject::EntityType(entity_type);
                visited.push(implied);
                self.step(implied, &entity_type.fully_qualified_name, segment, visited)
            }
            MetadataObject::EntityType(entity_type) => {
                if segment == TYPE_MARKER {
                    return Some(with_target(current));
                }
                if let Some(property) = entity_type.property(segment) {
                    return Some(with_target(MetadataObject::Property(property)));
                }
                let navigation = entity_type.navigation_property(segment)?;
                Some(with_target(MetadataObject::NavigationProperty(navigation)))
            }
            MetadataObject::ComplexType(complex) => {
                if let Some(property) = complex.properties.iter().find(|p| p.name == segment) {
                    return Some(with_target(MetadataObject::Property(property)));
                }
                let navigation = complex
                    .navigation_properties
                    .iter()
                    .find(|n| n.name == segment)?;
                Some(with_target(MetadataObject::NavigationProperty(navigation)))
            }
            MetadataObject::NavigationProperty(navigation) => {
                let target_type = self.navigation_target(navigation)?;
                let implied = MetadataObject::EntityType(target_type);
                visited.push(implied);
                self.step(implied, &target_type.fully_qualified_name, segment, visited)
            }
            MetadataObject::Property(property) => {
                let complex = self.complex_type(&property.type_name)?;
                let implied = MetadataObject::ComplexType(complex);
                visited.push(implied);
                self.step(implied, &complex.fully_qualified_name, segment, visited)
            }
            MetadataObject::Action(action) => {
                let parameter = action.parameters.iter().find(|p| p.name == segment)?;
                Some(with_target(MetadataObject::ActionParameter(parameter)))
            }
            MetadataObject::Annotation(annotation) => {
                let value = annotation.value.member(segment)?;
                Some((
                    MetadataObject::Value(value),
                    format!("{}/{}", current_target, segment),
                ))
            }
            MetadataObject::Value(value) => {
                let member = value.member(segment)?;
                Some((
                    MetadataObject::Value(member),
                    format!("{}/{}", current_target, segment),
                ))
            }
            MetadataObject::TypeDefinition(_)
            | MetadataObject::ActionParameter(_)
            | MetadataObject::ActionImport(_) => None,
        }
    }

    /// Resolve a path whose first segment is a qualified type or action name.
    pub(crate) fn resolve_qualified<'a>(
        &'a self,
        first: &str,
        rest: &str,
    ) -> Option<ResolvedTarget<'a>> {
        let start = self
            .schema
            .entity_types
            .iter()
            .find(|t| t.fully_qualified_name == first)
            .map(MetadataObject::EntityType)
            .or_else(|| {
                self.schema
                    .complex_types
                    .iter()
                    .find(|t| t.fully_qualified_name == first)
                    .map(MetadataObject::ComplexType)
            })
            .or_else(|| {
                self.schema
                    .type_definitions
                    .iter()
                    .find(|t| t.fully_qualified_name == first)
                    .map(MetadataObject::TypeDefinition)
            })
            .or_else(|| {
                self.schema
                    .actions
                    .iter()
                    .find(|a| a.fully_qualified_name == first)
                    .map(MetadataObject::Action)
            })?;
        self.resolve_relative(start, rest)
    }

    /// JSON summary of the linked graph, with bindings spelled out by name.
    pub fn to_json(&self) -> Value {
        let set_json = |set: &EntitySet| {
            let bindings: Map<String, Value> = set
                .navigation_property_binding
                .iter()
                .filter_map(|(path, set_ref)| {
                    let target = self.set_by_ref(*set_ref)?.name()?;
                    Some((path.clone(), Value::String(target.to_string())))
                })
                .collect();
            json!({
                "name": set.name,
                "fullyQualifiedName": set.fully_qualified_name,
                "entityTypeName": set.entity_type_name,
                "navigationPropertyBinding": bindings,
            })
        };

        json!({
            "namespace": self.schema.namespace,
            "entityContainer": self.schema.entity_container,
            "entityTypes": self.schema.entity_types,
            "complexTypes": self.schema.complex_types,
            "typeDefinitions": self.schema.type_definitions,
            "entitySets": self.schema.entity_sets.iter().map(set_json).collect::<Vec<_>>(),
            "singletons": self.schema.singletons.iter().map(set_json).collect::<Vec<_>>(),
            "actions": self.schema.actions,
            "actionImports": self.schema.action_imports,
        })
    }
}

fn with_target(object: MetadataObject<'_>) -> (MetadataObject<'_>, String) {
    let target = object.fully_qualified_name().unwrap_or("").to_string();
    (object, target)
}

/// Split a relative path into segments, separating inline `@Term` suffixes
/// (`Name@Common.Label` yields `Name`, `@Common.Label`).
pub(crate) fn split_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        let mut rest = part;
        while let Some((at, _)) = rest.char_indices().skip(1).find(|(_, c)| *c == '@') {
            segments.push(&rest[..at]);
            rest = &rest[at..];
        }
        segments.push(rest);
    }
    segments
}

fn check_unique_names(schema: &RawSchema) -> Result<(), LinkError> {
    let mut seen = HashSet::new();
    let names = schema
        .entity_types
        .iter()
        .map(|t| &t.fully_qualified_name)
        .chain(schema.complex_types.iter().map(|t| &t.fully_qualified_name))
        .chain(schema.type_definitions.iter().map(|t| &t.fully_qualified_name))
        .chain(schema.entity_sets.iter().map(|s| &s.fully_qualified_name))
        .chain(schema.singletons.iter().map(|s| &s.fully_qualified_name))
        .chain(schema.action_imports.iter().map(|i| &i.fully_qualified_name));
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(LinkError::DuplicateName { name: name.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RawMetadata;
    use crate::loader::JsonSource;
    use std::sync::Arc;

    fn metadata() -> Value {
        json!({
            "$EntityContainer": "NS.Container",
            "NS.": {
                "$kind": "Schema",
                "$Annotations": {
                    "NS.Product/Name": {
                        "@com.sap.vocabularies.Common.v1.Label": "Product name"
                    },
                    "NS.Product": {
                        "@com.sap.vocabularies.UI.v1.LineItem": [
                            { "$Type": "com.sap.vocabularies.UI.v1.DataField", "Value": { "$Path": "Name" } }
                        ]
                    }
                }
            },
            "NS.Product": {
                "$kind": "EntityType",
                "$Key": ["ID"],
                "ID": { "$kind": "Property", "$Type": "Edm.String" },
                "Name": { "$kind": "Property", "$Type": "Edm.String" },
                "Address": { "$kind": "Property", "$Type": "NS.Address" },
                "Supplier": { "$kind": "NavigationProperty", "$Type": "NS.Supplier" }
            },
            "NS.Supplier": {
                "$kind": "EntityType",
                "$Key": ["ID"],
                "ID": { "$kind": "Property", "$Type": "Edm.String" }
            },
            "NS.Address": {
                "$kind": "ComplexType",
                "City": { "$kind": "Property", "$Type": "Edm.String" }
            },
            "NS.Container": {
                "$kind": "EntityContainer",
                "Products": { "$kind": "EntitySet", "$Type": "NS.Product" }
            }
        })
    }

    fn link(document: Value) -> Result<ConvertedMetadata, LinkError> {
        let source = Arc::new(JsonSource::new("test", document));
        ConvertedMetadata::link(RawMetadata::new(source, Capabilities::default()))
    }

    #[test]
    fn navigation_targets_resolved() {
        let meta = link(metadata()).unwrap();
        let product = meta.entity_type("NS.Product").unwrap();
        let nav = product.navigation_property("Supplier").unwrap();
        assert_eq!(meta.navigation_target(nav).unwrap().name, "Supplier");
    }

    #[test]
    fn unknown_entity_type_is_link_error() {
        let mut doc = metadata();
        doc["NS.Container"]["Ghosts"] = json!({ "$kind": "EntitySet", "$Type": "NS.Ghost" });
        let err = link(doc).unwrap_err();
        assert!(matches!(err, LinkError::UnknownEntityType { .. }));
    }

    #[test]
    fn foreign_set_type_is_link_error() {
        let mut doc = metadata();
        doc["NS.Container"]["Remote"] = json!({ "$kind": "EntitySet", "$Type": "Other.Thing" });
        let err = link(doc).unwrap_err();
        assert_eq!(
            err,
            LinkError::UnknownEntityType {
                set: "NS.Container/Remote".into(),
                type_name: "Other.Thing".into(),
            }
        );
    }

    #[test]
    fn unresolved_local_navigation_is_link_error() {
        let mut doc = metadata();
        doc["NS.Product"]["Broken"] = json!({ "$kind": "NavigationProperty", "$Type": "NS.Missing" });
        let err = link(doc).unwrap_err();
        assert_eq!(
            err,
            LinkError::UnresolvedNavigationTarget {
                navigation: "NS.Product/Broken".into(),
                type_name: "NS.Missing".into(),
            }
        );
    }

    #[test]
    fn foreign_navigation_target_tolerated() {
        let mut doc = metadata();
        doc["NS.Product"]["Remote"] = json!({ "$kind": "NavigationProperty", "$Type": "Other.Thing" });
        let meta = link(doc).unwrap();
        let nav = meta
            .entity_type("Product")
            .unwrap()
            .navigation_property("Remote")
            .unwrap();
        assert!(meta.navigation_target(nav).is_none());
    }

    #[test]
    fn annotations_merged_by_target() {
        let meta = link(metadata()).unwrap();
        let label = meta
            .annotation("NS.Product/Name", "@com.sap.vocabularies.Common.v1.Label")
            .unwrap();
        assert_eq!(label.value, Expression::String("Product name".into()));
        assert!(meta.annotation("NS.Product/Name", "Common.Label").is_some());
        assert!(meta.annotations("NS.Nothing").is_empty());
    }

    #[test]
    fn resolve_relative_property_annotation() {
        let meta = link(metadata()).unwrap();
        let product = meta.entity_type("NS.Product").unwrap();
        let resolved = meta
            .resolve_relative(MetadataObject::EntityType(product), "Name@Common.Label")
            .unwrap();
        let annotation = resolved.target.unwrap().as_annotation().unwrap();
        assert_eq!(annotation.term, "Common.Label");
        assert_eq!(resolved.visited_objects.len(), 3);
    }

    #[test]
    fn resolve_relative_into_annotation_value() {
        let meta = link(metadata()).unwrap();
        let product = meta.entity_type("NS.Product").unwrap();
        let resolved = meta
            .resolve_relative(MetadataObject::EntityType(product), "@UI.LineItem/0/Value")
            .unwrap();
        match resolved.target.unwrap() {
            MetadataObject::Value(value) => assert_eq!(value.path(), Some("Name")),
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn resolve_relative_complex_property() {
        let meta = link(metadata()).unwrap();
        let product = meta.entity_type("NS.Product").unwrap();
        let resolved = meta
            .resolve_relative(MetadataObject::EntityType(product), "Address/City")
            .unwrap();
        let city = resolved.target.unwrap().as_property().unwrap();
        assert_eq!(city.fully_qualified_name, "NS.Address/City");
    }

    #[test]
    fn resolve_relative_through_navigation() {
        let meta = link(metadata()).unwrap();
        let product = meta.entity_type("NS.Product").unwrap();
        let resolved = meta
            .resolve_relative(MetadataObject::EntityType(product), "Supplier/ID")
            .unwrap();
        let kinds: Vec<&str> = resolved.visited_objects.iter().map(|o| o.kind()).collect();
        assert_eq!(
            kinds,
            vec!["EntityType", "NavigationProperty", "EntityType", "Property"]
        );
        assert!(meta
            .resolve_relative(MetadataObject::EntityType(product), "Nope")
            .is_none());
    }

    #[test]
    fn split_segments_separates_terms() {
        assert_eq!(
            split_segments("A/B@UI.X#q@Common.Label"),
            vec!["A", "B", "@UI.X#q", "@Common.Label"]
        );
        assert_eq!(split_segments("@UI.LineItem/0"), vec!["@UI.LineItem", "0"]);
    }

    #[test]
    fn summary_lists_bindings_by_name() {
        let mut doc = metadata();
        doc["NS.Container"]["Suppliers"] = json!({ "$kind": "EntitySet", "$Type": "NS.Supplier" });
        doc["NS.Container"]["Products"]["$NavigationPropertyBinding"] = json!({ "Supplier": "Suppliers" });
        let meta = link(doc).unwrap();
        let summary = meta.to_json();
        assert_eq!(
            summary["entitySets"][0]["navigationPropertyBinding"]["Supplier"],
            "Suppliers"
        );
        assert_eq!(summary["entityTypes"][0]["name"], "Product");
    }
}
