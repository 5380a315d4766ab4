//! Metadata path resolution.
//!
//! [`resolve_context`] walks an absolute path such as
//! `/Container/Products/$NavigationPropertyBinding/Supplier/Name@Common.Label`
//! and records every object it crosses. [`resolve_data_model_path`] turns that
//! record into a [`DataModelObjectPath`]: the entity sets, entity type and
//! navigation properties a binding path involves.
//!
//! Nothing here fails. Unresolvable segments leave the target absent and a
//! dangling navigation leaves the target entity set absent.

use serde_json::{json, Value};

use crate::metadata::{split_segments, ConvertedMetadata, MetadataObject, ResolvedTarget};
use crate::schema::{EntityType, NavigationProperty};
use crate::types::{NAVIGATION_BINDING_MARKER, TYPE_MARKER};

/// Resolve `path` against `meta`.
///
/// With `include_visited`, the visited list of the result covers the whole
/// path, starting at the container or entity set. Without it, only the
/// objects crossed by the final type-relative step are listed.
pub fn resolve_context<'a>(
    path: &str,
    meta: &'a ConvertedMetadata,
    include_visited: bool,
) -> ResolvedTarget<'a> {
    let segments = split_segments(path);
    let mut rest: &[&str] = &segments;
    let mut visited: Vec<MetadataObject<'a>> = Vec::new();

    let container = meta.entity_container();
    if let Some(first) = rest.first() {
        if !container.name.is_empty()
            && (*first == container.name || *first == container.fully_qualified_name)
        {
            visited.push(MetadataObject::EntityContainer(container));
            rest = &rest[1..];
        }
    }

    let Some((first, tail)) = rest.split_first() else {
        return best_effort(visited);
    };
    let Some(start_set) = meta.entity_set_object(first) else {
        // Not a set: an action import below the container, or a qualified
        // type or action name.
        let resolved = if visited.is_empty() {
            meta.resolve_qualified(first, &tail.join("/"))
        } else {
            meta.resolve_relative(MetadataObject::EntityContainer(container), &rest.join("/"))
        };
        return resolved.unwrap_or_else(|| ResolvedTarget {
            target: None,
            visited_objects: visited,
        });
    };

    visited.push(start_set);
    rest = tail;
    let mut target_set = Some(start_set);
    let mut current_type = start_set
        .as_entity_set()
        .and_then(|set| meta.set_entity_type(set));
    let mut dangling: Option<&'a NavigationProperty> = None;

    while rest.first() == Some(&NAVIGATION_BINDING_MARKER) {
        rest = &rest[1..];
        let Some(set) = target_set.and_then(|s| s.as_entity_set()) else {
            break;
        };

        // Longest binding keys span several segments; try the shortest first
        let bound = (1..=rest.len()).find_map(|len| {
            meta.binding(set, &rest[..len].join("/"))
                .map(|bound| (len, bound))
        });

        match bound {
            Some((len, bound_set)) => {
                // The key may cross complex-typed properties before its
                // navigation property
                let walk = current_type.and_then(|t| {
                    meta.resolve_relative(MetadataObject::EntityType(t), &rest[..len].join("/"))
                });
                if let Some(walk) = walk {
                    visited.extend(walk.visited_objects.into_iter().filter(|o| {
                        matches!(
                            o,
                            MetadataObject::Property(_) | MetadataObject::NavigationProperty(_)
                        )
                    }));
                }
                visited.push(bound_set);
                target_set = Some(bound_set);
                current_type = bound_set
                    .as_entity_set()
                    .and_then(|s| meta.set_entity_type(s));
                rest = &rest[len..];
            }
            None => {
                let Some(navigation) = rest
                    .first()
                    .and_then(|segment| current_type.and_then(|t| t.navigation_property(segment)))
                else {
                    break;
                };
                tracing::debug!(
                    navigation = %navigation.name,
                    "No navigation property binding; entity set left unresolved"
                );
                visited.push(MetadataObject::NavigationProperty(navigation));
                current_type = meta.navigation_target(navigation);
                dangling = Some(navigation);
                target_set = None;
                rest = &rest[1..];
            }
        }
    }

    let mut type_cast = false;
    if rest.first() == Some(&TYPE_MARKER) {
        type_cast = true;
        rest = match rest.get(1) {
            Some(next) if !next.starts_with('@') => &rest[2..],
            _ => &rest[1..],
        };
    }

    if rest.is_empty() {
        if type_cast {
            if let Some(entity_type) = current_type {
                visited.push(MetadataObject::EntityType(entity_type));
            }
        }
        return best_effort(visited);
    }

    let start = match (dangling, type_cast) {
        (_, true) => current_type.map(MetadataObject::EntityType),
        (Some(navigation), false) => Some(MetadataObject::NavigationProperty(navigation)),
        (None, false) => target_set,
    };
    let Some(start) = start else {
        return best_effort(visited);
    };

    if let Some(resolved) = meta.resolve_relative(start, &rest.join("/")) {
        return splice(visited, resolved, include_visited);
    }

    if let Some(entity_type) = current_type {
        if let Some(resolved) = resolve_operation(meta, entity_type, rest, &mut visited) {
            return resolved;
        }
    }

    ResolvedTarget {
        target: None,
        visited_objects: visited,
    }
}

/// Resolve `Action` or `Action/Parameter` against the bound operations of
/// `entity_type`. Parameters are matched by fully qualified name suffix.
fn resolve_operation<'a>(
    meta: &'a ConvertedMetadata,
    entity_type: &'a EntityType,
    rest: &[&str],
    visited: &mut Vec<MetadataObject<'a>>,
) -> Option<ResolvedTarget<'a>> {
    let action = meta.bound_action(entity_type, rest.first()?)?;
    visited.push(MetadataObject::Action(action));

    let target = match rest {
        [_] => Some(MetadataObject::Action(action)),
        [_, parameter] => {
            let suffix = format!("/{}", parameter);
            let found = action
                .parameters
                .iter()
                .find(|p| p.fully_qualified_name.ends_with(&suffix))
                .map(MetadataObject::ActionParameter);
            if let Some(found) = found {
                visited.push(found);
            }
            found
        }
        _ => None,
    };
    Some(ResolvedTarget {
        target,
        visited_objects: std::mem::take(visited),
    })
}

fn best_effort(visited: Vec<MetadataObject<'_>>) -> ResolvedTarget<'_> {
    ResolvedTarget {
        target: visited.last().copied(),
        visited_objects: visited,
    }
}

fn splice<'a>(
    mut history: Vec<MetadataObject<'a>>,
    resolved: ResolvedTarget<'a>,
    include_visited: bool,
) -> ResolvedTarget<'a> {
    if !include_visited {
        return resolved;
    }
    let mut own = resolved.visited_objects.into_iter().peekable();
    let repeated = match (history.last(), own.peek()) {
        (Some(last), Some(first)) => last.same(first),
        _ => false,
    };
    if repeated {
        own.next();
    }
    history.extend(own);
    ResolvedTarget {
        target: resolved.target,
        visited_objects: history,
    }
}

/// The data model objects a resolved path involves.
#[derive(Debug, Clone)]
pub struct DataModelObjectPath<'a> {
    /// Entity set or singleton the path starts from.
    pub starting_entity_set: Option<MetadataObject<'a>>,
    /// Entity set or singleton reached at the end; absent after a navigation
    /// without binding.
    pub target_entity_set: Option<MetadataObject<'a>>,
    pub target_entity_type: Option<&'a EntityType>,
    pub target_object: Option<MetadataObject<'a>>,
    pub navigation_properties: Vec<&'a NavigationProperty>,
    /// Outer path this one was resolved in; `None` means the path is its own
    /// context.
    pub context_location: Option<Box<DataModelObjectPath<'a>>>,
    pub converted_types: &'a ConvertedMetadata,
}

impl<'a> DataModelObjectPath<'a> {
    /// The context path, or `self` when none was given.
    pub fn context_location(&self) -> &DataModelObjectPath<'a> {
        self.context_location.as_deref().unwrap_or(self)
    }

    /// Navigation property names joined with `/`.
    pub fn navigation_path(&self) -> String {
        self.navigation_properties
            .iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// JSON summary naming every involved object.
    pub fn to_json(&self) -> Value {
        let name = |object: Option<MetadataObject<'_>>| object.and_then(|o| o.name()).map(String::from);
        let mut summary = json!({
            "startingEntitySet": name(self.starting_entity_set),
            "targetEntitySet": name(self.target_entity_set),
            "targetEntityType": self.target_entity_type.map(|t| t.fully_qualified_name.clone()),
            "targetObject": self.target_object.map(object_json),
            "navigationProperties": self
                .navigation_properties
                .iter()
                .map(|n| n.name.clone())
                .collect::<Vec<_>>(),
        });
        if let Some(context) = &self.context_location {
            summary["contextLocation"] = context.to_json();
        }
        summary
    }
}

fn object_json(object: MetadataObject<'_>) -> Value {
    let mut summary = json!({
        "kind": object.kind(),
        "name": object.name(),
        "fullyQualifiedName": object.fully_qualified_name(),
    });
    let value = match object {
        MetadataObject::Annotation(annotation) => serde_json::to_value(annotation).ok(),
        MetadataObject::Value(value) => serde_json::to_value(value).ok(),
        MetadataObject::Property(property) => serde_json::to_value(property).ok(),
        _ => None,
    };
    if let Some(value) = value {
        summary["value"] = value;
    }
    summary
}

/// Build the data model path of `resolved`.
///
/// `resolved` should come from [`resolve_context`] with visited objects
/// included. When `outer` starts at an entity set this path reaches through a
/// binding, `outer` is rewritten to start where this path starts. With
/// `only_service_objects`, the target is dropped unless the last visited
/// object is a service object.
pub fn resolve_data_model_path<'a>(
    resolved: &ResolvedTarget<'a>,
    meta: &'a ConvertedMetadata,
    outer: Option<DataModelObjectPath<'a>>,
    only_service_objects: bool,
) -> DataModelObjectPath<'a> {
    let relevant: Vec<MetadataObject<'a>> = resolved
        .visited_objects
        .iter()
        .copied()
        .filter(|o| {
            matches!(
                o,
                MetadataObject::EntitySet(_)
                    | MetadataObject::Singleton(_)
                    | MetadataObject::NavigationProperty(_)
            )
        })
        .collect();

    let mut starting_entity_set = None;
    let mut current_set = None;
    let mut current_type = None;
    let mut navigation_properties = Vec::new();
    // Binding keys span every segment since the last set, including
    // complex-typed properties
    let mut binding_source = None;
    let mut binding_key = String::new();
    let mut dangling = false;

    for object in &resolved.visited_objects {
        match *object {
            MetadataObject::EntitySet(set) | MetadataObject::Singleton(set) => {
                starting_entity_set.get_or_insert(*object);
                current_set = Some(*object);
                current_type = meta.set_entity_type(set);
                binding_source = Some(set);
                binding_key.clear();
                dangling = false;
            }
            MetadataObject::NavigationProperty(navigation) => {
                navigation_properties.push(navigation);
                current_type = meta.navigation_target(navigation);
                if !binding_key.is_empty() {
                    binding_key.push('/');
                }
                binding_key.push_str(&navigation.name);
                match binding_source.and_then(|source| meta.binding(source, &binding_key)) {
                    Some(bound) => {
                        current_set = Some(bound);
                        binding_source = bound.as_entity_set();
                        binding_key.clear();
                        dangling = false;
                    }
                    None => dangling = true,
                }
            }
            MetadataObject::Property(property) if binding_source.is_some() => {
                if !binding_key.is_empty() {
                    binding_key.push('/');
                }
                binding_key.push_str(&property.name);
            }
            _ => {}
        }
    }
    if dangling {
        current_set = None;
    }

    let target_entity_type = current_type.or_else(|| {
        resolved
            .visited_objects
            .iter()
            .rev()
            .find_map(|o| o.as_entity_type())
    });

    let mut target_object = resolved.target;
    if only_service_objects
        && !resolved
            .visited_objects
            .last()
            .is_some_and(|o| o.is_service_object())
    {
        target_object = None;
    }

    let context_location = outer.map(|mut outer| {
        if let (Some(outer_start), Some(start)) = (outer.starting_entity_set, starting_entity_set) {
            if !outer_start.same(&start) {
                if let Some(position) = relevant.iter().position(|o| o.same(&outer_start)) {
                    let crossed: Vec<&NavigationProperty> = relevant[..position]
                        .iter()
                        .filter_map(|o| o.as_navigation_property())
                        .collect();
                    outer.starting_entity_set = Some(start);
                    outer.navigation_properties.splice(0..0, crossed);
                }
            }
        }
        Box::new(outer)
    });

    DataModelObjectPath {
        starting_entity_set,
        target_entity_set: current_set,
        target_entity_type,
        target_object,
        navigation_properties,
        context_location,
        converted_types: meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::convert;
    use crate::loader::JsonSource;
    use crate::types::Capabilities;
    use serde_json::json;
    use std::sync::Arc;

    fn metadata() -> ConvertedMetadata {
        let document = json!({
            "$EntityContainer": "NS.Container",
            "NS.": {
                "$kind": "Schema",
                "$Annotations": {
                    "NS.Supplier/Name": {
                        "@com.sap.vocabularies.Common.v1.Label": "Supplier name"
                    },
                    "NS.Supplier": {
                        "@com.sap.vocabularies.UI.v1.HeaderInfo": { "TypeName": "Supplier" }
                    }
                }
            },
            "NS.Product": {
                "$kind": "EntityType",
                "$Key": ["ID"],
                "ID": { "$kind": "Property", "$Type": "Edm.String" },
                "Address": { "$kind": "Property", "$Type": "NS.Address" },
                "Supplier": { "$kind": "NavigationProperty", "$Type": "NS.Supplier" },
                "Items": { "$kind": "NavigationProperty", "$Type": "NS.Item", "$isCollection": true }
            },
            "NS.Address": {
                "$kind": "ComplexType",
                "Street": { "$kind": "Property", "$Type": "Edm.String" },
                "Country": { "$kind": "NavigationProperty", "$Type": "NS.Country" }
            },
            "NS.Supplier": {
                "$kind": "EntityType",
                "$Key": ["ID"],
                "ID": { "$kind": "Property", "$Type": "Edm.String" },
                "Name": { "$kind": "Property", "$Type": "Edm.String" },
                "Country": { "$kind": "NavigationProperty", "$Type": "NS.Country" }
            },
            "NS.Country": {
                "$kind": "EntityType",
                "$Key": ["Code"],
                "Code": { "$kind": "Property", "$Type": "Edm.String" }
            },
            "NS.Item": {
                "$kind": "EntityType",
                "$Key": ["ID"],
                "ID": { "$kind": "Property", "$Type": "Edm.String" },
                "Product": { "$kind": "NavigationProperty", "$Type": "NS.Product" }
            },
            "NS.Approve": [{
                "$kind": "Action",
                "$IsBound": true,
                "$Parameter": [
                    { "$Name": "_it", "$Type": "NS.Product" },
                    { "$Name": "Comment", "$Type": "Edm.String" }
                ]
            }],
            "NS.Container": {
                "$kind": "EntityContainer",
                "Products": {
                    "$kind": "EntitySet",
                    "$Type": "NS.Product",
                    "$NavigationPropertyBinding": {
                        "Supplier": "Suppliers",
                        "Items/Product": "Products",
                        "Address/Country": "Countries"
                    }
                },
                "Suppliers": { "$kind": "EntitySet", "$Type": "NS.Supplier" },
                "Countries": { "$kind": "EntitySet", "$Type": "NS.Country" },
                "Me": {
                    "$kind": "Singleton",
                    "$Type": "NS.Supplier",
                    "$NavigationPropertyBinding": { "Country": "Countries" }
                }
            }
        });
        convert(Arc::new(JsonSource::new("paths", document)), Capabilities::default()).unwrap()
    }

    #[test]
    fn container_prefix_skipped() {
        let meta = metadata();
        let with = resolve_context("/Container/Products/ID", &meta, true);
        let without = resolve_context("/Products/ID", &meta, true);
        assert_eq!(
            with.target.unwrap().fully_qualified_name(),
            Some("NS.Product/ID")
        );
        assert!(with.target.unwrap().same(&without.target.unwrap()));
        assert_eq!(with.visited_objects[0].kind(), "EntityContainer");
    }

    #[test]
    fn bare_set_resolves_to_itself() {
        let meta = metadata();
        let resolved = resolve_context("/Me", &meta, true);
        assert_eq!(resolved.target.unwrap().kind(), "Singleton");
    }

    #[test]
    fn binding_marker_switches_entity_set() {
        let meta = metadata();
        let resolved = resolve_context(
            "/Products/$NavigationPropertyBinding/Supplier/Name",
            &meta,
            true,
        );
        assert_eq!(
            resolved.target.unwrap().fully_qualified_name(),
            Some("NS.Supplier/Name")
        );
        let names: Vec<&str> = resolved
            .visited_objects
            .iter()
            .filter_map(|o| o.name())
            .collect();
        assert_eq!(names, vec!["Products", "Supplier", "Suppliers", "Supplier", "Name"]);
    }

    #[test]
    fn binding_marker_takes_multi_segment_key() {
        let meta = metadata();
        let resolved = resolve_context(
            "/Products/$NavigationPropertyBinding/Items/Product/ID",
            &meta,
            true,
        );
        assert_eq!(
            resolved.target.unwrap().fully_qualified_name(),
            Some("NS.Product/ID")
        );
        let model = resolve_data_model_path(&resolved, &meta, None, false);
        assert_eq!(model.target_entity_set.unwrap().name(), Some("Products"));
        assert_eq!(model.navigation_path(), "Items/Product");
    }

    #[test]
    fn binding_key_through_complex_property() {
        let meta = metadata();
        let resolved = resolve_context(
            "/Products/$NavigationPropertyBinding/Address/Country",
            &meta,
            true,
        );
        assert_eq!(resolved.target.unwrap().name(), Some("Countries"));
        assert!(resolved
            .visited_objects
            .iter()
            .any(|o| o.fully_qualified_name() == Some("NS.Address/Country")));

        let model = resolve_data_model_path(&resolved, &meta, None, false);
        assert_eq!(model.starting_entity_set.unwrap().name(), Some("Products"));
        assert_eq!(model.target_entity_set.unwrap().name(), Some("Countries"));
        assert_eq!(model.target_entity_type.unwrap().name, "Country");
        assert_eq!(model.navigation_path(), "Country");

        let resolved = resolve_context(
            "/Products/$NavigationPropertyBinding/Address/Country/Code",
            &meta,
            true,
        );
        assert_eq!(
            resolved.target.unwrap().fully_qualified_name(),
            Some("NS.Country/Code")
        );
    }

    #[test]
    fn plain_path_through_complex_property_uses_binding() {
        let meta = metadata();
        let resolved = resolve_context("/Products/Address/Country/Code", &meta, true);
        assert_eq!(
            resolved.target.unwrap().fully_qualified_name(),
            Some("NS.Country/Code")
        );
        let model = resolve_data_model_path(&resolved, &meta, None, false);
        assert_eq!(model.target_entity_set.unwrap().name(), Some("Countries"));
        assert_eq!(model.navigation_path(), "Country");
    }

    #[test]
    fn singleton_binding_marker() {
        let meta = metadata();
        let resolved = resolve_context("/Me/$NavigationPropertyBinding/Country/Code", &meta, true);
        assert_eq!(
            resolved.target.unwrap().fully_qualified_name(),
            Some("NS.Country/Code")
        );
        let model = resolve_data_model_path(&resolved, &meta, None, false);
        assert_eq!(model.starting_entity_set.unwrap().kind(), "Singleton");
        assert_eq!(model.target_entity_set.unwrap().name(), Some("Countries"));
        assert_eq!(model.navigation_path(), "Country");
    }

    #[test]
    fn dangling_navigation_clears_target_set() {
        let meta = metadata();
        let resolved = resolve_context("/Products/$NavigationPropertyBinding/Items/ID", &meta, true);
        assert_eq!(
            resolved.target.unwrap().fully_qualified_name(),
            Some("NS.Item/ID")
        );
        let model = resolve_data_model_path(&resolved, &meta, None, false);
        assert!(model.target_entity_set.is_none());
        assert_eq!(model.target_entity_type.unwrap().name, "Item");
        assert_eq!(model.navigation_path(), "Items");
    }

    #[test]
    fn type_cast_marker_normalized() {
        let meta = metadata();
        let resolved = resolve_context("/Products/$Type/NS.Product/ID", &meta, true);
        assert_eq!(
            resolved.target.unwrap().fully_qualified_name(),
            Some("NS.Product/ID")
        );

        let resolved = resolve_context("/Suppliers/$Type@UI.HeaderInfo", &meta, true);
        let annotation = resolved.target.unwrap().as_annotation().unwrap();
        assert_eq!(annotation.term, "UI.HeaderInfo");

        let resolved = resolve_context("/Suppliers/$Type", &meta, true);
        assert_eq!(resolved.target.unwrap().kind(), "EntityType");
    }

    #[test]
    fn annotation_on_property() {
        let meta = metadata();
        let resolved = resolve_context("/Suppliers/Name@Common.Label", &meta, false);
        let annotation = resolved.target.unwrap().as_annotation().unwrap();
        assert_eq!(annotation.term, "Common.Label");
    }

    #[test]
    fn bound_action_and_parameter() {
        let meta = metadata();
        let action = resolve_context("/Products/Approve", &meta, true);
        assert_eq!(
            action.target.unwrap().fully_qualified_name(),
            Some("NS.Approve(NS.Product)")
        );

        let parameter = resolve_context("/Products/Approve/Comment", &meta, true);
        let parameter = parameter.target.unwrap().as_action_parameter().unwrap();
        assert_eq!(parameter.fully_qualified_name, "NS.Approve(NS.Product)/Comment");

        let missing = resolve_context("/Products/Approve/Nope", &meta, true);
        assert!(missing.target.is_none());
    }

    #[test]
    fn qualified_type_path() {
        let meta = metadata();
        let resolved = resolve_context("/NS.Supplier/Country/Code", &meta, true);
        assert_eq!(
            resolved.target.unwrap().fully_qualified_name(),
            Some("NS.Country/Code")
        );
    }

    #[test]
    fn unknown_path_has_no_target() {
        let meta = metadata();
        assert!(resolve_context("/Nothing/Here", &meta, true).target.is_none());
        assert!(resolve_context("/Products/Nothing", &meta, true).target.is_none());
    }

    #[test]
    fn context_location_defaults_to_self() {
        let meta = metadata();
        let resolved = resolve_context("/Products/ID", &meta, true);
        let model = resolve_data_model_path(&resolved, &meta, None, false);
        assert!(model.context_location.is_none());
        assert!(std::ptr::eq(model.context_location(), &model));
    }

    #[test]
    fn only_service_objects_drops_plain_values() {
        let meta = metadata();
        let resolved = resolve_context("/Suppliers/Name@Common.Label", &meta, true);
        let model = resolve_data_model_path(&resolved, &meta, None, true);
        assert!(model.target_object.is_none());

        let resolved = resolve_context("/Suppliers/Name", &meta, true);
        let model = resolve_data_model_path(&resolved, &meta, None, true);
        assert_eq!(model.target_object.unwrap().kind(), "Property");
    }

    #[test]
    fn summary_names_objects() {
        let meta = metadata();
        let resolved = resolve_context("/Products/Supplier/Name", &meta, true);
        let model = resolve_data_model_path(&resolved, &meta, None, false);
        let summary = model.to_json();
        assert_eq!(summary["startingEntitySet"], "Products");
        assert_eq!(summary["targetEntitySet"], "Suppliers");
        assert_eq!(summary["targetObject"]["kind"], "Property");
        assert_eq!(summary["navigationProperties"], json!(["Supplier"]));
    }
}
