//! Schema building - normalizes the raw CSDL JSON member table.
//!
//! The raw table maps qualified names to member objects distinguished by
//! `$kind`. Building produces typed records for entity types, complex types,
//! type definitions, actions and the entity container. Entity sets and
//! singletons live in arenas; navigation property bindings are resolved in a
//! second pass into indices of those arenas.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::types::{split_qualifier, terms};
use crate::vocabulary::alias;

/// Normalized, not yet linked schema.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSchema {
    pub namespace: String,
    pub entity_container: EntityContainer,
    pub entity_types: Vec<EntityType>,
    pub complex_types: Vec<ComplexType>,
    pub type_definitions: Vec<TypeDefinition>,
    pub entity_sets: Vec<EntitySet>,
    pub singletons: Vec<EntitySet>,
    pub actions: Vec<Action>,
    pub action_imports: Vec<ActionImport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityContainer {
    pub name: String,
    pub fully_qualified_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityType {
    pub name: String,
    pub fully_qualified_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    /// Key properties, in `$Key` order; always a subset of `entity_properties`.
    pub keys: Vec<Property>,
    /// Own and inherited properties.
    pub entity_properties: Vec<Property>,
    pub navigation_properties: Vec<NavigationProperty>,
    /// Bound operations, keyed by their unbound qualified name, valued by
    /// index into the action list.
    #[serde(skip)]
    pub actions: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexType {
    pub name: String,
    pub fully_qualified_name: String,
    pub properties: Vec<Property>,
    pub navigation_properties: Vec<NavigationProperty>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    pub name: String,
    pub fully_qualified_name: String,
    pub underlying_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    pub fully_qualified_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub is_collection: bool,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
}

/// `$Scale` facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Fixed(u64),
    Variable,
    Floating,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationProperty {
    pub name: String,
    pub fully_qualified_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
    pub is_collection: bool,
    pub contains_target: bool,
    pub target_type_name: String,
    pub referential_constraint: Vec<ReferentialConstraint>,
    /// Index of the target entity type, set while linking.
    #[serde(skip)]
    pub target_type: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferentialConstraint {
    pub source_property: String,
    pub target_property: String,
    pub source_type_name: String,
    pub target_type_name: String,
}

/// Entity set or singleton.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySet {
    pub name: String,
    pub fully_qualified_name: String,
    pub entity_type_name: String,
    #[serde(skip)]
    pub navigation_property_binding: BTreeMap<String, EntitySetRef>,
}

/// Index into the entity set or singleton arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntitySetRef {
    EntitySet(usize),
    Singleton(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    /// Carries a `(Type)` or `(Collection(Type))` suffix when bound.
    pub fully_qualified_name: String,
    pub is_bound: bool,
    pub is_function: bool,
    /// Binding parameter type; empty when unbound.
    pub source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<ReturnType>,
    pub parameters: Vec<ActionParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnType {
    #[serde(rename = "type")]
    pub type_name: String,
    pub is_collection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParameter {
    pub name: String,
    /// `ActionFQN/ParameterName`.
    pub fully_qualified_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub is_collection: bool,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionImport {
    pub name: String,
    pub fully_qualified_name: String,
    pub action_name: String,
}

impl Action {
    /// Qualified name without the binding suffix.
    pub fn unbound_name(&self) -> &str {
        match self.fully_qualified_name.find('(') {
            Some(i) => &self.fully_qualified_name[..i],
            None => &self.fully_qualified_name,
        }
    }
}

impl EntityType {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.entity_properties.iter().find(|p| p.name == name)
    }

    pub fn navigation_property(&self, name: &str) -> Option<&NavigationProperty> {
        self.navigation_properties.iter().find(|n| n.name == name)
    }
}

/// Builds a [`RawSchema`] from the raw member table.
pub struct SchemaBuilder<'a> {
    members: &'a Map<String, Value>,
    namespace: String,
    schema: RawSchema,
}

impl<'a> SchemaBuilder<'a> {
    /// Build the schema. Never fails: unknown members are skipped and
    /// unresolvable references degrade to absent values.
    pub fn build(raw: &Value) -> RawSchema {
        let Some(members) = raw.as_object() else {
            tracing::warn!("Raw schema is not an object; producing an empty schema");
            return RawSchema::default();
        };

        let namespace = infer_namespace(members);
        let mut builder = SchemaBuilder {
            members,
            namespace: namespace.clone(),
            schema: RawSchema {
                namespace,
                ..RawSchema::default()
            },
        };
        builder.run();
        builder.schema
    }

    fn run(&mut self) {
        let mut container: Option<(&str, &Map<String, Value>)> = None;
        let mut container_members: Vec<(&str, &str, &Map<String, Value>)> = Vec::new();
        let members = self.members;

        for (name, member) in members {
            if name.starts_with('$') {
                continue;
            }
            // Overloaded operations are listed as arrays
            let overloads: Vec<&Value> = match member {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for member in overloads {
                let Some(object) = member.as_object() else {
                    continue;
                };
                let kind = object.get("$kind").and_then(Value::as_str).unwrap_or("");
                tracing::trace!(member = %name, kind, "Preparing schema member");

                match kind {
                    "EntityContainer" => container = Some((name.as_str(), object)),
                    "EntitySet" | "Singleton" | "ActionImport" | "FunctionImport" => {
                        if let Some((owner, short)) = name.split_once('/') {
                            container_members.push((owner, short, object));
                        }
                    }
                    "Action" | "Function" => self.prepare_action(name, object, kind == "Function"),
                    "EntityType" => self.prepare_entity_type(name, object),
                    "ComplexType" => self.prepare_complex_type(name, object),
                    "TypeDefinition" => self.prepare_type_definition(name, object),
                    _ => {}
                }
            }
        }

        if let Some((name, object)) = container {
            let mut entries: Vec<(&str, &Map<String, Value>)> = object
                .iter()
                .filter(|(key, _)| !key.starts_with('$') && !key.starts_with('@'))
                .filter_map(|(key, value)| value.as_object().map(|o| (key.as_str(), o)))
                .collect();
            entries.extend(
                container_members
                    .iter()
                    .filter(|(owner, _, _)| *owner == name)
                    .map(|(_, short, object)| (*short, *object)),
            );
            self.parse_entity_container(name, &entries);
        }

        self.link_bound_actions();
    }

    fn short_name(&self, qualified: &str) -> String {
        let prefix = format!("{}.", self.namespace);
        match qualified.strip_prefix(&prefix) {
            Some(short) if !self.namespace.is_empty() => short.to_string(),
            _ => qualified
                .rsplit_once('.')
                .map(|(_, short)| short.to_string())
                .unwrap_or_else(|| qualified.to_string()),
        }
    }

    fn prepare_entity_type(&mut self, name: &str, object: &Map<String, Value>) {
        let members = self.members;
        let mut entity_properties = Vec::new();
        let mut navigation_properties = Vec::new();

        // Inherited members first, nearest base last
        let mut chain = Vec::new();
        let mut visited = HashSet::from([name.to_string()]);
        let mut base = object.get("$BaseType").and_then(Value::as_str);
        while let Some(base_name) = base {
            if !visited.insert(base_name.to_string()) {
                break;
            }
            let Some(base_object) = members.get(base_name).and_then(Value::as_object) else {
                break;
            };
            chain.push((base_name, base_object));
            base = base_object.get("$BaseType").and_then(Value::as_str);
        }
        for (base_name, base_object) in chain.iter().rev() {
            let (props, navs) = prepare_members(base_name, base_object);
            entity_properties.extend(props);
            navigation_properties.extend(navs);
        }

        let (props, navs) = prepare_members(name, object);
        entity_properties.extend(props);
        navigation_properties.extend(navs);

        let key_names = prepare_entity_keys(object, members, &mut HashSet::new());
        let keys = key_names
            .iter()
            .filter_map(|key| entity_properties.iter().find(|p| &p.name == key))
            .cloned()
            .collect();

        self.schema.entity_types.push(EntityType {
            name: self.short_name(name),
            fully_qualified_name: name.to_string(),
            base_type: object
                .get("$BaseType")
                .and_then(Value::as_str)
                .map(String::from),
            keys,
            entity_properties,
            navigation_properties,
            actions: BTreeMap::new(),
        });
    }

    fn prepare_complex_type(&mut self, name: &str, object: &Map<String, Value>) {
        let (properties, navigation_properties) = prepare_members(name, object);
        self.schema.complex_types.push(ComplexType {
            name: self.short_name(name),
            fully_qualified_name: name.to_string(),
            properties,
            navigation_properties,
        });
    }

    fn prepare_type_definition(&mut self, name: &str, object: &Map<String, Value>) {
        self.schema.type_definitions.push(TypeDefinition {
            name: self.short_name(name),
            fully_qualified_name: name.to_string(),
            underlying_type: str_field(object, "$UnderlyingType"),
        });
    }

    fn prepare_action(&mut self, name: &str, object: &Map<String, Value>, is_function: bool) {
        let is_bound = object
            .get("$IsBound")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let raw_parameters: Vec<&Map<String, Value>> = object
            .get("$Parameter")
            .and_then(Value::as_array)
            .map(|params| params.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default();

        let mut fully_qualified_name = name.to_string();
        let mut source_type = String::new();
        if is_bound {
            if let Some(binding) = raw_parameters.first() {
                source_type = str_field(binding, "$Type");
                if bool_field(binding, "$isCollection", false) {
                    fully_qualified_name = format!("{}(Collection({}))", name, source_type);
                } else {
                    fully_qualified_name = format!("{}({})", name, source_type);
                }
            }
        }

        let parameters = raw_parameters
            .iter()
            .map(|param| {
                let param_name = str_field(param, "$Name");
                ActionParameter {
                    fully_qualified_name: format!("{}/{}", fully_qualified_name, param_name),
                    name: param_name,
                    type_name: str_field(param, "$Type"),
                    is_collection: bool_field(param, "$isCollection", false),
                    nullable: bool_field(param, "$Nullable", true),
                }
            })
            .collect();

        let return_type = object
            .get("$ReturnType")
            .and_then(Value::as_object)
            .map(|ret| ReturnType {
                type_name: str_field(ret, "$Type"),
                is_collection: bool_field(ret, "$isCollection", false),
            });

        self.schema.actions.push(Action {
            name: self.short_name(name),
            fully_qualified_name,
            is_bound,
            is_function,
            source_type,
            return_type,
            parameters,
        });
    }

    fn parse_entity_container(&mut self, name: &str, entries: &[(&str, &Map<String, Value>)]) {
        self.schema.entity_container = EntityContainer {
            name: self.short_name(name),
            fully_qualified_name: name.to_string(),
        };

        let mut pending_bindings: Vec<(EntitySetRef, &Map<String, Value>)> = Vec::new();

        for (member_name, object) in entries {
            let kind = object.get("$kind").and_then(Value::as_str).unwrap_or("");
            let fully_qualified_name = format!("{}/{}", name, member_name);
            match kind {
                "EntitySet" | "Singleton" => {
                    let set = EntitySet {
                        name: member_name.to_string(),
                        fully_qualified_name,
                        entity_type_name: str_field(object, "$Type"),
                        navigation_property_binding: BTreeMap::new(),
                    };
                    let set_ref = if kind == "EntitySet" {
                        self.schema.entity_sets.push(set);
                        EntitySetRef::EntitySet(self.schema.entity_sets.len() - 1)
                    } else {
                        self.schema.singletons.push(set);
                        EntitySetRef::Singleton(self.schema.singletons.len() - 1)
                    };
                    if let Some(bindings) = object
                        .get("$NavigationPropertyBinding")
                        .and_then(Value::as_object)
                    {
                        pending_bindings.push((set_ref, bindings));
                    }
                }
                "ActionImport" | "FunctionImport" => {
                    let action_name = object
                        .get("$Action")
                        .or_else(|| object.get("$Function"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    self.schema.action_imports.push(ActionImport {
                        name: member_name.to_string(),
                        fully_qualified_name,
                        action_name,
                    });
                }
                _ => {}
            }
        }

        // Second pass: every set exists now, so binding targets can be resolved
        for (source, bindings) in pending_bindings {
            let mut resolved = BTreeMap::new();
            for (path, target) in bindings {
                let Some(target) = target.as_str() else {
                    continue;
                };
                match self.find_set(name, target) {
                    Some(target_ref) => {
                        resolved.insert(path.clone(), target_ref);
                    }
                    None => tracing::debug!(
                        binding = %path,
                        binding_target = %target,
                        "Navigation property binding target not in container; omitted"
                    ),
                }
            }
            match source {
                EntitySetRef::EntitySet(i) => {
                    self.schema.entity_sets[i].navigation_property_binding = resolved
                }
                EntitySetRef::Singleton(i) => {
                    self.schema.singletons[i].navigation_property_binding = resolved
                }
            }
        }
    }

    fn find_set(&self, container: &str, target: &str) -> Option<EntitySetRef> {
        let local = match target.split_once('/') {
            Some((owner, local)) if owner == container => local,
            Some(_) => return None,
            None => target,
        };
        if let Some(i) = self.schema.entity_sets.iter().position(|s| s.name == local) {
            return Some(EntitySetRef::EntitySet(i));
        }
        self.schema
            .singletons
            .iter()
            .position(|s| s.name == local)
            .map(EntitySetRef::Singleton)
    }

    fn link_bound_actions(&mut self) {
        for (index, action) in self.schema.actions.iter().enumerate() {
            if !action.is_bound {
                continue;
            }
            let Some(entity_type) = self
                .schema
                .entity_types
                .iter_mut()
                .find(|t| t.fully_qualified_name == action.source_type)
            else {
                continue;
            };
            let key = action.unbound_name().to_string();
            // The single-entity overload wins over the collection-bound one
            if action.fully_qualified_name.ends_with("))") {
                entity_type.actions.entry(key).or_insert(index);
            } else {
                entity_type.actions.insert(key, index);
            }
        }
    }
}

fn prepare_members(
    owner: &str,
    object: &Map<String, Value>,
) -> (Vec<Property>, Vec<NavigationProperty>) {
    let mut properties = Vec::new();
    let mut navigation_properties = Vec::new();

    for (name, member) in object {
        if name.starts_with('$') || name.contains('@') {
            continue;
        }
        let Some(member) = member.as_object() else {
            continue;
        };
        match member.get("$kind").and_then(Value::as_str) {
            Some("Property") => properties.push(Property {
                name: name.clone(),
                fully_qualified_name: format!("{}/{}", owner, name),
                type_name: str_field(member, "$Type"),
                is_collection: bool_field(member, "$isCollection", false),
                nullable: bool_field(member, "$Nullable", true),
                max_length: member.get("$MaxLength").and_then(Value::as_u64),
                precision: member.get("$Precision").and_then(Value::as_u64),
                scale: member.get("$Scale").and_then(parse_scale),
            }),
            Some("NavigationProperty") => {
                let target_type_name = str_field(member, "$Type");
                let referential_constraint = member
                    .get("$ReferentialConstraint")
                    .and_then(Value::as_object)
                    .map(|constraints| {
                        constraints
                            .iter()
                            .filter(|(source, _)| !source.contains('@'))
                            .filter_map(|(source, target)| {
                                target.as_str().map(|target| ReferentialConstraint {
                                    source_property: source.clone(),
                                    target_property: target.to_string(),
                                    source_type_name: owner.to_string(),
                                    target_type_name: target_type_name.clone(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                navigation_properties.push(NavigationProperty {
                    name: name.clone(),
                    fully_qualified_name: format!("{}/{}", owner, name),
                    partner: member
                        .get("$Partner")
                        .and_then(Value::as_str)
                        .map(String::from),
                    is_collection: bool_field(member, "$isCollection", false),
                    contains_target: bool_field(member, "$ContainsTarget", false),
                    target_type_name,
                    referential_constraint,
                    target_type: None,
                });
            }
            _ => {}
        }
    }

    (properties, navigation_properties)
}

/// Resolve key property names, walking `$BaseType` when `$Key` is absent.
///
/// Returns an empty list when neither is present (keyless types are tolerated).
fn prepare_entity_keys(
    object: &Map<String, Value>,
    members: &Map<String, Value>,
    visited: &mut HashSet<String>,
) -> Vec<String> {
    if let Some(keys) = object.get("$Key").and_then(Value::as_array) {
        return keys
            .iter()
            .filter_map(|key| match key {
                Value::String(name) => Some(name.clone()),
                // Key alias: { "alias": "path" }
                Value::Object(alias) => alias.values().next().and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect();
    }

    let Some(base_name) = object.get("$BaseType").and_then(Value::as_str) else {
        return Vec::new();
    };
    if !visited.insert(base_name.to_string()) {
        return Vec::new();
    }
    match members.get(base_name).and_then(Value::as_object) {
        Some(base) => prepare_entity_keys(base, members, visited),
        None => Vec::new(),
    }
}

/// Namespace of the single schema in the table.
fn infer_namespace(members: &Map<String, Value>) -> String {
    let schema_key = members.iter().find_map(|(key, member)| {
        (member.get("$kind").and_then(Value::as_str) == Some("Schema")).then_some(key)
    });
    if let Some(key) = schema_key {
        return key.trim_end_matches('.').to_string();
    }

    let qualified = members
        .get("$EntityContainer")
        .and_then(Value::as_str)
        .or_else(|| {
            members
                .keys()
                .find(|key| !key.starts_with('$') && key.contains('.'))
                .map(String::as_str)
        });
    qualified
        .map(|name| name.split('/').next().unwrap_or(name))
        .and_then(|name| name.rsplit_once('.'))
        .map(|(namespace, _)| namespace.to_string())
        .unwrap_or_default()
}

/// The `$Annotations` table of the schema-kind member, if any.
pub fn embedded_annotations(raw: &Value) -> Option<&Map<String, Value>> {
    raw.as_object()?
        .values()
        .find(|member| member.get("$kind").and_then(Value::as_str) == Some("Schema"))?
        .get("$Annotations")?
        .as_object()
}

/// Add the annotations the schema implies to a raw annotation table.
///
/// Every entity property without a `UI.DataFieldDefault` gets one whose value
/// is the property itself, and `UI.FilterFacets` records without an `ID` get
/// one derived from their annotation path target.
pub fn prepare_annotations(schema: &RawSchema, annotations: &mut Map<String, Value>) {
    for entity_type in &schema.entity_types {
        for property in &entity_type.entity_properties {
            let entry = annotations
                .entry(property.fully_qualified_name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let Some(entry) = entry.as_object_mut() else {
                continue;
            };
            let declared = entry
                .keys()
                .any(|key| annotation_term_is(key, terms::DATA_FIELD_DEFAULT));
            if !declared {
                entry.insert(
                    format!("@{}", terms::DATA_FIELD_DEFAULT),
                    json!({
                        "$Type": terms::DATA_FIELD,
                        "Value": { "$Path": property.name }
                    }),
                );
            }
        }

        let Some(type_entry) = annotations
            .get_mut(&entity_type.fully_qualified_name)
            .and_then(Value::as_object_mut)
        else {
            continue;
        };
        for (key, value) in type_entry.iter_mut() {
            if !annotation_term_is(key, terms::FILTER_FACETS) {
                continue;
            }
            let Some(facets) = value.as_array_mut() else {
                continue;
            };
            for facet in facets.iter_mut().filter_map(Value::as_object_mut) {
                if facet.contains_key("ID") {
                    continue;
                }
                let generated = facet
                    .get("Target")
                    .and_then(|t| t.get("$AnnotationPath"))
                    .and_then(Value::as_str)
                    .map(filter_facet_id);
                if let Some(id) = generated {
                    facet.insert("ID".to_string(), Value::String(id));
                }
            }
        }
    }
}

fn annotation_term_is(key: &str, term: &str) -> bool {
    let Some(bare) = key.strip_prefix('@') else {
        return false;
    };
    if bare.contains('@') {
        return false;
    }
    let name = split_qualifier(bare).0;
    name == term || alias(name) == alias(term)
}

/// Stable identifier for a filter facet pointing at `annotation_path`.
fn filter_facet_id(annotation_path: &str) -> String {
    let parts: Vec<String> = annotation_path
        .split(['/', '@', '#'])
        .filter(|part| !part.is_empty())
        .map(alias)
        .collect();
    format!("FilterFacet::{}", parts.join("::"))
}

fn parse_scale(value: &Value) -> Option<Scale> {
    match value {
        Value::Number(n) => n.as_u64().map(Scale::Fixed),
        Value::String(s) if s == "variable" => Some(Scale::Variable),
        Value::String(s) if s == "floating" => Some(Scale::Floating),
        _ => None,
    }
}

fn str_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn bool_field(object: &Map<String, Value>, key: &str, default: bool) -> bool {
    object.get(key).and_then(Value::as_bool).unwrap_or(default)
}
