//! Annotation value parsing.
//!
//! Raw annotation values use the CSDL JSON dynamic-expression grammar: plain
//! JSON primitives, arrays, objects carrying one operator key (`$Path`,
//! `$If`, ...), or records (objects with an optional `$Type`). Parsing turns
//! them into the tagged [`Expression`] tree.
//!
//! Keys starting with `@` inside a record are annotations of that record. They
//! are not part of the expression; the parser hands them to an
//! [`AnnotationSink`] together with the target string of the record.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::vocabulary::alias_enum_member;

/// Operator keys in dispatch priority order.
const OPERATOR_KEYS: &[&str] = &[
    "$Path",
    "$Decimal",
    "$PropertyPath",
    "$NavigationPropertyPath",
    "$If",
    "$And",
    "$Or",
    "$Not",
    "$Eq",
    "$Ne",
    "$Gt",
    "$Ge",
    "$Lt",
    "$Le",
    "$Apply",
    "$AnnotationPath",
    "$EnumMember",
];

/// Markers probed, in order, on the first collection element to infer the
/// collection's item kind.
const COLLECTION_MARKERS: &[(&str, CollectionKind)] = &[
    ("$PropertyPath", CollectionKind::PropertyPath),
    ("$Path", CollectionKind::Path),
    ("$NavigationPropertyPath", CollectionKind::NavigationPropertyPath),
    ("$AnnotationPath", CollectionKind::AnnotationPath),
    ("$Type", CollectionKind::Record),
    ("$If", CollectionKind::If),
    ("$Or", CollectionKind::Or),
    ("$And", CollectionKind::And),
    ("$Eq", CollectionKind::Eq),
    ("$Ne", CollectionKind::Ne),
    ("$Not", CollectionKind::Not),
    ("$Gt", CollectionKind::Gt),
    ("$Ge", CollectionKind::Ge),
    ("$Lt", CollectionKind::Lt),
    ("$Le", CollectionKind::Le),
    ("$Apply", CollectionKind::Apply),
];

/// A parsed annotation or property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Expression {
    Null,
    String(String),
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Path(String),
    PropertyPath(String),
    NavigationPropertyPath(String),
    AnnotationPath(String),
    /// Alias-resolved `Alias.Type/Member` reference.
    EnumMember(String),
    Record(Record),
    Collection(Collection),
    /// Condition, then-branch, else-branch.
    If(Vec<Expression>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Eq(Vec<Expression>),
    Ne(Vec<Expression>),
    Gt(Vec<Expression>),
    Ge(Vec<Expression>),
    Lt(Vec<Expression>),
    Le(Vec<Expression>),
    Apply(Apply),
}

/// Structured value with an optional declared type.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Value of `$Type`, kept fully qualified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub property_values: Vec<PropertyValue>,
}

/// One named member of a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyValue {
    pub name: String,
    pub value: Expression,
}

/// Ordered list of values with an advisory item kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    /// Inferred from the first element only.
    pub kind: CollectionKind,
    pub items: Vec<Expression>,
}

/// Client-side function application (`$Apply` + `$Function`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Apply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub parameters: Vec<Expression>,
}

/// Item kind hint attached to a [`Collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CollectionKind {
    Empty,
    PropertyPath,
    Path,
    NavigationPropertyPath,
    AnnotationPath,
    Record,
    If,
    Or,
    And,
    Eq,
    Ne,
    Not,
    Gt,
    Ge,
    Lt,
    Le,
    Apply,
    String,
}

impl Expression {
    /// Variant name, as used in the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Null => "Null",
            Expression::String(_) => "String",
            Expression::Bool(_) => "Bool",
            Expression::Int(_) => "Int",
            Expression::Decimal(_) => "Decimal",
            Expression::Path(_) => "Path",
            Expression::PropertyPath(_) => "PropertyPath",
            Expression::NavigationPropertyPath(_) => "NavigationPropertyPath",
            Expression::AnnotationPath(_) => "AnnotationPath",
            Expression::EnumMember(_) => "EnumMember",
            Expression::Record(_) => "Record",
            Expression::Collection(_) => "Collection",
            Expression::If(_) => "If",
            Expression::And(_) => "And",
            Expression::Or(_) => "Or",
            Expression::Not(_) => "Not",
            Expression::Eq(_) => "Eq",
            Expression::Ne(_) => "Ne",
            Expression::Gt(_) => "Gt",
            Expression::Ge(_) => "Ge",
            Expression::Lt(_) => "Lt",
            Expression::Le(_) => "Le",
            Expression::Apply(_) => "Apply",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expression::String(s) => Some(s),
            _ => None,
        }
    }

    /// The path carried by a `Path` expression.
    pub fn path(&self) -> Option<&str> {
        match self {
            Expression::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Expression::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Expression::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Expression::Collection(_))
    }

    /// Step into a record member (by name) or a collection item (by index).
    pub fn member(&self, segment: &str) -> Option<&Expression> {
        match self {
            Expression::Record(record) => record.property(segment),
            Expression::Collection(collection) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| collection.items.get(i)),
            _ => None,
        }
    }
}

impl Record {
    pub fn property(&self, name: &str) -> Option<&Expression> {
        self.property_values
            .iter()
            .find(|pv| pv.name == name)
            .map(|pv| &pv.value)
    }
}

/// Receiver for annotations found on sub-objects while parsing.
pub trait AnnotationSink {
    /// Handle the raw `key` (`@Term[#Qualifier]`) entry of the object at `target`.
    fn annotate(&mut self, target: &str, key: &str, value: &Value);
}

/// Sink that drops nested annotations.
#[derive(Debug, Default)]
pub struct DiscardAnnotations;

impl AnnotationSink for DiscardAnnotations {
    fn annotate(&mut self, _target: &str, _key: &str, _value: &Value) {}
}

/// Position of a value relative to its parent, used to derive target strings.
#[derive(Debug, Clone, Copy)]
pub enum ValueKind<'a> {
    /// The value of a named annotation; the target is already complete.
    Annotation,
    /// A record member.
    Property(&'a str),
    /// A collection element or operator operand.
    Item(usize),
}

impl ValueKind<'_> {
    fn target(&self, parent: &str) -> String {
        match self {
            ValueKind::Annotation => parent.to_string(),
            ValueKind::Property(name) => format!("{}/{}", parent, name),
            ValueKind::Item(index) => format!("{}/{}", parent, index),
        }
    }
}

/// Parse a raw annotation value.
///
/// `target` names the annotated value itself (for example
/// `NS.Product@UI.LineItem`). Never fails: shapes that match no operator
/// become records.
pub fn parse_expression(raw: &Value, target: &str, sink: &mut dyn AnnotationSink) -> Expression {
    parse_value(raw, target, ValueKind::Annotation, sink)
}

/// Parse a raw value positioned under `parent` as described by `kind`.
pub fn parse_value(
    raw: &Value,
    parent: &str,
    kind: ValueKind<'_>,
    sink: &mut dyn AnnotationSink,
) -> Expression {
    match raw {
        Value::Null => Expression::Null,
        Value::String(s) => Expression::String(s.clone()),
        Value::Bool(b) => Expression::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Expression::Int(i),
            None => Expression::Decimal(n.as_f64().unwrap_or_default()),
        },
        Value::Array(items) => {
            let target = kind.target(parent);
            parse_collection(items, &target, sink)
        }
        Value::Object(map) => {
            let target = kind.target(parent);
            parse_object(map, &target, sink)
        }
    }
}

fn parse_collection(items: &[Value], target: &str, sink: &mut dyn AnnotationSink) -> Expression {
    let kind = infer_collection_kind(items);
    let items = items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_value(item, target, ValueKind::Item(i), sink))
        .collect();
    Expression::Collection(Collection { kind, items })
}

/// Infer the item kind of a collection from its first element.
pub fn infer_collection_kind(items: &[Value]) -> CollectionKind {
    let Some(first) = items.first() else {
        return CollectionKind::Empty;
    };
    match first {
        Value::Object(map) => COLLECTION_MARKERS
            .iter()
            .find(|(key, _)| map.contains_key(*key))
            .map(|(_, kind)| *kind)
            .unwrap_or(CollectionKind::Record),
        Value::Array(_) => CollectionKind::Record,
        _ => CollectionKind::String,
    }
}

fn parse_object(map: &Map<String, Value>, target: &str, sink: &mut dyn AnnotationSink) -> Expression {
    let operator = OPERATOR_KEYS
        .iter()
        .find_map(|key| map.get(*key).map(|v| (*key, v)));

    match operator {
        Some((key, value)) => parse_operator(key, value, map, target, sink),
        None => Expression::Record(parse_record(map, target, sink)),
    }
}

fn parse_operator(
    key: &str,
    value: &Value,
    map: &Map<String, Value>,
    target: &str,
    sink: &mut dyn AnnotationSink,
) -> Expression {
    match key {
        "$Path" => Expression::Path(string_of(value)),
        "$PropertyPath" => Expression::PropertyPath(string_of(value)),
        "$NavigationPropertyPath" => Expression::NavigationPropertyPath(string_of(value)),
        "$AnnotationPath" => Expression::AnnotationPath(string_of(value)),
        "$EnumMember" => Expression::EnumMember(alias_enum_member(&string_of(value))),
        "$Decimal" => parse_decimal(value),
        "$Not" => Expression::Not(Box::new(parse_value(
            value,
            target,
            ValueKind::Item(0),
            sink,
        ))),
        "$If" => Expression::If(operands(value, target, sink)),
        "$And" => Expression::And(operands(value, target, sink)),
        "$Or" => Expression::Or(operands(value, target, sink)),
        "$Eq" => Expression::Eq(operands(value, target, sink)),
        "$Ne" => Expression::Ne(operands(value, target, sink)),
        "$Gt" => Expression::Gt(operands(value, target, sink)),
        "$Ge" => Expression::Ge(operands(value, target, sink)),
        "$Lt" => Expression::Lt(operands(value, target, sink)),
        "$Le" => Expression::Le(operands(value, target, sink)),
        "$Apply" => Expression::Apply(Apply {
            function: map
                .get("$Function")
                .and_then(Value::as_str)
                .map(String::from),
            parameters: operands(value, target, sink),
        }),
        _ => Expression::Record(parse_record(map, target, sink)),
    }
}

fn parse_record(map: &Map<String, Value>, target: &str, sink: &mut dyn AnnotationSink) -> Record {
    let type_name = map.get("$Type").and_then(Value::as_str).map(String::from);
    let mut property_values = Vec::new();

    for (key, value) in map {
        if key.starts_with('@') {
            sink.annotate(target, key, value);
            continue;
        }
        if key == "$Type" || OPERATOR_KEYS.contains(&key.as_str()) {
            continue;
        }
        property_values.push(PropertyValue {
            name: key.clone(),
            value: parse_value(value, target, ValueKind::Property(key), sink),
        });
    }

    Record {
        type_name,
        property_values,
    }
}

fn operands(value: &Value, target: &str, sink: &mut dyn AnnotationSink) -> Vec<Expression> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_value(item, target, ValueKind::Item(i), sink))
            .collect(),
        single => vec![parse_value(single, target, ValueKind::Item(0), sink)],
    }
}

fn parse_decimal(value: &Value) -> Expression {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(d) => Expression::Decimal(d),
        None => Expression::Null,
    }
}

fn string_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
