//! Annotation list building.
//!
//! The raw annotation table maps a target (`NS.Product`, `NS.Product/ID`,
//! `NS.Container/Products`, ...) to its `@Term[#Qualifier]` entries. Each
//! target yields one [`AnnotationList`]; annotations found on nested records,
//! and keys of the form `@Term@OtherTerm`, yield lists for derived targets
//! such as `NS.Product@UI.LineItem/0`.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::expression::{parse_expression, AnnotationSink, Expression};
use crate::types::{json_type_name, split_qualifier, terms, Capabilities};
use crate::vocabulary::alias;

/// One annotation applied to a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedAnnotation {
    /// Aliased term, e.g. `Common.Label`.
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    pub value: Expression,
    /// True exactly when `value` is a collection.
    pub is_collection: bool,
}

impl NamedAnnotation {
    /// `Term` or `Term#Qualifier`.
    pub fn qualified_term(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}#{}", self.term, q),
            None => self.term.clone(),
        }
    }
}

/// All annotations applied to one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationList {
    pub target: String,
    pub annotations: Vec<NamedAnnotation>,
}

/// Decomposed raw annotation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationKey {
    /// Effective target; differs from the owning target for
    /// annotation-of-annotation keys.
    pub target: String,
    /// Aliased term.
    pub term: String,
    pub qualifier: Option<String>,
}

impl AnnotationKey {
    /// Split `@[Term[#Q]@]Term[#Qualifier]` found on `target`.
    ///
    /// Returns `None` for keys that are not annotations.
    pub fn parse(target: &str, key: &str) -> Option<Self> {
        let bare = key.strip_prefix('@')?;
        let segments: Vec<&str> = bare.split('@').collect();
        let (last, inner) = segments.split_last()?;

        let target = if inner.is_empty() {
            target.to_string()
        } else {
            let annotated: Vec<String> = inner.iter().map(|s| alias(s)).collect();
            format!("{}@{}", target, annotated.join("@"))
        };

        let (term, qualifier) = split_qualifier(last);
        if term.is_empty() {
            return None;
        }

        Some(Self {
            target,
            term: alias(term),
            qualifier: qualifier.map(String::from),
        })
    }

    /// Target string of the annotation value itself.
    pub fn value_target(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}@{}#{}", self.target, self.term, q),
            None => format!("{}@{}", self.target, self.term),
        }
    }
}

/// Collects [`AnnotationList`]s from raw annotation maps.
#[derive(Debug)]
pub struct AnnotationListBuilder {
    capabilities: Capabilities,
    lists: Vec<AnnotationList>,
    by_target: HashMap<String, usize>,
}

impl AnnotationListBuilder {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            lists: Vec::new(),
            by_target: HashMap::new(),
        }
    }

    /// Build annotation lists for a whole raw annotation table.
    pub fn build(raw: &Map<String, Value>, capabilities: Capabilities) -> Vec<AnnotationList> {
        let mut builder = Self::new(capabilities);
        for (target, entries) in raw {
            match entries {
                Value::Object(entries) => builder.add_target(target, entries),
                other => tracing::warn!(
                    target_name = %target,
                    actual = json_type_name(other),
                    "Skipping annotation target that is not an object"
                ),
            }
        }
        builder.finish()
    }

    /// Add every annotation entry of one raw target.
    pub fn add_target(&mut self, target: &str, entries: &Map<String, Value>) {
        if entries.is_empty() {
            return;
        }

        let mut entries = entries.clone();
        remove_disabled_terms(&mut entries, &self.capabilities);

        for (key, value) in entries.iter_mut() {
            filter_value(key, value, &self.capabilities);
        }
        for (key, value) in &entries {
            self.add_entry(target, key, value);
        }
    }

    pub fn finish(self) -> Vec<AnnotationList> {
        self.lists
    }

    fn add_entry(&mut self, target: &str, key: &str, value: &Value) {
        let Some(key) = AnnotationKey::parse(target, key) else {
            return;
        };

        let expression = parse_expression(value, &key.value_target(), self);
        let annotation = NamedAnnotation {
            term: key.term,
            qualifier: key.qualifier,
            is_collection: expression.is_collection(),
            value: expression,
        };
        self.list_mut(&key.target).annotations.push(annotation);
    }

    fn list_mut(&mut self, target: &str) -> &mut AnnotationList {
        let index = match self.by_target.get(target) {
            Some(index) => *index,
            None => {
                self.lists.push(AnnotationList {
                    target: target.to_string(),
                    annotations: Vec::new(),
                });
                let index = self.lists.len() - 1;
                self.by_target.insert(target.to_string(), index);
                index
            }
        };
        &mut self.lists[index]
    }
}

impl AnnotationSink for AnnotationListBuilder {
    fn annotate(&mut self, target: &str, key: &str, value: &Value) {
        if !self.capabilities.chart && mentions_term(key, terms::CHART) {
            return;
        }
        let mut value = value.clone();
        filter_value(key, &mut value, &self.capabilities);
        self.add_entry(target, key, &value);
    }
}

/// The innermost term of a raw key, without marker and qualifier.
fn key_term(key: &str) -> &str {
    let last = key.rsplit('@').next().unwrap_or(key);
    split_qualifier(last).0
}

/// True when any term of a raw key, outer or annotating, is `expected`.
fn mentions_term(key: &str, expected: &str) -> bool {
    key.split('@')
        .filter(|segment| !segment.is_empty())
        .any(|segment| is_term(split_qualifier(segment).0, expected))
}

fn is_term(term: &str, expected: &str) -> bool {
    term == expected || alias(term) == alias(expected)
}

/// Drop entries of terms that a capability disables entirely.
fn remove_disabled_terms(entries: &mut Map<String, Value>, capabilities: &Capabilities) {
    if !capabilities.chart {
        entries.retain(|key, _| !mentions_term(key, terms::CHART));
    }
}

/// Strip capability-dependent records from one raw annotation value in place.
fn filter_value(key: &str, value: &mut Value, capabilities: &Capabilities) {
    let term = key_term(key);

    if is_term(term, terms::HEADER_FACETS) {
        if !capabilities.micro_chart {
            retain_records(value, |record| !targets_chart(record));
        }
    } else if is_term(term, terms::IDENTIFICATION) || is_term(term, terms::LINE_ITEM) {
        if !capabilities.intent_based_navigation {
            retain_records(value, |record| !is_intent_navigation(record));
        }
    } else if is_term(term, terms::FIELD_GROUP) {
        if !capabilities.intent_based_navigation {
            if let Some(data) = value.get_mut("Data") {
                retain_records(data, |record| !is_intent_navigation(record));
            }
        }
    } else if is_term(term, terms::PRESENTATION_VARIANT) && !capabilities.chart {
        if let Some(visualizations) = value.get_mut("Visualizations") {
            retain_records(visualizations, |record| !is_chart_reference(record));
        }
    }
}

fn retain_records(value: &mut Value, keep: impl Fn(&Value) -> bool) {
    if let Value::Array(records) = value {
        records.retain(|record| keep(record));
    }
}

fn targets_chart(record: &Value) -> bool {
    record
        .get("Target")
        .and_then(|t| t.get("$AnnotationPath"))
        .and_then(Value::as_str)
        .map(|path| path.contains(terms::CHART) || path.contains("@UI.Chart"))
        .unwrap_or(false)
}

fn is_intent_navigation(record: &Value) -> bool {
    record
        .get("$Type")
        .and_then(Value::as_str)
        .map(|t| is_term(t, terms::DATA_FIELD_FOR_IBN))
        .unwrap_or(false)
}

fn is_chart_reference(record: &Value) -> bool {
    record
        .get("$AnnotationPath")
        .and_then(Value::as_str)
        .and_then(|path| path.rsplit_once('@'))
        .map(|(_, term)| is_term(split_qualifier(term).0, terms::CHART))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(raw: Value, capabilities: Capabilities) -> Vec<AnnotationList> {
        AnnotationListBuilder::build(raw.as_object().unwrap(), capabilities)
    }

    fn find<'a>(lists: &'a [AnnotationList], target: &str) -> &'a AnnotationList {
        lists.iter().find(|l| l.target == target).unwrap()
    }

    #[test]
    fn key_simple() {
        let key = AnnotationKey::parse("NS.T", "@com.sap.vocabularies.UI.v1.LineItem").unwrap();
        assert_eq!(key.target, "NS.T");
        assert_eq!(key.term, "UI.LineItem");
        assert_eq!(key.qualifier, None);
        assert_eq!(key.value_target(), "NS.T@UI.LineItem");
    }

    #[test]
    fn key_with_qualifier() {
        let key = AnnotationKey::parse("NS.T", "@com.sap.vocabularies.UI.v1.LineItem#Q").unwrap();
        assert_eq!(key.term, "UI.LineItem");
        assert_eq!(key.qualifier.as_deref(), Some("Q"));
        assert_eq!(key.value_target(), "NS.T@UI.LineItem#Q");
    }

    #[test]
    fn key_annotation_of_annotation() {
        let key = AnnotationKey::parse(
            "NS.T",
            "@com.sap.vocabularies.UI.v1.LineItem#Q@com.sap.vocabularies.Common.v1.Label",
        )
        .unwrap();
        assert_eq!(key.target, "NS.T@UI.LineItem#Q");
        assert_eq!(key.term, "Common.Label");
    }

    #[test]
    fn key_without_marker_is_ignored() {
        assert!(AnnotationKey::parse("NS.T", "$kind").is_none());
        assert!(AnnotationKey::parse("NS.T", "@").is_none());
    }

    #[test]
    fn label_annotation_aliased() {
        let lists = build(
            json!({
                "NS.Product/ID": { "@com.sap.vocabularies.Common.v1.Label": "Identifier" }
            }),
            Capabilities::default(),
        );
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].target, "NS.Product/ID");
        let annotation = &lists[0].annotations[0];
        assert_eq!(annotation.term, "Common.Label");
        assert_eq!(annotation.value, Expression::String("Identifier".into()));
        assert!(!annotation.is_collection);
    }

    #[test]
    fn empty_target_contributes_nothing() {
        let lists = build(json!({ "NS.Product": {} }), Capabilities::default());
        assert!(lists.is_empty());
    }

    #[test]
    fn collection_flag_set() {
        let lists = build(
            json!({
                "NS.Product": {
                    "@com.sap.vocabularies.UI.v1.LineItem": [
                        { "$Type": "com.sap.vocabularies.UI.v1.DataField", "Value": { "$Path": "ID" } }
                    ]
                }
            }),
            Capabilities::default(),
        );
        assert!(lists[0].annotations[0].is_collection);
    }

    #[test]
    fn nested_record_annotation_gets_own_list() {
        let lists = build(
            json!({
                "NS.Product": {
                    "@com.sap.vocabularies.UI.v1.LineItem": [
                        {
                            "$Type": "com.sap.vocabularies.UI.v1.DataField",
                            "Value": { "$Path": "ID" },
                            "@com.sap.vocabularies.UI.v1.Importance": {
                                "$EnumMember": "com.sap.vocabularies.UI.v1.ImportanceType/High"
                            }
                        }
                    ]
                }
            }),
            Capabilities::default(),
        );
        let nested = find(&lists, "NS.Product@UI.LineItem/0");
        assert_eq!(nested.annotations[0].term, "UI.Importance");
        assert_eq!(
            nested.annotations[0].value,
            Expression::EnumMember("UI.ImportanceType/High".into())
        );
    }

    #[test]
    fn annotation_of_annotation_key_redirects_target() {
        let lists = build(
            json!({
                "NS.Product": {
                    "@com.sap.vocabularies.UI.v1.Chart#Sales": { "Title": "Sales" },
                    "@com.sap.vocabularies.UI.v1.Chart#Sales@com.sap.vocabularies.Common.v1.Label": "Sales chart"
                }
            }),
            Capabilities::default(),
        );
        let nested = find(&lists, "NS.Product@UI.Chart#Sales");
        assert_eq!(nested.annotations[0].term, "Common.Label");
        assert_eq!(find(&lists, "NS.Product").annotations.len(), 1);
    }

    fn line_item_with_ibn() -> Value {
        json!({
            "NS.Product": {
                "@com.sap.vocabularies.UI.v1.LineItem": [
                    { "$Type": "com.sap.vocabularies.UI.v1.DataField", "Value": { "$Path": "ID" } },
                    {
                        "$Type": "com.sap.vocabularies.UI.v1.DataFieldForIntentBasedNavigation",
                        "SemanticObject": "Product",
                        "Action": "display"
                    }
                ]
            }
        })
    }

    #[test]
    fn intent_navigation_removed_when_disabled() {
        let caps = Capabilities::new().intent_based_navigation(false);
        let lists = build(line_item_with_ibn(), caps);
        let items = lists[0].annotations[0].value.as_collection().unwrap();
        assert_eq!(items.items.len(), 1);
        for item in &items.items {
            assert_ne!(
                item.as_record().unwrap().type_name.as_deref(),
                Some(terms::DATA_FIELD_FOR_IBN)
            );
        }
    }

    #[test]
    fn intent_navigation_kept_when_enabled() {
        let lists = build(line_item_with_ibn(), Capabilities::default());
        let items = lists[0].annotations[0].value.as_collection().unwrap();
        assert_eq!(items.items.len(), 2);
    }

    #[test]
    fn field_group_data_filtered() {
        let lists = build(
            json!({
                "NS.Product": {
                    "@com.sap.vocabularies.UI.v1.FieldGroup#General": {
                        "Data": [
                            { "$Type": "com.sap.vocabularies.UI.v1.DataFieldForIntentBasedNavigation" },
                            { "$Type": "com.sap.vocabularies.UI.v1.DataField", "Value": { "$Path": "ID" } }
                        ]
                    }
                }
            }),
            Capabilities::new().intent_based_navigation(false),
        );
        let group = lists[0].annotations[0].value.as_record().unwrap();
        let data = group.property("Data").unwrap().as_collection().unwrap();
        assert_eq!(data.items.len(), 1);
    }

    #[test]
    fn header_micro_charts_filtered() {
        let raw = json!({
            "NS.Product": {
                "@com.sap.vocabularies.UI.v1.HeaderFacets": [
                    {
                        "$Type": "com.sap.vocabularies.UI.v1.ReferenceFacet",
                        "Target": { "$AnnotationPath": "@com.sap.vocabularies.UI.v1.Chart#Micro" }
                    },
                    {
                        "$Type": "com.sap.vocabularies.UI.v1.ReferenceFacet",
                        "Target": { "$AnnotationPath": "@com.sap.vocabularies.UI.v1.FieldGroup#Header" }
                    }
                ]
            }
        });
        let lists = build(raw.clone(), Capabilities::new().micro_chart(false));
        assert_eq!(
            lists[0].annotations[0].value.as_collection().unwrap().items.len(),
            1
        );

        let lists = build(raw, Capabilities::default());
        assert_eq!(
            lists[0].annotations[0].value.as_collection().unwrap().items.len(),
            2
        );
    }

    #[test]
    fn chart_disabled_drops_chart_terms_and_visualizations() {
        let lists = build(
            json!({
                "NS.Product": {
                    "@com.sap.vocabularies.UI.v1.Chart": { "Title": "Sales" },
                    "@com.sap.vocabularies.UI.v1.PresentationVariant": {
                        "Visualizations": [
                            { "$AnnotationPath": "@com.sap.vocabularies.UI.v1.LineItem" },
                            { "$AnnotationPath": "@com.sap.vocabularies.UI.v1.Chart" }
                        ]
                    }
                }
            }),
            Capabilities::new().chart(false),
        );
        let product = find(&lists, "NS.Product");
        assert_eq!(product.annotations.len(), 1);
        assert_eq!(product.annotations[0].term, "UI.PresentationVariant");
        let variant = product.annotations[0].value.as_record().unwrap();
        let visualizations = variant.property("Visualizations").unwrap();
        assert_eq!(
            visualizations.as_collection().unwrap().items,
            vec![Expression::AnnotationPath("@com.sap.vocabularies.UI.v1.LineItem".into())]
        );
    }

    #[test]
    fn chart_disabled_drops_annotations_of_charts() {
        let lists = build(
            json!({
                "NS.Product": {
                    "@com.sap.vocabularies.UI.v1.Chart#S": { "Title": "Sales" },
                    "@com.sap.vocabularies.UI.v1.Chart#S@com.sap.vocabularies.Common.v1.Label": "Sales chart",
                    "@com.sap.vocabularies.Common.v1.Label": "Product"
                }
            }),
            Capabilities::new().chart(false),
        );
        let targets: Vec<&str> = lists.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, vec!["NS.Product"]);
        assert_eq!(lists[0].annotations[0].term, "Common.Label");
    }
}
