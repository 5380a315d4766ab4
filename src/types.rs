//! Core types shared by the conversion stages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker segment introducing a navigation property binding in a metadata path.
pub const NAVIGATION_BINDING_MARKER: &str = "$NavigationPropertyBinding";

/// Marker segment introducing a type cast in a metadata path.
pub const TYPE_MARKER: &str = "$Type";

/// Terms whose raw values are filtered according to [`Capabilities`].
pub mod terms {
    pub const HEADER_FACETS: &str = "com.sap.vocabularies.UI.v1.HeaderFacets";
    pub const IDENTIFICATION: &str = "com.sap.vocabularies.UI.v1.Identification";
    pub const LINE_ITEM: &str = "com.sap.vocabularies.UI.v1.LineItem";
    pub const FIELD_GROUP: &str = "com.sap.vocabularies.UI.v1.FieldGroup";
    pub const PRESENTATION_VARIANT: &str = "com.sap.vocabularies.UI.v1.PresentationVariant";
    pub const CHART: &str = "com.sap.vocabularies.UI.v1.Chart";
    pub const FILTER_FACETS: &str = "com.sap.vocabularies.UI.v1.FilterFacets";
    pub const DATA_FIELD_DEFAULT: &str = "com.sap.vocabularies.UI.v1.DataFieldDefault";
    pub const DATA_FIELD: &str = "com.sap.vocabularies.UI.v1.DataField";
    pub const DATA_FIELD_FOR_IBN: &str =
        "com.sap.vocabularies.UI.v1.DataFieldForIntentBasedNavigation";
}

/// Returns the JSON type name for log and error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Environment feature toggles honoured while building annotation lists.
///
/// Every flag defaults to `true`. A disabled flag strips the annotation
/// records that would need the feature before they are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Capabilities {
    /// Charts can be rendered. When off, `UI.Chart` annotations are dropped
    /// and charts are removed from presentation variants.
    pub chart: bool,
    /// Micro charts can be rendered in object page headers.
    pub micro_chart: bool,
    /// Navigation to other applications by semantic intent is available.
    pub intent_based_navigation: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            chart: true,
            micro_chart: true,
            intent_based_navigation: true,
        }
    }
}

impl Capabilities {
    /// All capabilities enabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chart(mut self, enabled: bool) -> Self {
        self.chart = enabled;
        self
    }

    pub fn micro_chart(mut self, enabled: bool) -> Self {
        self.micro_chart = enabled;
        self
    }

    pub fn intent_based_navigation(mut self, enabled: bool) -> Self {
        self.intent_based_navigation = enabled;
        self
    }
}

/// Split `Term#Qualifier` into its term and optional qualifier.
pub fn split_qualifier(key: &str) -> (&str, Option<&str>) {
    match key.split_once('#') {
        Some((term, qualifier)) => (term, Some(qualifier)),
        None => (key, None),
    }
}
