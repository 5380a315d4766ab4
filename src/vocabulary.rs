//! Vocabulary namespace aliases.
//!
//! Annotation terms arrive fully qualified (`com.sap.vocabularies.UI.v1.LineItem`).
//! The converted graph stores them under their conventional short alias
//! (`UI.LineItem`), and enum member references are rewritten the same way.

/// Vocabulary namespaces and their conventional aliases.
pub const VOCABULARY_ALIASES: &[(&str, &str)] = &[
    ("Org.OData.Capabilities.V1", "Capabilities"),
    ("Org.OData.Core.V1", "Core"),
    ("Org.OData.Measures.V1", "Measures"),
    ("Org.OData.Aggregation.V1", "Aggregation"),
    ("Org.OData.Validation.V1", "Validation"),
    ("Org.OData.Authorization.V1", "Auth"),
    ("Org.OData.JSON.V1", "JSON"),
    ("com.sap.vocabularies.Common.v1", "Common"),
    ("com.sap.vocabularies.UI.v1", "UI"),
    ("com.sap.vocabularies.Session.v1", "Session"),
    ("com.sap.vocabularies.Analytics.v1", "Analytics"),
    ("com.sap.vocabularies.CodeList.v1", "CodeList"),
    ("com.sap.vocabularies.Communication.v1", "Communication"),
    ("com.sap.vocabularies.PersonalData.v1", "PersonalData"),
    ("com.sap.vocabularies.HTML5.v1", "HTML5"),
    ("com.sap.vocabularies.Hierarchy.v1", "Hierarchy"),
];

/// Look up the alias registered for a vocabulary namespace.
pub fn alias_for_namespace(namespace: &str) -> Option<&'static str> {
    VOCABULARY_ALIASES
        .iter()
        .find(|(ns, _)| *ns == namespace)
        .map(|(_, alias)| *alias)
}

/// Compress a qualified term name to its aliased form.
///
/// `com.sap.vocabularies.Common.v1.Label` becomes `Common.Label`. Names whose
/// namespace has no registered alias, and names already aliased, are returned
/// unchanged. A leading `@` is preserved.
pub fn alias(term: &str) -> String {
    let (prefix, bare) = match term.strip_prefix('@') {
        Some(rest) => ("@", rest),
        None => ("", term),
    };

    // Terms may carry a qualifier; only the name part is namespaced
    let (name, qualifier) = match bare.split_once('#') {
        Some((name, qualifier)) => (name, Some(qualifier)),
        None => (bare, None),
    };

    let aliased = match name.rfind('.') {
        Some(dot) => match alias_for_namespace(&name[..dot]) {
            Some(alias) => format!("{}.{}", alias, &name[dot + 1..]),
            None => name.to_string(),
        },
        None => name.to_string(),
    };

    match qualifier {
        Some(qualifier) => format!("{}{}#{}", prefix, aliased, qualifier),
        None => format!("{}{}", prefix, aliased),
    }
}

/// Rewrite an enum member reference (`Namespace.Type/Member`) to its aliased form.
///
/// Flag enums list several members separated by spaces; every member is
/// rewritten.
pub fn alias_enum_member(value: &str) -> String {
    value
        .split(' ')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('/') {
            Some((type_name, member)) => format!("{}/{}", alias(type_name), member),
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
