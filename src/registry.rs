//! Registry Module for the Ruxy Pre-renderer
//!
//! The registry is the sole input of the pre-render phase: an append-only,
//! insertion-ordered map of every HTML primitive instantiated on the primary
//! branch, as emitted by the JSX instrumentation step.
//!
//! The registry is an inert value. Nothing in this crate mutates it once it is
//! handed to the resolver.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::validate::PrerenderError;

// ═══════════════════════════════════════════════════════════════════════════════
// PROP VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a prop value originates, as classified by the instrumentation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    Literal,
    ComponentLocal,
    ServerValue,
    Unknown,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provenance::Literal => "literal",
            Provenance::ComponentLocal => "componentLocal",
            Provenance::ServerValue => "serverValue",
            Provenance::Unknown => "unknown",
        })
    }
}

/// A prop (or scope binding) value tagged with its provenance.
///
/// Serialized form:
///
/// ```json
/// { "provenance": "literal", "value": "hi" }
/// { "provenance": "serverValue", "slot": "message" }
/// { "provenance": "componentLocal", "expr": "`${greeting}!`" }
/// { "provenance": "unknown", "expr": "current.casing" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provenance", rename_all = "camelCase")]
pub enum PropValue {
    Literal { value: serde_json::Value },
    ComponentLocal { expr: String },
    ServerValue { slot: String },
    Unknown { expr: String },
}

impl PropValue {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        PropValue::Literal {
            value: value.into(),
        }
    }

    pub fn local(expr: impl Into<String>) -> Self {
        PropValue::ComponentLocal { expr: expr.into() }
    }

    pub fn server(slot: impl Into<String>) -> Self {
        PropValue::ServerValue { slot: slot.into() }
    }

    pub fn unknown(expr: impl Into<String>) -> Self {
        PropValue::Unknown { expr: expr.into() }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            PropValue::Literal { .. } => Provenance::Literal,
            PropValue::ComponentLocal { .. } => Provenance::ComponentLocal,
            PropValue::ServerValue { .. } => Provenance::ServerValue,
            PropValue::Unknown { .. } => Provenance::Unknown,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRIMITIVE RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// One instantiation of an HTML primitive element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveRecord {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Document order; significant for output.
    #[serde(default)]
    pub children_ids: Vec<String>,
    pub tag: String,
    #[serde(default)]
    pub props: IndexMap<String, PropValue>,
    /// Local bindings of the component scope that instantiated this primitive.
    #[serde(default)]
    pub bindings: IndexMap<String, PropValue>,
    pub is_primary_branch: bool,
    /// Name of the enclosing component, for diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl PrimitiveRecord {
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            children_ids: Vec::new(),
            tag: tag.into(),
            props: IndexMap::new(),
            bindings: IndexMap::new(),
            is_primary_branch: true,
            component: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children_ids = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: PropValue) -> Self {
        self.props.insert(name.into(), value);
        self
    }

    pub fn with_binding(mut self, name: impl Into<String>, value: PropValue) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    pub fn primary(mut self, is_primary_branch: bool) -> Self {
        self.is_primary_branch = is_primary_branch;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Serialized registry as written by the instrumentation step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFile {
    #[serde(default)]
    pub route: Option<String>,
    pub records: Vec<PrimitiveRecord>,
}

/// Append-only `id → PrimitiveRecord` map, in instrumentation order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    route: Option<String>,
    records: IndexMap<String, PrimitiveRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I>(records: I) -> Result<Self, PrerenderError>
    where
        I: IntoIterator<Item = PrimitiveRecord>,
    {
        let mut registry = Self::new();
        for record in records {
            registry.insert(record)?;
        }
        Ok(registry)
    }

    pub fn from_json(json: &str) -> Result<Self, PrerenderError> {
        let file: RegistryFile =
            serde_json::from_str(json).map_err(|e| PrerenderError::InvalidRegistry {
                reason: e.to_string(),
            })?;
        let route = file.route.clone();
        let mut registry = Self::from_records(file.records)?;
        registry.route = route;
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self, PrerenderError> {
        let json = fs::read_to_string(path).map_err(|source| PrerenderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut registry = Self::from_json(&json)?;
        if registry.route.is_none() {
            registry.route = Some(path.display().to_string());
        }
        Ok(registry)
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Appends a record. Ids are write-once.
    pub fn insert(&mut self, record: PrimitiveRecord) -> Result<(), PrerenderError> {
        if self.records.contains_key(&record.id) {
            return Err(PrerenderError::DuplicateId { id: record.id });
        }
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&PrimitiveRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrimitiveRecord> {
        self.records.values()
    }

    /// Parentless records, in registry order.
    pub fn roots(&self) -> impl Iterator<Item = &PrimitiveRecord> {
        self.records.values().filter(|r| r.is_root())
    }

    pub fn to_file(&self) -> RegistryFile {
        RegistryFile {
            route: self.route.clone(),
            records: self.records.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prop_value_tagging() {
        let literal: PropValue =
            serde_json::from_value(json!({ "provenance": "literal", "value": "hi" })).unwrap();
        assert_eq!(literal, PropValue::literal("hi"));
        assert_eq!(literal.provenance(), Provenance::Literal);

        let server: PropValue =
            serde_json::from_value(json!({ "provenance": "serverValue", "slot": "S1" })).unwrap();
        assert_eq!(server.provenance(), Provenance::ServerValue);

        let local: PropValue =
            serde_json::from_value(json!({ "provenance": "componentLocal", "expr": "a + 1" }))
                .unwrap();
        assert_eq!(local, PropValue::local("a + 1"));
    }

    #[test]
    fn test_registry_from_json_keeps_prop_order() {
        let json = json!({
            "route": "hello/{name}",
            "records": [{
                "id": "p0",
                "tag": "div",
                "isPrimaryBranch": true,
                "props": {
                    "id": { "provenance": "literal", "value": "main" },
                    "className": { "provenance": "literal", "value": "container" },
                    "aria-label": { "provenance": "literal", "value": "x" }
                }
            }]
        })
        .to_string();

        let registry = Registry::from_json(&json).unwrap();
        assert_eq!(registry.route(), Some("hello/{name}"));
        let record = registry.get("p0").unwrap();
        let names: Vec<&str> = record.props.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "className", "aria-label"]);
        assert!(record.children_ids.is_empty());
        assert!(record.parent_id.is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_ids() {
        let result = Registry::from_records(vec![
            PrimitiveRecord::new("a", "div"),
            PrimitiveRecord::new("a", "span"),
        ]);
        assert!(matches!(result, Err(PrerenderError::DuplicateId { id }) if id == "a"));
    }

    #[test]
    fn test_roots_in_registry_order() {
        let registry = Registry::from_records(vec![
            PrimitiveRecord::new("b", "div"),
            PrimitiveRecord::new("c", "span").with_parent("b"),
            PrimitiveRecord::new("a", "div"),
        ])
        .unwrap();
        let roots: Vec<&str> = registry.roots().map(|r| r.id.as_str()).collect();
        assert_eq!(roots, vec!["b", "a"]);
    }

    #[test]
    fn test_malformed_registry_json() {
        let result = Registry::from_json("{ \"records\": [ { \"id\": 1 } ] }");
        assert!(matches!(result, Err(PrerenderError::InvalidRegistry { .. })));
    }
}
