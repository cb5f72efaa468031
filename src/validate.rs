#[cfg(feature = "napi")]
use napi_derive::napi;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::evaluator::DeferReason;
use crate::registry::{PropValue, Registry};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_INVALID_PROVENANCE: &str = "RX-ERR-PROVENANCE-001";
pub const ERR_UNRESOLVABLE_AT_ROOT: &str = "RX-ERR-RESOLVE-001";
pub const ERR_DANGLING_REFERENCE: &str = "RX-ERR-REGISTRY-001";
pub const ERR_CYCLIC_STRUCTURE: &str = "RX-ERR-REGISTRY-002";
pub const ERR_DUPLICATE_ID: &str = "RX-ERR-REGISTRY-003";
pub const ERR_MULTIPLE_PARENTS: &str = "RX-ERR-REGISTRY-004";
pub const ERR_PARENT_MISMATCH: &str = "RX-ERR-REGISTRY-005";
pub const ERR_INVALID_TAG: &str = "RX-ERR-MARKUP-001";
pub const ERR_INVALID_ATTRIBUTE: &str = "RX-ERR-MARKUP-002";
pub const ERR_STRAY_PLACEHOLDER: &str = "RX-ERR-PLACEHOLDER-001";
pub const ERR_INVALID_REGISTRY: &str = "RX-ERR-INPUT-001";
pub const ERR_INVALID_CONFIG: &str = "RX-ERR-INPUT-002";
pub const ERR_IO: &str = "RX-ERR-IO-001";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_INVALID_PROVENANCE => {
            "Primitives outside the primary branch only receive literal, component-local or server values."
        }
        ERR_UNRESOLVABLE_AT_ROOT => "Every primitive on the primary branch is pre-rendered at build time.",
        ERR_DANGLING_REFERENCE => "Every referenced primitive id exists in the registry.",
        ERR_CYCLIC_STRUCTURE => "Primitives form a document tree.",
        ERR_DUPLICATE_ID => "Primitive ids are unique within a build.",
        ERR_MULTIPLE_PARENTS => "Every primitive has at most one parent.",
        ERR_PARENT_MISMATCH => "parentId and childrenIds describe the same tree.",
        ERR_INVALID_TAG | ERR_INVALID_ATTRIBUTE => "Emitted markup is well-formed HTML.",
        ERR_STRAY_PLACEHOLDER => {
            "Every server-value token in the output is listed in the placeholder manifest."
        }
        ERR_INVALID_REGISTRY | ERR_INVALID_CONFIG => "Build inputs are well-formed JSON.",
        ERR_IO => "Build inputs are readable.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRERENDER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Fatal build-time errors. None of them is retried.
#[derive(Debug, thiserror::Error)]
pub enum PrerenderError {
    #[error(
        "primitive `{node_id}` is outside the primary branch but prop `{prop}` has unknown provenance"
    )]
    InvalidProvenance { node_id: String, prop: String },

    #[error(
        "primitive `{node_id}` is outside the primary branch but binding `{binding}` has unknown provenance"
    )]
    InvalidBindingProvenance { node_id: String, binding: String },

    #[error(
        "primitive `{node_id}` is still deferred at the root (bubbled through {}): {reason}",
        .chain.join(" -> ")
    )]
    UnresolvableAtRoot {
        node_id: String,
        chain: Vec<String>,
        reason: DeferReason,
    },

    #[error("primitive `{from}` references `{to}`, which is not in the registry")]
    DanglingReference { from: String, to: String },

    #[error("primitives form a cycle: {}", .cycle.join(" -> "))]
    CyclicStructure { cycle: Vec<String> },

    #[error("primitive id `{id}` is registered twice")]
    DuplicateId { id: String },

    #[error("primitive `{child_id}` is listed as a child of both `{first}` and `{second}`")]
    MultipleParents {
        child_id: String,
        first: String,
        second: String,
    },

    #[error(
        "primitive `{child_id}` is listed by `{listed_by}` but declares parent {}",
        .declared.as_deref().map(|p| format!("`{}`", p)).unwrap_or_else(|| "none".to_string())
    )]
    ParentMismatch {
        child_id: String,
        listed_by: String,
        declared: Option<String>,
    },

    #[error("primitive `{node_id}` has invalid tag name `{tag}`")]
    InvalidTagName { node_id: String, tag: String },

    #[error("primitive `{node_id}` has invalid attribute name `{name}`")]
    InvalidAttributeName { node_id: String, name: String },

    #[error("tree `{root_id}` contains placeholder `{token}` missing from its manifest")]
    StrayPlaceholder { root_id: String, token: String },

    #[error("invalid registry: {reason}")]
    InvalidRegistry { reason: String },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("cannot read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PrerenderError {
    pub fn code(&self) -> &'static str {
        match self {
            PrerenderError::InvalidProvenance { .. }
            | PrerenderError::InvalidBindingProvenance { .. } => ERR_INVALID_PROVENANCE,
            PrerenderError::UnresolvableAtRoot { .. } => ERR_UNRESOLVABLE_AT_ROOT,
            PrerenderError::DanglingReference { .. } => ERR_DANGLING_REFERENCE,
            PrerenderError::CyclicStructure { .. } => ERR_CYCLIC_STRUCTURE,
            PrerenderError::DuplicateId { .. } => ERR_DUPLICATE_ID,
            PrerenderError::MultipleParents { .. } => ERR_MULTIPLE_PARENTS,
            PrerenderError::ParentMismatch { .. } => ERR_PARENT_MISMATCH,
            PrerenderError::InvalidTagName { .. } => ERR_INVALID_TAG,
            PrerenderError::InvalidAttributeName { .. } => ERR_INVALID_ATTRIBUTE,
            PrerenderError::StrayPlaceholder { .. } => ERR_STRAY_PLACEHOLDER,
            PrerenderError::InvalidRegistry { .. } => ERR_INVALID_REGISTRY,
            PrerenderError::InvalidConfig { .. } => ERR_INVALID_CONFIG,
            PrerenderError::Io { .. } => ERR_IO,
        }
    }

    /// The primitive the error is about, when there is one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            PrerenderError::InvalidProvenance { node_id, .. }
            | PrerenderError::InvalidBindingProvenance { node_id, .. }
            | PrerenderError::UnresolvableAtRoot { node_id, .. }
            | PrerenderError::InvalidTagName { node_id, .. }
            | PrerenderError::InvalidAttributeName { node_id, .. } => Some(node_id),
            PrerenderError::DanglingReference { from, .. } => Some(from),
            PrerenderError::DuplicateId { id } => Some(id),
            PrerenderError::MultipleParents { child_id, .. }
            | PrerenderError::ParentMismatch { child_id, .. } => Some(child_id),
            PrerenderError::CyclicStructure { cycle } => cycle.first().map(String::as_str),
            PrerenderError::StrayPlaceholder { root_id, .. } => Some(root_id),
            _ => None,
        }
    }

    fn hints(&self) -> Vec<String> {
        match self {
            PrerenderError::InvalidProvenance { prop, .. } => vec![
                format!("Pass `{}` a server value or a value declared in the same component.", prop),
                "Conditionally rendered primitives cannot be re-evaluated with arbitrary values.".to_string(),
            ],
            PrerenderError::InvalidBindingProvenance { binding, .. } => vec![format!(
                "Declare `{}` from a literal, a server value or another component-local value.",
                binding
            )],
            PrerenderError::UnresolvableAtRoot { reason, .. } => match reason {
                DeferReason::MissingBinding { name, .. } => vec![format!(
                    "No enclosing scope declares `{}`. Declare it in the rendering component or read it with useServerValues().",
                    name
                )],
                DeferReason::NotComputable { .. } | DeferReason::RuntimeOnly { .. } => vec![
                    "Move runtime-only computation into a client effect, or pass the value as a server value.".to_string(),
                ],
                DeferReason::DeferredChild { .. } => vec![],
            },
            PrerenderError::DanglingReference { .. }
            | PrerenderError::CyclicStructure { .. }
            | PrerenderError::MultipleParents { .. }
            | PrerenderError::ParentMismatch { .. }
            | PrerenderError::DuplicateId { .. } => {
                vec!["This is a bug in the JSX instrumentation step; please report it.".to_string()]
            }
            _ => vec![],
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable report of a [`PrerenderError`] for the embedding build tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub guarantee: String,
    pub node_id: Option<String>,
    pub route: Option<String>,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn from_error(error: &PrerenderError, route: Option<&str>) -> Self {
        let code = error.code();
        Diagnostic {
            code: code.to_string(),
            message: error.to_string(),
            guarantee: get_guarantee(code).to_string(),
            node_id: error.node_id().map(str::to_string),
            route: route.map(str::to_string),
            hints: error.hints(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref TAG_NAME_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").unwrap();
    // HTML attribute names exclude whitespace, quotes, `>`, `/` and `=`
    static ref ATTR_NAME_RE: Regex = Regex::new(r#"^[^\s"'<>/=\x00-\x1f]+$"#).unwrap();
}

/// Runs every registry check and returns the first error found.
///
/// Checks run in dependency order: references, parenthood, cycles, then
/// per-record markup and provenance rules.
pub fn validate_registry(registry: &Registry) -> Result<(), PrerenderError> {
    match collect_errors(registry).into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Runs every registry check and returns all errors, for reporting.
pub fn collect_errors(registry: &Registry) -> Vec<PrerenderError> {
    let mut errors = Vec::new();

    errors.extend(check_references(registry));
    if !errors.is_empty() {
        // Structural checks below assume every id resolves.
        return errors;
    }

    errors.extend(check_parenthood(registry));
    errors.extend(check_cycles(registry));

    for record in registry.iter() {
        if !TAG_NAME_RE.is_match(&record.tag) {
            errors.push(PrerenderError::InvalidTagName {
                node_id: record.id.clone(),
                tag: record.tag.clone(),
            });
        }
        for (name, value) in &record.props {
            if !ATTR_NAME_RE.is_match(name) {
                errors.push(PrerenderError::InvalidAttributeName {
                    node_id: record.id.clone(),
                    name: name.clone(),
                });
            }
            if !record.is_primary_branch && matches!(value, PropValue::Unknown { .. }) {
                errors.push(PrerenderError::InvalidProvenance {
                    node_id: record.id.clone(),
                    prop: name.clone(),
                });
            }
        }
        if !record.is_primary_branch {
            for (name, value) in &record.bindings {
                if matches!(value, PropValue::Unknown { .. }) {
                    errors.push(PrerenderError::InvalidBindingProvenance {
                        node_id: record.id.clone(),
                        binding: name.clone(),
                    });
                }
            }
        }
    }

    errors
}

fn check_references(registry: &Registry) -> Vec<PrerenderError> {
    let mut errors = Vec::new();
    for record in registry.iter() {
        for child_id in &record.children_ids {
            if !registry.contains(child_id) {
                errors.push(PrerenderError::DanglingReference {
                    from: record.id.clone(),
                    to: child_id.clone(),
                });
            }
        }
        if let Some(parent_id) = &record.parent_id {
            if !registry.contains(parent_id) {
                errors.push(PrerenderError::DanglingReference {
                    from: record.id.clone(),
                    to: parent_id.clone(),
                });
            }
        }
    }
    errors
}

fn check_parenthood(registry: &Registry) -> Vec<PrerenderError> {
    let mut errors = Vec::new();
    let mut listed_by: HashMap<&str, &str> = HashMap::new();

    for record in registry.iter() {
        for child_id in &record.children_ids {
            if let Some(first) = listed_by.insert(child_id, &record.id) {
                errors.push(PrerenderError::MultipleParents {
                    child_id: child_id.clone(),
                    first: first.to_string(),
                    second: record.id.clone(),
                });
                continue;
            }
            let declared = registry.get(child_id).and_then(|c| c.parent_id.clone());
            if declared.as_deref() != Some(record.id.as_str()) {
                errors.push(PrerenderError::ParentMismatch {
                    child_id: child_id.clone(),
                    listed_by: record.id.clone(),
                    declared,
                });
            }
        }
    }

    // A declared parent that never lists the child.
    for record in registry.iter() {
        if let Some(parent_id) = &record.parent_id {
            if !listed_by.contains_key(record.id.as_str()) {
                errors.push(PrerenderError::ParentMismatch {
                    child_id: record.id.clone(),
                    listed_by: parent_id.clone(),
                    declared: Some(parent_id.clone()),
                });
            }
        }
    }

    errors
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over `childrenIds`, started from every record so that
/// cycles unreachable from any root are found too.
fn check_cycles(registry: &Registry) -> Vec<PrerenderError> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut reported: HashSet<Vec<String>> = HashSet::new();
    let mut errors = Vec::new();

    for record in registry.iter() {
        if marks.contains_key(record.id.as_str()) {
            continue;
        }
        // (id, next child index)
        let mut stack: Vec<(&str, usize)> = vec![(record.id.as_str(), 0)];
        marks.insert(record.id.as_str(), Mark::Visiting);

        while let Some((id, next)) = stack.last().copied() {
            let children = registry
                .get(id)
                .map(|r| r.children_ids.as_slice())
                .unwrap_or(&[]);

            if next >= children.len() {
                marks.insert(id, Mark::Done);
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let child = children[next].as_str();
            match marks.get(child) {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                    cycle.push(child.to_string());
                    if reported.insert(cycle.clone()) {
                        errors.push(PrerenderError::CyclicStructure { cycle });
                    }
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(child, Mark::Visiting);
                    stack.push((child, 0));
                }
            }
        }
    }

    errors
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn validate_registry_native(registry_json: String) -> Vec<Diagnostic> {
    match Registry::from_json(&registry_json) {
        Ok(registry) => collect_errors(&registry)
            .iter()
            .map(|e| Diagnostic::from_error(e, registry.route()))
            .collect(),
        Err(e) => vec![Diagnostic::from_error(&e, None)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PrimitiveRecord;

    fn registry(records: Vec<PrimitiveRecord>) -> Registry {
        Registry::from_records(records).unwrap()
    }

    #[test]
    fn test_valid_tree_passes() {
        let reg = registry(vec![
            PrimitiveRecord::new("root", "div").with_children(["a", "b"]),
            PrimitiveRecord::new("a", "span").with_parent("root"),
            PrimitiveRecord::new("b", "p").with_parent("root"),
        ]);
        assert!(validate_registry(&reg).is_ok());
    }

    #[test]
    fn test_dangling_child_reports_both_ids() {
        let reg = registry(vec![PrimitiveRecord::new("root", "div").with_children(["ghost"])]);
        match validate_registry(&reg) {
            Err(PrerenderError::DanglingReference { from, to }) => {
                assert_eq!(from, "root");
                assert_eq!(to, "ghost");
            }
            other => panic!("expected DanglingReference, got {:?}", other),
        }
    }

    #[test]
    fn test_dangling_parent() {
        let reg = registry(vec![PrimitiveRecord::new("a", "div").with_parent("nowhere")]);
        assert!(matches!(
            validate_registry(&reg),
            Err(PrerenderError::DanglingReference { to, .. }) if to == "nowhere"
        ));
    }

    #[test]
    fn test_cycle_is_reported_with_its_members() {
        let reg = registry(vec![
            PrimitiveRecord::new("a", "div").with_parent("b").with_children(["b"]),
            PrimitiveRecord::new("b", "div").with_parent("a").with_children(["a"]),
        ]);
        let errors = collect_errors(&reg);
        let cycle = errors
            .iter()
            .find_map(|e| match e {
                PrerenderError::CyclicStructure { cycle } => Some(cycle.clone()),
                _ => None,
            })
            .expect("cycle reported");
        assert_eq!(cycle, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_self_cycle() {
        let reg = registry(vec![PrimitiveRecord::new("a", "div")
            .with_parent("a")
            .with_children(["a"])]);
        assert!(collect_errors(&reg)
            .iter()
            .any(|e| matches!(e, PrerenderError::CyclicStructure { cycle } if cycle == &["a", "a"])));
    }

    #[test]
    fn test_multiple_parents() {
        let reg = registry(vec![
            PrimitiveRecord::new("r1", "div").with_children(["c"]),
            PrimitiveRecord::new("r2", "div").with_children(["c"]),
            PrimitiveRecord::new("c", "span").with_parent("r1"),
        ]);
        assert!(matches!(
            validate_registry(&reg),
            Err(PrerenderError::MultipleParents { child_id, .. }) if child_id == "c"
        ));
    }

    #[test]
    fn test_parent_mismatch() {
        let reg = registry(vec![
            PrimitiveRecord::new("root", "div").with_children(["c"]),
            PrimitiveRecord::new("c", "span"),
        ]);
        assert!(matches!(
            validate_registry(&reg),
            Err(PrerenderError::ParentMismatch { child_id, declared: None, .. }) if child_id == "c"
        ));
    }

    #[test]
    fn test_unknown_provenance_off_primary_branch() {
        let reg = registry(vec![PrimitiveRecord::new("n", "div")
            .primary(false)
            .with_prop("title", PropValue::unknown("whatever.here"))]);
        match validate_registry(&reg) {
            Err(PrerenderError::InvalidProvenance { node_id, prop }) => {
                assert_eq!(node_id, "n");
                assert_eq!(prop, "title");
            }
            other => panic!("expected InvalidProvenance, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_binding_off_primary_branch() {
        let reg = registry(vec![PrimitiveRecord::new("n", "div")
            .primary(false)
            .with_binding("title", PropValue::unknown("state.title"))
            .with_prop("title", PropValue::local("title"))]);
        match validate_registry(&reg) {
            Err(PrerenderError::InvalidBindingProvenance { node_id, binding }) => {
                assert_eq!(node_id, "n");
                assert_eq!(binding, "title");
            }
            other => panic!("expected InvalidBindingProvenance, got {:?}", other),
        }

        let primary = registry(vec![PrimitiveRecord::new("n", "div")
            .with_binding("title", PropValue::unknown("state.title"))]);
        assert!(validate_registry(&primary).is_ok());
    }

    #[test]
    fn test_unknown_provenance_on_primary_branch_is_allowed() {
        let reg = registry(vec![PrimitiveRecord::new("n", "div")
            .with_prop("title", PropValue::unknown("whatever.here"))]);
        assert!(validate_registry(&reg).is_ok());
    }

    #[test]
    fn test_markup_names() {
        let reg = registry(vec![
            PrimitiveRecord::new("bad", "di v"),
            PrimitiveRecord::new("attr", "div")
                .with_prop("on\"x", PropValue::literal("1")),
        ]);
        let errors = collect_errors(&reg);
        assert!(errors
            .iter()
            .any(|e| matches!(e, PrerenderError::InvalidTagName { node_id, .. } if node_id == "bad")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, PrerenderError::InvalidAttributeName { node_id, .. } if node_id == "attr")));
    }

    #[test]
    fn test_diagnostic_carries_code_and_guarantee() {
        let error = PrerenderError::InvalidProvenance {
            node_id: "n".to_string(),
            prop: "title".to_string(),
        };
        let diag = Diagnostic::from_error(&error, Some("hello/{name}"));
        assert_eq!(diag.code, ERR_INVALID_PROVENANCE);
        assert_eq!(diag.node_id.as_deref(), Some("n"));
        assert!(diag.message.contains("title"));
        assert!(!diag.guarantee.is_empty());
        assert_eq!(diag.hints.len(), 2);
    }
}
