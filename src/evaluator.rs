//! # Render Attempt Evaluator
//!
//! One attempt renders one primitive from its props, the markup of its
//! children and the scope chain it is offered. The result is an explicit
//! [`Attempt`]: a prop that needs context the chain does not have yields
//! `Deferred` instead of failing the build, and the resolver retries the node
//! with a wider chain.
//!
//! ## Rules
//!
//! 1. A deferred child defers its parent. Markup is never emitted around a
//!    hole.
//! 2. Literal props are inlined. Server values become placeholder tokens and
//!    are never evaluated.
//! 3. Component-local and unknown props are evaluated with the bindings of the
//!    scope chain only.
//!
//! Attempts are pure: the same record, children and chain always produce the
//! same result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::markup::{is_skipped_prop, is_void_element, MarkupWriter, CONTENT_PROPS};
use crate::registry::PrimitiveRecord;
use crate::scope::ScopeChain;
use crate::static_eval::{eval_prop, EvalError};
use crate::value::{NotComputable, Value};

/// Why a node could not be rendered with the context offered so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeferReason {
    /// The prop references a binding that no scope in the chain declares.
    #[serde(rename_all = "camelCase")]
    MissingBinding { prop: String, name: String },
    /// The prop reads a runtime global that no scope in the chain shadows.
    #[serde(rename_all = "camelCase")]
    RuntimeOnly { prop: String, name: String },
    #[serde(rename_all = "camelCase")]
    DeferredChild { child_id: String },
    /// The prop has no build-time value at any scope.
    #[serde(rename_all = "camelCase")]
    NotComputable { prop: String, detail: String },
}

impl DeferReason {
    /// Whether a wider scope chain could change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeferReason::NotComputable { .. })
    }

    fn from_eval(prop: &str, error: EvalError) -> Self {
        match error {
            EvalError::MissingBinding(name) => DeferReason::MissingBinding {
                prop: prop.to_string(),
                name,
            },
            EvalError::RuntimeOnly(name) => DeferReason::RuntimeOnly {
                prop: prop.to_string(),
                name,
            },
            EvalError::NotComputable(detail) => DeferReason::NotComputable {
                prop: prop.to_string(),
                detail,
            },
        }
    }

    fn from_markup(prop: &str, error: NotComputable) -> Self {
        DeferReason::NotComputable {
            prop: prop.to_string(),
            detail: error.0,
        }
    }
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::MissingBinding { prop, name } => {
                write!(f, "prop `{}` needs binding `{}`", prop, name)
            }
            DeferReason::RuntimeOnly { prop, name } => {
                write!(f, "prop `{}` reads `{}`, which only exists at runtime", prop, name)
            }
            DeferReason::DeferredChild { child_id } => {
                write!(f, "child `{}` is deferred", child_id)
            }
            DeferReason::NotComputable { prop, detail } => {
                write!(f, "prop `{}` is not computable at build time: {}", prop, detail)
            }
        }
    }
}

/// Markup of a resolved node and the server slots it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedHtml {
    pub html: String,
    pub slots: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Resolved(RenderedHtml),
    Deferred(DeferReason),
}

impl Attempt {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Attempt::Resolved(_))
    }
}

/// A child's outcome as seen by its parent's attempt.
#[derive(Debug, Clone, Copy)]
pub enum ChildState<'r> {
    Resolved(&'r RenderedHtml),
    Deferred,
}

/// Renders `record` once.
///
/// `children` holds one state per entry of `record.children_ids`, in the same
/// order.
pub fn attempt(record: &PrimitiveRecord, children: &[ChildState<'_>], scope: &ScopeChain<'_>) -> Attempt {
    debug_assert_eq!(children.len(), record.children_ids.len());

    let mut child_markup = Vec::with_capacity(children.len());
    for (child_id, state) in record.children_ids.iter().zip(children) {
        match state {
            ChildState::Resolved(rendered) => child_markup.push(*rendered),
            ChildState::Deferred => {
                return Attempt::Deferred(DeferReason::DeferredChild {
                    child_id: child_id.clone(),
                })
            }
        }
    }

    match render(record, &child_markup, scope) {
        Ok(rendered) => {
            log::trace!("resolved `{}` at scope {:?}", record.id, scope.owners());
            Attempt::Resolved(rendered)
        }
        Err(reason) => {
            log::trace!("deferred `{}` at scope {:?}: {}", record.id, scope.owners(), reason);
            Attempt::Deferred(reason)
        }
    }
}

fn render(
    record: &PrimitiveRecord,
    children: &[&RenderedHtml],
    scope: &ScopeChain<'_>,
) -> Result<RenderedHtml, DeferReason> {
    let mut element = MarkupWriter::new();
    let mut body = MarkupWriter::new();

    element.open_tag(&record.tag);
    for (prop, value) in &record.props {
        if is_skipped_prop(prop) {
            continue;
        }
        let value: Value = eval_prop(value, scope).map_err(|e| DeferReason::from_eval(prop, e))?;
        let written = if CONTENT_PROPS.contains(&prop.as_str()) {
            body.text(&value)
        } else {
            element.attribute(prop, &value)
        };
        written.map_err(|e| DeferReason::from_markup(prop, e))?;
    }

    for child in children {
        body.raw(&child.html);
        body.adopt_slots(&child.slots);
    }

    if is_void_element(&record.tag) && body.is_empty() {
        element.close_void_tag();
    } else {
        let (inner, slots) = body.finish();
        element.close_open_tag();
        element.raw(&inner);
        element.adopt_slots(&slots);
        element.end_tag(&record.tag);
    }

    let (html, slots) = element.finish();
    Ok(RenderedHtml { html, slots })
}
