//! # Bottom-Up Resolver
//!
//! Resolves every tree of the registry in one post-order traversal.
//!
//! ## Bubbling
//!
//! A node that cannot render at its own scope is kept pending. When its parent
//! is visited, every pending node below the parent is retried once with the
//! parent's bindings added to its chain, deepest first, so a retried node
//! already sees the newly resolved markup of its children. Nodes that still
//! cannot render move on to the grandparent, and so on.
//!
//! ## Invariants
//!
//! - Children are always visited before their parent.
//! - A node is evaluated at most `1 + bubble distance` times, and never again
//!   once it is resolved.
//! - Markup is assembled in `childrenIds` order whatever order nodes resolved in.
//! - The registry is never modified.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::{PrerenderConfig, UnresolvablePolicy};
use crate::evaluator::{attempt, Attempt, ChildState, DeferReason, RenderedHtml};
use crate::registry::{PrimitiveRecord, Registry};
use crate::scope::ScopeChain;
use crate::validate::{validate_registry, PrerenderError};

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Final state of one node after the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ResolutionState {
    Resolved { html: String },
    Deferred { reason: DeferReason },
}

impl ResolutionState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionState::Resolved { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveStats {
    pub trees: usize,
    pub nodes: usize,
    pub evaluations: usize,
    /// Nodes whose first attempt at their own scope was deferred.
    pub deferrals: usize,
    /// Nodes that resolved only after bubbling.
    pub bubbled: usize,
    pub max_bubble_distance: usize,
    pub unresolved: usize,
}

impl ResolveStats {
    fn absorb(&mut self, other: &ResolveStats) {
        self.trees += other.trees;
        self.nodes += other.nodes;
        self.evaluations += other.evaluations;
        self.deferrals += other.deferrals;
        self.bubbled += other.bubbled;
        self.max_bubble_distance = self.max_bubble_distance.max(other.max_bubble_distance);
        self.unresolved += other.unresolved;
    }
}

/// One root tree after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTree {
    pub root_id: String,
    /// `None` when the root stayed deferred and the policy allowed it.
    pub rendered: Option<RenderedHtml>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Root trees in registry order.
    pub trees: Vec<ResolvedTree>,
    pub states: BTreeMap<String, ResolutionState>,
    pub evaluations: BTreeMap<String, usize>,
    pub stats: ResolveStats,
}

impl Resolution {
    pub fn state(&self, id: &str) -> Option<&ResolutionState> {
        self.states.get(id)
    }

    pub fn evaluations_of(&self, id: &str) -> usize {
        self.evaluations.get(id).copied().unwrap_or(0)
    }

    pub fn tree(&self, root_id: &str) -> Option<&ResolvedTree> {
        self.trees.iter().find(|t| t.root_id == root_id)
    }

    pub fn html(&self, root_id: &str) -> Option<&str> {
        self.tree(root_id)
            .and_then(|t| t.rendered.as_ref())
            .map(|r| r.html.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Validates `registry` and resolves every root tree.
pub fn resolve(registry: &Registry, config: &PrerenderConfig) -> Result<Resolution, PrerenderError> {
    validate_registry(registry)?;

    let roots: Vec<&PrimitiveRecord> = registry.roots().collect();
    log::debug!(
        "resolving {} primitives in {} trees{}",
        registry.len(),
        roots.len(),
        registry.route().map(|r| format!(" for {}", r)).unwrap_or_default()
    );

    let outcomes: Vec<TreeOutcome> = if config.parallel && roots.len() > 1 {
        roots
            .par_iter()
            .map(|root| TreeResolver::new(registry).run(root))
            .collect()
    } else {
        roots
            .iter()
            .map(|root| TreeResolver::new(registry).run(root))
            .collect()
    };

    let mut resolution = Resolution::default();
    for outcome in outcomes {
        let rendered = match outcome.result {
            Ok(rendered) => Some(rendered),
            Err(error) => match config.on_unresolvable {
                UnresolvablePolicy::Fail => return Err(error),
                UnresolvablePolicy::DeferToServe => {
                    log::warn!("{}; tree `{}` is left to serve-time rendering", error, outcome.root_id);
                    None
                }
            },
        };

        resolution.stats.absorb(&outcome.stats);
        resolution.states.extend(outcome.states);
        resolution.evaluations.extend(outcome.evaluations);
        resolution.trees.push(ResolvedTree {
            root_id: outcome.root_id,
            rendered,
        });
    }

    log::debug!(
        "resolved {} primitives with {} evaluations ({} bubbled, max distance {})",
        resolution.stats.nodes,
        resolution.stats.evaluations,
        resolution.stats.bubbled,
        resolution.stats.max_bubble_distance
    );
    Ok(resolution)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PER-TREE TRAVERSAL
// ═══════════════════════════════════════════════════════════════════════════════

struct TreeOutcome {
    root_id: String,
    result: Result<RenderedHtml, PrerenderError>,
    states: BTreeMap<String, ResolutionState>,
    evaluations: BTreeMap<String, usize>,
    stats: ResolveStats,
}

struct TreeResolver<'r> {
    registry: &'r Registry,
    /// Latest attempt per visited node. Resolved entries are final.
    attempts: HashMap<&'r str, Attempt>,
    evaluations: HashMap<&'r str, usize>,
    /// Ancestor distance at which a node resolved, for nodes that bubbled.
    distances: HashMap<&'r str, usize>,
    deferrals: usize,
}

impl<'r> TreeResolver<'r> {
    fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            attempts: HashMap::new(),
            evaluations: HashMap::new(),
            distances: HashMap::new(),
            deferrals: 0,
        }
    }

    fn run(mut self, root: &'r PrimitiveRecord) -> TreeOutcome {
        let pending = self.visit(root);
        log::debug!(
            "tree `{}`: {} primitives, {} still deferred at the root",
            root.id,
            self.attempts.len(),
            pending.len()
        );

        let result = match self.attempts.get(root.id.as_str()) {
            Some(Attempt::Resolved(rendered)) => Ok(rendered.clone()),
            _ => Err(self.unresolvable(root)),
        };

        let mut stats = ResolveStats {
            trees: 1,
            nodes: self.attempts.len(),
            evaluations: self.evaluations.values().sum(),
            deferrals: self.deferrals,
            bubbled: self.distances.len(),
            max_bubble_distance: self.distances.values().copied().max().unwrap_or(0),
            unresolved: pending.len(),
        };
        for id in &pending {
            let distance = self.distance_to(id, &root.id);
            stats.max_bubble_distance = stats.max_bubble_distance.max(distance);
        }

        let states = self
            .attempts
            .into_iter()
            .map(|(id, attempt)| {
                let state = match attempt {
                    Attempt::Resolved(rendered) => ResolutionState::Resolved { html: rendered.html },
                    Attempt::Deferred(reason) => ResolutionState::Deferred { reason },
                };
                (id.to_string(), state)
            })
            .collect();
        let evaluations = self
            .evaluations
            .into_iter()
            .map(|(id, count)| (id.to_string(), count))
            .collect();

        TreeOutcome {
            root_id: root.id.clone(),
            result,
            states,
            evaluations,
            stats,
        }
    }

    /// Visits `record` after its subtree and returns the nodes of the subtree
    /// still deferred, deepest first.
    fn visit(&mut self, record: &'r PrimitiveRecord) -> Vec<&'r str> {
        let mut pending = Vec::new();
        for child_id in &record.children_ids {
            if let Some(child) = self.registry.get(child_id) {
                pending.extend(self.visit(child));
            }
        }

        pending.retain(|&id| !self.retry_at(id, record));

        if !self.evaluate(record, ScopeChain::for_record(record)) {
            self.deferrals += 1;
            pending.push(record.id.as_str());
        }
        pending
    }

    /// Retries a pending descendant with every scope up to `ancestor`.
    /// Returns whether it resolved.
    fn retry_at(&mut self, id: &'r str, ancestor: &'r PrimitiveRecord) -> bool {
        let record = match self.registry.get(id) {
            Some(record) => record,
            None => return false,
        };

        if let Some(Attempt::Deferred(reason)) = self.attempts.get(id) {
            // The same construct fails again at any scope.
            if !reason.is_retryable() {
                return false;
            }
        }

        let chain = self.chain_up_to(record, ancestor);
        let distance = chain.depth().saturating_sub(1);
        let resolved = self.evaluate(record, chain);
        if resolved {
            self.distances.insert(id, distance);
        }
        resolved
    }

    /// Scope chain from `record` up to and including `ancestor`.
    fn chain_up_to(&self, record: &'r PrimitiveRecord, ancestor: &'r PrimitiveRecord) -> ScopeChain<'r> {
        let mut chain = ScopeChain::for_record(record);
        let mut current = record;
        while current.id != ancestor.id {
            match current.parent_id.as_deref().and_then(|p| self.registry.get(p)) {
                Some(parent) => {
                    chain.push_outer(parent);
                    current = parent;
                }
                None => break,
            }
        }
        chain
    }

    fn evaluate(&mut self, record: &'r PrimitiveRecord, chain: ScopeChain<'r>) -> bool {
        let result = {
            let children: Vec<ChildState<'_>> = record
                .children_ids
                .iter()
                .map(|id| match self.attempts.get(id.as_str()) {
                    Some(Attempt::Resolved(rendered)) => ChildState::Resolved(rendered),
                    _ => ChildState::Deferred,
                })
                .collect();
            attempt(record, &children, &chain)
        };

        *self.evaluations.entry(record.id.as_str()).or_insert(0) += 1;
        let resolved = result.is_resolved();
        self.attempts.insert(record.id.as_str(), result);
        resolved
    }

    fn distance_to(&self, id: &str, ancestor_id: &str) -> usize {
        let mut distance = 0;
        let mut current = self.registry.get(id);
        while let Some(record) = current {
            if record.id == ancestor_id {
                break;
            }
            distance += 1;
            current = record.parent_id.as_deref().and_then(|p| self.registry.get(p));
        }
        distance
    }

    /// Follows `deferredChild` links down from the root to the node that
    /// actually lacks context.
    fn unresolvable(&self, root: &'r PrimitiveRecord) -> PrerenderError {
        let mut path = vec![root.id.clone()];
        let mut reason = DeferReason::DeferredChild {
            child_id: root.id.clone(),
        };

        let mut current = root.id.as_str();
        while let Some(Attempt::Deferred(r)) = self.attempts.get(current) {
            reason = r.clone();
            match r {
                DeferReason::DeferredChild { child_id } => {
                    path.push(child_id.clone());
                    current = child_id.as_str();
                }
                _ => break,
            }
        }

        path.reverse();
        PrerenderError::UnresolvableAtRoot {
            node_id: path.first().cloned().unwrap_or_else(|| root.id.clone()),
            chain: path,
            reason,
        }
    }
}
