//! Finalize Module for the Ruxy Pre-renderer
//!
//! Assembles the per-route output of the pre-render phase: one HTML string per
//! root tree with its placeholder manifest, the state of every node for
//! diagnostics, and resolve statistics.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PrerenderConfig;
use crate::placeholder::{scan_placeholders, PlaceholderManifest};
use crate::registry::Registry;
use crate::resolver::{resolve, ResolutionState, ResolveStats};
use crate::validate::PrerenderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedTree {
    pub root_id: String,
    /// `None` when the tree is left to serve-time rendering.
    pub html: Option<String>,
    /// `token → slot`
    pub placeholders: PlaceholderManifest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerenderOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    pub trees: Vec<RenderedTree>,
    pub states: BTreeMap<String, ResolutionState>,
    pub stats: ResolveStats,
}

impl PrerenderOutput {
    pub fn html(&self, root_id: &str) -> Option<&str> {
        self.trees
            .iter()
            .find(|t| t.root_id == root_id)
            .and_then(|t| t.html.as_deref())
    }

    /// Markup of every pre-rendered tree, in root order.
    pub fn document_html(&self) -> String {
        self.trees
            .iter()
            .filter_map(|t| t.html.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn to_json(&self, pretty: bool) -> String {
        let json = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        // Every field serializes infallibly.
        json.unwrap_or_default()
    }
}

/// Every token in `tree.html` must be listed in its manifest.
pub fn verify_placeholders(tree: &RenderedTree) -> Result<(), PrerenderError> {
    let html = match &tree.html {
        Some(html) => html,
        None => return Ok(()),
    };
    for token in scan_placeholders(html) {
        if !tree.placeholders.contains_token(&token) {
            return Err(PrerenderError::StrayPlaceholder {
                root_id: tree.root_id.clone(),
                token,
            });
        }
    }
    Ok(())
}

/// Runs the whole pre-render phase for one registry.
pub fn prerender(registry: &Registry, config: &PrerenderConfig) -> Result<PrerenderOutput, PrerenderError> {
    let resolution = resolve(registry, config)?;

    let mut trees = Vec::with_capacity(resolution.trees.len());
    for tree in resolution.trees {
        let rendered = match tree.rendered {
            Some(rendered) => RenderedTree {
                root_id: tree.root_id,
                placeholders: PlaceholderManifest::from_slots(&rendered.slots),
                html: Some(rendered.html),
            },
            None => RenderedTree {
                root_id: tree.root_id,
                html: None,
                placeholders: PlaceholderManifest::new(),
            },
        };
        if config.verify_placeholders {
            verify_placeholders(&rendered)?;
        }
        trees.push(rendered);
    }

    Ok(PrerenderOutput {
        route: registry.route().map(str::to_string),
        trees,
        states: resolution.states,
        stats: resolution.stats,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn prerender_native(
    registry_json: String,
    config_json: Option<String>,
) -> napi::Result<serde_json::Value> {
    let to_napi = |e: PrerenderError| {
        napi::Error::from_reason(format!("[{}] {}", e.code(), e))
    };

    let registry = Registry::from_json(&registry_json).map_err(to_napi)?;
    let config = match config_json {
        Some(json) => PrerenderConfig::from_json(&json).map_err(to_napi)?,
        None => PrerenderConfig::default(),
    };
    let output = prerender(&registry, &config).map_err(to_napi)?;

    serde_json::to_value(&output)
        .map_err(|e| napi::Error::from_reason(format!("Failed to serialize output: {}", e)))
}
