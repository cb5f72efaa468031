//! # Placeholder Emitter
//!
//! Server values are never read at build time. Each reference is rendered as a
//! token that the serve-time substitution stage replaces by plain string
//! search, without parsing the HTML around it.
//!
//! ## Token format
//!
//! ```text
//! __RUXY_SV_<slot>__           slot matches [A-Za-z0-9]+
//! __RUXY_SV_x_<16 hex>__       any other slot: first 8 bytes of SHA-256(slot)
//! ```
//!
//! Tokens only contain `[A-Za-z0-9_]`, so they are valid verbatim in text
//! content and in double-quoted attribute values. Literal content never carries
//! the `__RUXY_SV_` prefix: [`neutralize_literal`] rewrites it after escaping,
//! and [`neutralize_after_token`] also breaks up a run that would complete a
//! prefix together with the `__` ending the token before it. Writers merge
//! adjacent literal pieces into one run before neutralizing, since the pieces
//! may only form the prefix together.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const TOKEN_PREFIX: &str = "__RUXY_SV_";
const TOKEN_SUFFIX: &str = "__";
const NEUTRALIZED_PREFIX: &str = "&#95;_RUXY_SV_";

lazy_static::lazy_static! {
    static ref TOKEN_RE: Regex =
        Regex::new(r"__RUXY_SV_(?:([A-Za-z0-9]+)|x_([0-9a-f]{16}))__").unwrap();
}

/// Formats the token for a server-value slot. Deterministic across builds.
pub fn emit_placeholder(slot: &str) -> String {
    if !slot.is_empty() && slot.bytes().all(|b| b.is_ascii_alphanumeric()) {
        format!("{}{}{}", TOKEN_PREFIX, slot, TOKEN_SUFFIX)
    } else {
        format!("{}x_{}{}", TOKEN_PREFIX, slot_digest(slot), TOKEN_SUFFIX)
    }
}

fn slot_digest(slot: &str) -> String {
    let digest = Sha256::digest(slot.as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Rewrites the token prefix inside already-escaped literal content.
///
/// `&#95;` is `_`, so the browser shows the same text.
pub fn neutralize_literal(escaped: &str) -> String {
    if escaped.contains(TOKEN_PREFIX) {
        escaped.replace(TOKEN_PREFIX, NEUTRALIZED_PREFIX)
    } else {
        escaped.to_string()
    }
}

/// [`neutralize_literal`] for a run written directly after a token.
///
/// The token ends in `__`, so a run starting with `_` or with `RUXY_SV_`
/// would complete a prefix across the boundary. Its first character is
/// written as a character reference instead.
pub fn neutralize_after_token(escaped: &str) -> String {
    let neutralized = neutralize_literal(escaped);
    if let Some(rest) = neutralized.strip_prefix('_') {
        format!("&#95;{}", rest)
    } else if let Some(rest) = neutralized.strip_prefix('R').filter(|r| r.starts_with("UXY_SV_")) {
        format!("&#82;{}", rest)
    } else {
        neutralized
    }
}

/// Every token in `html`, in document order (duplicates included).
pub fn scan_placeholders(html: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(html)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `token → slot` for one rendered tree, handed to the serve-time stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderManifest {
    entries: BTreeMap<String, String>,
}

impl PlaceholderManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots<'s, I>(slots: I) -> Self
    where
        I: IntoIterator<Item = &'s String>,
    {
        let mut manifest = Self::new();
        for slot in slots {
            manifest.record(slot);
        }
        manifest
    }

    /// Adds a slot and returns its token.
    pub fn record(&mut self, slot: &str) -> String {
        let token = emit_placeholder(slot);
        self.entries.insert(token.clone(), slot.to_string());
        token
    }

    pub fn slot_for(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(String::as_str)
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, s)| (t.as_str(), s.as_str()))
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.entries
    }
}

/// Serve-time style substitution, used to check that tokens round-trip.
pub fn substitute<F>(html: &str, manifest: &PlaceholderManifest, mut value_of: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    TOKEN_RE
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            manifest
                .slot_for(token)
                .and_then(&mut value_of)
                .unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}
