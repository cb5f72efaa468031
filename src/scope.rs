use indexmap::IndexMap;
use std::collections::HashSet;

use crate::registry::{PrimitiveRecord, PropValue};

lazy_static::lazy_static! {
    /// Globals that only exist in a running browser or server. A component
    /// binding of the same name shadows them, so reading one that no scope
    /// declares yet still defers rather than failing outright.
    pub static ref RUNTIME_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("window");
        s.insert("document");
        s.insert("globalThis");
        s.insert("navigator");
        s.insert("location");
        s.insert("localStorage");
        s.insert("sessionStorage");
        s.insert("console");
        s.insert("fetch");
        s.insert("Math");
        s.insert("Date");
        s.insert("JSON");
        s.insert("Intl");
        s.insert("performance");
        s.insert("setTimeout");
        s.insert("setInterval");
        s.insert("requestAnimationFrame");
        s
    };
}

/// Bindings contributed by one primitive's component scope.
#[derive(Debug, Clone, Copy)]
pub struct ScopeLayer<'a> {
    pub owner: &'a str,
    pub bindings: &'a IndexMap<String, PropValue>,
}

/// Lookup order for an evaluation: the node's own bindings first, then each
/// ancestor whose scope has been supplied by bubbling, innermost first.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain<'a> {
    layers: Vec<ScopeLayer<'a>>,
}

impl<'a> ScopeChain<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn for_record(record: &'a PrimitiveRecord) -> Self {
        let mut chain = Self::new();
        chain.push_outer(record);
        chain
    }

    /// Adds an enclosing scope. Existing layers keep shadowing it.
    pub fn push_outer(&mut self, record: &'a PrimitiveRecord) {
        self.layers.push(ScopeLayer {
            owner: &record.id,
            bindings: &record.bindings,
        });
    }

    /// Finds the innermost binding for `name` and the layer index declaring it.
    pub fn lookup(&self, name: &str) -> Option<(usize, &'a PropValue)> {
        self.layers
            .iter()
            .enumerate()
            .find_map(|(i, layer)| layer.bindings.get(name).map(|b| (i, b)))
    }

    /// The chain as seen from the layer at `index`: a binding's own expression
    /// can only reference its declaring scope and scopes around it.
    pub fn from_layer(&self, index: usize) -> ScopeChain<'a> {
        ScopeChain {
            layers: self.layers.get(index..).unwrap_or(&[]).to_vec(),
        }
    }

    pub fn owner(&self, index: usize) -> Option<&'a str> {
        self.layers.get(index).map(|l| l.owner)
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn owners(&self) -> Vec<&'a str> {
        self.layers.iter().map(|l| l.owner).collect()
    }
}
