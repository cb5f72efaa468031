//! Pre-render configuration, read from `ruxy.prerender.json`.
//!
//! ```json
//! { "parallel": true, "onUnresolvable": "fail", "verifyPlaceholders": true }
//! ```
//!
//! Every field is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::validate::PrerenderError;

pub const CONFIG_FILE_NAME: &str = "ruxy.prerender.json";

/// What to do with a tree whose root is still deferred after bubbling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvablePolicy {
    /// Abort the build with `UnresolvableAtRoot`.
    #[default]
    Fail,
    /// Warn and leave the tree to be rendered at serve time.
    DeferToServe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PrerenderConfig {
    /// Resolve independent root trees on the rayon pool.
    pub parallel: bool,
    pub on_unresolvable: UnresolvablePolicy,
    /// Check that every token in the output is listed in its tree's manifest.
    pub verify_placeholders: bool,
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            on_unresolvable: UnresolvablePolicy::Fail,
            verify_placeholders: true,
        }
    }
}

impl PrerenderConfig {
    pub fn from_json(json: &str) -> Result<Self, PrerenderError> {
        serde_json::from_str(json).map_err(|e| PrerenderError::InvalidConfig {
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, PrerenderError> {
        let json = fs::read_to_string(path).map_err(|source| PrerenderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Loads `ruxy.prerender.json` from `dir` when present, defaults otherwise.
    pub fn discover(dir: &Path) -> Result<Self, PrerenderError> {
        let candidate: PathBuf = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            log::debug!("using config {}", candidate.display());
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_policy(mut self, policy: UnresolvablePolicy) -> Self {
        self.on_unresolvable = policy;
        self
    }
}
