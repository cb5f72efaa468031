//! Discovery Module for the Ruxy Pre-renderer
//!
//! The instrumentation step writes one registry per route, named
//! `<route>.registry.json`, somewhere below the build directory (usually
//! `.ruxy/`). Discovery walks that tree and pairs every registry file with the
//! route it was written for.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const REGISTRY_SUFFIX: &str = ".registry.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub path: PathBuf,
    /// Path relative to the scanned directory, without the suffix, `/`-separated.
    pub route: String,
}

impl RegistryEntry {
    /// Output file for this route below `out_dir`.
    pub fn output_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}.prerender.json", self.route))
    }
}

/// Finds every registry file below `dir`, sorted by route.
pub fn discover_registries(dir: &Path) -> Vec<RegistryEntry> {
    let mut entries = Vec::new();
    if !dir.exists() {
        return entries;
    }

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable entry below {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(route) = route_for(dir, path) {
            entries.push(RegistryEntry {
                path: path.to_path_buf(),
                route,
            });
        }
    }

    entries.sort_by(|a, b| a.route.cmp(&b.route));
    entries
}

fn route_for(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let route = relative.strip_suffix(REGISTRY_SUFFIX)?;
    if route.is_empty() {
        None
    } else {
        Some(route.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_route_for() {
        let base = Path::new("/build/.ruxy");
        assert_eq!(
            route_for(base, Path::new("/build/.ruxy/hello/[name].registry.json")),
            Some("hello/[name]".to_string())
        );
        assert_eq!(route_for(base, Path::new("/build/.ruxy/index.json")), None);
        assert_eq!(route_for(base, Path::new("/build/.ruxy/.registry.json")), None);
    }

    #[test]
    fn test_discover_registries() {
        let dir = std::env::temp_dir().join("ruxy-prerender-discovery");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("blog")).unwrap();
        fs::write(dir.join("index.registry.json"), "{}").unwrap();
        fs::write(dir.join("blog/post.registry.json"), "{}").unwrap();
        fs::write(dir.join("blog/notes.txt"), "").unwrap();

        let routes: Vec<String> = discover_registries(&dir).into_iter().map(|e| e.route).collect();
        assert_eq!(routes, vec!["blog/post".to_string(), "index".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_directory() {
        assert!(discover_registries(Path::new("/definitely/not/here")).is_empty());
    }
}
