use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::WorkspaceError;

use super::package::Package;

const MANIFEST: &str = "package.json";

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    name: Option<String>,
    #[serde(default)]
    workspaces: Option<Workspaces>,
    #[serde(default)]
    scripts: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
}

/// `"workspaces": [...]` or `"workspaces": { "packages": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Workspaces {
    List(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl Workspaces {
    fn patterns(self) -> Vec<String> {
        match self {
            Self::List(v) => v,
            Self::Object { packages } => packages,
        }
    }
}

/// Load every package declared by the root manifest's `workspaces` globs.
///
/// Packages are returned in glob expansion order. Matched directories without
/// a manifest are ignored, as are manifests without a `name`.
pub fn discover(root: &Path) -> Result<Vec<Package>, WorkspaceError> {
    let root_manifest = read_manifest(&root.join(MANIFEST))?;
    let patterns = root_manifest
        .workspaces
        .map(Workspaces::patterns)
        .unwrap_or_default();

    tracing::debug!(root = %root.display(), patterns = ?patterns, "discovering workspace packages");

    let mut packages = Vec::new();
    let mut seen_dirs: HashSet<PathBuf> = HashSet::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for pattern in patterns {
        let full = root.join(&pattern).join(MANIFEST);
        let full = full.to_string_lossy().to_string();
        let entries = glob::glob(&full).map_err(|e| WorkspaceError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            let manifest_path = match entry {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Skipping unreadable workspace entry: {}", e);
                    continue;
                }
            };
            let Some(dir) = manifest_path.parent().map(Path::to_path_buf) else {
                continue;
            };
            if !seen_dirs.insert(dir.clone()) {
                continue;
            }

            let manifest = read_manifest(&manifest_path)?;
            let Some(name) = manifest.name else {
                tracing::warn!(path = %manifest_path.display(), "package manifest has no name, skipping");
                continue;
            };
            if !seen_names.insert(name.clone()) {
                return Err(WorkspaceError::DuplicatePackage(name));
            }

            packages.push(Package {
                name,
                path: dir,
                scripts: manifest.scripts.into_keys().collect(),
                dependencies: manifest.dependencies,
                dev_dependencies: manifest.dev_dependencies,
            });
        }
    }

    tracing::info!(count = packages.len(), "workspace packages loaded");
    Ok(packages)
}

fn read_manifest(path: &Path) -> Result<Manifest, WorkspaceError> {
    let text = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| WorkspaceError::Manifest {
        path: path.display().to_string(),
        source,
    })
}
