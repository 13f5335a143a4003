//! Hand-written navigation manifest (`.wayfind/navigation.toml`)
//!
//! Lets a project name scenes and controls the metadata scan cannot see, or
//! describe a non-Unity application entirely:
//!
//! ```toml
//! entry = "Home"
//!
//! [[scene]]
//! id = "Home"
//! title = "Main Menu"
//!
//! [[edge]]
//! from = "Home"
//! to = "Settings"
//! label = "Settings"      # or: x = 120, y = 40   or: keys = ["tab", "enter"]
//! ```
//!
//! Records are decoded one by one; a malformed record is skipped with a
//! warning and never takes the rest of the manifest down with it.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use wayfind_core::{ControlDescriptor, Result};

/// Relative location of the manifest inside a project
pub const MANIFEST_PATH: &str = ".wayfind/navigation.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestScene {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

impl ManifestEdge {
    /// The control this edge names; exactly one form must be given
    pub fn control(&self) -> Option<ControlDescriptor> {
        let label = self.label.as_ref().filter(|l| !l.trim().is_empty());
        let point = match (self.x, self.y) {
            (Some(x), Some(y)) => Some((x, y)),
            (None, None) => None,
            _ => return None,
        };
        let keys = self.keys.as_ref().filter(|k| !k.is_empty());

        match (label, point, keys) {
            (Some(text), None, None) => Some(ControlDescriptor::Label { text: text.clone() }),
            (None, Some((x, y)), None) => Some(ControlDescriptor::Point { x, y }),
            (None, None, Some(keys)) => Some(ControlDescriptor::Keys { keys: keys.clone() }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub path: PathBuf,
    pub entry: Option<String>,
    pub scenes: Vec<ManifestScene>,
    pub edges: Vec<ManifestEdge>,
}

impl Manifest {
    /// Load the manifest if the project has one
    ///
    /// A file that cannot be read or is not valid TOML at all is reported
    /// and ignored.
    pub fn load(project_root: &Path) -> Result<Option<Self>> {
        let path = project_root.join(MANIFEST_PATH);
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
                return Ok(None);
            }
        };
        match Self::parse(&content, path.clone()) {
            Some(manifest) => {
                debug!(
                    "Loaded manifest {} ({} scenes, {} edges)",
                    path.display(),
                    manifest.scenes.len(),
                    manifest.edges.len()
                );
                Ok(Some(manifest))
            }
            None => Ok(None),
        }
    }

    /// Parse manifest text, skipping malformed records
    pub fn parse(content: &str, path: PathBuf) -> Option<Self> {
        let table: toml::Table = match content.parse() {
            Ok(table) => table,
            Err(e) => {
                warn!("Ignoring unparsable manifest {}: {}", path.display(), e);
                return None;
            }
        };

        let entry = match table.get("entry") {
            Some(toml::Value::String(s)) => Some(s.clone()),
            Some(other) => {
                warn!("Ignoring non-string manifest entry: {}", other);
                None
            }
            None => None,
        };

        let scenes = decode_records::<ManifestScene>(&table, "scene");
        let edges = decode_records::<ManifestEdge>(&table, "edge")
            .into_iter()
            .filter(|edge| {
                let valid = edge.control().is_some();
                if !valid {
                    warn!(
                        "Skipping manifest edge {} -> {}: give exactly one of label, x/y, keys",
                        edge.from, edge.to
                    );
                }
                valid
            })
            .collect();

        Some(Self {
            path,
            entry,
            scenes,
            edges,
        })
    }
}

fn decode_records<T: for<'de> Deserialize<'de>>(table: &toml::Table, key: &str) -> Vec<T> {
    let Some(value) = table.get(key) else {
        return Vec::new();
    };

    let Some(items) = value.as_array() else {
        warn!("Manifest key '{}' must be an array of tables", key);
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item.clone().try_into::<T>() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed manifest {} #{}: {}", key, i + 1, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(
            r#"
entry = "Home"

[[scene]]
id = "Home"
title = "Main Menu"

[[scene]]
title = "missing id"

[[edge]]
from = "Home"
to = "Settings"
label = "Settings"

[[edge]]
from = "Home"
to = "About"
x = 10
y = 20

[[edge]]
from = "Home"
to = "Help"
keys = ["f1"]

[[edge]]
from = "Home"
to = "Ambiguous"
label = "A"
keys = ["a"]
"#,
            PathBuf::from("navigation.toml"),
        )
        .unwrap();

        assert_eq!(manifest.entry.as_deref(), Some("Home"));
        assert_eq!(manifest.scenes.len(), 1);
        assert_eq!(manifest.scenes[0].title.as_deref(), Some("Main Menu"));
        assert_eq!(manifest.edges.len(), 3);
        assert_eq!(
            manifest.edges[1].control(),
            Some(ControlDescriptor::Point { x: 10, y: 20 })
        );
    }

    #[test]
    fn test_unparsable_manifest_ignored() {
        assert!(Manifest::parse("[[edge]\nfrom = ", PathBuf::from("x")).is_none());
    }

    #[test]
    fn test_unreadable_manifest_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(MANIFEST_PATH)).unwrap();

        assert_eq!(Manifest::load(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_half_point_rejected() {
        let edge = ManifestEdge {
            from: "A".to_string(),
            to: "B".to_string(),
            label: None,
            x: Some(1),
            y: None,
            keys: None,
        };
        assert!(edge.control().is_none());
    }
}
