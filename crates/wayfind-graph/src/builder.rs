//! Navigation graph construction from project metadata

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use wayfind_core::{
    ControlDescriptor, EdgeOrigin, EdgeTarget, NavigationGraph, Result, SceneId, SceneNode,
    TransitionEdge, WayfindError,
};

use crate::manifest::{Manifest, ManifestEdge, ManifestScene};
use crate::unity::{self, BuildSettingsEntry, SceneReference};

/// Relative location of the Unity build scene list
pub const BUILD_SETTINGS_PATH: &str = "ProjectSettings/EditorBuildSettings.asset";

/// Scene files scanned below the project root
const SCENE_GLOB: &str = "Assets/**/*.unity";

/// Builds a [`NavigationGraph`] from a project directory without writing to it
///
/// Sources, in order of precedence (later refines earlier):
/// 1. `ProjectSettings/EditorBuildSettings.asset` for enabled scenes and build order
/// 2. `Assets/**/*.unity` for scene nodes and serialized scene-load calls
/// 3. `.wayfind/navigation.toml` for titles, extra scenes, explicit edges and the entry
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    skip_manifest: bool,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore `.wayfind/navigation.toml` and use scanned metadata only
    pub fn without_manifest(mut self) -> Self {
        self.skip_manifest = true;
        self
    }

    /// Build the graph for `project_root`
    ///
    /// Fails only when the root is missing or no scene at all was found.
    #[instrument(skip(self), fields(root = %project_root.display()))]
    pub fn build(&self, project_root: &Path) -> Result<NavigationGraph> {
        if !project_root.is_dir() {
            return Err(WayfindError::GraphBuild(format!(
                "project root {} is not a directory",
                project_root.display()
            )));
        }

        let build_settings = read_build_settings(project_root);
        let scene_files = find_scene_files(project_root)?;
        let mut scenes = SceneTable::from_sources(&build_settings, &scene_files);

        let manifest = if self.skip_manifest {
            None
        } else {
            Manifest::load(project_root)?
        };

        if let Some(manifest) = &manifest {
            for record in &manifest.scenes {
                scenes.apply_manifest_scene(record);
            }
        }

        scenes.scan_transitions(project_root);

        if let Some(manifest) = &manifest {
            for record in &manifest.edges {
                scenes.apply_manifest_edge(record);
            }
        }

        if scenes.nodes.is_empty() {
            return Err(WayfindError::GraphBuild(format!(
                "no scenes found under {}",
                project_root.display()
            )));
        }

        let entry = scenes.choose_entry(manifest.as_ref().and_then(|m| m.entry.as_deref()));
        let graph = NavigationGraph::new(scenes.nodes, entry);

        let summary = graph.summary();
        info!(
            "Built navigation graph: {} scenes ({} enabled), {} edges ({} unresolved), entry {:?}",
            summary.scenes,
            summary.enabled_scenes,
            summary.edges,
            summary.unresolved_edges,
            graph.entry().map(|e| e.as_str())
        );

        Ok(graph)
    }
}

fn read_build_settings(project_root: &Path) -> Vec<BuildSettingsEntry> {
    let path = project_root.join(BUILD_SETTINGS_PATH);
    if !path.exists() {
        debug!("No build settings at {}", path.display());
        return Vec::new();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => unity::parse_build_settings(&content),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Project-relative scene file paths with `/` separators, sorted
fn find_scene_files(project_root: &Path) -> Result<Vec<String>> {
    let pattern = project_root.join(SCENE_GLOB);
    let pattern = pattern.to_string_lossy();

    let paths = glob::glob(&pattern)
        .map_err(|e| WayfindError::GraphBuild(format!("invalid scene pattern: {}", e)))?;

    let mut files: Vec<String> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable scene path: {}", e);
                None
            }
        })
        .filter_map(|path| {
            path.strip_prefix(project_root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();

    files.sort();
    Ok(files)
}

fn relative_key(path: &str) -> String {
    path.trim().trim_start_matches("./").replace('\\', "/")
}

/// Nodes under construction, in deterministic insertion order
struct SceneTable {
    nodes: Vec<SceneNode>,
    by_id: HashMap<SceneId, usize>,
    by_path: HashMap<String, usize>,
}

impl SceneTable {
    fn from_sources(build_settings: &[BuildSettingsEntry], scene_files: &[String]) -> Self {
        let mut table = Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
            by_path: HashMap::new(),
        };

        let on_disk: HashSet<&str> = scene_files.iter().map(String::as_str).collect();
        let mut next_index = 0;

        for entry in build_settings {
            let path = relative_key(&entry.path);
            if !on_disk.contains(path.as_str()) {
                warn!("Build settings list {} but the file is missing", path);
                continue;
            }
            if table.by_path.contains_key(&path) {
                warn!("Build settings list {} more than once", path);
                continue;
            }

            let build_index = entry.enabled.then(|| {
                let index = next_index;
                next_index += 1;
                index
            });
            table.insert_scene_file(&path, entry.enabled, build_index);
        }

        for path in scene_files {
            if !table.by_path.contains_key(path) {
                table.insert_scene_file(path, false, None);
            }
        }

        table
    }

    fn insert_scene_file(&mut self, path: &str, enabled: bool, build_index: Option<usize>) {
        let stem = SceneId::new(unity::scene_name_from_path(path));
        let id = if self.by_id.contains_key(&stem) {
            let fallback = SceneId::new(path.strip_suffix(".unity").unwrap_or(path));
            warn!(
                "Scene name {} is used twice; identifying {} as {}",
                stem, path, fallback
            );
            fallback
        } else {
            stem
        };

        let mut node = SceneNode::new(id.clone(), PathBuf::from(path));
        node.enabled = enabled;
        node.build_index = build_index;

        self.by_id.insert(id, self.nodes.len());
        self.by_path.insert(path.to_string(), self.nodes.len());
        self.nodes.push(node);
    }

    fn apply_manifest_scene(&mut self, record: &ManifestScene) {
        if record.id.trim().is_empty() {
            warn!("Skipping manifest scene with an empty id");
            return;
        }

        let id = SceneId::new(record.id.trim());
        let index = match self.by_id.get(&id) {
            Some(&index) => index,
            None => {
                let source = record
                    .path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(crate::manifest::MANIFEST_PATH));
                debug!("Manifest adds scene {}", id);
                self.by_id.insert(id.clone(), self.nodes.len());
                self.nodes.push(SceneNode::new(id, source));
                self.nodes.len() - 1
            }
        };

        let node = &mut self.nodes[index];
        if let Some(title) = record.title.as_ref().filter(|t| !t.trim().is_empty()) {
            node.title = Some(title.clone());
        }
        node.aliases.extend(record.aliases.iter().cloned());
        if let Some(enabled) = record.enabled {
            node.enabled = enabled;
        }
    }

    fn resolve(&self, reference: &SceneReference) -> Option<&SceneNode> {
        let index = match reference {
            SceneReference::Name(name) => self
                .by_path
                .get(&relative_key(name))
                .or_else(|| {
                    self.by_path
                        .get(&format!("{}.unity", relative_key(name)))
                })
                .or_else(|| {
                    reference
                        .normalized_name()
                        .and_then(|n| self.by_id.get(&SceneId::new(n)))
                })
                .copied(),
            SceneReference::BuildIndex(i) => {
                self.nodes.iter().position(|n| n.build_index == Some(*i))
            }
        };
        index.map(|i| &self.nodes[i])
    }

    fn scan_transitions(&mut self, project_root: &Path) {
        let mut found: Vec<(usize, Vec<TransitionEdge>)> = Vec::new();

        for (index, node) in self.nodes.iter().enumerate() {
            let is_scene_file = node
                .source_path
                .extension()
                .map(|ext| ext == "unity")
                .unwrap_or(false);
            if !is_scene_file {
                continue;
            }

            let full_path = project_root.join(&node.source_path);
            let content = match std::fs::read_to_string(&full_path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Could not read scene {}: {}", full_path.display(), e);
                    continue;
                }
            };

            let mut edges: Vec<TransitionEdge> = Vec::new();
            for reference in unity::parse_scene_transitions(&content) {
                let edge = match self.resolve(&reference) {
                    Some(target) => TransitionEdge {
                        target: EdgeTarget::Resolved {
                            scene: target.id.clone(),
                        },
                        control: ControlDescriptor::Label {
                            text: target.label_text(),
                        },
                        origin: EdgeOrigin::SceneFile,
                    },
                    None => {
                        debug!("{}: unresolved scene reference {}", node.id, reference);
                        TransitionEdge {
                            target: EdgeTarget::Unresolved {
                                reference: reference.to_string(),
                            },
                            control: ControlDescriptor::Label {
                                text: reference
                                    .normalized_name()
                                    .unwrap_or_else(|| reference.to_string()),
                            },
                            origin: EdgeOrigin::SceneFile,
                        }
                    }
                };

                if !edges.contains(&edge) {
                    edges.push(edge);
                }
            }

            if !edges.is_empty() {
                found.push((index, edges));
            }
        }

        for (index, edges) in found {
            self.nodes[index].out_edges.extend(edges);
        }
    }

    fn apply_manifest_edge(&mut self, record: &ManifestEdge) {
        let from = SceneId::new(record.from.trim());
        let Some(&index) = self.by_id.get(&from) else {
            warn!(
                "Skipping manifest edge {} -> {}: unknown source scene",
                record.from, record.to
            );
            return;
        };
        let Some(control) = record.control() else {
            return;
        };

        let to = SceneId::new(record.to.trim());
        let edge = TransitionEdge {
            target: EdgeTarget::Resolved { scene: to.clone() },
            control,
            origin: EdgeOrigin::Manifest,
        };

        let out_edges = &mut self.nodes[index].out_edges;
        let scanned_to_target = |e: &TransitionEdge| {
            e.origin == EdgeOrigin::SceneFile && e.target.resolved() == Some(&to)
        };

        match out_edges.iter().position(scanned_to_target) {
            Some(position) => {
                out_edges[position] = edge;
                out_edges.retain(|e| !scanned_to_target(e));
            }
            None => out_edges.push(edge),
        }
    }

    fn choose_entry(&self, manifest_entry: Option<&str>) -> Option<SceneId> {
        if let Some(entry) = manifest_entry {
            let id = SceneId::new(entry.trim());
            if self.by_id.contains_key(&id) {
                return Some(id);
            }
            warn!("Manifest entry {} is not a known scene", entry);
        }

        self.nodes
            .iter()
            .filter(|n| n.enabled)
            .filter_map(|n| n.build_index.map(|i| (i, &n.id)))
            .min_by_key(|(i, _)| *i)
            .map(|(_, id)| id.clone())
            .or_else(|| {
                self.nodes
                    .iter()
                    .filter(|n| n.enabled)
                    .map(|n| n.id.clone())
                    .min()
            })
    }
}
