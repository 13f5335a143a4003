//! Navigation graph data model
//!
//! The graph is built once from project metadata before the target process
//! starts and is read-only afterwards. Edges that point at scenes the builder
//! never saw are tagged unresolved at construction, so traversal never has to
//! dereference a dangling target.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Identifier of one navigable screen of the target application
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split camel case and separators into words: `MainMenu_v2` -> `Main Menu v2`
    pub fn humanized(&self) -> String {
        let mut out = String::with_capacity(self.0.len() + 4);
        let mut prev: Option<char> = None;

        for c in self.0.chars() {
            if c == '_' || c == '-' || c == '.' {
                if !out.ends_with(' ') && !out.is_empty() {
                    out.push(' ');
                }
                prev = Some(' ');
                continue;
            }
            if let Some(p) = prev {
                let boundary = (p.is_lowercase() && c.is_uppercase())
                    || (p.is_alphabetic() && c.is_ascii_digit())
                    || (p.is_ascii_digit() && c.is_alphabetic());
                if boundary && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            out.push(c);
            prev = Some(c);
        }

        out.trim().to_string()
    }

    /// File-name safe form used for `<outputDir>/<SceneId>.<ext>`
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SceneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Hint for locating the control that triggers a transition
///
/// Opaque to the graph; interpreted when the control is activated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlDescriptor {
    /// Visible label text of a button or menu item
    Label { text: String },
    /// Window-relative pointer position
    Point { x: i32, y: i32 },
    /// Key presses in order
    Keys { keys: Vec<String> },
}

impl std::fmt::Display for ControlDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Label { text } => write!(f, "label '{}'", text),
            Self::Point { x, y } => write!(f, "point ({}, {})", x, y),
            Self::Keys { keys } => write!(f, "keys [{}]", keys.join(", ")),
        }
    }
}

/// Destination of a transition edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EdgeTarget {
    Resolved { scene: SceneId },
    /// External or unknown destination, never traversed
    Unresolved { reference: String },
}

impl EdgeTarget {
    pub fn resolved(&self) -> Option<&SceneId> {
        match self {
            Self::Resolved { scene } => Some(scene),
            Self::Unresolved { .. } => None,
        }
    }
}

/// Where an edge was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOrigin {
    SceneFile,
    Manifest,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub target: EdgeTarget,
    pub control: ControlDescriptor,
    pub origin: EdgeOrigin,
}

impl TransitionEdge {
    pub fn to_scene(target: impl Into<SceneId>, control: ControlDescriptor) -> Self {
        Self {
            target: EdgeTarget::Resolved {
                scene: target.into(),
            },
            control,
            origin: EdgeOrigin::Manifest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: SceneId,
    pub source_path: PathBuf,
    /// Disabled scenes are not part of the shipped build
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_index: Option<usize>,
    /// On-screen title, when it differs from the id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub out_edges: Vec<TransitionEdge>,
}

impl SceneNode {
    pub fn new(id: impl Into<SceneId>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            source_path: source_path.into(),
            enabled: true,
            build_index: None,
            title: None,
            aliases: Vec::new(),
            out_edges: Vec::new(),
        }
    }

    pub fn with_edge(mut self, edge: TransitionEdge) -> Self {
        self.out_edges.push(edge);
        self
    }

    /// Texts expected on screen when this scene is displayed, deduplicated
    pub fn display_texts(&self) -> Vec<String> {
        let mut texts = vec![self.id.as_str().to_string(), self.id.humanized()];
        texts.extend(self.title.iter().cloned());
        texts.extend(self.aliases.iter().cloned());

        let mut seen = std::collections::HashSet::new();
        texts.retain(|t| !t.trim().is_empty() && seen.insert(t.to_lowercase()));
        texts
    }

    /// Text best suited as a button label leading to this scene
    pub fn label_text(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.id.humanized())
    }
}

/// Counts describing a graph, for planning before any process is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub scenes: usize,
    pub enabled_scenes: usize,
    pub edges: usize,
    pub unresolved_edges: usize,
}

/// Immutable directed graph of scenes and transition controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationGraph {
    entry: Option<SceneId>,
    scenes: BTreeMap<SceneId, SceneNode>,
}

impl NavigationGraph {
    /// Assemble a graph, tagging edges to unknown scenes as unresolved
    ///
    /// Later nodes with a duplicate id replace earlier ones. An entry that does
    /// not name a known scene is dropped.
    pub fn new(nodes: impl IntoIterator<Item = SceneNode>, entry: Option<SceneId>) -> Self {
        let mut scenes: BTreeMap<SceneId, SceneNode> = BTreeMap::new();
        for node in nodes {
            scenes.insert(node.id.clone(), node);
        }

        let known: std::collections::HashSet<SceneId> = scenes.keys().cloned().collect();
        for node in scenes.values_mut() {
            for edge in &mut node.out_edges {
                if let EdgeTarget::Resolved { scene } = &edge.target {
                    if !known.contains(scene) {
                        edge.target = EdgeTarget::Unresolved {
                            reference: scene.as_str().to_string(),
                        };
                    }
                }
            }
        }

        let entry = entry.filter(|id| scenes.contains_key(id));

        Self { entry, scenes }
    }

    pub fn entry(&self) -> Option<&SceneId> {
        self.entry.as_ref()
    }

    pub fn scene(&self, id: &SceneId) -> Option<&SceneNode> {
        self.scenes.get(id)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &SceneNode> {
        self.scenes.values()
    }

    pub fn enabled_scenes(&self) -> impl Iterator<Item = &SceneNode> {
        self.scenes.values().filter(|s| s.enabled)
    }

    pub fn is_enabled(&self, id: &SceneId) -> bool {
        self.scenes.get(id).map(|s| s.enabled).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn summary(&self) -> GraphSummary {
        let edges = self.scenes.values().flat_map(|s| s.out_edges.iter());
        let (mut total, mut unresolved) = (0, 0);
        for edge in edges {
            total += 1;
            if edge.target.resolved().is_none() {
                unresolved += 1;
            }
        }

        GraphSummary {
            scenes: self.scenes.len(),
            enabled_scenes: self.enabled_scenes().count(),
            edges: total,
            unresolved_edges: unresolved,
        }
    }
}
