//! Parsers for Unity project metadata
//!
//! Unity serializes settings and scenes as tagged YAML documents that generic
//! YAML readers reject, so these are line-oriented parsers over the handful of
//! keys navigation needs.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Methods whose persistent calls change the active scene
const LOAD_METHODS: &[&str] = &["LoadScene", "LoadSceneAsync", "LoadLevel", "LoadLevelAsync"];

/// UnityEvent argument modes
const MODE_INT: u32 = 3;
const MODE_STRING: u32 = 5;

/// One entry of `EditorBuildSettings.asset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettingsEntry {
    pub enabled: bool,
    pub path: String,
}

/// Scene named by a serialized load call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneReference {
    Name(String),
    BuildIndex(usize),
}

impl SceneReference {
    /// Scene name without directories or the `.unity` extension
    pub fn normalized_name(&self) -> Option<String> {
        match self {
            Self::Name(name) => Some(scene_name_from_path(name)),
            Self::BuildIndex(_) => None,
        }
    }
}

impl std::fmt::Display for SceneReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::BuildIndex(index) => write!(f, "#{}", index),
        }
    }
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:-\s+)?([A-Za-z_][A-Za-z0-9_]*):\s*(.*?)\s*$").expect("valid regex")
    })
}

fn key_value(line: &str) -> Option<(&str, &str)> {
    let caps = key_value_re().captures(line)?;
    let key = caps.get(1)?.as_str();
    let value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    Some((key, value))
}

/// `Assets/Scenes/Main Menu.unity` -> `Main Menu`
pub fn scene_name_from_path(path: &str) -> String {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    file.strip_suffix(".unity").unwrap_or(file).to_string()
}

/// Parse the scene list of `ProjectSettings/EditorBuildSettings.asset`
///
/// Entries missing a path or carrying an unreadable `enabled` flag are skipped.
pub fn parse_build_settings(content: &str) -> Vec<BuildSettingsEntry> {
    let mut entries = Vec::new();
    let mut in_scenes = false;
    let mut current: Option<(Option<bool>, Option<String>)> = None;

    let flush = |current: &mut Option<(Option<bool>, Option<String>)>,
                     entries: &mut Vec<BuildSettingsEntry>| {
        if let Some((enabled, path)) = current.take() {
            match (enabled, path) {
                (Some(enabled), Some(path)) if !path.is_empty() => {
                    entries.push(BuildSettingsEntry { enabled, path })
                }
                (enabled, path) => warn!(
                    "Skipping malformed build settings entry (enabled: {:?}, path: {:?})",
                    enabled, path
                ),
            }
        }
    };

    for line in content.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("m_Scenes:") {
            in_scenes = true;
            continue;
        }
        if !in_scenes {
            continue;
        }

        // Another top-level key ends the scene list
        if !trimmed.starts_with('-') && trimmed.starts_with("m_") {
            flush(&mut current, &mut entries);
            in_scenes = false;
            continue;
        }

        let Some((key, value)) = key_value(line) else {
            continue;
        };

        if trimmed.starts_with('-') {
            flush(&mut current, &mut entries);
            current = Some((None, None));
        }

        if let Some((enabled, path)) = current.as_mut() {
            match key {
                "enabled" => {
                    *enabled = match value {
                        "1" | "true" => Some(true),
                        "0" | "false" => Some(false),
                        _ => None,
                    }
                }
                "path" => *path = Some(value.to_string()),
                _ => {}
            }
        }
    }
    flush(&mut current, &mut entries);

    entries
}

/// Persistent call being collected while scanning a scene file
#[derive(Default)]
struct PendingCall {
    method: String,
    mode: Option<u32>,
    string_argument: Option<String>,
    int_argument: Option<usize>,
}

impl PendingCall {
    fn into_reference(self) -> Option<SceneReference> {
        let string_arg = self.string_argument.filter(|s| !s.is_empty());
        match self.mode {
            Some(MODE_STRING) => string_arg.map(SceneReference::Name),
            Some(MODE_INT) => self.int_argument.map(SceneReference::BuildIndex),
            _ => string_arg
                .map(SceneReference::Name)
                .or(self.int_argument.map(SceneReference::BuildIndex)),
        }
    }
}

/// Extract scene load calls wired to UI events in a serialized scene
///
/// Calls without a usable argument are skipped with a warning.
pub fn parse_scene_transitions(content: &str) -> Vec<SceneReference> {
    let mut references = Vec::new();
    let mut pending: Option<PendingCall> = None;

    let finish = |pending: &mut Option<PendingCall>, references: &mut Vec<SceneReference>| {
        if let Some(call) = pending.take() {
            let method = call.method.clone();
            match call.into_reference() {
                Some(reference) => references.push(reference),
                None => warn!("Skipping {} call without a scene argument", method),
            }
        }
    };

    for line in content.lines() {
        let Some((key, value)) = key_value(line) else {
            continue;
        };

        match key {
            "m_Target" | "m_CallState" => finish(&mut pending, &mut references),
            "m_MethodName" => {
                finish(&mut pending, &mut references);
                if LOAD_METHODS.contains(&value) {
                    pending = Some(PendingCall {
                        method: value.to_string(),
                        ..Default::default()
                    });
                }
            }
            "m_Mode" => {
                if let Some(call) = pending.as_mut() {
                    call.mode = value.parse().ok();
                }
            }
            "m_StringArgument" => {
                if let Some(call) = pending.as_mut() {
                    call.string_argument = Some(value.to_string());
                }
            }
            "m_IntArgument" => {
                if let Some(call) = pending.as_mut() {
                    call.int_argument = value.parse().ok();
                }
            }
            _ => {}
        }
    }
    finish(&mut pending, &mut references);

    references
}
