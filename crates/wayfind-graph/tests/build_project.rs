//! Integration tests for graph building over on-disk project fixtures
//!
//! Covers:
//! - Unity build settings and scene-load scanning
//! - Manifest overrides and manifest-only projects
//! - Determinism and hard-stop errors

use std::path::Path;
use tempfile::TempDir;
use wayfind_core::{ControlDescriptor, EdgeOrigin, EdgeTarget, SceneId, WayfindError};
use wayfind_graph::GraphBuilder;

const BUILD_SETTINGS: &str = r#"%YAML 1.1
%TAG !u! tag:unity3d.com,2011:
--- !u!1045 &1
EditorBuildSettings:
  m_ObjectHideFlags: 0
  serializedVersion: 2
  m_Scenes:
  - enabled: 1
    path: Assets/Scenes/Home.unity
    guid: 01
  - enabled: 0
    path: Assets/Scenes/Legacy.unity
    guid: 02
  - enabled: 1
    path: Assets/Scenes/Settings.unity
    guid: 03
  - enabled: 1
    path: Assets/Scenes/About.unity
    guid: 04
  m_configObjects: {}
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Serialized button wired to SceneManager.LoadScene
fn load_call(target: u32, mode: u32, int_arg: usize, string_arg: &str) -> String {
    format!(
        r#"      - m_Target: {{fileID: {target}}}
        m_MethodName: LoadScene
        m_Mode: {mode}
        m_Arguments:
          m_ObjectArgument: {{fileID: 0}}
          m_IntArgument: {int_arg}
          m_StringArgument: {string_arg}
        m_CallState: 2
"#
    )
}

fn scene_file(calls: &[String]) -> String {
    format!(
        "--- !u!114 &100\nMonoBehaviour:\n  m_OnClick:\n    m_PersistentCalls:\n      m_Calls:\n{}",
        calls.concat()
    )
}

/// Home -> Settings (by path), Home -> About (by build index), Home -> Store (unknown),
/// Settings -> Home (by name), plus a disabled scene and a duplicate scene name
fn create_unity_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, "ProjectSettings/EditorBuildSettings.asset", BUILD_SETTINGS);
    write(
        root,
        "Assets/Scenes/Home.unity",
        &scene_file(&[
            load_call(1, 5, 0, "Assets/Scenes/Settings.unity"),
            load_call(2, 3, 2, ""),
            load_call(3, 5, 0, "Store"),
            load_call(4, 5, 0, "Assets/Scenes/Settings.unity"),
        ]),
    );
    write(
        root,
        "Assets/Scenes/Settings.unity",
        &scene_file(&[load_call(1, 5, 0, "Home")]),
    );
    write(root, "Assets/Scenes/About.unity", &scene_file(&[]));
    write(root, "Assets/Scenes/Legacy.unity", &scene_file(&[]));
    write(root, "Assets/Extra/Home.unity", &scene_file(&[]));

    dir
}

#[test]
fn test_build_unity_project() {
    let project = create_unity_project();
    let graph = GraphBuilder::new().build(project.path()).unwrap();

    assert_eq!(graph.len(), 5);
    assert_eq!(graph.entry(), Some(&SceneId::from("Home")));

    let summary = graph.summary();
    assert_eq!(summary.enabled_scenes, 3);
    assert_eq!(summary.unresolved_edges, 1);

    let home = graph.scene(&SceneId::from("Home")).unwrap();
    assert_eq!(home.build_index, Some(0));
    let targets: Vec<&EdgeTarget> = home.out_edges.iter().map(|e| &e.target).collect();
    assert_eq!(
        targets,
        vec![
            &EdgeTarget::Resolved {
                scene: SceneId::from("Settings")
            },
            &EdgeTarget::Resolved {
                scene: SceneId::from("About")
            },
            &EdgeTarget::Unresolved {
                reference: "Store".to_string()
            },
        ]
    );
    assert_eq!(
        home.out_edges[0].control,
        ControlDescriptor::Label {
            text: "Settings".to_string()
        }
    );
    assert_eq!(home.out_edges[0].origin, EdgeOrigin::SceneFile);

    assert!(!graph.is_enabled(&SceneId::from("Legacy")));
    assert_eq!(
        graph.scene(&SceneId::from("About")).unwrap().build_index,
        Some(2)
    );

    // The second Home scene is keyed by its path and excluded from the build
    let duplicate = graph.scene(&SceneId::from("Assets/Extra/Home")).unwrap();
    assert!(!duplicate.enabled);
}

#[test]
fn test_build_is_deterministic() {
    let project = create_unity_project();
    let builder = GraphBuilder::new();

    let first = builder.build(project.path()).unwrap();
    let second = builder.build(project.path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_unreadable_manifest_falls_back_to_scanning() {
    let project = create_unity_project();
    std::fs::create_dir_all(project.path().join(".wayfind/navigation.toml")).unwrap();

    let graph = GraphBuilder::new().build(project.path()).unwrap();
    let scanned = GraphBuilder::new()
        .without_manifest()
        .build(project.path())
        .unwrap();
    assert_eq!(graph, scanned);
}

#[test]
fn test_manifest_refines_scanned_graph() {
    let project = create_unity_project();
    write(
        project.path(),
        ".wayfind/navigation.toml",
        r#"
entry = "About"

[[scene]]
id = "Home"
title = "Main Menu"
aliases = ["Start"]

[[scene]]
id = "Credits"
title = "Credits"

[[scene]]
aliases = "not a list"

[[edge]]
from = "Home"
to = "Settings"
keys = ["tab", "enter"]

[[edge]]
from = "Ghost"
to = "Home"
label = "Home"

[[edge]]
from = "About"
to = "Credits"
x = 40
y = 300
"#,
    );

    let graph = GraphBuilder::new().build(project.path()).unwrap();
    assert_eq!(graph.entry(), Some(&SceneId::from("About")));

    let home = graph.scene(&SceneId::from("Home")).unwrap();
    assert_eq!(home.title.as_deref(), Some("Main Menu"));
    assert_eq!(home.aliases, vec!["Start".to_string()]);

    // The explicit edge replaced the scanned Settings button in place
    assert_eq!(home.out_edges.len(), 3);
    assert_eq!(home.out_edges[0].origin, EdgeOrigin::Manifest);
    assert_eq!(
        home.out_edges[0].control,
        ControlDescriptor::Keys {
            keys: vec!["tab".to_string(), "enter".to_string()]
        }
    );

    // Scanned labels use the manifest title of their target
    let settings = graph.scene(&SceneId::from("Settings")).unwrap();
    assert_eq!(
        settings.out_edges[0].control,
        ControlDescriptor::Label {
            text: "Main Menu".to_string()
        }
    );

    let about = graph.scene(&SceneId::from("About")).unwrap();
    assert_eq!(
        about.out_edges[0].target.resolved(),
        Some(&SceneId::from("Credits"))
    );
    assert!(graph.is_enabled(&SceneId::from("Credits")));
}

#[test]
fn test_manifest_only_project() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        ".wayfind/navigation.toml",
        r#"
[[scene]]
id = "Settings"

[[scene]]
id = "Home"

[[edge]]
from = "Home"
to = "Settings"
label = "Settings"

[[edge]]
from = "Home"
to = "Store"
label = "Store"
"#,
    );

    let graph = GraphBuilder::new().build(dir.path()).unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.entry(), Some(&SceneId::from("Home")));

    let home = graph.scene(&SceneId::from("Home")).unwrap();
    assert!(home.out_edges[1].target.resolved().is_none());

    let scanned_only = GraphBuilder::new().without_manifest().build(dir.path());
    assert!(matches!(scanned_only, Err(WayfindError::GraphBuild(_))));
}

#[test]
fn test_empty_project_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("Assets")).unwrap();

    let err = GraphBuilder::new().build(dir.path()).unwrap_err();
    assert!(matches!(err, WayfindError::GraphBuild(_)));
    assert_eq!(err.reason_code(), "graph build failed");

    let missing = GraphBuilder::new().build(&dir.path().join("nope"));
    assert!(matches!(missing, Err(WayfindError::GraphBuild(_))));
}
