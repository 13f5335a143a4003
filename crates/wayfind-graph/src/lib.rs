//! # wayfind-graph
//!
//! Static navigation discovery for Wayfind.
//!
//! This crate provides:
//! - Unity build settings and scene file parsing
//! - The `.wayfind/navigation.toml` manifest
//! - `GraphBuilder`, which turns a project directory into a `NavigationGraph`

mod builder;
pub mod manifest;
pub mod unity;

pub use builder::{GraphBuilder, BUILD_SETTINGS_PATH};
pub use manifest::{Manifest, ManifestEdge, ManifestScene, MANIFEST_PATH};
