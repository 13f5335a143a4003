//! Per-run traversal bookkeeping
//!
//! Owned by exactly one engine run and discarded afterwards. A scene enters
//! `visited` only through [`TraversalState::visit`], which the engine calls
//! after a confirmed recognition.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use wayfind_core::{ControlDescriptor, SceneId};

/// Identity of an attempted edge: source, intended target and control
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub from: SceneId,
    pub to: SceneId,
    pub control: ControlDescriptor,
}

/// A transition observed to work during this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedStep {
    pub from: SceneId,
    pub to: SceneId,
    pub control: ControlDescriptor,
}

#[derive(Debug, Default)]
pub struct TraversalState {
    visited: HashSet<SceneId>,
    order: Vec<SceneId>,
    frontier: VecDeque<SceneId>,
    failed_edges: HashMap<EdgeKey, u32>,
    screenshots: BTreeMap<SceneId, PathBuf>,
    confirmed: BTreeMap<SceneId, Vec<ConfirmedStep>>,
}

impl TraversalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed scene with its screenshot and queue it for expansion
    ///
    /// Returns false if the scene was already visited; the first screenshot is kept.
    pub fn visit(&mut self, scene: SceneId, screenshot: PathBuf) -> bool {
        if !self.visited.insert(scene.clone()) {
            return false;
        }
        self.order.push(scene.clone());
        self.frontier.push_back(scene.clone());
        self.screenshots.insert(scene, screenshot);
        true
    }

    pub fn is_visited(&self, scene: &SceneId) -> bool {
        self.visited.contains(scene)
    }

    /// Next scene to expand, FIFO
    pub fn next_scene(&mut self) -> Option<SceneId> {
        self.frontier.pop_front()
    }

    /// Count one more failed attempt, returning the new total
    pub fn record_failure(&mut self, key: &EdgeKey) -> u32 {
        let count = self.failed_edges.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset_failures(&mut self, key: &EdgeKey) {
        self.failed_edges.remove(key);
    }

    pub fn failure_count(&self, key: &EdgeKey) -> u32 {
        self.failed_edges.get(key).copied().unwrap_or(0)
    }

    pub fn record_confirmed(&mut self, from: SceneId, to: SceneId, control: ControlDescriptor) {
        let steps = self.confirmed.entry(from.clone()).or_default();
        if !steps.iter().any(|s| s.to == to && s.control == control) {
            steps.push(ConfirmedStep { from, to, control });
        }
    }

    /// Shortest sequence of confirmed steps from `from` to `to`
    ///
    /// `Some(vec![])` when already there, `None` when no known route exists.
    pub fn route(&self, from: &SceneId, to: &SceneId) -> Option<Vec<ConfirmedStep>> {
        if from == to {
            return Some(Vec::new());
        }

        let mut came_from: HashMap<&SceneId, &ConfirmedStep> = HashMap::new();
        let mut queue: VecDeque<&SceneId> = VecDeque::from([from]);
        let mut seen: HashSet<&SceneId> = HashSet::from([from]);

        while let Some(scene) = queue.pop_front() {
            for step in self.confirmed.get(scene).into_iter().flatten() {
                if !seen.insert(&step.to) {
                    continue;
                }
                came_from.insert(&step.to, step);
                if &step.to == to {
                    let mut path = Vec::new();
                    let mut cursor = to;
                    while let Some(step) = came_from.get(cursor) {
                        path.push((*step).clone());
                        cursor = &step.from;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(&step.to);
            }
        }
        None
    }

    /// Visited scenes in confirmation order
    pub fn visited(&self) -> &[SceneId] {
        &self.order
    }

    pub fn visited_count(&self) -> usize {
        self.order.len()
    }

    pub fn screenshots(&self) -> &BTreeMap<SceneId, PathBuf> {
        &self.screenshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SceneId {
        SceneId::from(s)
    }

    fn key(k: &str) -> ControlDescriptor {
        ControlDescriptor::Keys {
            keys: vec![k.to_string()],
        }
    }

    #[test]
    fn test_visit_is_fifo_and_idempotent() {
        let mut state = TraversalState::new();
        assert!(state.visit(id("Home"), PathBuf::from("Home.png")));
        assert!(state.visit(id("Settings"), PathBuf::from("Settings.png")));
        assert!(!state.visit(id("Home"), PathBuf::from("other.png")));

        assert_eq!(state.visited_count(), 2);
        assert_eq!(state.screenshots()[&id("Home")], PathBuf::from("Home.png"));
        assert_eq!(state.next_scene(), Some(id("Home")));
        assert_eq!(state.next_scene(), Some(id("Settings")));
        assert_eq!(state.next_scene(), None);
    }

    #[test]
    fn test_failure_counts() {
        let mut state = TraversalState::new();
        let edge = EdgeKey {
            from: id("Home"),
            to: id("About"),
            control: key("a"),
        };

        assert_eq!(state.record_failure(&edge), 1);
        assert_eq!(state.record_failure(&edge), 2);
        state.reset_failures(&edge);
        assert_eq!(state.failure_count(&edge), 0);
    }

    #[test]
    fn test_shortest_route() {
        let mut state = TraversalState::new();
        state.record_confirmed(id("Home"), id("Settings"), key("s"));
        state.record_confirmed(id("Settings"), id("Audio"), key("a"));
        state.record_confirmed(id("Home"), id("Help"), key("h"));
        state.record_confirmed(id("Help"), id("Audio"), key("x"));
        state.record_confirmed(id("Audio"), id("Home"), key("esc"));

        let route = state.route(&id("Home"), &id("Audio")).unwrap();
        assert_eq!(route.len(), 2);
        assert_eq!(route[0].to, id("Settings"));
        assert_eq!(route[1].to, id("Audio"));

        let back = state.route(&id("Audio"), &id("Help")).unwrap();
        assert_eq!(back.len(), 2);

        assert_eq!(state.route(&id("Home"), &id("Home")), Some(vec![]));
        assert!(state.route(&id("Home"), &id("Credits")).is_none());
    }
}
