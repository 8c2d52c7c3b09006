//! Logger registry: the hierarchical tree of logger names and the events
//! assigned to them.
//!
//! Every event lands on the node named by its dotted logger path; missing
//! nodes along the way are created on demand. Events themselves live in one
//! ordered map keyed by `(sequence_nr, arrival)` so the visible view comes out
//! in sequence order without sorting. Each node only remembers the keys of
//! the events assigned to it directly.
//!
//! The registry is a plain single-owner structure. Concurrency is handled one
//! level up by [`crate::service::RegistryService`].

use crate::types::{LogEvent, LogLevel};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// `(sequence_nr, arrival)`; arrival breaks ties between equal sequence numbers.
type EventKey = (u64, u64);

/// Split a dotted logger name into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// One segment of the logger namespace.
#[derive(Debug, Clone)]
pub struct LoggerNode {
    /// Leaf segment; empty for the root.
    pub name: String,
    /// Dotted path from the root; empty for the root.
    pub full_path: String,
    pub enabled: bool,
    pub children: HashMap<String, LoggerNode>,
    /// Events assigned to this node directly, descendants excluded.
    pub message_count: u64,
    events: Vec<EventKey>,
}

impl LoggerNode {
    fn new(name: &str, full_path: String, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            full_path,
            enabled,
            children: HashMap::new(),
            message_count: 0,
            events: Vec::new(),
        }
    }

    fn root() -> Self {
        Self::new("", String::new(), true)
    }

    pub fn is_root(&self) -> bool {
        self.full_path.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&LoggerNode> {
        self.children.get(name)
    }

    /// Children ordered by name.
    pub fn sorted_children(&self) -> Vec<&LoggerNode> {
        let mut children: Vec<_> = self.children.values().collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    /// Events in this node and all of its descendants.
    pub fn aggregate_count(&self) -> u64 {
        self.message_count
            + self
                .children
                .values()
                .map(LoggerNode::aggregate_count)
                .sum::<u64>()
    }

    fn child_or_create(&mut self, segment: &str) -> &mut LoggerNode {
        let enabled = self.enabled;
        let full_path = if self.full_path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.full_path, segment)
        };
        self.children
            .entry(segment.to_string())
            .or_insert_with(|| LoggerNode::new(segment, full_path, enabled))
    }

    fn set_enabled_recursive(&mut self, enabled: bool) {
        self.enabled = enabled;
        for child in self.children.values_mut() {
            child.set_enabled_recursive(enabled);
        }
    }

    fn collect_keys(&self, out: &mut Vec<EventKey>) {
        out.extend_from_slice(&self.events);
        for child in self.children.values() {
            child.collect_keys(out);
        }
    }

    fn snapshot(&self) -> LoggerSnapshot {
        LoggerSnapshot {
            name: self.name.clone(),
            full_path: self.full_path.clone(),
            enabled: self.enabled,
            message_count: self.message_count,
            aggregate_count: self.aggregate_count(),
            children: self
                .sorted_children()
                .into_iter()
                .map(LoggerNode::snapshot)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Owned, serialisable copy of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggerSnapshot {
    pub name: String,
    pub full_path: String,
    pub enabled: bool,
    pub message_count: u64,
    pub aggregate_count: u64,
    pub children: Vec<LoggerSnapshot>,
}

impl LoggerSnapshot {
    /// Depth-first walk yielding `(depth, node)`; the root is depth 0.
    pub fn walk(&self) -> Vec<(usize, &LoggerSnapshot)> {
        fn visit<'a>(node: &'a LoggerSnapshot, depth: usize, out: &mut Vec<(usize, &'a LoggerSnapshot)>) {
            out.push((depth, node));
            for child in &node.children {
                visit(child, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        visit(self, 0, &mut out);
        out
    }

    pub fn find(&self, path: &str) -> Option<&LoggerSnapshot> {
        let mut node = self;
        for segment in path_segments(path) {
            node = node.children.iter().find(|c| c.name == segment)?;
        }
        Some(node)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub root: LoggerSnapshot,
    pub total_events: usize,
    pub visible_events: usize,
    pub min_level: LogLevel,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LoggerRegistry {
    root: LoggerNode,
    events: BTreeMap<EventKey, LogEvent>,
    min_level: LogLevel,
    next_arrival: u64,
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self {
            root: LoggerNode::root(),
            events: BTreeMap::new(),
            min_level: LogLevel::Trace,
            next_arrival: 0,
        }
    }

    pub fn root(&self) -> &LoggerNode {
        &self.root
    }

    /// Look up a node by dotted path. The empty path is the root.
    pub fn node(&self, path: &str) -> Option<&LoggerNode> {
        let mut node = &self.root;
        for segment in path_segments(path) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &str) -> Option<&mut LoggerNode> {
        let mut node = &mut self.root;
        for segment in path_segments(path) {
            node = node.children.get_mut(segment)?;
        }
        Some(node)
    }

    /// Place one event in the tree. Returns whether it is currently visible.
    pub fn apply(&mut self, event: LogEvent) -> bool {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        let key = (event.sequence_nr.unwrap_or(arrival), arrival);

        let mut node = &mut self.root;
        for segment in path_segments(&event.logger_name) {
            node = node.child_or_create(segment);
        }
        node.message_count += 1;
        node.events.push(key);
        let visible = node.enabled && event.level >= self.min_level;

        self.events.insert(key, event);
        visible
    }

    /// Apply a batch in order and return the events that are visible.
    pub fn apply_batch(&mut self, events: Vec<LogEvent>) -> Vec<LogEvent> {
        let mut visible = Vec::new();
        for event in events {
            let copy = event.clone();
            if self.apply(event) {
                visible.push(copy);
            }
        }
        visible
    }

    /// Enable or disable a logger and everything below it. Stored events are
    /// kept either way. Returns `false` if the path does not exist.
    pub fn set_enabled(&mut self, path: &str, enabled: bool) -> bool {
        match self.node_mut(path) {
            Some(node) => {
                node.set_enabled_recursive(enabled);
                true
            }
            None => false,
        }
    }

    /// Remove a logger subtree together with its events. Removing the root
    /// clears everything. Returns the number of events dropped.
    pub fn remove_logger(&mut self, path: &str) -> Option<usize> {
        let segments = path_segments(path);
        let Some((leaf, parents)) = segments.split_last() else {
            return Some(self.clear_all());
        };

        let mut parent = &mut self.root;
        for segment in parents {
            parent = parent.children.get_mut(*segment)?;
        }
        let removed = parent.children.remove(*leaf)?;

        let mut keys = Vec::new();
        removed.collect_keys(&mut keys);
        for key in &keys {
            self.events.remove(key);
        }
        tracing::debug!(logger = %removed.full_path, events = keys.len(), "removed logger");
        Some(keys.len())
    }

    /// Drop every node and event. Returns the number of events dropped.
    pub fn clear_all(&mut self) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        self.root.children.clear();
        self.root.message_count = 0;
        self.root.events.clear();
        dropped
    }

    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Enabled state for `path`, following the inheritance rule for nodes
    /// that do not exist yet.
    fn path_enabled(&self, path: &str) -> bool {
        let mut node = &self.root;
        for segment in path_segments(path) {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => break,
            }
        }
        node.enabled
    }

    pub fn is_visible(&self, event: &LogEvent) -> bool {
        event.level >= self.min_level && self.path_enabled(&event.logger_name)
    }

    /// Visible events ordered by sequence number, ties by arrival.
    pub fn visible(&self) -> Vec<&LogEvent> {
        self.events.values().filter(|e| self.is_visible(e)).collect()
    }

    /// Case-insensitive substring search over the visible events.
    pub fn search(&self, text: &str) -> Vec<&LogEvent> {
        let needle = text.to_lowercase();
        self.events
            .values()
            .filter(|e| self.is_visible(e) && e.contains_text(&needle))
            .collect()
    }

    /// Total number of stored events, visible or not.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn aggregate_count(&self, path: &str) -> Option<u64> {
        self.node(path).map(LoggerNode::aggregate_count)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            root: self.root.snapshot(),
            total_events: self.events.len(),
            visible_events: self.events.values().filter(|e| self.is_visible(e)).count(),
            min_level: self.min_level,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
