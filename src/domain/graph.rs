//! Dependency graph for artifacts
//!
//! Edges point from an artifact to each artifact in its `blocked_by` list.
//! Uses petgraph for storage, reachability and topological ordering.
//!
//! The validators in this module never fail: each returns every issue it
//! finds so callers can report all inconsistencies in one pass.

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

use super::artifact::ArtifactSet;
use super::id::{ArtifactId, ArtifactType};

/// Which relationship list an issue refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Blocks,
    BlockedBy,
}

impl Relation {
    pub fn field(&self) -> &'static str {
        match self {
            Relation::Blocks => "blocks",
            Relation::BlockedBy => "blocked_by",
        }
    }

    pub fn inverse(&self) -> Relation {
        match self {
            Relation::Blocks => Relation::BlockedBy,
            Relation::BlockedBy => Relation::Blocks,
        }
    }
}

/// A problem found in the relationships of an artifact collection
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyIssue {
    /// Ordered path that returns to its first element
    CircularDependency { cycle: Vec<ArtifactId> },

    CrossLevelDependency {
        source: ArtifactId,
        source_type: ArtifactType,
        target: ArtifactId,
        target_type: ArtifactType,
    },

    /// Same level, but a different initiative or milestone
    CrossScopeDependency {
        source: ArtifactId,
        target: ArtifactId,
    },

    UnknownArtifact {
        source: ArtifactId,
        target: String,
        relation: Relation,
    },

    /// `source` lists `target` under `relation`, but not the other way round
    InconsistentPair {
        source: ArtifactId,
        target: ArtifactId,
        relation: Relation,
    },
}

impl DependencyIssue {
    pub fn code(&self) -> &'static str {
        match self {
            DependencyIssue::CircularDependency { .. } => "CIRCULAR_DEPENDENCY",
            DependencyIssue::CrossLevelDependency { .. } => "CROSS_LEVEL_DEPENDENCY",
            DependencyIssue::CrossScopeDependency { .. } => "CROSS_SCOPE_DEPENDENCY",
            DependencyIssue::UnknownArtifact { .. } => "RELATIONSHIP_UNKNOWN_ARTIFACT",
            DependencyIssue::InconsistentPair { .. } => "RELATIONSHIP_INCONSISTENT_PAIR",
        }
    }

    /// Location of the offending field, as `<ID>:<field path>`
    pub fn path(&self) -> Option<String> {
        let (id, relation) = match self {
            DependencyIssue::CircularDependency { cycle } => (cycle.first()?, Relation::BlockedBy),
            DependencyIssue::CrossLevelDependency { source, .. }
            | DependencyIssue::CrossScopeDependency { source, .. } => (source, Relation::BlockedBy),
            DependencyIssue::UnknownArtifact {
                source, relation, ..
            }
            | DependencyIssue::InconsistentPair {
                source, relation, ..
            } => (source, *relation),
        };
        Some(format!("{}:metadata.relationships.{}", id, relation.field()))
    }

    /// Serializable `{code, message, path}` form
    pub fn report(&self) -> IssueReport {
        IssueReport {
            code: self.code(),
            message: self.to_string(),
            path: self.path(),
        }
    }
}

impl fmt::Display for DependencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyIssue::CircularDependency { cycle } => {
                let path: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
                write!(f, "Circular dependency detected: {}", path.join(" -> "))
            }
            DependencyIssue::CrossLevelDependency {
                source,
                source_type,
                target,
                target_type,
            } => write!(
                f,
                "Cross-level dependency: {} {} is blocked by {} {}; dependencies must stay within one level",
                source_type, source, target_type, target
            ),
            DependencyIssue::CrossScopeDependency { source, target } => {
                let scope = match source.artifact_type() {
                    ArtifactType::Issue => "milestone",
                    _ => "initiative",
                };
                write!(
                    f,
                    "Dependency crosses scope: {} is blocked by {}, which belongs to a different {}",
                    source, target, scope
                )
            }
            DependencyIssue::UnknownArtifact {
                source,
                target,
                relation,
            } => write!(
                f,
                "{} lists unknown artifact '{}' in {}",
                source,
                target,
                relation.field()
            ),
            DependencyIssue::InconsistentPair {
                source,
                target,
                relation,
            } => write!(
                f,
                "{} lists {} in {}, but {} does not list {} in {}",
                source,
                target,
                relation.field(),
                target,
                source,
                relation.inverse().field()
            ),
        }
    }
}

/// Flat issue record for CLI and JSON output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueReport {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Directed `blocked_by` graph over an artifact snapshot
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph
    graph: DiGraph<ArtifactId, ()>,

    /// Map from ArtifactId to node index
    node_map: HashMap<ArtifactId, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Builds a graph from an artifact snapshot
    ///
    /// `blocked_by` references that do not resolve to an artifact in the set
    /// are left out of the graph.
    pub fn from_artifacts(set: &ArtifactSet) -> Self {
        let mut graph = Self::new();

        // First pass: add all nodes
        for id in set.ids() {
            graph.add_artifact(id.clone());
        }

        // Second pass: add all edges
        for artifact in set.iter() {
            for blocker in artifact.blocked_by_ids() {
                graph.add_edge(&artifact.id, &blocker);
            }
        }

        graph
    }

    /// Adds an artifact node
    pub fn add_artifact(&mut self, id: ArtifactId) {
        if !self.node_map.contains_key(&id) {
            let idx = self.graph.add_node(id.clone());
            self.node_map.insert(id, idx);
        }
    }

    /// Adds an edge `artifact -> blocker`; returns false if either is unknown
    pub fn add_edge(&mut self, artifact: &ArtifactId, blocker: &ArtifactId) -> bool {
        match (self.node_map.get(artifact), self.node_map.get(blocker)) {
            (Some(&from), Some(&to)) => {
                self.graph.update_edge(from, to, ());
                true
            }
            _ => false,
        }
    }

    /// Direct blockers of an artifact
    pub fn dependencies(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Artifacts that list `id` in their `blocked_by`
    pub fn dependents(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &ArtifactId, direction: Direction) -> Vec<ArtifactId> {
        let Some(&idx) = self.node_map.get(id) else {
            return vec![];
        };
        let mut ids: Vec<ArtifactId> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        ids
    }

    /// Neighbors in ID order, so traversal does not depend on insertion order
    fn sorted_successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
        next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        next
    }

    /// Returns true if making `artifact` wait on `blocker` would close a cycle
    pub fn would_create_cycle(&self, artifact: &ArtifactId, blocker: &ArtifactId) -> bool {
        if artifact == blocker {
            return true;
        }
        match (self.node_map.get(artifact), self.node_map.get(blocker)) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.graph, to, from, None),
            _ => false,
        }
    }

    /// Every cycle reachable by depth-first search, as closed ID paths
    ///
    /// Roots are visited in ID order and a node is explored at most once, so
    /// each disjoint cycle is reported exactly once.
    pub fn cycles(&self) -> Vec<Vec<ArtifactId>> {
        let count = self.graph.node_count();
        let mut visited = vec![false; count];
        let mut in_stack = vec![false; count];
        let mut cycles = Vec::new();

        let mut roots: Vec<NodeIndex> = self.graph.node_indices().collect();
        roots.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for root in roots {
            if visited[root.index()] {
                continue;
            }

            visited[root.index()] = true;
            in_stack[root.index()] = true;
            let mut frames: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
                vec![(root, self.sorted_successors(root), 0)];

            while let Some((node, successors, pos)) = frames.last_mut() {
                let Some(&next) = successors.get(*pos) else {
                    let node = *node;
                    frames.pop();
                    in_stack[node.index()] = false;
                    continue;
                };
                *pos += 1;

                if in_stack[next.index()] {
                    if let Some(start) = frames.iter().position(|(n, _, _)| *n == next) {
                        let mut cycle: Vec<ArtifactId> = frames[start..]
                            .iter()
                            .map(|(n, _, _)| self.graph[*n].clone())
                            .collect();
                        cycle.push(self.graph[next].clone());
                        cycles.push(cycle);
                    }
                } else if !visited[next.index()] {
                    visited[next.index()] = true;
                    in_stack[next.index()] = true;
                    frames.push((next, self.sorted_successors(next), 0));
                }
            }
        }

        cycles
    }

    /// All artifacts with blockers before the artifacts they block
    ///
    /// Returns None if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<ArtifactId>> {
        let order = toposort(&self.graph, None).ok()?;
        Some(
            order
                .into_iter()
                .rev()
                .map(|idx| self.graph[idx].clone())
                .collect(),
        )
    }

    /// Returns true if the graph contains the artifact
    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.node_map.contains_key(id)
    }

    /// Returns the number of artifacts in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}

/// One `CIRCULAR_DEPENDENCY` issue per detected cycle
pub fn find_circular_dependencies(set: &ArtifactSet) -> Vec<DependencyIssue> {
    let issues: Vec<_> = DependencyGraph::from_artifacts(set)
        .cycles()
        .into_iter()
        .map(|cycle| DependencyIssue::CircularDependency { cycle })
        .collect();
    debug!(count = issues.len(), "Cycle detection finished");
    issues
}

/// `blocked_by` edges between different hierarchy levels
///
/// References that do not parse or are not in the set are skipped.
pub fn find_cross_level_dependencies(set: &ArtifactSet) -> Vec<DependencyIssue> {
    let mut issues = Vec::new();
    for artifact in set.sorted() {
        for target in artifact.blocked_by_ids() {
            if !set.contains(&target) {
                continue;
            }
            let (source_type, target_type) = (artifact.artifact_type(), target.artifact_type());
            if source_type != target_type {
                issues.push(DependencyIssue::CrossLevelDependency {
                    source: artifact.id.clone(),
                    source_type,
                    target,
                    target_type,
                });
            }
        }
    }
    debug!(count = issues.len(), "Cross-level check finished");
    issues
}

/// Same-level `blocked_by` edges that leave the source's initiative or milestone
pub fn find_cross_scope_dependencies(set: &ArtifactSet) -> Vec<DependencyIssue> {
    let mut issues = Vec::new();
    for artifact in set.sorted() {
        if artifact.artifact_type() == ArtifactType::Initiative {
            continue;
        }
        for target in artifact.blocked_by_ids() {
            if !set.contains(&target) || target.artifact_type() != artifact.artifact_type() {
                continue;
            }
            if target.parent() != artifact.id.parent() {
                issues.push(DependencyIssue::CrossScopeDependency {
                    source: artifact.id.clone(),
                    target,
                });
            }
        }
    }
    issues
}

/// Checks that every `blocks` edge is mirrored by `blocked_by` and vice versa
///
/// An asymmetric pair is reported once, however many sides disagree.
pub fn find_relationship_inconsistencies(set: &ArtifactSet) -> Vec<DependencyIssue> {
    let mut issues = Vec::new();
    let mut reported: HashSet<(ArtifactId, ArtifactId)> = HashSet::new();

    for artifact in set.sorted() {
        let rel = artifact.relationships();
        let lists = [
            (Relation::Blocks, &rel.blocks),
            (Relation::BlockedBy, &rel.blocked_by),
        ];

        for (relation, refs) in lists {
            for reference in refs {
                let Some(target) = set.get_ref(reference) else {
                    issues.push(DependencyIssue::UnknownArtifact {
                        source: artifact.id.clone(),
                        target: reference.clone(),
                        relation,
                    });
                    continue;
                };

                let mirrored = match relation {
                    Relation::Blocks => target.blocked_by_ids().any(|id| id == artifact.id),
                    Relation::BlockedBy => target.blocks_ids().any(|id| id == artifact.id),
                };
                if mirrored {
                    continue;
                }

                let pair = if artifact.id <= target.id {
                    (artifact.id.clone(), target.id.clone())
                } else {
                    (target.id.clone(), artifact.id.clone())
                };
                if reported.insert(pair) {
                    issues.push(DependencyIssue::InconsistentPair {
                        source: artifact.id.clone(),
                        target: target.id.clone(),
                        relation,
                    });
                }
            }
        }
    }

    debug!(count = issues.len(), "Relationship consistency check finished");
    issues
}

/// Runs every dependency check and concatenates the results
pub fn validate_dependencies(set: &ArtifactSet) -> Vec<DependencyIssue> {
    let mut issues = find_circular_dependencies(set);
    issues.extend(find_cross_level_dependencies(set));
    issues.extend(find_cross_scope_dependencies(set));
    issues.extend(find_relationship_inconsistencies(set));
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::Artifact;
    use chrono::{TimeZone, Utc};

    fn artifact(id: &str, blocked_by: &[&str], blocks: &[&str]) -> Artifact {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut artifact = Artifact::new(id.parse().unwrap(), id, "tester", ts);
        artifact.metadata.relationships.blocked_by = blocked_by.iter().map(|s| s.to_string()).collect();
        artifact.metadata.relationships.blocks = blocks.iter().map(|s| s.to_string()).collect();
        artifact
    }

    fn ids(list: &[&str]) -> Vec<ArtifactId> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn three_node_cycle() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.1", &["A.2"], &["A.3"]),
            artifact("A.2", &["A.3"], &["A.1"]),
            artifact("A.3", &["A.1"], &["A.2"]),
        ]);

        let issues = find_circular_dependencies(&set);
        assert_eq!(
            issues,
            vec![DependencyIssue::CircularDependency {
                cycle: ids(&["A.1", "A.2", "A.3", "A.1"])
            }]
        );
        assert_eq!(issues[0].code(), "CIRCULAR_DEPENDENCY");
    }

    #[test]
    fn self_loop() {
        let set = ArtifactSet::from_artifacts([artifact("A.1", &["A.1"], &["A.1"])]);
        let issues = find_circular_dependencies(&set);
        assert_eq!(
            issues,
            vec![DependencyIssue::CircularDependency {
                cycle: ids(&["A.1", "A.1"])
            }]
        );
    }

    #[test]
    fn disjoint_cycles_reported_once_each() {
        // Insertion order deliberately scrambled
        let set = ArtifactSet::from_artifacts([
            artifact("B.2", &["B.1"], &[]),
            artifact("A.2", &["A.1"], &[]),
            artifact("B.1", &["B.2"], &[]),
            artifact("A.1", &["A.2"], &[]),
        ]);

        let issues = find_circular_dependencies(&set);
        assert_eq!(issues.len(), 2);
        assert!(issues.contains(&DependencyIssue::CircularDependency {
            cycle: ids(&["A.1", "A.2", "A.1"])
        }));
        assert!(issues.contains(&DependencyIssue::CircularDependency {
            cycle: ids(&["B.1", "B.2", "B.1"])
        }));
    }

    #[test]
    fn unknown_dependencies_do_not_form_cycles() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.1", &["A.9", "not-an-id"], &[]),
            artifact("A.2", &["A.1"], &[]),
        ]);
        assert!(find_circular_dependencies(&set).is_empty());
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut artifacts = vec![artifact("A.1.1", &[], &[])];
        for i in 2..=10_000 {
            let prev = format!("A.1.{}", i - 1);
            artifacts.push(artifact(&format!("A.1.{}", i), &[prev.as_str()], &[]));
        }
        let set = ArtifactSet::from_artifacts(artifacts);
        assert!(find_circular_dependencies(&set).is_empty());
    }

    #[test]
    fn cross_level_dependency() {
        let set = ArtifactSet::from_artifacts([
            artifact("A", &["B.1"], &[]),
            artifact("B", &[], &[]),
            artifact("B.1", &[], &["A"]),
        ]);

        let issues = find_cross_level_dependencies(&set);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "CROSS_LEVEL_DEPENDENCY");
        assert!(issues[0].to_string().contains("initiative A"));
        assert!(issues[0].to_string().contains("milestone B.1"));
        assert_eq!(
            issues[0].report().path.as_deref(),
            Some("A:metadata.relationships.blocked_by")
        );
    }

    #[test]
    fn cross_level_skips_unknown_and_unparseable() {
        let set = ArtifactSet::from_artifacts([artifact("A", &["Z.1", "??"], &[])]);
        assert!(find_cross_level_dependencies(&set).is_empty());
    }

    #[test]
    fn cross_scope_dependency() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.1.1", &["A.2.1"], &[]),
            artifact("A.2.1", &[], &["A.1.1"]),
            artifact("A.1.2", &["A.1.1"], &[]),
        ]);

        let issues = find_cross_scope_dependencies(&set);
        assert_eq!(
            issues,
            vec![DependencyIssue::CrossScopeDependency {
                source: "A.1.1".parse().unwrap(),
                target: "A.2.1".parse().unwrap(),
            }]
        );
    }

    #[test]
    fn inconsistent_pair_reported_once() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.1", &[], &["A.2"]),
            artifact("A.2", &[], &[]),
        ]);

        let issues = find_relationship_inconsistencies(&set);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "RELATIONSHIP_INCONSISTENT_PAIR");
        assert_eq!(
            issues[0].path().as_deref(),
            Some("A.1:metadata.relationships.blocks")
        );
    }

    #[test]
    fn mutual_asymmetry_is_one_pair() {
        // A.1 blocks A.2 and A.2 blocks A.1, neither mirrored
        let set = ArtifactSet::from_artifacts([
            artifact("A.1", &[], &["A.2"]),
            artifact("A.2", &[], &["A.1"]),
        ]);
        assert_eq!(find_relationship_inconsistencies(&set).len(), 1);
    }

    #[test]
    fn unknown_relationship_target() {
        let set = ArtifactSet::from_artifacts([artifact("A.1", &["A.7"], &[])]);
        let issues = find_relationship_inconsistencies(&set);
        assert_eq!(
            issues,
            vec![DependencyIssue::UnknownArtifact {
                source: "A.1".parse().unwrap(),
                target: "A.7".to_string(),
                relation: Relation::BlockedBy,
            }]
        );
        assert_eq!(issues[0].code(), "RELATIONSHIP_UNKNOWN_ARTIFACT");
    }

    #[test]
    fn consistent_collection_is_clean() {
        let set = ArtifactSet::from_artifacts([
            artifact("A", &[], &[]),
            artifact("A.1", &[], &["A.2"]),
            artifact("A.2", &["A.1"], &[]),
        ]);
        assert!(validate_dependencies(&set).is_empty());
    }

    #[test]
    fn validators_do_not_mutate_input() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.1", &["A.2"], &[]),
            artifact("A.2", &["A.1"], &[]),
        ]);
        let before: Vec<Artifact> = set.iter().cloned().collect();
        let _ = validate_dependencies(&set);
        let after: Vec<Artifact> = set.iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn dependents_and_dependencies() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.1", &[], &["A.2", "A.3"]),
            artifact("A.2", &["A.1"], &[]),
            artifact("A.3", &["A.1"], &[]),
        ]);
        let graph = DependencyGraph::from_artifacts(&set);

        assert_eq!(graph.dependents(&"A.1".parse().unwrap()), ids(&["A.2", "A.3"]));
        assert_eq!(graph.dependencies(&"A.3".parse().unwrap()), ids(&["A.1"]));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn topological_order_puts_blockers_first() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.3", &["A.2"], &[]),
            artifact("A.2", &["A.1"], &[]),
            artifact("A.1", &[], &[]),
        ]);
        let order = DependencyGraph::from_artifacts(&set).topological_order().unwrap();
        let pos = |s: &str| order.iter().position(|id| id.to_string() == s).unwrap();
        assert!(pos("A.1") < pos("A.2"));
        assert!(pos("A.2") < pos("A.3"));
    }

    #[test]
    fn topological_order_none_when_cyclic() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.1", &["A.2"], &[]),
            artifact("A.2", &["A.1"], &[]),
        ]);
        assert!(DependencyGraph::from_artifacts(&set).topological_order().is_none());
    }

    #[test]
    fn would_create_cycle_detects_back_edge() {
        let set = ArtifactSet::from_artifacts([
            artifact("A.1", &[], &[]),
            artifact("A.2", &["A.1"], &[]),
        ]);
        let graph = DependencyGraph::from_artifacts(&set);
        let (a1, a2): (ArtifactId, ArtifactId) = ("A.1".parse().unwrap(), "A.2".parse().unwrap());

        assert!(graph.would_create_cycle(&a1, &a2));
        assert!(graph.would_create_cycle(&a1, &a1));
        assert!(!graph.would_create_cycle(&a2, &a1));
    }
}
