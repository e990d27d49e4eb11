//! Cascade engine
//!
//! Two kinds of automatic state propagation:
//!
//! - **Upward**: a parent in `ready` moves to `in_progress` once any child has
//!   started, and a parent in `in_progress` moves to `in_review` once every
//!   child is `completed`.
//! - **Lateral**: when a dependency completes, the matching entry of the
//!   blocked artifact's `blocked` event metadata is marked resolved, and once
//!   every entry is resolved the artifact receives a `ready` event.
//!
//! Nothing here mutates its input; every operation returns new values.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::artifact::{Artifact, ArtifactSet};
use super::event::{format_timestamp, ArtifactState, BlockingDependency, Event, EventMeta, Trigger, TriggerKind};
use super::graph::DependencyGraph;
use super::id::ArtifactId;
use super::lifecycle::{append_event, LifecycleError};

/// Actor recorded on synthesized cascade events
pub const CASCADE_ACTOR: &str = "System Cascade (cascade@completion)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeKind {
    ChildrenStarted,
    ChildrenCompleted,
}

impl CascadeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeKind::ChildrenStarted => "children_started",
            CascadeKind::ChildrenCompleted => "children_completed",
        }
    }

    pub fn target_state(&self) -> ArtifactState {
        match self {
            CascadeKind::ChildrenStarted => ArtifactState::InProgress,
            CascadeKind::ChildrenCompleted => ArtifactState::InReview,
        }
    }

    fn trigger(&self) -> Trigger {
        match self {
            CascadeKind::ChildrenStarted => TriggerKind::ChildrenStarted.into(),
            CascadeKind::ChildrenCompleted => TriggerKind::ChildrenCompleted.into(),
        }
    }

    fn qualifies(&self, child: &Artifact) -> bool {
        match self {
            CascadeKind::ChildrenStarted => child.state().is_started(),
            CascadeKind::ChildrenCompleted => child.state() == ArtifactState::Completed,
        }
    }
}

/// Whether a parent should move, given its children
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeDecision {
    Cascade {
        new_state: ArtifactState,
        kind: CascadeKind,
        reason: String,
    },
    NoCascade {
        reason: String,
    },
}

impl CascadeDecision {
    pub fn should_cascade(&self) -> bool {
        matches!(self, CascadeDecision::Cascade { .. })
    }

    pub fn new_state(&self) -> Option<ArtifactState> {
        match self {
            CascadeDecision::Cascade { new_state, .. } => Some(*new_state),
            CascadeDecision::NoCascade { .. } => None,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            CascadeDecision::Cascade { reason, .. } | CascadeDecision::NoCascade { reason } => reason,
        }
    }

    fn none(reason: impl Into<String>) -> Self {
        CascadeDecision::NoCascade {
            reason: reason.into(),
        }
    }
}

/// Decides whether a parent in `parent_state` should follow its children
///
/// A parent without children never cascades.
pub fn analyze_parent_cascade(parent_state: ArtifactState, children: &[&Artifact]) -> CascadeDecision {
    if children.is_empty() {
        return CascadeDecision::none("No children to cascade from");
    }

    let total = children.len();
    match parent_state {
        ArtifactState::Ready => {
            let started = children
                .iter()
                .filter(|c| CascadeKind::ChildrenStarted.qualifies(c))
                .count();
            if started > 0 {
                CascadeDecision::Cascade {
                    new_state: ArtifactState::InProgress,
                    kind: CascadeKind::ChildrenStarted,
                    reason: format!("{} of {} children started", started, total),
                }
            } else {
                CascadeDecision::none("No child has started")
            }
        }
        ArtifactState::InProgress => {
            let completed = children
                .iter()
                .filter(|c| CascadeKind::ChildrenCompleted.qualifies(c))
                .count();
            if completed == total {
                CascadeDecision::Cascade {
                    new_state: ArtifactState::InReview,
                    kind: CascadeKind::ChildrenCompleted,
                    reason: format!("All {} children completed", total),
                }
            } else {
                CascadeDecision::none(format!("{} of {} children completed", completed, total))
            }
        }
        other => CascadeDecision::none(format!("Parent in '{}' does not cascade", other)),
    }
}

/// The qualifying child whose latest event is most recent
fn triggering_child<'a>(kind: CascadeKind, children: &[&'a Artifact]) -> Option<&'a Artifact> {
    children
        .iter()
        .copied()
        .filter(|c| kind.qualifies(c))
        .max_by_key(|c| c.last_event().and_then(|e| e.parsed_timestamp()))
}

/// Builds the event a cascade appends to the parent
///
/// Metadata records the cascade type and the child event that caused it.
pub fn cascade_event(
    kind: CascadeKind,
    trigger_child: Option<&Artifact>,
    actor: &str,
    now: DateTime<Utc>,
) -> Event {
    let mut metadata = EventMeta::new();
    metadata.set("cascade_type", kind.as_str());

    if let Some(child) = trigger_child {
        metadata.set("trigger_artifact", child.id.to_string());
        if let Some(event) = child.last_event() {
            metadata.set("trigger_event", event.event.as_str());
            metadata.set("trigger_actor", event.actor.clone());
            metadata.set("trigger_timestamp", event.timestamp.clone());
        }
    }

    Event::at(kind.target_state(), now, actor, kind.trigger()).with_metadata(metadata)
}

/// How a dependency completion affected a blocked artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// No `blocked` event lists the dependency
    NotTracked,
    /// Metadata updated; other dependencies remain
    Partial { remaining: Vec<ArtifactId> },
    /// Every dependency resolved; `unblocked` says whether a `ready` event was appended
    AllResolved { unblocked: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencyResolution {
    pub artifact: Artifact,
    pub outcome: ResolutionOutcome,
}

/// Latest `blocked` event that carries a dependency list, with its index
fn latest_blocking_list(artifact: &Artifact) -> Option<(usize, Vec<BlockingDependency>)> {
    artifact
        .events()
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, e)| e.event == ArtifactState::Blocked)
        .find_map(|(i, e)| e.blocking_dependencies().map(|deps| (i, deps)))
}

/// Copy of `artifact` with the event at `index` carrying `deps`
fn with_blocking_list(artifact: &Artifact, index: usize, deps: &[BlockingDependency]) -> Artifact {
    let mut next = artifact.clone();
    next.metadata.events[index] = artifact.events()[index].with_blocking_dependencies(deps);
    next
}

/// Appends `ready` to a `blocked` artifact once nothing in `deps` is open
fn settle(
    next: Artifact,
    deps: &[BlockingDependency],
    metadata: EventMeta,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<DependencyResolution, LifecycleError> {
    let remaining: Vec<ArtifactId> = deps
        .iter()
        .filter(|d| !d.resolved)
        .map(|d| d.artifact_id.clone())
        .collect();

    if !remaining.is_empty() {
        return Ok(DependencyResolution {
            artifact: next,
            outcome: ResolutionOutcome::Partial { remaining },
        });
    }

    if next.state() != ArtifactState::Blocked {
        return Ok(DependencyResolution {
            artifact: next,
            outcome: ResolutionOutcome::AllResolved { unblocked: false },
        });
    }

    let ready = Event::at(ArtifactState::Ready, now, actor, TriggerKind::DependencyCompleted)
        .with_metadata(metadata);
    let next = append_event(&next, ready)?;
    info!(artifact = %next.id, "All dependencies resolved, artifact ready");
    Ok(DependencyResolution {
        artifact: next,
        outcome: ResolutionOutcome::AllResolved { unblocked: true },
    })
}

/// Marks `dependency` resolved in the artifact's latest `blocked` event
///
/// Returns a modified copy. When this resolves the last open dependency of a
/// `blocked` artifact, a `ready` event with trigger `dependency_completed` is
/// appended.
pub fn resolve_dependency_completion(
    artifact: &Artifact,
    dependency: &ArtifactId,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<DependencyResolution, LifecycleError> {
    let not_tracked = || DependencyResolution {
        artifact: artifact.clone(),
        outcome: ResolutionOutcome::NotTracked,
    };

    let Some((index, mut deps)) = latest_blocking_list(artifact) else {
        return Ok(not_tracked());
    };
    let Some(entry) = deps.iter_mut().find(|d| &d.artifact_id == dependency) else {
        return Ok(not_tracked());
    };
    if !entry.resolved {
        entry.resolved = true;
        entry.resolved_at = Some(format_timestamp(now));
    }

    debug!(artifact = %artifact.id, %dependency, "Dependency resolved");
    let next = with_blocking_list(artifact, index, &deps);
    let mut metadata = EventMeta::new();
    metadata.set("resolved_dependency", dependency.to_string());
    settle(next, &deps, metadata, actor, now)
}

/// Adds `dependency` to the dependency list of a `blocked` artifact
///
/// The entry starts resolved when the dependency is already `completed` in
/// `set`. Returns None when the artifact is not blocked on a tracked list or
/// already lists the dependency.
pub fn track_added_dependency(
    artifact: &Artifact,
    dependency: &ArtifactId,
    set: &ArtifactSet,
) -> Option<Artifact> {
    if artifact.state() != ArtifactState::Blocked {
        return None;
    }
    let (index, mut deps) = latest_blocking_list(artifact)?;
    if deps.iter().any(|d| &d.artifact_id == dependency) {
        return None;
    }

    let completed = set
        .get(dependency)
        .filter(|a| a.state() == ArtifactState::Completed);
    deps.push(BlockingDependency {
        artifact_id: dependency.clone(),
        resolved: completed.is_some(),
        resolved_at: completed
            .and_then(|a| a.last_event())
            .map(|e| e.timestamp.clone()),
    });

    debug!(artifact = %artifact.id, %dependency, "Dependency added to blocked list");
    Some(with_blocking_list(artifact, index, &deps))
}

/// Drops `dependency` from the artifact's latest `blocked` event
///
/// When it was the last open entry of a `blocked` artifact, a `ready` event
/// with trigger `dependency_completed` is appended.
pub fn resolve_dependency_removal(
    artifact: &Artifact,
    dependency: &ArtifactId,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<DependencyResolution, LifecycleError> {
    let Some((index, mut deps)) = latest_blocking_list(artifact) else {
        return Ok(DependencyResolution {
            artifact: artifact.clone(),
            outcome: ResolutionOutcome::NotTracked,
        });
    };
    let before = deps.len();
    deps.retain(|d| &d.artifact_id != dependency);
    if deps.len() == before {
        return Ok(DependencyResolution {
            artifact: artifact.clone(),
            outcome: ResolutionOutcome::NotTracked,
        });
    }

    debug!(artifact = %artifact.id, %dependency, "Dependency removed from blocked list");
    let next = with_blocking_list(artifact, index, &deps);
    let mut metadata = EventMeta::new();
    metadata.set("removed_dependency", dependency.to_string());
    settle(next, &deps, metadata, actor, now)
}

/// Moves a `draft` artifact with open dependencies to `blocked`
///
/// The `blocked` event lists every parseable `blocked_by` entry, with entries
/// whose artifact is already completed marked resolved. Returns None if the
/// artifact is not a draft or nothing blocks it.
pub fn block_on_dependencies(
    artifact: &Artifact,
    set: &ArtifactSet,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Option<Artifact>, LifecycleError> {
    if artifact.state() != ArtifactState::Draft {
        return Ok(None);
    }

    let deps: Vec<BlockingDependency> = artifact
        .blocked_by_ids()
        .map(|id| {
            let completed = set
                .get(&id)
                .filter(|a| a.state() == ArtifactState::Completed);
            BlockingDependency {
                resolved: completed.is_some(),
                resolved_at: completed
                    .and_then(|a| a.last_event())
                    .map(|e| e.timestamp.clone()),
                artifact_id: id,
            }
        })
        .collect();

    if deps.iter().all(|d| d.resolved) {
        return Ok(None);
    }

    let blocked = Event::at(ArtifactState::Blocked, now, actor, TriggerKind::HasDependencies)
        .with_blocking_dependencies(&deps);
    let next = append_event(artifact, blocked)?;
    info!(artifact = %artifact.id, dependencies = deps.len(), "Artifact blocked on dependencies");
    Ok(Some(next))
}

/// A state or metadata change applied by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChange {
    pub id: ArtifactId,
    /// New state, or None for metadata-only changes
    pub new_state: Option<ArtifactState>,
    pub description: String,
}

/// New snapshot plus the list of changes that produced it
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub artifacts: ArtifactSet,
    pub changes: Vec<AppliedChange>,
}

impl CascadeOutcome {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// IDs of changed artifacts, in the order they changed
    pub fn changed_ids(&self) -> Vec<&ArtifactId> {
        let mut ids: Vec<&ArtifactId> = Vec::new();
        for change in &self.changes {
            if !ids.contains(&&change.id) {
                ids.push(&change.id);
            }
        }
        ids
    }
}

/// Applies cascades across an artifact snapshot
#[derive(Debug, Clone)]
pub struct CascadeEngine {
    actor: String,
}

impl Default for CascadeEngine {
    fn default() -> Self {
        Self::new(CASCADE_ACTOR)
    }
}

impl CascadeEngine {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Walks up from `child`, cascading each parent until one does not move
    pub fn propagate(
        &self,
        set: &ArtifactSet,
        child: &ArtifactId,
        now: DateTime<Utc>,
    ) -> Result<CascadeOutcome, LifecycleError> {
        let mut current = set.clone();
        let mut changes = Vec::new();
        let mut cursor = child.clone();

        while let Some(parent_id) = cursor.parent() {
            let Some(parent) = current.get(&parent_id) else {
                debug!(parent = %parent_id, "Parent not in snapshot, stopping cascade");
                break;
            };

            let children = current.children(&parent_id);
            let decision = analyze_parent_cascade(parent.state(), &children);
            let (kind, reason) = match decision {
                CascadeDecision::Cascade { kind, reason, .. } => (kind, reason),
                CascadeDecision::NoCascade { reason } => {
                    debug!(parent = %parent_id, %reason, "No cascade");
                    break;
                }
            };

            let event = cascade_event(kind, triggering_child(kind, &children), &self.actor, now);
            let updated = append_event(parent, event)?;
            info!(parent = %parent_id, to = %kind.target_state(), %reason, "Cascade applied");

            changes.push(AppliedChange {
                id: parent_id.clone(),
                new_state: Some(kind.target_state()),
                description: reason,
            });
            current = current.with_artifact(updated);
            cursor = parent_id;
        }

        Ok(CascadeOutcome {
            artifacts: current,
            changes,
        })
    }

    /// Resolves `dependency` in every artifact that lists it in `blocked_by`
    ///
    /// Does nothing unless the dependency is `completed`.
    pub fn complete_dependency(
        &self,
        set: &ArtifactSet,
        dependency: &ArtifactId,
        now: DateTime<Utc>,
    ) -> Result<CascadeOutcome, LifecycleError> {
        let mut current = set.clone();
        let mut changes = Vec::new();

        let completed = set
            .get(dependency)
            .is_some_and(|a| a.state() == ArtifactState::Completed);
        if !completed {
            debug!(%dependency, "Dependency not completed, nothing to resolve");
            return Ok(CascadeOutcome {
                artifacts: current,
                changes,
            });
        }

        let graph = DependencyGraph::from_artifacts(set);
        for dependent in graph.dependents(dependency) {
            let Some(artifact) = current.get(&dependent) else {
                continue;
            };
            let resolution = resolve_dependency_completion(artifact, dependency, &self.actor, now)?;

            let (new_state, description) = match &resolution.outcome {
                ResolutionOutcome::NotTracked => continue,
                ResolutionOutcome::Partial { remaining } => (
                    None,
                    format!("{} resolved, {} dependencies remaining", dependency, remaining.len()),
                ),
                ResolutionOutcome::AllResolved { unblocked: true } => (
                    Some(ArtifactState::Ready),
                    format!("{} resolved, all dependencies met", dependency),
                ),
                ResolutionOutcome::AllResolved { unblocked: false } => {
                    (None, format!("{} resolved, all dependencies met", dependency))
                }
            };

            changes.push(AppliedChange {
                id: dependent.clone(),
                new_state,
                description,
            });
            current = current.with_artifact(resolution.artifact);
        }

        Ok(CascadeOutcome {
            artifacts: current,
            changes,
        })
    }
}
