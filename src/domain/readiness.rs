//! Readiness queries
//!
//! An artifact is ready when every `blocked_by` entry is completed and, once
//! it has been `ready` at least once, every ancestor still accepts child work
//! (`ready` or `in_progress`). A never-ready artifact is judged on its own
//! dependencies only.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::artifact::{Artifact, ArtifactSet};
use super::event::ArtifactState;
use super::id::ArtifactId;
use super::lifecycle::can_transition;

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Artifact not found: {0}")]
    NotFound(ArtifactId),
}

/// Why an artifact is not actionable
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockingReason {
    /// Blockers that are not completed, verbatim (unknown references included)
    IncompleteDependencies { dependencies: Vec<String> },
    IncompleteParent {
        ancestor: ArtifactId,
        state: ArtifactState,
    },
    InvalidState { state: ArtifactState },
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingReason::IncompleteDependencies { dependencies } => {
                write!(f, "Waiting on {}", dependencies.join(", "))
            }
            BlockingReason::IncompleteParent { ancestor, state } => {
                write!(f, "Ancestor {} is {}", ancestor, state)
            }
            BlockingReason::InvalidState { state } => {
                write!(f, "Artifact is already {}", state)
            }
        }
    }
}

/// Readiness over one artifact snapshot
#[derive(Debug, Clone, Copy)]
pub struct ReadinessResolver<'a> {
    set: &'a ArtifactSet,
}

impl<'a> ReadinessResolver<'a> {
    pub fn new(set: &'a ArtifactSet) -> Self {
        Self { set }
    }

    fn lookup(&self, id: &ArtifactId) -> Result<&'a Artifact, ReadinessError> {
        self.set
            .get(id)
            .ok_or_else(|| ReadinessError::NotFound(id.clone()))
    }

    /// `blocked_by` entries that are unknown or not yet completed
    fn unresolved_dependencies(&self, artifact: &Artifact) -> Vec<String> {
        artifact
            .relationships()
            .blocked_by
            .iter()
            .filter(|r| {
                self.set
                    .get_ref(r)
                    .is_none_or(|dep| dep.state() != ArtifactState::Completed)
            })
            .cloned()
            .collect()
    }

    /// Ancestors that do not accept child work, nearest first
    ///
    /// Empty unless the artifact has been `ready` at some point.
    fn blocking_ancestors(&self, artifact: &Artifact) -> Vec<&'a Artifact> {
        if !artifact.has_reached(ArtifactState::Ready) {
            return Vec::new();
        }
        self.set
            .ancestors(&artifact.id)
            .into_iter()
            .filter(|a| !a.state().accepts_child_work())
            .collect()
    }

    pub fn is_ready(&self, id: &ArtifactId) -> Result<bool, ReadinessError> {
        let artifact = self.lookup(id)?;
        Ok(self.unresolved_dependencies(artifact).is_empty()
            && self.blocking_ancestors(artifact).is_empty())
    }

    pub fn blocking_reasons(&self, id: &ArtifactId) -> Result<Vec<BlockingReason>, ReadinessError> {
        let artifact = self.lookup(id)?;
        Ok(self.reasons_for(artifact))
    }

    fn reasons_for(&self, artifact: &Artifact) -> Vec<BlockingReason> {
        let mut reasons = Vec::new();

        let state = artifact.state();
        if state.is_terminal() {
            reasons.push(BlockingReason::InvalidState { state });
        }

        let dependencies = self.unresolved_dependencies(artifact);
        if !dependencies.is_empty() {
            reasons.push(BlockingReason::IncompleteDependencies { dependencies });
        }

        reasons.extend(
            self.blocking_ancestors(artifact)
                .into_iter()
                .map(|a| BlockingReason::IncompleteParent {
                    ancestor: a.id.clone(),
                    state: a.state(),
                }),
        );
        reasons
    }

    /// Ready now, and the lifecycle allows `ready -> in_progress`
    pub fn can_transition_to_in_progress(&self, id: &ArtifactId) -> Result<bool, ReadinessError> {
        let artifact = self.lookup(id)?;
        Ok(artifact.state() == ArtifactState::Ready
            && can_transition(
                artifact.artifact_type(),
                ArtifactState::Ready,
                ArtifactState::InProgress,
            )
            && self.is_ready(id)?)
    }

    /// Artifacts in `ready` with nothing blocking them, sorted by ID
    pub fn ready_artifacts(&self) -> Vec<&'a Artifact> {
        self.set
            .sorted()
            .into_iter()
            .filter(|a| a.state() == ArtifactState::Ready && self.reasons_for(a).is_empty())
            .collect()
    }

    /// Open artifacts with at least one blocking reason, sorted by ID
    ///
    /// Terminal and cancelled artifacts are left out.
    pub fn blocked_artifacts(&self) -> Vec<(&'a Artifact, Vec<BlockingReason>)> {
        self.set
            .sorted()
            .into_iter()
            .filter(|a| {
                let state = a.state();
                !state.is_terminal() && state != ArtifactState::Cancelled
            })
            .filter_map(|a| {
                let reasons = self.reasons_for(a);
                (!reasons.is_empty()).then_some((a, reasons))
            })
            .collect()
    }
}
