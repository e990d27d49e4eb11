//! kodebase - file-based artifact tracking for software teams
//!
//! Work is organized as initiatives, milestones and issues stored as YAML
//! files. Each artifact carries an append-only event log; its current state
//! is the last event. The lifecycle engine validates transitions, cascades
//! state to parents and resolves sibling dependencies.

pub mod domain;
pub mod storage;
pub mod cli;

pub use domain::{Artifact, ArtifactId, ArtifactSet, ArtifactState, ArtifactType, Event};
