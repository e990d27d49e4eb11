//! Domain models for kodebase
//!
//! The artifact lifecycle engine: pure functions and value types over an
//! in-memory artifact snapshot, without any I/O concerns.

mod id;
mod event;
mod artifact;
mod lifecycle;
mod graph;
mod cascade;
mod readiness;
mod allocator;

pub use id::{ArtifactId, ArtifactType, IdError};
pub use event::{
    format_timestamp, ArtifactState, BlockingDependency, Event, EventMeta, Trigger, TriggerKind,
    BLOCKING_DEPENDENCIES_KEY,
};
pub use artifact::{
    Artifact, ArtifactContent, ArtifactDocument, ArtifactMetadata, ArtifactSet, Estimation,
    InitiativeContent, IssueContent, MilestoneContent, ParseError, Priority, RawDocument,
    Relationships, SCHEMA_VERSION,
};
pub use lifecycle::{
    append_event, assert_transition, can_transition, valid_transitions, validate_event_log,
    validate_event_order, EventOrderError, LifecycleError, StateTransitionError,
};
pub use graph::{
    find_circular_dependencies, find_cross_level_dependencies, find_cross_scope_dependencies,
    find_relationship_inconsistencies, validate_dependencies, DependencyGraph, DependencyIssue,
    IssueReport, Relation,
};
pub use cascade::{
    analyze_parent_cascade, block_on_dependencies, cascade_event, resolve_dependency_completion,
    resolve_dependency_removal, track_added_dependency, AppliedChange, CascadeDecision,
    CascadeEngine, CascadeKind, CascadeOutcome,
    DependencyResolution, ResolutionOutcome, CASCADE_ACTOR,
};
pub use readiness::{BlockingReason, ReadinessError, ReadinessResolver};
pub use allocator::{decode_base26, encode_base26, AllocationError, IdAllocator};
