//! Artifact events
//!
//! Every artifact carries an append-only list of events. The `event` field of
//! the last entry is the artifact's current state.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::id::ArtifactId;

/// Metadata key holding the dependency list of a `blocked` event
pub const BLOCKING_DEPENDENCIES_KEY: &str = "blocking_dependencies";

/// Lifecycle state of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Draft,
    Ready,
    Blocked,
    Cancelled,
    InProgress,
    InReview,
    Completed,
    Archived,
}

impl ArtifactState {
    pub const ALL: [ArtifactState; 8] = [
        ArtifactState::Draft,
        ArtifactState::Ready,
        ArtifactState::Blocked,
        ArtifactState::Cancelled,
        ArtifactState::InProgress,
        ArtifactState::InReview,
        ArtifactState::Completed,
        ArtifactState::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactState::Draft => "draft",
            ArtifactState::Ready => "ready",
            ArtifactState::Blocked => "blocked",
            ArtifactState::Cancelled => "cancelled",
            ArtifactState::InProgress => "in_progress",
            ArtifactState::InReview => "in_review",
            ArtifactState::Completed => "completed",
            ArtifactState::Archived => "archived",
        }
    }

    /// Returns true for states with no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactState::Completed | ArtifactState::Archived)
    }

    /// Returns true once work has actually begun (in_progress or later)
    pub fn is_started(&self) -> bool {
        matches!(
            self,
            ArtifactState::InProgress | ArtifactState::InReview | ArtifactState::Completed
        )
    }

    /// Returns true if descendants may be worked on while in this state
    pub fn accepts_child_work(&self) -> bool {
        matches!(self, ArtifactState::Ready | ArtifactState::InProgress)
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ArtifactState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown state '{}'", s))
    }
}

/// What caused an event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    ArtifactCreated,
    DependenciesMet,
    HasDependencies,
    BranchCreated,
    PrReady,
    PrMerged,
    DependencyCompleted,
    ChildrenStarted,
    ChildrenCompleted,
    ManualCancel,
    Reactivated,
    Archived,
    Manual,
    /// Any trigger name outside the known vocabulary
    Custom(String),
}

impl TriggerKind {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerKind::ArtifactCreated => "artifact_created",
            TriggerKind::DependenciesMet => "dependencies_met",
            TriggerKind::HasDependencies => "has_dependencies",
            TriggerKind::BranchCreated => "branch_created",
            TriggerKind::PrReady => "pr_ready",
            TriggerKind::PrMerged => "pr_merged",
            TriggerKind::DependencyCompleted => "dependency_completed",
            TriggerKind::ChildrenStarted => "children_started",
            TriggerKind::ChildrenCompleted => "children_completed",
            TriggerKind::ManualCancel => "manual_cancel",
            TriggerKind::Reactivated => "reactivated",
            TriggerKind::Archived => "archived",
            TriggerKind::Manual => "manual",
            TriggerKind::Custom(name) => name,
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "artifact_created" => TriggerKind::ArtifactCreated,
            "dependencies_met" => TriggerKind::DependenciesMet,
            "has_dependencies" => TriggerKind::HasDependencies,
            "branch_created" => TriggerKind::BranchCreated,
            "pr_ready" => TriggerKind::PrReady,
            "pr_merged" => TriggerKind::PrMerged,
            "dependency_completed" => TriggerKind::DependencyCompleted,
            "children_started" => TriggerKind::ChildrenStarted,
            "children_completed" => TriggerKind::ChildrenCompleted,
            "manual_cancel" => TriggerKind::ManualCancel,
            "reactivated" => TriggerKind::Reactivated,
            "archived" => TriggerKind::Archived,
            "manual" => TriggerKind::Manual,
            other => TriggerKind::Custom(other.to_string()),
        }
    }
}

/// Event trigger, optionally parameterized (`child_started:A.1.2`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Trigger {
    pub kind: TriggerKind,
    pub param: Option<String>,
}

impl Trigger {
    pub fn new(kind: TriggerKind) -> Self {
        Self { kind, param: None }
    }

    pub fn with_param(kind: TriggerKind, param: impl Into<String>) -> Self {
        Self {
            kind,
            param: Some(param.into()),
        }
    }
}

impl From<TriggerKind> for Trigger {
    fn from(kind: TriggerKind) -> Self {
        Trigger::new(kind)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if let Some(param) = &self.param {
            write!(f, ":{}", param)?;
        }
        Ok(())
    }
}

impl From<String> for Trigger {
    fn from(value: String) -> Self {
        match value.split_once(':') {
            Some((name, param)) => Trigger::with_param(TriggerKind::from_name(name), param),
            None => Trigger::new(TriggerKind::from_name(&value)),
        }
    }
}

impl From<&str> for Trigger {
    fn from(value: &str) -> Self {
        Trigger::from(value.to_string())
    }
}

impl From<Trigger> for String {
    fn from(trigger: Trigger) -> Self {
        trigger.to_string()
    }
}

/// Opaque per-event metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMeta(BTreeMap<String, serde_json::Value>);

impl EventMeta {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// One entry of a `blocked` event's dependency list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingDependency {
    pub artifact_id: ArtifactId,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

impl BlockingDependency {
    pub fn unresolved(artifact_id: ArtifactId) -> Self {
        Self {
            artifact_id,
            resolved: false,
            resolved_at: None,
        }
    }
}

/// Formats a timestamp the way events persist it (`2025-01-01T00:00:00Z`)
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A single state-change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// State entered by this event
    pub event: ArtifactState,

    /// ISO-8601 timestamp, kept verbatim so malformed values survive a round trip
    pub timestamp: String,

    /// `"Name (email)"` or an agent identifier
    pub actor: String,

    pub trigger: Trigger,

    #[serde(default, skip_serializing_if = "EventMeta::is_empty")]
    pub metadata: EventMeta,
}

impl Event {
    /// Creates an event stamped with the current time
    pub fn now(state: ArtifactState, actor: impl Into<String>, trigger: impl Into<Trigger>) -> Self {
        Self::at(state, Utc::now(), actor, trigger)
    }

    /// Creates an event with an explicit timestamp
    pub fn at(
        state: ArtifactState,
        timestamp: DateTime<Utc>,
        actor: impl Into<String>,
        trigger: impl Into<Trigger>,
    ) -> Self {
        Self {
            event: state,
            timestamp: format_timestamp(timestamp),
            actor: actor.into(),
            trigger: trigger.into(),
            metadata: EventMeta::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: EventMeta) -> Self {
        self.metadata = metadata;
        self
    }

    /// Parses the timestamp, or None if it is not valid RFC 3339
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Reads the blocking dependency list from a `blocked` event
    ///
    /// Returns None when the metadata has no list or it cannot be decoded.
    pub fn blocking_dependencies(&self) -> Option<Vec<BlockingDependency>> {
        let value = self.metadata.get(BLOCKING_DEPENDENCIES_KEY)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Returns a copy of this event with the blocking dependency list replaced
    pub fn with_blocking_dependencies(&self, deps: &[BlockingDependency]) -> Event {
        let mut event = self.clone();
        let value = serde_json::to_value(deps).unwrap_or(serde_json::Value::Null);
        event.metadata.set(BLOCKING_DEPENDENCIES_KEY, value);
        event
    }
}
