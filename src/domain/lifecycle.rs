//! Artifact lifecycle state machine
//!
//! Each artifact type has its own transition table. The event log of an
//! artifact must start with `draft`, keep timestamps non-decreasing, and only
//! move along edges of its type's table.

use thiserror::Error;
use tracing::{debug, info};

use super::artifact::Artifact;
use super::event::{ArtifactState, Event};
use super::id::ArtifactType;

use ArtifactState::*;

type TransitionTable = [(ArtifactState, &'static [ArtifactState]); 8];

const INITIATIVE_TRANSITIONS: TransitionTable = [
    (Draft, &[Ready, Blocked, Cancelled]),
    (Blocked, &[Ready, Cancelled]),
    (Ready, &[InProgress, Cancelled]),
    (InProgress, &[InReview, Cancelled]),
    (InReview, &[Completed, Cancelled]),
    (Completed, &[]),
    (Cancelled, &[Draft, Archived]),
    (Archived, &[]),
];

const MILESTONE_TRANSITIONS: TransitionTable = [
    (Draft, &[Ready, Blocked, Cancelled]),
    (Blocked, &[Ready, Cancelled]),
    (Ready, &[InProgress, Cancelled]),
    (InProgress, &[InReview, Cancelled]),
    (InReview, &[Completed, Cancelled]),
    (Completed, &[]),
    (Cancelled, &[Draft, Archived]),
    (Archived, &[]),
];

// draft -> blocked is only produced by dependency detection, never by hand
const ISSUE_TRANSITIONS: TransitionTable = [
    (Draft, &[Ready, Blocked, Cancelled]),
    (Blocked, &[Ready, Cancelled]),
    (Ready, &[InProgress, Cancelled]),
    (InProgress, &[InReview, Cancelled]),
    (InReview, &[Completed, Cancelled]),
    (Completed, &[]),
    (Cancelled, &[Draft, Archived]),
    (Archived, &[]),
];

fn table(kind: ArtifactType) -> &'static TransitionTable {
    match kind {
        ArtifactType::Initiative => &INITIATIVE_TRANSITIONS,
        ArtifactType::Milestone => &MILESTONE_TRANSITIONS,
        ArtifactType::Issue => &ISSUE_TRANSITIONS,
    }
}

fn targets(kind: ArtifactType, from: ArtifactState) -> &'static [ArtifactState] {
    table(kind)
        .iter()
        .find(|(state, _)| *state == from)
        .map(|(_, to)| *to)
        .unwrap_or(&[])
}

/// Illegal lifecycle edge, with the legal alternatives
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}", describe_transition(.artifact_type, .from_state, .to_state, .valid_transitions))]
pub struct StateTransitionError {
    pub artifact_type: ArtifactType,
    pub from_state: ArtifactState,
    pub to_state: ArtifactState,
    pub valid_transitions: Vec<ArtifactState>,
}

impl StateTransitionError {
    /// Returns true if the source state has no outgoing edges at all
    pub fn is_terminal(&self) -> bool {
        self.valid_transitions.is_empty()
    }
}

fn describe_transition(
    kind: &ArtifactType,
    from: &ArtifactState,
    to: &ArtifactState,
    valid: &[ArtifactState],
) -> String {
    if valid.is_empty() {
        return format!(
            "Cannot transition {} from '{}' to '{}': '{}' is a terminal state",
            kind, from, to, from
        );
    }
    let valid: Vec<&str> = valid.iter().map(|s| s.as_str()).collect();
    format!(
        "Invalid {} transition '{}' -> '{}'. Valid transitions: {}",
        kind,
        from,
        to,
        valid.join(", ")
    )
}

/// Structural problem with an event log
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EventOrderError {
    #[error("Event log is empty: an artifact must start with a 'draft' event")]
    Empty,

    #[error("First event must be 'draft', got '{actual}'")]
    FirstEventMustBeDraft { actual: ArtifactState },

    #[error("Event {index} at {curr_timestamp} precedes the previous event at {prev_timestamp}")]
    OutOfOrder {
        index: usize,
        prev_timestamp: String,
        curr_timestamp: String,
    },
}

impl EventOrderError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            EventOrderError::Empty => "EMPTY_EVENTS",
            EventOrderError::FirstEventMustBeDraft { .. } => "FIRST_EVENT_MUST_BE_DRAFT",
            EventOrderError::OutOfOrder { .. } => "EVENTS_OUT_OF_ORDER",
        }
    }
}

/// Any reason an event log or an appended event is rejected
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    #[error(transparent)]
    Order(#[from] EventOrderError),

    #[error("Event {index}: {source}")]
    Transition {
        index: usize,
        #[source]
        source: StateTransitionError,
    },
}

impl LifecycleError {
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::Order(e) => e.code(),
            LifecycleError::Transition { .. } => "INVALID_TRANSITION",
        }
    }
}

/// Returns true if `from -> to` is a legal edge for `kind`
pub fn can_transition(kind: ArtifactType, from: ArtifactState, to: ArtifactState) -> bool {
    targets(kind, from).contains(&to)
}

/// Legal target states from `from`, in table order without duplicates
pub fn valid_transitions(kind: ArtifactType, from: ArtifactState) -> Vec<ArtifactState> {
    let mut valid = Vec::new();
    for state in targets(kind, from) {
        if !valid.contains(state) {
            valid.push(*state);
        }
    }
    valid
}

/// Fails with the full set of legal alternatives if `from -> to` is illegal
pub fn assert_transition(
    kind: ArtifactType,
    from: ArtifactState,
    to: ArtifactState,
) -> Result<(), StateTransitionError> {
    if can_transition(kind, from, to) {
        return Ok(());
    }
    Err(StateTransitionError {
        artifact_type: kind,
        from_state: from,
        to_state: to,
        valid_transitions: valid_transitions(kind, from),
    })
}

/// Checks that the log is non-empty, starts with `draft`, and is time-ordered
///
/// Timestamps that do not parse are skipped rather than reported; schema
/// validation is responsible for them.
pub fn validate_event_order(events: &[Event]) -> Result<(), EventOrderError> {
    let first = events.first().ok_or(EventOrderError::Empty)?;
    if first.event != ArtifactState::Draft {
        return Err(EventOrderError::FirstEventMustBeDraft {
            actual: first.event,
        });
    }

    for (index, pair) in events.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);
        if let (Some(p), Some(c)) = (prev.parsed_timestamp(), curr.parsed_timestamp()) {
            if c < p {
                return Err(EventOrderError::OutOfOrder {
                    index: index + 1,
                    prev_timestamp: prev.timestamp.clone(),
                    curr_timestamp: curr.timestamp.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Validates ordering and every consecutive transition of a log
pub fn validate_event_log(kind: ArtifactType, events: &[Event]) -> Result<(), LifecycleError> {
    validate_event_order(events)?;

    for (index, pair) in events.windows(2).enumerate() {
        assert_transition(kind, pair[0].event, pair[1].event).map_err(|source| {
            LifecycleError::Transition {
                index: index + 1,
                source,
            }
        })?;
    }

    debug!(kind = %kind, events = events.len(), "Event log valid");
    Ok(())
}

/// Returns a copy of `artifact` with `event` appended
///
/// The new event must be a legal transition from the current state and must
/// not be timestamped before the last event.
pub fn append_event(artifact: &Artifact, event: Event) -> Result<Artifact, LifecycleError> {
    let index = artifact.events().len();

    match artifact.last_event() {
        None => {
            if event.event != ArtifactState::Draft {
                return Err(EventOrderError::FirstEventMustBeDraft {
                    actual: event.event,
                }
                .into());
            }
        }
        Some(last) => {
            assert_transition(artifact.artifact_type(), last.event, event.event)
                .map_err(|source| LifecycleError::Transition { index, source })?;

            if let (Some(p), Some(c)) = (last.parsed_timestamp(), event.parsed_timestamp()) {
                if c < p {
                    return Err(EventOrderError::OutOfOrder {
                        index,
                        prev_timestamp: last.timestamp.clone(),
                        curr_timestamp: event.timestamp.clone(),
                    }
                    .into());
                }
            }
        }
    }

    info!(
        artifact = %artifact.id,
        from = %artifact.state(),
        to = %event.event,
        trigger = %event.trigger,
        "Appending event"
    );
    Ok(artifact.with_event(event))
}
