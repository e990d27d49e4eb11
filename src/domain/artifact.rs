//! Artifact domain model
//!
//! Artifacts are the tracked work items: initiatives, milestones and issues.
//! The type is never stored; it is implied by the ID shape, which also picks
//! the content variant when a document is parsed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::event::{ArtifactState, Event, TriggerKind};
use super::id::{ArtifactId, ArtifactType};

pub const SCHEMA_VERSION: &str = "0.1.0";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid {kind} content for {id}: {source}")]
    InvalidContent {
        id: ArtifactId,
        kind: ArtifactType,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Estimation {
    XS,
    S,
    M,
    L,
    XL,
}

/// Same-level dependency edges
///
/// References are kept verbatim so validators can report (or skip) entries
/// that do not parse as artifact IDs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationships {
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

impl Relationships {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.blocked_by.is_empty()
    }

    /// Adds `id` to `blocks` unless present
    pub fn add_blocks(&mut self, id: &ArtifactId) -> bool {
        push_unique(&mut self.blocks, id)
    }

    /// Adds `id` to `blocked_by` unless present
    pub fn add_blocked_by(&mut self, id: &ArtifactId) -> bool {
        push_unique(&mut self.blocked_by, id)
    }

    pub fn remove_blocks(&mut self, id: &ArtifactId) -> bool {
        remove_ref(&mut self.blocks, id)
    }

    pub fn remove_blocked_by(&mut self, id: &ArtifactId) -> bool {
        remove_ref(&mut self.blocked_by, id)
    }
}

fn push_unique(refs: &mut Vec<String>, id: &ArtifactId) -> bool {
    let s = id.to_string();
    if refs.contains(&s) {
        false
    } else {
        refs.push(s);
        true
    }
}

fn remove_ref(refs: &mut Vec<String>, id: &ArtifactId) -> bool {
    let s = id.to_string();
    let len_before = refs.len();
    refs.retain(|r| r != &s);
    refs.len() != len_before
}

/// Metadata common to every artifact type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimation: Option<Estimation>,

    pub created_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub relationships: Relationships,

    #[serde(default)]
    pub events: Vec<Event>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitiativeContent {
    pub vision: String,
    pub scope: String,
    pub success_criteria: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneContent {
    pub summary: String,
    pub deliverables: Vec<String>,
    pub validation: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueContent {
    pub summary: String,
    pub acceptance_criteria: Vec<String>,
}

/// Type-specific payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArtifactContent {
    Initiative(InitiativeContent),
    Milestone(MilestoneContent),
    Issue(IssueContent),
}

impl ArtifactContent {
    /// Empty content for the given type
    pub fn empty(kind: ArtifactType) -> Self {
        match kind {
            ArtifactType::Initiative => ArtifactContent::Initiative(InitiativeContent::default()),
            ArtifactType::Milestone => ArtifactContent::Milestone(MilestoneContent::default()),
            ArtifactType::Issue => ArtifactContent::Issue(IssueContent::default()),
        }
    }

    /// Parses an untyped payload into the variant for `kind`
    fn parse(id: &ArtifactId, kind: ArtifactType, value: serde_json::Value) -> Result<Self, ParseError> {
        let value = match value {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        let err = |source: serde_json::Error| ParseError::InvalidContent {
            id: id.clone(),
            kind,
            source,
        };
        Ok(match kind {
            ArtifactType::Initiative => {
                ArtifactContent::Initiative(serde_json::from_value(value).map_err(err)?)
            }
            ArtifactType::Milestone => {
                ArtifactContent::Milestone(serde_json::from_value(value).map_err(err)?)
            }
            ArtifactType::Issue => ArtifactContent::Issue(serde_json::from_value(value).map_err(err)?),
        })
    }

    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            ArtifactContent::Initiative(_) => ArtifactType::Initiative,
            ArtifactContent::Milestone(_) => ArtifactType::Milestone,
            ArtifactContent::Issue(_) => ArtifactType::Issue,
        }
    }

    /// Summary line, or the vision for initiatives
    pub fn summary(&self) -> &str {
        match self {
            ArtifactContent::Initiative(c) => &c.vision,
            ArtifactContent::Milestone(c) => &c.summary,
            ArtifactContent::Issue(c) => &c.summary,
        }
    }
}

/// Untyped document as read from disk, before classification
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    pub metadata: ArtifactMetadata,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Borrowed view used for serialization
#[derive(Debug, Serialize)]
pub struct ArtifactDocument<'a> {
    pub metadata: &'a ArtifactMetadata,
    pub content: &'a ArtifactContent,
}

/// A tracked work item
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: ArtifactId,
    pub metadata: ArtifactMetadata,
    pub content: ArtifactContent,
}

impl Artifact {
    /// Creates a draft artifact with a single `draft` event
    pub fn new(
        id: ArtifactId,
        title: impl Into<String>,
        actor: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let actor = actor.into();
        let kind = id.artifact_type();
        Self {
            id,
            metadata: ArtifactMetadata {
                title: title.into(),
                priority: None,
                estimation: None,
                created_by: actor.clone(),
                assignee: None,
                schema_version: default_schema_version(),
                relationships: Relationships::default(),
                events: vec![Event::at(
                    ArtifactState::Draft,
                    created_at,
                    actor,
                    TriggerKind::ArtifactCreated,
                )],
            },
            content: ArtifactContent::empty(kind),
        }
    }

    /// Classifies by ID shape, then parses the content for that type
    pub fn from_document(id: ArtifactId, doc: RawDocument) -> Result<Self, ParseError> {
        let content = ArtifactContent::parse(&id, id.artifact_type(), doc.content)?;
        Ok(Self {
            id,
            metadata: doc.metadata,
            content,
        })
    }

    pub fn document(&self) -> ArtifactDocument<'_> {
        ArtifactDocument {
            metadata: &self.metadata,
            content: &self.content,
        }
    }

    pub fn artifact_type(&self) -> ArtifactType {
        self.id.artifact_type()
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn events(&self) -> &[Event] {
        &self.metadata.events
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.metadata.events.last()
    }

    /// Current state: the last event's state
    ///
    /// An artifact without events is treated as `draft`; event-log
    /// validation reports it separately.
    pub fn state(&self) -> ArtifactState {
        self.last_event()
            .map(|e| e.event)
            .unwrap_or(ArtifactState::Draft)
    }

    /// Returns true if the history contains an event for `state`
    pub fn has_reached(&self, state: ArtifactState) -> bool {
        self.metadata.events.iter().any(|e| e.event == state)
    }

    pub fn relationships(&self) -> &Relationships {
        &self.metadata.relationships
    }

    /// Parsed `blocked_by` references, skipping ones that do not parse
    pub fn blocked_by_ids(&self) -> impl Iterator<Item = ArtifactId> + '_ {
        self.metadata
            .relationships
            .blocked_by
            .iter()
            .filter_map(|r| r.parse().ok())
    }

    /// Parsed `blocks` references, skipping ones that do not parse
    pub fn blocks_ids(&self) -> impl Iterator<Item = ArtifactId> + '_ {
        self.metadata
            .relationships
            .blocks
            .iter()
            .filter_map(|r| r.parse().ok())
    }

    /// Returns a copy with `event` appended, without validation
    pub(crate) fn with_event(&self, event: Event) -> Artifact {
        let mut next = self.clone();
        next.metadata.events.push(event);
        next
    }
}

/// Snapshot of an artifact collection
///
/// Entries are shared behind `Arc`, so cloning the set is cheap and replacing
/// one artifact leaves every other entry shared with the previous snapshot.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    entries: Vec<Arc<Artifact>>,
    index: HashMap<ArtifactId, usize>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set; later artifacts with a duplicate ID replace earlier ones
    pub fn from_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        let mut set = Self::new();
        for artifact in artifacts {
            set.insert(artifact);
        }
        set
    }

    /// Inserts or replaces an artifact
    pub fn insert(&mut self, artifact: Artifact) {
        match self.index.get(&artifact.id) {
            Some(&idx) => self.entries[idx] = Arc::new(artifact),
            None => {
                self.index.insert(artifact.id.clone(), self.entries.len());
                self.entries.push(Arc::new(artifact));
            }
        }
    }

    /// Returns a new snapshot with `artifact` inserted or replaced
    pub fn with_artifact(&self, artifact: Artifact) -> ArtifactSet {
        let mut next = self.clone();
        next.insert(artifact);
        next
    }

    pub fn get(&self, id: &ArtifactId) -> Option<&Artifact> {
        self.index.get(id).map(|&idx| self.entries[idx].as_ref())
    }

    /// Looks up a raw reference, returning None if it does not parse
    pub fn get_ref(&self, reference: &str) -> Option<&Artifact> {
        let id: ArtifactId = reference.parse().ok()?;
        self.get(&id)
    }

    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter().map(|a| a.as_ref())
    }

    /// All artifacts sorted by ID
    pub fn sorted(&self) -> Vec<&Artifact> {
        let mut all: Vec<_> = self.iter().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn ids(&self) -> impl Iterator<Item = &ArtifactId> {
        self.entries.iter().map(|a| &a.id)
    }

    /// Direct children of `id`, sorted by ID
    pub fn children(&self, id: &ArtifactId) -> Vec<&Artifact> {
        let mut children: Vec<_> = self.iter().filter(|a| id.is_parent_of(&a.id)).collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children
    }

    pub fn parent(&self, id: &ArtifactId) -> Option<&Artifact> {
        id.parent().and_then(|p| self.get(&p))
    }

    /// Ancestors present in the set, nearest first
    pub fn ancestors(&self, id: &ArtifactId) -> Vec<&Artifact> {
        id.ancestors().iter().filter_map(|a| self.get(a)).collect()
    }

    /// All initiatives, sorted
    pub fn initiatives(&self) -> Vec<&Artifact> {
        self.sorted()
            .into_iter()
            .filter(|a| a.artifact_type() == ArtifactType::Initiative)
            .collect()
    }
}

impl FromIterator<Artifact> for ArtifactSet {
    fn from_iter<T: IntoIterator<Item = Artifact>>(iter: T) -> Self {
        ArtifactSet::from_artifacts(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn make(id: &str) -> Artifact {
        Artifact::new(id.parse().unwrap(), format!("Artifact {}", id), "tester", ts())
    }

    #[test]
    fn new_artifact_starts_in_draft() {
        let artifact = make("A.1.1");
        assert_eq!(artifact.state(), ArtifactState::Draft);
        assert_eq!(artifact.events().len(), 1);
        assert_eq!(artifact.artifact_type(), ArtifactType::Issue);
        assert!(matches!(artifact.content, ArtifactContent::Issue(_)));
    }

    #[test]
    fn parse_classifies_by_id() {
        let yaml = r#"
metadata:
  title: Platform
  created_by: Ada (ada@example.com)
  relationships:
    blocks: []
    blocked_by: []
  events:
    - event: draft
      timestamp: "2025-01-01T00:00:00Z"
      actor: Ada (ada@example.com)
      trigger: artifact_created
content:
  vision: One engine
  scope: Core only
  success_criteria:
    - Ships
"#;
        let doc: RawDocument = serde_yaml::from_str(yaml).unwrap();
        let artifact = Artifact::from_document("B".parse().unwrap(), doc).unwrap();

        match &artifact.content {
            ArtifactContent::Initiative(c) => {
                assert_eq!(c.vision, "One engine");
                assert_eq!(c.success_criteria, vec!["Ships"]);
            }
            other => panic!("expected initiative content, got {:?}", other),
        }
    }

    #[test]
    fn parse_rejects_mismatched_content() {
        let yaml = r#"
metadata:
  title: Fix parser
  created_by: bot
content:
  acceptance_criteria: "should be a list"
"#;
        let doc: RawDocument = serde_yaml::from_str(yaml).unwrap();
        let result = Artifact::from_document("A.1.1".parse().unwrap(), doc);
        assert!(matches!(result, Err(ParseError::InvalidContent { .. })));
    }

    #[test]
    fn missing_content_uses_defaults() {
        let doc: RawDocument =
            serde_yaml::from_str("metadata:\n  title: M\n  created_by: bot\n").unwrap();
        let artifact = Artifact::from_document("A.2".parse().unwrap(), doc).unwrap();
        assert_eq!(artifact.content, ArtifactContent::empty(ArtifactType::Milestone));
        assert_eq!(artifact.metadata.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn relationships_dedupe() {
        let mut rel = Relationships::default();
        let id: ArtifactId = "A.2".parse().unwrap();
        assert!(rel.add_blocked_by(&id));
        assert!(!rel.add_blocked_by(&id));
        assert!(rel.remove_blocked_by(&id));
        assert!(rel.is_empty());
    }

    #[test]
    fn set_navigation() {
        let set: ArtifactSet = ["A", "A.1", "A.2", "A.1.1", "A.1.2", "B"]
            .into_iter()
            .map(make)
            .collect();

        let a: ArtifactId = "A".parse().unwrap();
        let children: Vec<_> = set.children(&a).iter().map(|c| c.id.to_string()).collect();
        assert_eq!(children, vec!["A.1", "A.2"]);

        let issue: ArtifactId = "A.1.2".parse().unwrap();
        let ancestors: Vec<_> = set.ancestors(&issue).iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ancestors, vec!["A.1", "A"]);
        assert_eq!(set.initiatives().len(), 2);
    }

    #[test]
    fn with_artifact_leaves_original_snapshot() {
        let set: ArtifactSet = ["A", "A.1"].into_iter().map(make).collect();
        let id: ArtifactId = "A.1".parse().unwrap();

        let mut renamed = set.get(&id).unwrap().clone();
        renamed.metadata.title = "Renamed".to_string();
        let next = set.with_artifact(renamed);

        assert_eq!(set.get(&id).unwrap().title(), "Artifact A.1");
        assert_eq!(next.get(&id).unwrap().title(), "Renamed");
        assert_eq!(next.len(), 2);
    }
}
