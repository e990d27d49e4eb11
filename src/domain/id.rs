//! Hierarchical ID system for artifacts
//!
//! ID Format:
//! - Initiative IDs: uppercase letters (e.g., `A`, `Z`, `AA`)
//! - Milestone IDs: `{initiative}.{n}` (e.g., `A.1`)
//! - Issue IDs: `{milestone}.{m}` (e.g., `A.1.3`)
//!
//! The number of dot-separated segments determines the artifact type, and a
//! child's ID is always its parent's ID plus one numeric segment.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid artifact ID: expected 'A', 'A.1' or 'A.1.1', got '{0}'")]
    InvalidFormat(String),

    #[error("Invalid initiative segment '{0}': expected uppercase letters A-Z")]
    InvalidInitiative(String),

    #[error("Invalid sequence number: {0}")]
    InvalidSequence(String),
}

/// The three levels of the artifact hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Initiative,
    Milestone,
    Issue,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 3] = [
        ArtifactType::Initiative,
        ArtifactType::Milestone,
        ArtifactType::Issue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Initiative => "initiative",
            ArtifactType::Milestone => "milestone",
            ArtifactType::Issue => "issue",
        }
    }

    /// Returns the type of a direct child, or None for issues
    pub fn child_type(&self) -> Option<ArtifactType> {
        match self {
            ArtifactType::Initiative => Some(ArtifactType::Milestone),
            ArtifactType::Milestone => Some(ArtifactType::Issue),
            ArtifactType::Issue => None,
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initiative" => Ok(ArtifactType::Initiative),
            "milestone" => Ok(ArtifactType::Milestone),
            "issue" => Ok(ArtifactType::Issue),
            other => Err(format!("unknown artifact type '{}'", other)),
        }
    }
}

/// Returns true if `s` is a non-empty run of ASCII uppercase letters
pub(crate) fn is_initiative_segment(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_uppercase())
}

/// Positive decimal without leading zeros, so references round-trip verbatim
fn parse_sequence(s: &str) -> Result<u32, IdError> {
    if s.is_empty() || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdError::InvalidSequence(s.to_string()));
    }
    s.parse::<u32>()
        .map_err(|_| IdError::InvalidSequence(s.to_string()))
}

/// Artifact ID: an initiative code followed by up to two numeric segments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId {
    /// Initiative letters (`A`, `AB`, ...)
    initiative: String,
    /// Numeric segments below the initiative (0, 1 or 2 of them)
    segments: Vec<u32>,
}

impl ArtifactId {
    /// Creates an initiative ID from its letter code
    pub fn initiative(code: &str) -> Result<Self, IdError> {
        if !is_initiative_segment(code) {
            return Err(IdError::InvalidInitiative(code.to_string()));
        }
        Ok(Self {
            initiative: code.to_string(),
            segments: vec![],
        })
    }

    /// Returns the artifact type implied by the ID shape
    pub fn artifact_type(&self) -> ArtifactType {
        match self.segments.len() {
            0 => ArtifactType::Initiative,
            1 => ArtifactType::Milestone,
            _ => ArtifactType::Issue,
        }
    }

    /// Returns the initiative letter code
    pub fn initiative_code(&self) -> &str {
        &self.initiative
    }

    /// Returns the numeric segments (empty for initiatives)
    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    /// Returns the last numeric segment, or None for initiatives
    pub fn sequence(&self) -> Option<u32> {
        self.segments.last().copied()
    }

    /// Returns the parent ID, or None for initiatives
    pub fn parent(&self) -> Option<ArtifactId> {
        if self.segments.is_empty() {
            return None;
        }
        Some(ArtifactId {
            initiative: self.initiative.clone(),
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Returns all ancestors, nearest first
    pub fn ancestors(&self) -> Vec<ArtifactId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent();
        while let Some(id) = current {
            current = id.parent();
            ancestors.push(id);
        }
        ancestors
    }

    /// Creates the ID of a direct child, or None for issues and sequence 0
    pub fn child(&self, sequence: u32) -> Option<ArtifactId> {
        self.artifact_type().child_type()?;
        if sequence == 0 {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.push(sequence);
        Some(ArtifactId {
            initiative: self.initiative.clone(),
            segments,
        })
    }

    /// Returns true if `self` is the direct parent of `other`
    pub fn is_parent_of(&self, other: &ArtifactId) -> bool {
        other.parent().as_ref() == Some(self)
    }

    /// Parses the leading artifact ID from a file stem like `A.1.2.fix-parser`
    ///
    /// Segments are consumed while they fit the grammar, so a trailing slug
    /// is ignored.
    pub fn parse_prefix(stem: &str) -> Option<ArtifactId> {
        let mut parts = stem.split('.');
        let initiative = parts.next()?;
        if !is_initiative_segment(initiative) {
            return None;
        }
        let segments = parts
            .take(2)
            .map_while(|p| parse_sequence(p).ok())
            .collect();
        Some(ArtifactId {
            initiative: initiative.to_string(),
            segments,
        })
    }
}

impl Ord for ArtifactId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Bijective base-26 ordering: shorter codes sort first (Z < AA)
        self.initiative
            .len()
            .cmp(&other.initiative.len())
            .then_with(|| self.initiative.cmp(&other.initiative))
            .then_with(|| self.segments.cmp(&other.segments))
    }
}

impl PartialOrd for ArtifactId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.initiative)?;
        for seg in &self.segments {
            write!(f, ".{}", seg)?;
        }
        Ok(())
    }
}

impl FromStr for ArtifactId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('.').collect();

        if parts.len() > 3 {
            return Err(IdError::InvalidFormat(s.to_string()));
        }

        let initiative = parts[0];
        if !is_initiative_segment(initiative) {
            return Err(IdError::InvalidInitiative(initiative.to_string()));
        }

        let segments = parts[1..]
            .iter()
            .map(|p| parse_sequence(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            initiative: initiative.to_string(),
            segments,
        })
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ArtifactId {
        s.parse().unwrap()
    }

    #[test]
    fn segment_count_determines_type() {
        assert_eq!(id("A").artifact_type(), ArtifactType::Initiative);
        assert_eq!(id("AB.3").artifact_type(), ArtifactType::Milestone);
        assert_eq!(id("C.1.12").artifact_type(), ArtifactType::Issue);
    }

    #[test]
    fn rejects_invalid_format() {
        assert!("".parse::<ArtifactId>().is_err());
        assert!("a".parse::<ArtifactId>().is_err());
        assert!("A1".parse::<ArtifactId>().is_err());
        assert!("A.".parse::<ArtifactId>().is_err());
        assert!("A.x".parse::<ArtifactId>().is_err());
        assert!("A.+1".parse::<ArtifactId>().is_err());
        assert!("A.1.2.3".parse::<ArtifactId>().is_err());
        assert!("1.2".parse::<ArtifactId>().is_err());
    }

    #[test]
    fn sequences_are_positive_without_leading_zeros() {
        assert!("A.0".parse::<ArtifactId>().is_err());
        assert!("A.1.0".parse::<ArtifactId>().is_err());
        assert!("A.01".parse::<ArtifactId>().is_err());
        assert!("A.1.007".parse::<ArtifactId>().is_err());
        assert_eq!(id("A.10.20").to_string(), "A.10.20");
    }

    #[test]
    fn display_matches_input() {
        assert_eq!(id("A.1.3").to_string(), "A.1.3");
        assert_eq!(id("ZZ").to_string(), "ZZ");
    }

    #[test]
    fn parent_chain() {
        let issue = id("B.2.7");
        assert_eq!(issue.parent(), Some(id("B.2")));
        assert_eq!(issue.ancestors(), vec![id("B.2"), id("B")]);
        assert!(id("B").parent().is_none());
        assert!(id("B.2").is_parent_of(&issue));
        assert!(!id("B").is_parent_of(&issue));
    }

    #[test]
    fn child_appends_segment() {
        assert_eq!(id("A").child(4), Some(id("A.4")));
        assert_eq!(id("A.4").child(1), Some(id("A.4.1")));
        assert_eq!(id("A.4.1").child(1), None);
        assert_eq!(id("A").child(0), None);
    }

    #[test]
    fn ordering_is_length_then_lexicographic() {
        let mut ids = vec![id("AA"), id("B"), id("Z"), id("A.10"), id("A.2"), id("A")];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        assert_eq!(rendered, vec!["A", "A.2", "A.10", "B", "Z", "AA"]);
    }

    #[test]
    fn parse_prefix_ignores_slug() {
        assert_eq!(ArtifactId::parse_prefix("A.1.2.fix-parser"), Some(id("A.1.2")));
        assert_eq!(ArtifactId::parse_prefix("B.core-platform"), Some(id("B")));
        assert_eq!(ArtifactId::parse_prefix("A.1"), Some(id("A.1")));
        assert_eq!(ArtifactId::parse_prefix("readme"), None);
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&id("A.1")).unwrap();
        assert_eq!(json, "\"A.1\"");
        let parsed: ArtifactId = serde_json::from_str("\"C.2.5\"").unwrap();
        assert_eq!(parsed, id("C.2.5"));
        assert!(serde_json::from_str::<ArtifactId>("\"c.2\"").is_err());
    }
}
