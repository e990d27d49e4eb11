//! ID allocation
//!
//! Initiative codes count in bijective base 26 (`A`=1 .. `Z`=26, `AA`=27).
//! Children take the highest existing sequence under their parent plus one.
//! Gaps are never filled, so an ID freed by deletion is never handed out again.

use thiserror::Error;

use super::id::{ArtifactId, ArtifactType};

#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("Invalid parent ID '{0}': expected an initiative (A) or a milestone (A.1)")]
    InvalidParent(String),

    #[error("No IDs left under {0}")]
    Exhausted(String),
}

/// Encodes a positive number as bijective base-26 letters
///
/// Returns None for zero.
pub fn encode_base26(mut n: u64) -> Option<String> {
    if n == 0 {
        return None;
    }
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    Some(letters.into_iter().rev().collect())
}

/// Decodes bijective base-26 letters, or None if not `^[A-Z]+$` or too large
pub fn decode_base26(code: &str) -> Option<u64> {
    if code.is_empty() {
        return None;
    }
    code.bytes().try_fold(0u64, |acc, b| {
        if !b.is_ascii_uppercase() {
            return None;
        }
        acc.checked_mul(26)?.checked_add(u64::from(b - b'A') + 1)
    })
}

/// Computes fresh IDs against a set of existing ones
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    existing: Vec<ArtifactId>,
}

impl IdAllocator {
    pub fn new(existing: impl IntoIterator<Item = ArtifactId>) -> Self {
        Self {
            existing: existing.into_iter().collect(),
        }
    }

    /// Next initiative after the highest code in use; `A` when there is none
    ///
    /// Codes referenced only by descendants still count as used.
    pub fn next_initiative(&self) -> Result<ArtifactId, AllocationError> {
        let highest = self
            .existing
            .iter()
            .filter_map(|id| decode_base26(id.initiative_code()))
            .max()
            .unwrap_or(0);

        let code = highest
            .checked_add(1)
            .and_then(encode_base26)
            .ok_or_else(|| AllocationError::Exhausted("initiatives".to_string()))?;
        ArtifactId::initiative(&code).map_err(|_| AllocationError::Exhausted("initiatives".to_string()))
    }

    /// Next child of `parent`: highest existing sequence plus one
    pub fn next_child(&self, parent: &str) -> Result<ArtifactId, AllocationError> {
        let parent_id = validate_parent(parent)?;
        let depth = parent_id.segments().len();

        let highest = self
            .existing
            .iter()
            .filter(|id| {
                id.initiative_code() == parent_id.initiative_code()
                    && id.segments().len() > depth
                    && id.segments()[..depth] == *parent_id.segments()
            })
            .map(|id| id.segments()[depth])
            .max()
            .unwrap_or(0);

        let sequence = highest
            .checked_add(1)
            .ok_or_else(|| AllocationError::Exhausted(parent_id.to_string()))?;
        parent_id
            .child(sequence)
            .ok_or_else(|| AllocationError::InvalidParent(parent.to_string()))
    }

    /// Allocates under `parent`, or a new initiative when there is none
    pub fn next(&self, parent: Option<&str>) -> Result<ArtifactId, AllocationError> {
        match parent {
            Some(parent) => self.next_child(parent),
            None => self.next_initiative(),
        }
    }
}

/// Accepts `^[A-Z]+$` and `^[A-Z]+\.\d+$` only
fn validate_parent(parent: &str) -> Result<ArtifactId, AllocationError> {
    let invalid = || AllocationError::InvalidParent(parent.to_string());
    let id: ArtifactId = parent.parse().map_err(|_| invalid())?;
    match id.artifact_type() {
        ArtifactType::Initiative | ArtifactType::Milestone => Ok(id),
        ArtifactType::Issue => Err(invalid()),
    }
}
