//! Context export: a markdown digest of an artifact and its descendants

use anyhow::Result;
use serde::Serialize;

use super::output::Output;
use crate::domain::{Artifact, ArtifactContent, ArtifactId, ArtifactSet, ArtifactState, ArtifactType};
use crate::storage::Project;

#[derive(Debug, Serialize)]
struct Node {
    id: ArtifactId,
    #[serde(rename = "type")]
    kind: ArtifactType,
    title: String,
    state: ArtifactState,
    summary: String,
    blocked_by: Vec<String>,
    children: Vec<Node>,
}

impl Node {
    fn build(artifact: &Artifact, set: &ArtifactSet) -> Self {
        Self {
            id: artifact.id.clone(),
            kind: artifact.artifact_type(),
            title: artifact.title().to_string(),
            state: artifact.state(),
            summary: artifact.content.summary().to_string(),
            blocked_by: artifact.relationships().blocked_by.clone(),
            children: set
                .children(&artifact.id)
                .into_iter()
                .map(|child| Node::build(child, set))
                .collect(),
        }
    }

    /// (completed, total) over direct children
    fn progress(&self) -> (usize, usize) {
        let done = self
            .children
            .iter()
            .filter(|c| c.state == ArtifactState::Completed)
            .count();
        (done, self.children.len())
    }
}

/// Export an artifact with its children as markdown (or JSON)
pub fn export(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id: ArtifactId = id_str.parse()?;
    let set = project.artifact_store().read_all()?;

    let artifact = set
        .get(&id)
        .ok_or_else(|| anyhow::anyhow!("Artifact not found: {}", id))?;
    let tree = Node::build(artifact, &set);
    output.verbose_ctx(
        "context",
        &format!("{} has {} direct children", id, tree.children.len()),
    );

    if output.is_json() {
        let (completed, total) = tree.progress();
        output.data(&serde_json::json!({
            "artifact": tree,
            "progress": { "completed": completed, "total": total },
        }));
    } else {
        print!("{}", render(artifact, &tree));
    }

    Ok(())
}

fn render(artifact: &Artifact, tree: &Node) -> String {
    let mut lines = vec![
        format!("# {} {}: {}", capitalize(tree.kind.as_str()), tree.id, tree.title),
        String::new(),
        format!("**State:** {}", tree.state),
    ];

    if !tree.children.is_empty() {
        let (done, total) = tree.progress();
        lines.push(format!("**Progress:** {}/{} completed", done, total));
    }
    if !tree.blocked_by.is_empty() {
        lines.push(format!("**Blocked by:** {}", tree.blocked_by.join(", ")));
    }

    lines.extend(content_lines(&artifact.content));

    if let Some(child_type) = tree.kind.child_type() {
        lines.push(String::new());
        lines.push(format!("## {}s", capitalize(child_type.as_str())));
        lines.push(String::new());
        if tree.children.is_empty() {
            lines.push("_None yet._".to_string());
        }
        for child in &tree.children {
            child_lines(&mut lines, child, 0);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn content_lines(content: &ArtifactContent) -> Vec<String> {
    let (texts, lists): (Vec<(&str, &str)>, Vec<(&str, &[String])>) = match content {
        ArtifactContent::Initiative(c) => (
            vec![("Vision", c.vision.as_str()), ("Scope", c.scope.as_str())],
            vec![("Success criteria", c.success_criteria.as_slice())],
        ),
        ArtifactContent::Milestone(c) => (
            vec![("Summary", c.summary.as_str())],
            vec![
                ("Deliverables", c.deliverables.as_slice()),
                ("Validation", c.validation.as_slice()),
            ],
        ),
        ArtifactContent::Issue(c) => (
            vec![("Summary", c.summary.as_str())],
            vec![("Acceptance criteria", c.acceptance_criteria.as_slice())],
        ),
    };

    let mut lines = Vec::new();
    for (heading, text) in texts {
        if text.trim().is_empty() {
            continue;
        }
        lines.extend([String::new(), format!("## {}", heading), String::new()]);
        lines.push(text.trim().to_string());
    }
    for (heading, items) in lists {
        if items.is_empty() {
            continue;
        }
        lines.extend([String::new(), format!("## {}", heading), String::new()]);
        lines.extend(items.iter().map(|item| format!("- {}", item)));
    }
    lines
}

fn child_lines(lines: &mut Vec<String>, node: &Node, depth: usize) {
    let mark = if node.state == ArtifactState::Completed { "x" } else { " " };
    lines.push(format!(
        "{}- [{}] {} {} ({})",
        "  ".repeat(depth),
        mark,
        node.id,
        node.title,
        node.state
    ));
    for child in &node.children {
        child_lines(lines, child, depth + 1);
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, TriggerKind};
    use chrono::{TimeZone, Utc};

    fn make(id: &str, title: &str, states: &[ArtifactState]) -> Artifact {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut artifact = Artifact::new(id.parse().unwrap(), title, "tester", ts);
        for state in states {
            artifact
                .metadata
                .events
                .push(Event::at(*state, ts, "tester", TriggerKind::Manual));
        }
        artifact
    }

    #[test]
    fn milestone_digest() {
        use ArtifactState::*;
        let mut milestone = make("A.1", "Parser", &[Ready, InProgress]);
        if let ArtifactContent::Milestone(c) = &mut milestone.content {
            c.summary = "Parse everything".to_string();
            c.deliverables = vec!["Lexer".to_string()];
        }
        let set = ArtifactSet::from_artifacts([
            milestone.clone(),
            make("A.1.1", "Lexer", &[Ready, InProgress, InReview, Completed]),
            make("A.1.2", "Grammar", &[Ready]),
        ]);

        let tree = Node::build(&milestone, &set);
        let text = render(&milestone, &tree);

        assert!(text.starts_with("# Milestone A.1: Parser\n"));
        assert!(text.contains("**Progress:** 1/2 completed"));
        assert!(text.contains("## Summary\n\nParse everything\n"));
        assert!(text.contains("## Deliverables\n\n- Lexer\n"));
        assert!(text.contains("## Issues\n"));
        assert!(text.contains("- [x] A.1.1 Lexer (completed)"));
        assert!(text.contains("- [ ] A.1.2 Grammar (ready)"));
    }

    #[test]
    fn initiative_nests_issues() {
        let initiative = make("B", "Platform", &[]);
        let set = ArtifactSet::from_artifacts([
            initiative.clone(),
            make("B.1", "Core", &[]),
            make("B.1.1", "Setup", &[]),
        ]);

        let text = render(&initiative, &Node::build(&initiative, &set));
        assert!(text.contains("## Milestones\n"));
        assert!(text.contains("- [ ] B.1 Core (draft)\n  - [ ] B.1.1 Setup (draft)"));
    }

    #[test]
    fn initiative_sections_in_order() {
        let mut initiative = make("C", "Tooling", &[]);
        initiative.metadata.relationships.blocked_by = vec!["B".to_string()];
        if let ArtifactContent::Initiative(c) = &mut initiative.content {
            c.vision = "  Fast builds  ".to_string();
            c.success_criteria = vec!["Under a minute".to_string()];
        }
        let set = ArtifactSet::from_artifacts([initiative.clone()]);

        let text = render(&initiative, &Node::build(&initiative, &set));
        assert!(text.contains("**Blocked by:** B\n"));
        assert!(!text.contains("## Scope"));
        let vision = text.find("## Vision\n\nFast builds\n").unwrap();
        let criteria = text.find("## Success criteria\n\n- Under a minute\n").unwrap();
        assert!(vision < criteria);
        assert!(text.ends_with("## Milestones\n\n_None yet._\n"));
    }

    #[test]
    fn issue_has_no_children_section() {
        let issue = make("A.1.1", "Lexer", &[]);
        let set = ArtifactSet::from_artifacts([issue.clone()]);
        let text = render(&issue, &Node::build(&issue, &set));
        assert!(!text.contains("## Issue"));
    }
}
