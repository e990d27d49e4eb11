//! Query commands (ready, blocked, why, validate)

use anyhow::Result;
use serde::Serialize;

use super::output::Output;
use crate::domain::{validate_dependencies, validate_event_log, ArtifactId, IssueReport, ReadinessResolver};
use crate::storage::Project;

/// Show artifacts ready to work on
pub fn ready(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    output.verbose_ctx(
        "ready",
        &format!("Opened project at: {}", project.root().display()),
    );

    let set = project.artifact_store().read_all()?;
    let resolver = ReadinessResolver::new(&set);
    let ready = resolver.ready_artifacts();

    output.verbose_ctx("ready", &format!("Found {} ready artifacts", ready.len()));

    if output.is_json() {
        let items: Vec<_> = ready
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id.to_string(),
                    "type": a.artifact_type(),
                    "title": a.title(),
                })
            })
            .collect();
        output.data(&items);
    } else if ready.is_empty() {
        println!("No artifacts ready to work on.");
    } else {
        println!("Ready ({}):", ready.len());
        println!("{:<12} TITLE", "ID");
        println!("{}", "-".repeat(60));
        for artifact in ready {
            println!("{:<12} {}", artifact.id.to_string(), artifact.title());
        }
    }

    Ok(())
}

/// Show open artifacts that cannot be worked on, with reasons
pub fn blocked(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    output.verbose_ctx(
        "blocked",
        &format!("Opened project at: {}", project.root().display()),
    );

    let set = project.artifact_store().read_all()?;
    let resolver = ReadinessResolver::new(&set);
    let blocked = resolver.blocked_artifacts();

    output.verbose_ctx("blocked", &format!("Found {} blocked artifacts", blocked.len()));

    if output.is_json() {
        let items: Vec<_> = blocked
            .iter()
            .map(|(a, reasons)| {
                serde_json::json!({
                    "id": a.id.to_string(),
                    "state": a.state(),
                    "title": a.title(),
                    "reasons": reasons,
                })
            })
            .collect();
        output.data(&items);
    } else if blocked.is_empty() {
        println!("No blocked artifacts.");
    } else {
        println!("Blocked ({}):", blocked.len());
        println!("{:<12} {:<12} TITLE", "ID", "STATE");
        println!("{}", "-".repeat(60));
        for (artifact, reasons) in blocked {
            println!(
                "{:<12} {:<12} {}",
                artifact.id.to_string(),
                artifact.state().as_str(),
                artifact.title()
            );
            for reason in reasons {
                println!("             - {}", reason);
            }
        }
    }

    Ok(())
}

/// Explain why an artifact is or is not actionable
pub fn why(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id: ArtifactId = id_str.parse()?;
    let set = project.artifact_store().read_all()?;

    let resolver = ReadinessResolver::new(&set);
    let ready = resolver.is_ready(&id)?;
    let can_start = resolver.can_transition_to_in_progress(&id)?;
    let reasons = resolver.blocking_reasons(&id)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": id.to_string(),
            "ready": ready,
            "can_start": can_start,
            "reasons": reasons,
        }));
    } else if reasons.is_empty() {
        if can_start {
            println!("{} is ready and can move to in_progress.", id);
        } else {
            println!("{} has nothing blocking it.", id);
        }
    } else {
        println!("{} is not ready:", id);
        for reason in &reasons {
            println!("  - {}", reason);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    artifacts: usize,
    valid: bool,
    issues: Vec<IssueReport>,
}

/// Check every event log and the dependency graph
///
/// Fails when any issue is found, after reporting all of them.
pub fn validate(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let loaded = project.artifact_store().load()?;
    let set = &loaded.artifacts;

    let mut issues: Vec<IssueReport> = loaded
        .failures
        .iter()
        .map(|failure| IssueReport {
            code: "PARSE_ERROR",
            message: failure.message.clone(),
            path: Some(project.relative_path(&failure.path).display().to_string()),
        })
        .collect();

    for artifact in set.sorted() {
        if let Err(e) = validate_event_log(artifact.artifact_type(), artifact.events()) {
            issues.push(IssueReport {
                code: e.code(),
                message: format!("{}: {}", artifact.id, e),
                path: Some(format!("{}:metadata.events", artifact.id)),
            });
        }
    }

    issues.extend(validate_dependencies(set).iter().map(|issue| issue.report()));
    output.verbose_ctx(
        "validate",
        &format!("Checked {} artifacts, {} issues", set.len(), issues.len()),
    );

    let report = ValidationReport {
        artifacts: set.len(),
        valid: issues.is_empty(),
        issues,
    };

    if output.is_json() {
        output.data(&report);
    } else if report.valid {
        output.success(&format!("All {} artifacts are valid", report.artifacts));
    } else {
        for issue in &report.issues {
            match &issue.path {
                Some(path) => println!("[{}] {} ({})", issue.code, issue.message, path),
                None => println!("[{}] {}", issue.code, issue.message),
            }
        }
        output.blank();
    }

    if !report.valid {
        anyhow::bail!("Validation found {} issue(s)", report.issues.len());
    }
    Ok(())
}
