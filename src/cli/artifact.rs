//! Artifact CLI commands (new, show, list, transition, dep)

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use super::output::Output;
use crate::domain::{
    append_event, block_on_dependencies, resolve_dependency_removal, track_added_dependency,
    AppliedChange, Artifact, ArtifactId, ArtifactSet, ArtifactState, ArtifactType, CascadeEngine,
    DependencyGraph, Event, IdAllocator, ReadinessResolver, ResolutionOutcome, Trigger,
    TriggerKind,
};
use crate::storage::Project;

fn find<'a>(set: &'a ArtifactSet, id: &ArtifactId) -> Result<&'a Artifact> {
    set.get(id)
        .ok_or_else(|| anyhow::anyhow!("Artifact not found: {}", id))
}

/// Creates a draft artifact under `parent`, or a new initiative
pub fn new_artifact(
    output: &Output,
    actor: Option<&str>,
    title: &str,
    parent: Option<&str>,
    blocked_by: &[String],
) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.artifact_store();
    let actor = project.actor(actor);
    let set = store.read_all()?;

    // Allocate against every file on disk, including ones that failed to load
    let allocator = IdAllocator::new(store.index()?.into_keys());
    let id = allocator.next(parent)?;
    output.verbose_ctx("new", &format!("Allocated {}", id));

    if let Some(parent_id) = id.parent() {
        if !set.contains(&parent_id) {
            anyhow::bail!("Parent artifact not found: {}", parent_id);
        }
    }

    let now = Utc::now();
    let mut artifact = Artifact::new(id.clone(), title, actor.as_str(), now);
    let mut changed = Vec::new();

    for blocker_str in blocked_by {
        let blocker_id: ArtifactId = blocker_str.parse()?;
        let blocker = find(&set, &blocker_id)?;
        check_same_level(&id, &blocker_id)?;

        artifact.metadata.relationships.add_blocked_by(&blocker_id);
        let mut blocker = blocker.clone();
        if blocker.metadata.relationships.add_blocks(&id) {
            changed.push(blocker);
        }
    }

    if project.config().project.dependencies.auto_block {
        if let Some(blocked) = block_on_dependencies(&artifact, &set, &actor, now)? {
            output.verbose_ctx("new", "Open dependencies, starting blocked");
            artifact = blocked;
        }
    }

    let path = store.write(&artifact)?;
    store.write_many(&changed)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": artifact.id.to_string(),
            "type": artifact.artifact_type(),
            "title": artifact.title(),
            "state": artifact.state(),
            "path": project.relative_path(&path).display().to_string(),
        }));
    } else {
        output.success(&format!(
            "Created {} {}: {} ({})",
            artifact.artifact_type(),
            artifact.id,
            artifact.title(),
            artifact.state()
        ));
    }

    Ok(())
}

/// Dependencies only connect siblings of the same type
fn check_same_level(id: &ArtifactId, blocker: &ArtifactId) -> Result<()> {
    if id == blocker {
        anyhow::bail!("An artifact cannot depend on itself: {}", id);
    }
    if id.artifact_type() != blocker.artifact_type() {
        anyhow::bail!(
            "Cross-level dependency: {} {} cannot be blocked by {} {}",
            id.artifact_type(),
            id,
            blocker.artifact_type(),
            blocker
        );
    }
    if id.parent() != blocker.parent() {
        anyhow::bail!(
            "Dependency crosses scope: {} and {} have different parents",
            id,
            blocker
        );
    }
    Ok(())
}

pub fn show_artifact(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id: ArtifactId = id_str.parse()?;
    let set = project.artifact_store().read_all()?;
    let artifact = find(&set, &id)?;

    let resolver = ReadinessResolver::new(&set);
    let reasons = resolver.blocking_reasons(&id)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": artifact.id.to_string(),
            "type": artifact.artifact_type(),
            "state": artifact.state(),
            "ready": resolver.is_ready(&id)?,
            "blocking_reasons": reasons,
            "metadata": artifact.metadata,
            "content": artifact.content,
        }));
        return Ok(());
    }

    let meta = &artifact.metadata;
    println!("{}: {}", artifact.id, meta.title);
    println!("Type: {}", artifact.artifact_type());
    println!("State: {}", artifact.state());
    println!("Created by: {}", meta.created_by);
    if let Some(assignee) = &meta.assignee {
        println!("Assignee: {}", assignee);
    }
    if let Some(priority) = meta.priority {
        println!("Priority: {:?}", priority);
    }
    if let Some(estimation) = meta.estimation {
        println!("Estimation: {:?}", estimation);
    }

    let summary = artifact.content.summary();
    if !summary.is_empty() {
        println!("\n{}", summary);
    }

    if !meta.relationships.blocked_by.is_empty() {
        println!("\nBlocked by:");
        for dep in &meta.relationships.blocked_by {
            let state = set
                .get_ref(dep)
                .map(|a| a.state().to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("  {} ({})", dep, state);
        }
    }
    if !meta.relationships.blocks.is_empty() {
        println!("\nBlocks: {}", meta.relationships.blocks.join(", "));
    }

    println!("\nEvents:");
    for event in artifact.events() {
        println!(
            "  {:<22} {:<12} {:<24} {}",
            event.timestamp,
            event.event.as_str(),
            event.trigger.to_string(),
            event.actor
        );
    }

    if !reasons.is_empty() {
        println!("\nNot ready:");
        for reason in &reasons {
            println!("  - {}", reason);
        }
    }

    Ok(())
}

pub fn list_artifacts(
    output: &Output,
    kind: Option<ArtifactType>,
    state: Option<ArtifactState>,
) -> Result<()> {
    let project = Project::open_current()?;
    let set = project.artifact_store().read_all()?;

    let artifacts: Vec<_> = set
        .sorted()
        .into_iter()
        .filter(|a| kind.is_none_or(|k| a.artifact_type() == k))
        .filter(|a| state.is_none_or(|s| a.state() == s))
        .collect();

    output.verbose_ctx("list", &format!("{} of {} artifacts match", artifacts.len(), set.len()));

    if output.is_json() {
        let items: Vec<_> = artifacts
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id.to_string(),
                    "type": a.artifact_type(),
                    "state": a.state(),
                    "title": a.title(),
                })
            })
            .collect();
        output.data(&items);
    } else if artifacts.is_empty() {
        println!("No artifacts");
    } else {
        println!("{:<12} {:<11} {:<12} TITLE", "ID", "TYPE", "STATE");
        println!("{}", "-".repeat(70));
        for a in artifacts {
            println!(
                "{:<12} {:<11} {:<12} {}",
                a.id.to_string(),
                a.artifact_type().as_str(),
                a.state().as_str(),
                a.title()
            );
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct TransitionReport {
    id: ArtifactId,
    from: ArtifactState,
    to: ArtifactState,
    changes: Vec<AppliedChange>,
}

/// Appends a validated event, then applies cascades and dependency resolution
pub fn transition(
    output: &Output,
    actor: Option<&str>,
    id_str: &str,
    state: ArtifactState,
    trigger: Option<&str>,
) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.artifact_store();
    let config = &project.config().project;
    let actor = project.actor(actor);

    let id: ArtifactId = id_str.parse()?;
    let set = store.read_all()?;
    let artifact = find(&set, &id)?;
    let from = artifact.state();

    let trigger = trigger
        .map(Trigger::from)
        .unwrap_or_else(|| TriggerKind::Manual.into());
    let now = Utc::now();
    let updated = append_event(artifact, Event::at(state, now, actor.as_str(), trigger))?;

    let mut current = set.with_artifact(updated);
    let mut changes = Vec::new();
    let engine = CascadeEngine::new(config.cascade.actor.as_str());

    if config.cascade.enabled && matches!(state, ArtifactState::InProgress | ArtifactState::Completed) {
        let outcome = engine.propagate(&current, &id, now)?;
        output.verbose_ctx("cascade", &format!("{} parent change(s)", outcome.changes.len()));
        current = outcome.artifacts;
        changes.extend(outcome.changes);
    }

    if state == ArtifactState::Completed {
        let outcome = engine.complete_dependency(&current, &id, now)?;
        output.verbose_ctx("dependencies", &format!("{} dependent change(s)", outcome.changes.len()));
        current = outcome.artifacts;
        changes.extend(outcome.changes);
    }

    let mut to_write: Vec<&ArtifactId> = vec![&id];
    for change in &changes {
        if !to_write.contains(&&change.id) {
            to_write.push(&change.id);
        }
    }
    store.write_many(to_write.into_iter().filter_map(|id| current.get(id)))?;

    let report = TransitionReport {
        id: id.clone(),
        from,
        to: state,
        changes,
    };

    if output.is_json() {
        output.data(&report);
    } else {
        output.success(&format!("{}: {} -> {}", report.id, report.from, report.to));
        for change in &report.changes {
            match change.new_state {
                Some(new_state) => println!("  {} -> {} ({})", change.id, new_state, change.description),
                None => println!("  {} updated ({})", change.id, change.description),
            }
        }
    }

    Ok(())
}

/// Marks an artifact completed with trigger `pr_merged`
pub fn complete(output: &Output, actor: Option<&str>, id_str: &str) -> Result<()> {
    transition(
        output,
        actor,
        id_str,
        ArtifactState::Completed,
        Some(TriggerKind::PrMerged.as_str()),
    )
}

/// Records that `id` is blocked by `blocker`, on both artifacts
pub fn add_dependency(output: &Output, actor: Option<&str>, id_str: &str, blocker_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.artifact_store();
    let actor = project.actor(actor);

    let id: ArtifactId = id_str.parse()?;
    let blocker_id: ArtifactId = blocker_str.parse()?;
    let set = store.read_all()?;

    let mut artifact = find(&set, &id)?.clone();
    let mut blocker = find(&set, &blocker_id)?.clone();
    check_same_level(&id, &blocker_id)?;

    if DependencyGraph::from_artifacts(&set).would_create_cycle(&id, &blocker_id) {
        anyhow::bail!(
            "Adding {} as a blocker of {} would create a circular dependency",
            blocker_id,
            id
        );
    }

    let added = artifact.metadata.relationships.add_blocked_by(&blocker_id);
    let mirrored = blocker.metadata.relationships.add_blocks(&id);
    if !added && !mirrored {
        output.success(&format!("{} already depends on {}", id, blocker_id));
        return Ok(());
    }

    if let Some(tracked) = track_added_dependency(&artifact, &blocker_id, &set) {
        output.verbose_ctx("dep", &format!("{} stays blocked until {} completes", id, blocker_id));
        artifact = tracked;
    } else if project.config().project.dependencies.auto_block {
        let snapshot = set.with_artifact(artifact.clone());
        if let Some(blocked) = block_on_dependencies(&artifact, &snapshot, &actor, Utc::now())? {
            output.verbose_ctx("dep", &format!("{} is now blocked", id));
            artifact = blocked;
        }
    }

    store.write_many([&artifact, &blocker])?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": id.to_string(),
            "blocked_by": blocker_id.to_string(),
            "state": artifact.state(),
        }));
    } else {
        output.success(&format!("{} is now blocked by {}", id, blocker_id));
    }

    Ok(())
}

/// Removes a dependency from both artifacts
///
/// A `blocked` artifact whose last open dependency is removed becomes `ready`.
pub fn remove_dependency(output: &Output, actor: Option<&str>, id_str: &str, blocker_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.artifact_store();
    let actor = project.actor(actor);

    let id: ArtifactId = id_str.parse()?;
    let blocker_id: ArtifactId = blocker_str.parse()?;
    let set = store.read_all()?;

    let mut artifact = find(&set, &id)?.clone();
    let removed = artifact.metadata.relationships.remove_blocked_by(&blocker_id);

    // The blocker may already be gone; clean up whichever side exists
    let blocker = set.get(&blocker_id).cloned().map(|mut b| {
        let mirrored = b.metadata.relationships.remove_blocks(&id);
        (b, mirrored)
    });
    let mirrored = blocker.as_ref().is_some_and(|(_, m)| *m);

    if !removed && !mirrored {
        anyhow::bail!("{} does not depend on {}", id, blocker_id);
    }

    let resolution = resolve_dependency_removal(&artifact, &blocker_id, &actor, Utc::now())?;
    if resolution.outcome == (ResolutionOutcome::AllResolved { unblocked: true }) {
        output.verbose_ctx("undep", &format!("{} has no open dependencies left", id));
    }
    let artifact = resolution.artifact;

    let mut to_write = vec![&artifact];
    if let Some((b, true)) = &blocker {
        to_write.push(b);
    }
    store.write_many(to_write)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": id.to_string(),
            "removed": blocker_id.to_string(),
            "state": artifact.state(),
        }));
    } else {
        output.success(&format!("{} no longer depends on {}", id, blocker_id));
    }

    Ok(())
}
