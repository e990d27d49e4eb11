//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::output::{Output, OutputFormat};
use super::{artifact, context, query};
use crate::domain::{ArtifactState, ArtifactType};
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "kodebase")]
#[command(author, version, about = "File-based artifact tracking with an event-sourced lifecycle")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Actor recorded on new events, "Name (email)"
    #[arg(long, global = true)]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new kodebase project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Create an artifact with the next free ID
    ///
    /// Examples:
    ///   kodebase new "Platform"                    # Initiative
    ///   kodebase new "Parser" --parent A           # Milestone under A
    ///   kodebase new "Lexer" --parent A.1          # Issue under A.1
    New {
        /// Artifact title
        title: String,

        /// Parent initiative or milestone
        #[arg(long)]
        parent: Option<String>,

        /// Sibling that must complete first (repeatable)
        #[arg(long = "blocked-by")]
        blocked_by: Vec<String>,
    },

    /// Show artifact details
    Show {
        /// Artifact ID
        id: String,
    },

    /// List artifacts
    List {
        /// Only this type
        #[arg(long = "type")]
        kind: Option<ArtifactType>,

        /// Only this state
        #[arg(long)]
        state: Option<ArtifactState>,
    },

    /// Move an artifact to a new state
    Transition {
        /// Artifact ID
        id: String,

        /// Target state (draft, ready, blocked, cancelled, in_progress, in_review, completed, archived)
        state: ArtifactState,

        /// Trigger recorded on the event (default: manual)
        #[arg(long)]
        trigger: Option<String>,
    },

    /// Mark an artifact completed (trigger: pr_merged)
    Complete {
        /// Artifact ID
        id: String,
    },

    /// Add a dependency between siblings
    Dep {
        /// Artifact that will be blocked
        id: String,

        /// Artifact that must be completed first
        blocker: String,
    },

    /// Remove a dependency
    Undep {
        /// Artifact to unblock
        id: String,

        /// Dependency to remove
        blocker: String,
    },

    /// Show artifacts ready to work on
    Ready,

    /// Show blocked artifacts
    Blocked,

    /// Explain what blocks an artifact
    Why {
        /// Artifact ID
        id: String,
    },

    /// Validate event logs and dependencies
    Validate,

    /// Export a markdown digest of an artifact and its descendants
    Context {
        /// Artifact ID
        id: String,
    },
}

/// Installs the stderr log subscriber
///
/// `KODEBASE_LOG` sets the filter (default `warn`); `--verbose` forces `debug`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("KODEBASE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = match cli.format {
        Some(format) => format,
        None => Config::load_global()?.default_format.into(),
    };
    let output = Output::new(format, cli.verbose);
    let actor = cli.actor.as_deref();

    output.verbose("kodebase starting");

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing project at: {}", path));
            let project = Project::init(&path)?;
            output.verbose_ctx(
                "init",
                &format!("Created .kodebase directory at: {}", project.kodebase_dir().display()),
            );
            output.success(&format!(
                "Initialized kodebase project at {}",
                project.root().display()
            ));
        }

        Commands::New {
            title,
            parent,
            blocked_by,
        } => artifact::new_artifact(&output, actor, &title, parent.as_deref(), &blocked_by)?,
        Commands::Show { id } => artifact::show_artifact(&output, &id)?,
        Commands::List { kind, state } => artifact::list_artifacts(&output, kind, state)?,
        Commands::Transition { id, state, trigger } => {
            artifact::transition(&output, actor, &id, state, trigger.as_deref())?
        }
        Commands::Complete { id } => artifact::complete(&output, actor, &id)?,
        Commands::Dep { id, blocker } => artifact::add_dependency(&output, actor, &id, &blocker)?,
        Commands::Undep { id, blocker } => {
            artifact::remove_dependency(&output, actor, &id, &blocker)?
        }

        Commands::Ready => query::ready(&output)?,
        Commands::Blocked => query::blocked(&output)?,
        Commands::Why { id } => query::why(&output, &id)?,
        Commands::Validate => query::validate(&output)?,
        Commands::Context { id } => context::export(&output, &id)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}
