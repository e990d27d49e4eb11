//! Project management
//!
//! Handles project initialization and provides access to the artifact store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::KODEBASE_DIR;
use super::{ArtifactStore, Config};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a kodebase project. Run 'kodebase init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# kodebase configuration

# Default actor for new events, "Name (email)"
# actor = "Ada Lovelace (ada@example.com)"

[cascade]
# Move parents forward when their children start or complete
enabled = true
actor = "System Cascade (cascade@completion)"

[dependencies]
# Block new drafts whose dependencies are not completed
auto_block = true
"#;

const GITIGNORE: &str = r#"# Interrupted writes
*.tmp
"#;

/// A kodebase project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(KODEBASE_DIR).is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    ///
    /// Existing files are left alone, so running it twice is harmless.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let kodebase_dir = root.join(KODEBASE_DIR);

        let artifacts_dir = kodebase_dir.join("artifacts");
        fs::create_dir_all(&artifacts_dir).with_context(|| {
            format!(
                "Failed to create artifacts directory: {}",
                artifacts_dir.display()
            )
        })?;

        let config_path = kodebase_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = kodebase_dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, GITIGNORE).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .kodebase directory path
    pub fn kodebase_dir(&self) -> PathBuf {
        self.root.join(KODEBASE_DIR)
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the artifact store
    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::for_project(&self.root)
    }

    /// Resolves the acting user, see [`Config::effective_actor`]
    pub fn actor(&self, explicit: Option<&str>) -> String {
        self.config.effective_actor(explicit)
    }

    /// Returns a path relative to the project root, for display
    pub fn relative_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
