//! # Storage Layer
//!
//! Persistence layer for kodebase with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Artifacts | YAML, one file per artifact | `.kodebase/artifacts/**/{id}.yml` |
//! | Config | TOML | `.kodebase/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`ArtifactStore`] takes a shared `fs2` lock for reads and an exclusive one for writes
//! - All writes are atomic (temp file + rename)
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a kodebase project
//! - [`ArtifactStore`] - Read/write artifacts as YAML
//! - [`Config`] - Project and global configuration

mod yaml;
mod config;
mod project;

pub use yaml::{ArtifactStore, LoadFailure, Loaded};
pub use config::{
    CascadeConfig, Config, ConfigError, DependencyConfig, GlobalConfig, OutputFormat as ConfigFormat,
    ProjectConfig, KODEBASE_DIR,
};
pub use project::{Project, ProjectError};
