//! YAML storage for artifacts
//!
//! Each artifact lives in its own `<ID>.yml` file, nested by hierarchy:
//!
//! ```text
//! .kodebase/artifacts/
//! └── A/
//!     ├── A.yml
//!     └── A.1/
//!         ├── A.1.yml
//!         └── A.1.1.yml
//! ```
//!
//! The ID comes from the file name; anything after the ID (`A.1.1.fix-parser.yml`)
//! is a free-form slug. Reads take a shared lock, writes go through a locked
//! temp file and an atomic rename.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{debug, warn};

use super::config::KODEBASE_DIR;
use crate::domain::{Artifact, ArtifactId, ArtifactSet, RawDocument};

/// A file that could not be loaded
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Result of scanning the store
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub artifacts: ArtifactSet,
    pub failures: Vec<LoadFailure>,
}

/// Store for artifact documents in YAML format
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(KODEBASE_DIR).join("artifacts"))
    }

    /// Returns the artifacts directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical location for a new artifact file
    pub fn canonical_path(&self, id: &ArtifactId) -> PathBuf {
        let mut path = self.dir.clone();
        let mut chain = id.ancestors();
        chain.reverse();
        for ancestor in &chain {
            path.push(ancestor.to_string());
        }
        if id.artifact_type().child_type().is_some() {
            path.push(id.to_string());
        }
        path.push(format!("{}.yml", id));
        path
    }

    /// Maps every artifact ID on disk to its file
    ///
    /// When two files claim the same ID, the first in path order wins.
    pub fn index(&self) -> Result<HashMap<ArtifactId, PathBuf>> {
        let mut index: HashMap<ArtifactId, PathBuf> = HashMap::new();
        for path in self.files()? {
            let Some(id) = id_from_path(&path) else {
                debug!(path = %path.display(), "Skipping file without an artifact ID");
                continue;
            };
            if let Some(existing) = index.get(&id) {
                warn!(
                    %id,
                    kept = %existing.display(),
                    ignored = %path.display(),
                    "Duplicate artifact file"
                );
                continue;
            }
            index.insert(id, path);
        }
        Ok(index)
    }

    /// All `.yml`/`.yaml` files below the store directory, sorted
    fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.dir.is_dir() {
            return Ok(files);
        }

        let mut pending = vec![self.dir.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir)
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
            for entry in entries {
                let path = entry
                    .with_context(|| format!("Failed to read directory: {}", dir.display()))?
                    .path();
                if path.is_dir() {
                    pending.push(path);
                } else if is_yaml(&path) {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Reads every artifact, collecting files that fail to load
    pub fn load(&self) -> Result<Loaded> {
        let mut loaded = Loaded::default();
        let mut index: Vec<_> = self.index()?.into_iter().collect();
        index.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, path) in index {
            match read_artifact(&path, id) {
                Ok(artifact) => loaded.artifacts.insert(artifact),
                Err(e) => {
                    let message = format!("{:#}", e);
                    warn!(path = %path.display(), error = %message, "Skipping unreadable artifact");
                    loaded.failures.push(LoadFailure { path, message });
                }
            }
        }

        debug!(
            count = loaded.artifacts.len(),
            failures = loaded.failures.len(),
            "Loaded artifacts"
        );
        Ok(loaded)
    }

    /// Reads every loadable artifact
    pub fn read_all(&self) -> Result<ArtifactSet> {
        Ok(self.load()?.artifacts)
    }

    /// Writes one artifact, in place if it already has a file
    pub fn write(&self, artifact: &Artifact) -> Result<PathBuf> {
        let index = self.index()?;
        self.write_indexed(artifact, &index)
    }

    /// Writes several artifacts with a single directory scan
    pub fn write_many<'a>(&self, artifacts: impl IntoIterator<Item = &'a Artifact>) -> Result<usize> {
        let index = self.index()?;
        let mut count = 0;
        for artifact in artifacts {
            self.write_indexed(artifact, &index)?;
            count += 1;
        }
        Ok(count)
    }

    fn write_indexed(&self, artifact: &Artifact, index: &HashMap<ArtifactId, PathBuf>) -> Result<PathBuf> {
        let path = index
            .get(&artifact.id)
            .cloned()
            .unwrap_or_else(|| self.canonical_path(&artifact.id));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        // Write to temp file first
        let temp_path = path.with_extension("yml.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .with_context(|| format!("Failed to acquire write lock on {}", temp_path.display()))?;

            let mut writer = BufWriter::new(&file);
            serde_yaml::to_writer(&mut writer, &artifact.document())
                .with_context(|| format!("Failed to serialize artifact {}", artifact.id))?;
            writer.flush().context("Failed to flush artifact file")?;
        }

        // Atomic rename
        fs::rename(&temp_path, &path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            )
        })?;

        debug!(id = %artifact.id, path = %path.display(), "Wrote artifact");
        Ok(path)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

/// `A.1.2.yml` and `A.1.2.fix-parser.yml` both map to `A.1.2`
fn id_from_path(path: &Path) -> Option<ArtifactId> {
    let stem = path.file_stem()?.to_str()?;
    ArtifactId::parse_prefix(stem)
}

fn read_artifact(path: &Path, id: ArtifactId) -> Result<Artifact> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    // Acquire shared lock for reading
    file.lock_shared()
        .with_context(|| format!("Failed to acquire read lock on {}", path.display()))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let doc: RawDocument = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Artifact::from_document(id, doc).with_context(|| format!("Invalid artifact in {}", path.display()))
}
