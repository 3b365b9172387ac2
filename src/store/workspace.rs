//! Per-project on-disk layout.
//!
//! All coordination state for a project lives under a single hidden directory
//! inside the project root:
//!
//! ```text
//! <project>/.agent-workspaces/
//!   coord.log            # live event log, one JSON object per line
//!   coord.log.1 … .N     # rotated generations (oldest highest N, capped)
//!   coord.log.lock       # meta-lock directory (transient)
//!   coord-snapshot.json  # cached snapshot
//! ```
//!
//! A `Workspace` is a cheap handle over these paths; it never touches the disk
//! except through [`Workspace::ensure_dir`].

use std::io;
use std::path::{Path, PathBuf};

/// Name of the coordination directory inside a project root.
pub const COORD_DIR: &str = ".agent-workspaces";

/// Filename of the live event log.
pub const LOG_FILE: &str = "coord.log";

/// Filename of the cached snapshot.
pub const SNAPSHOT_FILE: &str = "coord-snapshot.json";

/// Name of the meta-lock directory guarding log appends and rotation.
pub const META_LOCK_DIR: &str = "coord.log.lock";

/// Handle to one project's coordination directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    dir: PathBuf,
}

impl Workspace {
    /// Creates a handle for the given project root. Does not touch the disk.
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let dir = root.join(COORD_DIR);
        Workspace { root, dir }
    }

    /// The project root this workspace coordinates.
    pub fn project_root(&self) -> &Path {
        &self.root
    }

    /// The coordination directory (`<project>/.agent-workspaces`).
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the live event log.
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// Path to rotated log generation `n` (1-based; 1 is the most recent).
    pub fn rotated_log_path(&self, n: u32) -> PathBuf {
        self.dir.join(format!("{}.{}", LOG_FILE, n))
    }

    /// Path to the meta-lock directory.
    pub fn meta_lock_path(&self) -> PathBuf {
        self.dir.join(META_LOCK_DIR)
    }

    /// Path to the cached snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Resolves a project-relative content file path to an absolute path.
    pub fn resolve(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Creates the coordination directory if missing.
    ///
    /// Fails if the project root itself does not exist; coordination never
    /// invents a project directory.
    pub fn ensure_dir(&self) -> io::Result<()> {
        if !self.root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("project root not found: {}", self.root.display()),
            ));
        }
        std::fs::create_dir_all(&self.dir)
    }

    /// Lists rotated generation numbers currently present, ascending.
    pub fn rotated_generations(&self) -> io::Result<Vec<u32>> {
        let mut generations = Vec::new();

        if !self.dir.exists() {
            return Ok(generations);
        }

        let prefix = format!("{}.", LOG_FILE);
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if let Some(suffix) = name.strip_prefix(&prefix) {
                if let Ok(n) = suffix.parse::<u32>() {
                    generations.push(n);
                }
            }
        }

        generations.sort_unstable();
        Ok(generations)
    }
}
