/// Project root detection logic
///
/// Every correction carries the project it was captured in, and a review
/// run needs the root of the project it runs from. Git decides first; if
/// there is no repository, common project markers do.

use crate::error::{ReflectError, Result};
use git2::Repository;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project root detection markers
const PROJECT_MARKERS: &[&str] = &[
    ".git",
    ".claude",
    "CLAUDE.md",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "requirements.txt",
    "Gemfile",
    "composer.json",
];

/// Handles project root detection
pub struct ProjectDetector;

impl ProjectDetector {
    /// Detect the project root from a given path
    ///
    /// The working tree of the enclosing git repository if there is one,
    /// else the nearest ancestor holding a project marker, else the path itself.
    ///
    /// # Examples
    /// ```no_run
    /// use reflect_lib::core::ProjectDetector;
    /// use std::env;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let cwd = env::current_dir()?;
    /// let project_root = ProjectDetector::detect(&cwd)?;
    /// println!("Project root: {}", project_root.display());
    /// # Ok(())
    /// # }
    /// ```
    pub fn detect<P: AsRef<Path>>(start_path: P) -> Result<PathBuf> {
        let absolute_path = Self::absolute(start_path.as_ref())?;

        if let Some(root) = Self::git_root(&absolute_path) {
            debug!(root = %root.display(), "Project root from git");
            return Ok(root);
        }

        Ok(Self::marker_root(&absolute_path).unwrap_or(absolute_path))
    }

    /// Like `detect`, but a path with no repository and no marker is an error
    pub fn detect_strict<P: AsRef<Path>>(start_path: P) -> Result<PathBuf> {
        let absolute_path = Self::absolute(start_path.as_ref())?;

        Self::git_root(&absolute_path)
            .or_else(|| Self::marker_root(&absolute_path))
            .ok_or_else(|| ReflectError::ProjectRootNotFound(absolute_path.display().to_string()))
    }

    fn absolute(path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(path))
        }
    }

    fn git_root(path: &Path) -> Option<PathBuf> {
        let repo = Repository::discover(path).ok()?;
        let workdir = repo.workdir()?;
        // git2 hands back a trailing separator
        Some(workdir.components().collect())
    }

    // Walk up the directory tree looking for markers
    fn marker_root(path: &Path) -> Option<PathBuf> {
        path.ancestors()
            .find(|dir| {
                PROJECT_MARKERS
                    .iter()
                    .any(|marker| dir.join(marker).exists())
            })
            .map(Path::to_path_buf)
    }

    /// Get the project name from the root path
    pub fn get_project_name<P: AsRef<Path>>(project_root: P) -> Option<String> {
        project_root
            .as_ref()
            .file_name()
            .and_then(|name| name.to_str())
            .map(|s| s.to_string())
    }

    /// Detect if path is inside a git repository
    pub fn is_git_repo<P: AsRef<Path>>(path: P) -> bool {
        Repository::discover(path.as_ref()).is_ok()
    }
}
