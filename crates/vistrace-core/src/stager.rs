//! Environment staging: an isolated, writable copy of the files a run
//! instruments in place.

use std::{
    fs,
    io,
    path::{Component, Path, PathBuf},
};

use tempfile::TempDir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("root directory {0} does not exist")]
    RootMissing(PathBuf),

    #[error("{0} must be a relative path inside the root directory")]
    OutsideRoot(PathBuf),

    #[error("failed to stage {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create staging directory: {0}")]
    TempDir(#[source] io::Error),

    #[error("failed to remove staging directory: {0}")]
    Teardown(#[source] io::Error),
}

pub trait Stager {
    /// Copy `files` (relative to `root`) into a fresh directory
    fn stage(&self, root: &Path, files: &[PathBuf]) -> Result<StagedEnvironment, EnvironmentError>;
}

/// A staged copy. Dropping it removes the directory.
#[derive(Debug)]
pub struct StagedEnvironment {
    dir: TempDir,
    files: Vec<PathBuf>,
}

impl StagedEnvironment {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Relative paths of the staged files, in staging order
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn staged_path(&self, relative: &Path) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Keep the directory on disk and return its path
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }

    pub fn teardown(self) -> Result<(), EnvironmentError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(EnvironmentError::Teardown)?;
        tracing::debug!(path = %path.display(), "staging directory removed");
        Ok(())
    }
}

/// Stages into a temporary directory
#[derive(Debug, Clone)]
pub struct TempDirStager {
    prefix: String,
}

impl Default for TempDirStager {
    fn default() -> Self {
        Self {
            prefix: "vistrace-".to_string(),
        }
    }
}

impl TempDirStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl Stager for TempDirStager {
    fn stage(&self, root: &Path, files: &[PathBuf]) -> Result<StagedEnvironment, EnvironmentError> {
        if !root.is_dir() {
            return Err(EnvironmentError::RootMissing(root.to_path_buf()));
        }
        let dir = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempdir()
            .map_err(EnvironmentError::TempDir)?;

        for file in files {
            if !is_contained(file) {
                return Err(EnvironmentError::OutsideRoot(file.clone()));
            }
            let destination = dir.path().join(file);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|source| EnvironmentError::Copy {
                    path: file.clone(),
                    source,
                })?;
            }
            fs::copy(root.join(file), &destination).map_err(|source| EnvironmentError::Copy {
                path: file.clone(),
                source,
            })?;
        }
        tracing::info!(
            root = %root.display(),
            staged = %dir.path().display(),
            files = files.len(),
            "environment staged"
        );

        Ok(StagedEnvironment {
            dir,
            files: files.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_copies_nested_files() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("lib")).unwrap();
        fs::write(root.path().join("main.vt"), "a = 1;\n").unwrap();
        fs::write(root.path().join("lib/util.vt"), "b = 2;\n").unwrap();

        let files = vec![PathBuf::from("main.vt"), PathBuf::from("lib/util.vt")];
        let staged = TempDirStager::new().stage(root.path(), &files).unwrap();

        let copied = fs::read_to_string(staged.staged_path(Path::new("lib/util.vt"))).unwrap();
        assert_eq!(copied, "b = 2;\n");
        // Writes to the copy leave the original alone
        fs::write(staged.staged_path(Path::new("main.vt")), "changed").unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("main.vt")).unwrap(),
            "a = 1;\n"
        );

        let path = staged.path().to_path_buf();
        staged.teardown().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_stage_rejects_escaping_paths() {
        let root = tempfile::tempdir().unwrap();
        let err = TempDirStager::new()
            .stage(root.path(), &[PathBuf::from("../secret.vt")])
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::OutsideRoot(_)));
    }

    #[test]
    fn test_stage_reports_missing_files_and_root() {
        let root = tempfile::tempdir().unwrap();
        let err = TempDirStager::new()
            .stage(root.path(), &[PathBuf::from("missing.vt")])
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::Copy { .. }));

        let err = TempDirStager::new()
            .stage(&root.path().join("nowhere"), &[])
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::RootMissing(_)));
    }

    #[test]
    fn test_kept_environment_survives() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("main.vt"), "a = 1;\n").unwrap();
        let staged = TempDirStager::new()
            .stage(root.path(), &[PathBuf::from("main.vt")])
            .unwrap();

        let kept = staged.keep();
        assert!(kept.join("main.vt").exists());
        fs::remove_dir_all(kept).unwrap();
    }
}
