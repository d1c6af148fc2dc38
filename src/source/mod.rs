//! Manifest and artifact collaborators
//!
//! The reconciler only needs two things from the outside world: the list of
//! applications that should be running, and a way to put an application's
//! files into the working directory before it is launched.

use std::path::{Component, Path};

use async_trait::async_trait;

use crate::domain::AppId;
use crate::error::{RapidError, Result};

pub mod github;
pub mod local;
pub mod mock;

pub use github::{GithubManifest, GithubSync, GithubTarget};
pub use local::{LocalManifest, LocalSync};
pub use mock::{NoopSync, StaticManifest};

/// Snapshot of the artifact tree taken once per poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Every file under the artifact root, relative to it
    pub files: Vec<String>,
    /// Runnable entry points: the desired set
    pub applications: Vec<AppId>,
}

impl Manifest {
    /// Build a manifest, selecting applications by file extension
    pub fn from_files(files: Vec<String>, extension: &str) -> Self {
        let applications = files
            .iter()
            .filter(|f| f.ends_with(extension))
            .cloned()
            .collect();
        Self { files, applications }
    }

    /// Files that belong to an application (path-prefixed by its identity)
    pub fn files_for<'a>(&'a self, app: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .iter()
            .map(String::as_str)
            .filter(move |f| f.starts_with(app))
    }
}

/// Produces the desired application set
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self) -> Result<Manifest>;
}

/// Materializes an application's artifacts in the working directory
#[async_trait]
pub trait ArtifactSync: Send + Sync {
    async fn sync(&self, app: &str, manifest: &Manifest) -> Result<()>;
}

/// Create the working directory, clearing it first when `clean` is set
pub fn prepare_workdir(path: &Path, clean: bool) -> Result<()> {
    if clean && path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// True if `file` is a non-empty relative path that stays below its base
pub(crate) fn is_relative_artifact(file: &str) -> bool {
    !file.is_empty()
        && Path::new(file)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Write a downloaded artifact under the workdir, creating parent directories
pub(crate) async fn write_artifact(workdir: &Path, file: &str, body: &[u8]) -> Result<()> {
    if !is_relative_artifact(file) {
        return Err(RapidError::Sync(format!("refusing to write {:?} outside the workdir", file)));
    }
    let dest = workdir.join(file);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&dest, body).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn files() -> Vec<String> {
        vec![
            "poller.py".to_string(),
            "poller.py.json".to_string(),
            "report/README.md".to_string(),
            "report/main.py".to_string(),
        ]
    }

    #[test]
    fn test_from_files_selects_by_extension() {
        let manifest = Manifest::from_files(files(), ".py");
        assert_eq!(manifest.files.len(), 4);
        assert_eq!(manifest.applications, vec!["poller.py", "report/main.py"]);
    }

    #[test]
    fn test_files_for_uses_prefix() {
        let manifest = Manifest::from_files(files(), ".py");
        let owned: Vec<&str> = manifest.files_for("poller.py").collect();
        assert_eq!(owned, vec!["poller.py", "poller.py.json"]);
    }

    #[test]
    fn test_prepare_workdir_clean() {
        let dir = TempDir::new().unwrap();
        let workdir = dir.path().join("tmp");
        std::fs::create_dir_all(&workdir).unwrap();
        std::fs::write(workdir.join("stale.py"), "# 0").unwrap();

        prepare_workdir(&workdir, true).unwrap();
        assert!(workdir.exists());
        assert!(!workdir.join("stale.py").exists());
    }

    #[test]
    fn test_prepare_workdir_keep() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("kept.py"), "# 0").unwrap();

        prepare_workdir(dir.path(), false).unwrap();
        assert!(dir.path().join("kept.py").exists());
    }

    #[tokio::test]
    async fn test_write_artifact_creates_parents_and_overwrites() {
        let dir = TempDir::new().unwrap();
        write_artifact(dir.path(), "nested/job.py", b"# 1\n").await.unwrap();
        write_artifact(dir.path(), "nested/job.py", b"# 2\n").await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("nested/job.py")).unwrap();
        assert_eq!(content, "# 2\n");
    }

    #[test]
    fn test_relative_artifact_paths() {
        assert!(is_relative_artifact("job.py"));
        assert!(is_relative_artifact("report/main.py"));
        assert!(!is_relative_artifact(""));
        assert!(!is_relative_artifact("/job.py"));
        assert!(!is_relative_artifact("../job.py"));
        assert!(!is_relative_artifact("report/../../job.py"));
    }

    #[tokio::test]
    async fn test_write_artifact_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let workdir = dir.path().join("tmp");

        for file in ["/job.py", "../job.py", "nested/../../job.py"] {
            let err = write_artifact(&workdir, file, b"# 0\n").await.unwrap_err();
            assert!(matches!(err, RapidError::Sync(_)), "{} should be rejected", file);
        }
        assert!(!dir.path().join("job.py").exists());
    }
}
