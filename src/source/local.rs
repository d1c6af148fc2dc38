//! Manifest and sync backed by a local directory tree.
//!
//! Lets a host supervise scripts from a checkout or a mounted volume without
//! talking to GitHub.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{RapidError, Result};
use crate::source::{ArtifactSync, Manifest, ManifestSource, write_artifact};

/// List every file under `root` as a `/`-separated relative path
fn list_files(root: &Path) -> Result<Vec<String>> {
    let pattern = root.join("**").join("*");
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern)
        .map_err(|e| RapidError::Manifest(format!("bad source path {}: {}", root.display(), e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| RapidError::Manifest(e.to_string()))?;
        if !path.is_file() {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(parts.join("/"));
        }
    }
    files.sort();
    Ok(files)
}

pub struct LocalManifest {
    root: PathBuf,
    extension: String,
}

impl LocalManifest {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }
}

#[async_trait]
impl ManifestSource for LocalManifest {
    async fn fetch(&self) -> Result<Manifest> {
        if !self.root.is_dir() {
            return Err(RapidError::Manifest(format!(
                "source directory {} does not exist",
                self.root.display()
            )));
        }
        let files = list_files(&self.root)?;
        Ok(Manifest::from_files(files, &self.extension))
    }
}

pub struct LocalSync {
    root: PathBuf,
    workdir: PathBuf,
}

impl LocalSync {
    pub fn new(root: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl ArtifactSync for LocalSync {
    async fn sync(&self, app: &str, manifest: &Manifest) -> Result<()> {
        for file in manifest.files_for(app) {
            let source = self.root.join(file);
            let body = tokio::fs::read(&source)
                .await
                .map_err(|e| RapidError::Sync(format!("{}: {}", source.display(), e)))?;
            write_artifact(&self.workdir, file, &body).await?;
        }
        Ok(())
    }
}
