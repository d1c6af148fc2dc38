//! In-memory collaborators for tests and embedding.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::AppId;
use crate::error::{RapidError, Result};
use crate::source::{ArtifactSync, Manifest, ManifestSource};

/// Manifest whose contents are set programmatically
#[derive(Debug, Default)]
pub struct StaticManifest {
    manifest: Mutex<Manifest>,
    failure: Mutex<Option<String>>,
}

impl StaticManifest {
    /// Manifest listing the given applications (each is its own only file)
    pub fn new<I, S>(apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AppId>,
    {
        let manifest = Self::default();
        manifest.set_applications(apps);
        manifest
    }

    /// Replace the desired set
    pub fn set_applications<I, S>(&self, apps: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<AppId>,
    {
        let applications: Vec<AppId> = apps.into_iter().map(Into::into).collect();
        let mut manifest = self.manifest.lock().unwrap_or_else(|e| e.into_inner());
        *manifest = Manifest {
            files: applications.clone(),
            applications,
        };
    }

    /// Make subsequent fetches fail with the given message, or succeed again with `None`
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = message.map(str::to_string);
    }
}

#[async_trait]
impl ManifestSource for StaticManifest {
    async fn fetch(&self) -> Result<Manifest> {
        let failure = self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(message) = failure {
            return Err(RapidError::Manifest(message));
        }
        Ok(self.manifest.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// Sync that leaves the workdir untouched and records what was requested
#[derive(Debug, Default)]
pub struct NoopSync {
    synced: Mutex<Vec<AppId>>,
}

impl NoopSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applications synced so far, in call order
    pub fn synced(&self) -> Vec<AppId> {
        self.synced.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ArtifactSync for NoopSync {
    async fn sync(&self, app: &str, _manifest: &Manifest) -> Result<()> {
        self.synced
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(app.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_manifest_updates() {
        let source = StaticManifest::new(["a.py", "b.py"]);
        assert_eq!(source.fetch().await.unwrap().applications, vec!["a.py", "b.py"]);

        source.set_applications(["b.py"]);
        assert_eq!(source.fetch().await.unwrap().applications, vec!["b.py"]);
    }

    #[tokio::test]
    async fn test_static_manifest_failure() {
        let source = StaticManifest::new(["a.py"]);
        source.set_failure(Some("connection reset"));
        assert!(source.fetch().await.is_err());

        source.set_failure(None);
        assert!(source.fetch().await.is_ok());
    }

    #[tokio::test]
    async fn test_noop_sync_records() {
        let sync = NoopSync::new();
        sync.sync("a.py", &Manifest::default()).await.unwrap();
        sync.sync("b.py", &Manifest::default()).await.unwrap();
        assert_eq!(sync.synced(), vec!["a.py", "b.py"]);
    }
}
