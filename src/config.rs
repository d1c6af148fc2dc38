use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::source::github::{DEFAULT_API_URL, DEFAULT_RAW_URL, root_prefix};
use crate::source::{ArtifactSync, GithubManifest, GithubSync, GithubTarget, LocalManifest, LocalSync, ManifestSource};
use crate::supervisor::{Reconciler, ReconcilerConfig};
use crate::worker::{DEFAULT_OUTPUT_TAIL_BYTES, DeploymentMode, ScriptCommand};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub poll_interval_secs: u64,
    pub workdir: PathBuf,
    pub clean_workdir: bool,
    pub interpreter: String,
    pub venv: PathBuf,
    pub deployment: DeploymentMode,
    pub output_tail_bytes: usize,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Github,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub repo: String,
    pub branch: String,
    pub root: String,
    pub extension: String,
    pub token_env: String,
    pub api_url: String,
    pub raw_url: String,
    pub path: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Github,
            repo: "dreammify/rapidpy".to_string(),
            branch: "main".to_string(),
            root: "applications/".to_string(),
            extension: ".py".to_string(),
            token_env: "GITHUB_PAT".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            raw_url: DEFAULT_RAW_URL.to_string(),
            path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            workdir: PathBuf::from("tmp"),
            clean_workdir: true,
            interpreter: "python3".to_string(),
            venv: PathBuf::from("./venv"),
            deployment: DeploymentMode::default(),
            output_tail_bytes: DEFAULT_OUTPUT_TAIL_BYTES,
            source: SourceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try project location: ./<project>.yml
        let project_config = PathBuf::from(format!("{}.yml", project_name));
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", project_config.display(), e);
                }
            }
        }

        // Try user location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply the `RAPIDPY_ENV` deployment selector, if set
    pub fn apply_env(&mut self, rapidpy_env: Option<&str>) {
        if let Some(value) = rapidpy_env {
            self.deployment = DeploymentMode::from_env_value(value);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            eyre::bail!("poll-interval-secs must be > 0");
        }
        if self.interpreter.trim().is_empty() {
            eyre::bail!("interpreter must not be empty");
        }
        if self.source.extension.is_empty() {
            eyre::bail!("source.extension must not be empty");
        }
        if self.source.root.split('/').any(|part| part == "..") {
            eyre::bail!("source.root must not contain '..'");
        }
        if self.source.kind == SourceKind::Local && self.source.path.is_none() {
            eyre::bail!("source.path is required for a local source");
        }
        Ok(())
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig::default()
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_workdir(&self.workdir)
            .with_output_tail(self.output_tail_bytes)
    }

    pub fn command_builder(&self) -> ScriptCommand {
        ScriptCommand::new(self.deployment, &self.interpreter, &self.workdir, &self.venv)
    }

    fn github_target(&self) -> GithubTarget {
        let token = std::env::var(&self.source.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            log::debug!("{} not set, calling GitHub anonymously", self.source.token_env);
        }
        GithubTarget {
            api_url: self.source.api_url.clone(),
            raw_url: self.source.raw_url.clone(),
            repo: self.source.repo.clone(),
            branch: self.source.branch.clone(),
            root: root_prefix(&self.source.root),
            token,
        }
    }

    /// Build the manifest and sync collaborators for the configured source
    pub fn collaborators(&self) -> Result<(Arc<dyn ManifestSource>, Arc<dyn ArtifactSync>)> {
        match self.source.kind {
            SourceKind::Github => {
                let target = self.github_target();
                let manifest: Arc<dyn ManifestSource> = Arc::new(
                    GithubManifest::new(target.clone(), &self.source.extension)
                        .context("Failed to build GitHub client")?,
                );
                let sync: Arc<dyn ArtifactSync> =
                    Arc::new(GithubSync::new(target, &self.workdir).context("Failed to build GitHub client")?);
                Ok((manifest, sync))
            }
            SourceKind::Local => {
                let root = self
                    .source
                    .path
                    .clone()
                    .ok_or_else(|| eyre::eyre!("source.path is required for a local source"))?;
                let manifest: Arc<dyn ManifestSource> = Arc::new(LocalManifest::new(&root, &self.source.extension));
                let sync: Arc<dyn ArtifactSync> = Arc::new(LocalSync::new(root, &self.workdir));
                Ok((manifest, sync))
            }
        }
    }

    /// Wire a reconciler from this configuration
    pub fn build_reconciler(&self) -> Result<Reconciler> {
        let (manifest, sync) = self.collaborators()?;
        Ok(Reconciler::new(
            self.reconciler_config(),
            manifest,
            sync,
            Arc::new(self.command_builder()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.workdir, PathBuf::from("tmp"));
        assert_eq!(config.deployment, DeploymentMode::Venv);
        assert_eq!(config.source.kind, SourceKind::Github);
        assert_eq!(config.source.root, "applications/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rapidpy.yml");
        fs::write(
            &path,
            "poll-interval-secs: 30\ndeployment: direct\nsource:\n  kind: local\n  path: /srv/apps\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.deployment, DeploymentMode::Direct);
        assert_eq!(config.source.kind, SourceKind::Local);
        assert_eq!(config.source.path, Some(PathBuf::from("/srv/apps")));
        assert_eq!(config.source.extension, ".py");
        assert_eq!(config.interpreter, "python3");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.yml"))).is_err());
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rapidpy.yml");
        fs::write(&path, "poll-interval-secs: [not a number\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_apply_env() {
        let mut config = Config::default();
        config.apply_env(Some("PROD"));
        assert_eq!(config.deployment, DeploymentMode::Direct);

        config.apply_env(Some("STAGING"));
        assert_eq!(config.deployment, DeploymentMode::Venv);

        config.deployment = DeploymentMode::Direct;
        config.apply_env(None);
        assert_eq!(config.deployment, DeploymentMode::Direct);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.interpreter = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source.kind = SourceKind::Local;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_root_normalized_and_checked() {
        let mut config = Config::default();
        config.source.root = "/applications".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.github_target().root, "applications/");

        config.source.root = "applications/../secrets".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconciler_config_mapping() {
        let mut config = Config::default();
        config.poll_interval_secs = 3;
        let rc = config.reconciler_config();
        assert_eq!(rc.poll_interval, Duration::from_secs(3));
        assert_eq!(rc.workdir, PathBuf::from("tmp"));
    }

    #[test]
    fn test_build_local_reconciler() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.source.kind = SourceKind::Local;
        config.source.path = Some(dir.path().to_path_buf());
        config.workdir = dir.path().join("tmp");

        let reconciler = config.build_reconciler().unwrap();
        assert!(reconciler.active_apps().is_empty());
    }
}
