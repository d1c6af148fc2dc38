//! Launch command construction
//!
//! How a worker is invoked depends on the deployment: either the interpreter
//! runs the script directly, or the script runs inside an activated virtual
//! environment through a bash wrapper. The strategy is chosen once at startup
//! and the lifecycle calls [`CommandBuilder::build`] for every launch.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Value of `RAPIDPY_ENV` that selects direct deployment
pub const PRODUCTION_ENV: &str = "PROD";

/// A fully-resolved external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Program to execute
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory, inherited when `None`
    pub current_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl LaunchCommand {
    /// Create a command for the given program with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Builds the exact command line for an application identity
pub trait CommandBuilder: Send + Sync {
    fn build(&self, app: &str) -> LaunchCommand;
}

impl<F> CommandBuilder for F
where
    F: Fn(&str) -> LaunchCommand + Send + Sync,
{
    fn build(&self, app: &str) -> LaunchCommand {
        self(app)
    }
}

/// How worker scripts are invoked on this host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// `<interpreter> <script>`
    Direct,
    /// `bash -c "source <venv>/bin/activate && exec <interpreter> <script>"`
    #[default]
    Venv,
}

impl DeploymentMode {
    /// Map the `RAPIDPY_ENV` value to a deployment mode
    pub fn from_env_value(value: &str) -> Self {
        if value == PRODUCTION_ENV {
            DeploymentMode::Direct
        } else {
            DeploymentMode::Venv
        }
    }
}

/// Command builder for interpreter-run scripts materialized under a workdir
#[derive(Debug, Clone)]
pub struct ScriptCommand {
    mode: DeploymentMode,
    interpreter: String,
    workdir: PathBuf,
    venv: PathBuf,
}

impl ScriptCommand {
    pub fn new(
        mode: DeploymentMode,
        interpreter: impl Into<String>,
        workdir: impl Into<PathBuf>,
        venv: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mode,
            interpreter: interpreter.into(),
            workdir: workdir.into(),
            venv: venv.into(),
        }
    }

    fn script_path(&self, app: &str) -> String {
        self.workdir.join(app).to_string_lossy().into_owned()
    }
}

impl CommandBuilder for ScriptCommand {
    fn build(&self, app: &str) -> LaunchCommand {
        let script = self.script_path(app);
        match self.mode {
            DeploymentMode::Direct => LaunchCommand::new(&self.interpreter).arg(script),
            DeploymentMode::Venv => {
                let activate = self.venv.join("bin").join("activate");
                LaunchCommand::new("bash").arg("-c").arg(format!(
                    "source {} && exec {} {}",
                    shell_quote(&activate),
                    self.interpreter,
                    shell_quote(Path::new(&script))
                ))
            }
        }
    }
}

/// Single-quote a path for a POSIX shell
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}
