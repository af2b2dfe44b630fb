use std::fmt;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use steward_core::ExecutorConfig;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateTarget {
    Core,
    Extension(String),
}

impl UpdateTarget {
    pub fn from_extension(extension: Option<String>) -> Self {
        match extension {
            Some(id) => Self::Extension(id),
            None => Self::Core,
        }
    }

    pub fn command_args(&self) -> Vec<String> {
        match self {
            Self::Core => vec!["core".to_string()],
            Self::Extension(id) => vec!["extension".to_string(), id.clone()],
        }
    }
}

impl fmt::Display for UpdateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => f.write_str("core"),
            Self::Extension(id) => write!(f, "extension {id}"),
        }
    }
}

pub trait UpdateExecutor {
    fn execute(&self, target: &UpdateTarget) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandUpdateExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandUpdateExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    pub(crate) fn build_command(&self, target: &UpdateTarget) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).args(target.command_args());
        command
    }
}

impl UpdateExecutor for CommandUpdateExecutor {
    fn execute(&self, target: &UpdateTarget) -> Result<()> {
        let mut command = self.build_command(target);
        info!(program = %self.program, %target, "running update executor");
        let output = command.output().with_context(|| {
            format!(
                "update-executor-failed: {} could not be started for {target}",
                self.program
            )
        })?;
        if output.status.success() {
            debug!(%target, "update executor finished");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        Err(anyhow!(
            "update-executor-failed: {} for {target}: status={} stdout='{}' stderr='{}'",
            self.program,
            output.status,
            stdout.trim(),
            stderr.trim()
        ))
    }
}
