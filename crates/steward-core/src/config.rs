use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "steward.toml";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StewardConfig {
    pub core: CoreConfig,
    pub telemetry: TelemetryConfig,
    pub cache: CacheConfig,
    pub paths: PathsConfig,
    pub executor: ExecutorConfig,
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub name: String,
    pub version: String,
    pub build: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: "Core".to_string(),
            version: "1.0.0".to_string(),
            build: "1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 86_400 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub app: Option<PathBuf>,
    pub extensions: Option<PathBuf>,
    pub state: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "steward-apply".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StewardPaths {
    pub app: PathBuf,
    pub extensions: PathBuf,
    pub state: PathBuf,
}

impl StewardPaths {
    pub fn cache_dir(&self) -> PathBuf {
        self.state.join("cache")
    }

    pub fn offline_marker_path(&self) -> PathBuf {
        self.state.join("system-offline")
    }

    pub fn update_targets(&self) -> Vec<PathBuf> {
        vec![self.app.clone(), self.extensions.clone()]
    }
}

impl StewardConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse steward config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::load_rooted(path, default_root()?)
    }

    pub fn load_rooted(path: &Path, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default().with_root(root));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading config: {}", path.display()));
            }
        };

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed parsing config: {}", path.display()))?;
        Ok(config.with_root(root))
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_secs(self.telemetry.timeout_secs)
    }

    pub fn paths(&self) -> StewardPaths {
        StewardPaths {
            app: self.resolve(self.paths.app.as_deref(), "app"),
            extensions: self.resolve(self.paths.extensions.as_deref(), "extensions"),
            state: self.resolve(self.paths.state.as_deref(), "state"),
        }
    }

    fn resolve(&self, configured: Option<&Path>, default_name: &str) -> PathBuf {
        match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.root.join(path),
            None => self.root.join(default_name),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.core.version.trim().is_empty() {
            return Err(anyhow!("core.version must not be empty"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(anyhow!("cache.ttl_secs must be greater than zero"));
        }
        if self.telemetry.timeout_secs == 0 {
            return Err(anyhow!("telemetry.timeout_secs must be greater than zero"));
        }
        if self.executor.program.trim().is_empty() {
            return Err(anyhow!("executor.program must not be empty"));
        }
        Ok(())
    }
}

pub fn default_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows steward root")?;
        return Ok(PathBuf::from(app_data).join("Steward"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve steward root")?;
    Ok(PathBuf::from(home).join(".steward"))
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("STEWARD_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    Ok(default_root()?.join(CONFIG_FILE_NAME))
}
