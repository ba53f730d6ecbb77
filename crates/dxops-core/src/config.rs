use crate::error::{DxOpsError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "./dxtools.conf";
pub const DEFAULT_POLL_SECONDS: f64 = 10.0;
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 3;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// One engine entry from `dxtools.conf`. Read-only once loaded.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Display name, also the identifier matched by `--engine`.
    pub hostname: String,
    pub ip_address: String,
    #[serde(default, deserialize_with = "de_port")]
    pub port: Option<u16>,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default, deserialize_with = "de_flag")]
    pub use_https: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub default: bool,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("hostname", &self.hostname)
            .field("ip_address", &self.ip_address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_https", &self.use_https)
            .field("default", &self.default)
            .finish()
    }
}

impl Target {
    pub fn name(&self) -> &str {
        &self.hostname
    }
}

/// The tooling writes flags as `"true"`/`"false"` strings; accept real
/// booleans as well.
fn de_flag<'de, D>(d: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(d)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected true or false, got '{other}'"
            ))),
        },
    }
}

fn de_port<'de, D>(d: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(d)? {
        None => Ok(None),
        Some(Port::Number(n)) => Ok(Some(n)),
        Some(Port::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Port::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{s}'"))),
    }
}

// ---------------------------------------------------------------------------
// DxToolsConfig
// ---------------------------------------------------------------------------

/// Contents of `dxtools.conf`: the engines this tool may run against, in
/// file order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DxToolsConfig {
    #[serde(rename = "data")]
    pub targets: Vec<Target>,
    #[serde(skip)]
    pub path: PathBuf,
}

impl DxToolsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|source| DxOpsError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::parse(&data, path)?;

        for warning in cfg.validate() {
            match warning.level {
                WarnLevel::Warning => tracing::warn!("{}: {}", path.display(), warning.message),
                WarnLevel::Error => {
                    return Err(DxOpsError::ConfigInvalid {
                        path: path.to_path_buf(),
                        reason: warning.message,
                    })
                }
            }
        }
        Ok(cfg)
    }

    pub fn parse(data: &str, path: &Path) -> Result<Self> {
        let mut cfg: DxToolsConfig =
            serde_json::from_str(data).map_err(|source| DxOpsError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.path = path.to_path_buf();
        Ok(cfg)
    }

    pub fn find(&self, hostname: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.hostname == hostname)
    }

    /// The first engine flagged default. Extra defaults are reported once,
    /// by `validate`.
    pub fn default_target(&self) -> Option<&Target> {
        self.targets.iter().find(|t| t.default)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();

        for (i, target) in self.targets.iter().enumerate() {
            if target.hostname.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("engine #{} has an empty hostname", i + 1),
                });
                continue;
            }
            if !seen.insert(target.hostname.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("engine '{}' is defined more than once", target.hostname),
                });
            }
            if target.ip_address.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("engine '{}' has no ip_address", target.hostname),
                });
            }
        }

        let defaults: Vec<&str> = self
            .targets
            .iter()
            .filter(|t| t.default)
            .map(|t| t.hostname.as_str())
            .collect();
        if defaults.len() > 1 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "multiple engines are marked default ({}); '{}' will be used",
                    defaults.join(", "),
                    defaults[0]
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

/// Knobs shared by every worker in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Wait between two poll passes of the same worker.
    pub poll_interval: Duration,
    /// Maximum number of jobs a worker keeps in flight. `None` is unbounded.
    pub parallel: Option<NonZeroUsize>,
    /// Consecutive failed status queries tolerated per job.
    pub max_poll_failures: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_SECONDS),
            parallel: None,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
