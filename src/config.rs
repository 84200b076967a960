//! Sandbox configuration: runtime image, command contract, resource
//! limits, and the per-execution timeout.
//!
//! Loaded from `judgebox.toml` when present, with defaults matching
//! the judge's primary runtime otherwise.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

const CONFIG_FILE: &str = "judgebox.toml";

/// Configuration for one sandbox runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Runtime image the environment is created from.
    #[serde(default = "default_image")]
    pub image: String,

    /// Argument vector that launches the staged artifact.
    ///
    /// The entry-point name is owned by whatever produced the
    /// artifact; this core only delivers the vector as given.
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    /// Wall-clock timeout applied uniformly to every execution, in
    /// milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Resource limits applied to the environment.
    #[serde(default)]
    pub resources: ResourceConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            command: default_command(),
            timeout_ms: default_timeout_ms(),
            resources: ResourceConfig::default(),
        }
    }
}

/// Resource limits in human-readable form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Memory limit (e.g., "100m", "1g").
    #[serde(default = "default_memory")]
    pub memory: String,

    /// Swap limit. Keep at "0" so memory accounting is not confused
    /// by swapped pages.
    #[serde(default = "default_swap")]
    pub swap: String,

    /// Number of CPUs available to the environment.
    #[serde(default = "default_cpus")]
    pub cpus: i64,

    /// Whether the environment runs without network access.
    #[serde(default = "default_true")]
    pub network_disabled: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory: default_memory(),
            swap: default_swap(),
            cpus: default_cpus(),
            network_disabled: true,
        }
    }
}

/// Resource limits resolved to the values the backend applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Memory cap in bytes.
    pub memory_bytes: i64,
    /// Swap cap in bytes (0 disables swap).
    pub swap_bytes: i64,
    /// CPU count.
    pub cpu_count: i64,
    /// Whether network access is disabled.
    pub network_disabled: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_image() -> String {
    "openjdk:8-alpine".to_string()
}

fn default_command() -> Vec<String> {
    vec![
        "java".to_string(),
        "-cp".to_string(),
        crate::provision::ARTIFACT_MOUNT.to_string(),
        "Main".to_string(),
    ]
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_memory() -> String {
    "100m".to_string()
}

fn default_swap() -> String {
    "0".to_string()
}

fn default_cpus() -> i64 {
    1
}

impl SandboxConfig {
    /// Load configuration from `judgebox.toml` in the given directory,
    /// using defaults if the file is not present.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.display().to_string(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_path.display().to_string(),
            source,
        })?;

        Ok(config)
    }

    /// The per-execution timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve the human-readable resource strings to byte values.
    pub fn limits(&self) -> Result<ResourceLimits, ConfigError> {
        Ok(ResourceLimits {
            memory_bytes: parse_memory_limit(&self.resources.memory)?,
            swap_bytes: parse_memory_limit(&self.resources.swap)?,
            cpu_count: self.resources.cpus,
            network_disabled: self.resources.network_disabled,
        })
    }

    /// Rejects configurations this core cannot execute.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        Ok(())
    }
}

/// Parse a memory limit string (e.g., "1g", "512m", "64k") to bytes.
fn parse_memory_limit(limit: &str) -> Result<i64, ConfigError> {
    let lower = limit.to_lowercase();
    let invalid = || ConfigError::InvalidMemoryLimit {
        value: limit.to_string(),
    };

    if let Some(num) = lower.strip_suffix('g') {
        let gigs: i64 = num.parse().map_err(|_| invalid())?;
        gigs.checked_mul(1024 * 1024 * 1024).ok_or_else(invalid)
    } else if let Some(num) = lower.strip_suffix('m') {
        let megs: i64 = num.parse().map_err(|_| invalid())?;
        megs.checked_mul(1024 * 1024).ok_or_else(invalid)
    } else if let Some(num) = lower.strip_suffix('k') {
        let kilos: i64 = num.parse().map_err(|_| invalid())?;
        kilos.checked_mul(1024).ok_or_else(invalid)
    } else {
        lower.parse().map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.image, "openjdk:8-alpine");
        assert_eq!(config.command[0], "java");
        assert_eq!(config.timeout_ms, 5000);
        assert!(config.resources.network_disabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_limits() {
        let limits = SandboxConfig::default().limits().unwrap();
        assert_eq!(limits.memory_bytes, 100 * 1024 * 1024);
        assert_eq!(limits.swap_bytes, 0);
        assert_eq!(limits.cpu_count, 1);
        assert!(limits.network_disabled);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
image = "python:3.12-alpine"
command = ["python3", "/app/main.py"]
timeout_ms = 2000

[resources]
memory = "256m"
cpus = 2
network_disabled = false
"#;
        let config: SandboxConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.image, "python:3.12-alpine");
        assert_eq!(config.command, vec!["python3", "/app/main.py"]);
        assert_eq!(config.timeout(), Duration::from_millis(2000));

        let limits = config.limits().unwrap();
        assert_eq!(limits.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(limits.swap_bytes, 0);
        assert_eq!(limits.cpu_count, 2);
        assert!(!limits.network_disabled);
    }

    #[test]
    fn test_parse_memory_limit() {
        assert_eq!(parse_memory_limit("8g").unwrap(), 8 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory_limit("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_memory_limit("0").unwrap(), 0);
        assert_eq!(parse_memory_limit("12345").unwrap(), 12345);
        assert!(parse_memory_limit("lots").is_err());
        assert!(parse_memory_limit("4t").is_err());
    }

    #[test]
    fn test_memory_limit_overflow_rejected() {
        // Values that parse but overflow i64 when scaled must be
        // rejected, not wrapped.
        assert!(matches!(
            parse_memory_limit("99999999999g"),
            Err(ConfigError::InvalidMemoryLimit { .. })
        ));
        assert!(matches!(
            parse_memory_limit("99999999999999999m"),
            Err(ConfigError::InvalidMemoryLimit { .. })
        ));
        // The largest representable values still parse.
        assert_eq!(
            parse_memory_limit("8589934591g").unwrap(),
            8_589_934_591 * 1024 * 1024 * 1024
        );
    }

    #[test]
    fn test_empty_command_rejected() {
        let config = SandboxConfig {
            command: Vec::new(),
            ..SandboxConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyCommand)));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig::load(dir.path()).unwrap();
        assert_eq!(config.image, "openjdk:8-alpine");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "image = \"alpine:3.19\"\ncommand = [\"sh\", \"/app/main.sh\"]\n",
        )
        .unwrap();
        let config = SandboxConfig::load(dir.path()).unwrap();
        assert_eq!(config.image, "alpine:3.19");
        assert_eq!(config.command, vec!["sh", "/app/main.sh"]);
        // Unspecified sections still get defaults
        assert_eq!(config.timeout_ms, 5000);
    }
}
