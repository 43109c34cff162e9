use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    /// HTTP server configuration
    Serve,
}

fn default_port() -> u16 {
    3000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tmp/torsion_drive.sqlite")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("tmp/pdb")
}

fn default_error_dir() -> PathBuf {
    PathBuf::from("tmp/errors")
}

fn default_identity_header() -> String {
    "x-user-id".to_string()
}

fn default_executable() -> String {
    "matlab".to_string()
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60
}

/// Server configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Configuration type (must be "serve")
    pub config_type: ConfigType,
    /// Port to listen on (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite database file (default: tmp/torsion_drive.sqlite)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Directory for the structure, torsion and metadata files exchanged with the tool
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Directory the tool writes its error files into
    #[serde(default = "default_error_dir")]
    pub error_dir: PathBuf,
    /// Request header carrying the authenticated user id, set by the auth proxy
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    /// External tool settings (maps to [tool] section in TOML)
    pub tool: ToolConfig,
    /// Abuse limits for the pipeline endpoints (maps to [rate_limit] section in TOML)
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// External tool configuration (maps to [tool] section in TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Directory containing the tool's functions; the command changes into it first
    pub dir: PathBuf,
    /// Interpreter to launch (default: matlab)
    #[serde(default = "default_executable")]
    pub executable: String,
}

/// Fixed-window request limit per client address
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client within one window (default: 5)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in seconds (default: 60)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl ServerConfig {
    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at request time
    pub fn validate(&self) -> Result<(), String> {
        if self.tool.executable.trim().is_empty() {
            return Err("[tool] executable must not be empty".to_string());
        }
        if self.identity_header.trim().is_empty() {
            return Err("identity_header must not be empty".to_string());
        }
        if axum::http::HeaderName::from_bytes(self.identity_header.as_bytes()).is_err() {
            return Err(format!(
                "identity_header '{}' is not a valid header name",
                self.identity_header
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err("[rate_limit] max_requests must be at least 1".to_string());
        }
        if self.rate_limit.window_secs == 0 {
            return Err("[rate_limit] window_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            config_type = "serve"

            [tool]
            dir = "/opt/loop_modeller"
            "#,
        )
        .unwrap();

        assert_eq!(config.config_type, ConfigType::Serve);
        assert_eq!(config.port, 3000);
        assert_eq!(config.identity_header, "x-user-id");
        assert_eq!(config.tool.executable, "matlab");
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let config: ServerConfig = toml::from_str(
            r#"
            config_type = "serve"
            port = 8080
            database_path = "/var/lib/td/db.sqlite"
            work_dir = "/var/lib/td/pdb"
            error_dir = "/var/lib/td/errors"
            identity_header = "x-remote-user"

            [tool]
            dir = "/opt/loop_modeller"
            executable = "octave"

            [rate_limit]
            max_requests = 20
            window_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.work_dir, PathBuf::from("/var/lib/td/pdb"));
        assert_eq!(config.tool.executable, "octave");
        assert_eq!(config.rate_limit.max_requests, 20);
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config: ServerConfig = toml::from_str(
            r#"
            config_type = "serve"
            [tool]
            dir = "/opt/loop_modeller"
            "#,
        )
        .unwrap();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_header() {
        let mut config: ServerConfig = toml::from_str(
            r#"
            config_type = "serve"
            [tool]
            dir = "/opt/loop_modeller"
            "#,
        )
        .unwrap();
        config.identity_header = "bad header".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_tool_section_fails() {
        let result: Result<ServerConfig, _> = toml::from_str(r#"config_type = "serve""#);
        assert!(result.is_err());
    }
}
