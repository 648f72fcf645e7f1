//! Configuration management for actorflow
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (`AFL_*` prefix, `__` between sections and keys)
//! 3. actorflow.local.toml (gitignored, local overrides)
//! 4. actorflow.toml (git-tracked, project config)
//! 5. ~/.config/actorflow/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use std::net::SocketAddr;
use std::time::Duration;

use actorflow_server::{DEFAULT_PORT, ServerConfig};
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main actorflow configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorflowConfig {
    pub server: ServerSection,
    pub pipelines: PipelinesSection,
}

/// Event loop and listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_address: String,
    /// Seconds of inactivity before a session is closed. 0 disables the sweep.
    pub idle_timeout_secs: u64,
    pub max_line_length: usize,
    pub max_sessions: usize,
    pub read_buffer_size: usize,
    /// Bytes one session reads before the reactor moves on to other sources.
    pub max_read_per_dispatch: usize,
    pub tick_ms: u64,
    /// Serve Prometheus metrics here when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_address: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        let runtime = ServerConfig::default();
        Self {
            bind_address: runtime.bind_addr.to_string(),
            idle_timeout_secs: runtime.idle_timeout.map_or(0, |timeout| timeout.as_secs()),
            max_line_length: runtime.max_line_length,
            max_sessions: runtime.max_sessions,
            read_buffer_size: runtime.read_buffer_size,
            max_read_per_dispatch: runtime.max_read_per_dispatch,
            tick_ms: u64::try_from(runtime.tick.as_millis()).unwrap_or(u64::MAX),
            metrics_address: None,
        }
    }
}

impl ServerSection {
    /// Builds the runtime configuration, validating every field.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let bind_addr = parse_address("server.bind_address", &self.bind_address)?;

        if self.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_sessions must be positive".to_string(),
            ));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_line_length must be positive".to_string(),
            ));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "server.tick_ms must be positive".to_string(),
            ));
        }

        let idle_timeout =
            (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs));

        let mut config = ServerConfig::new(bind_addr)
            .with_idle_timeout(idle_timeout)
            .with_max_line_length(self.max_line_length)
            .with_max_sessions(self.max_sessions)
            .with_read_buffer_size(self.read_buffer_size.max(1))
            .with_max_read_per_dispatch(self.max_read_per_dispatch.max(1))
            .with_tick(Duration::from_millis(self.tick_ms));

        if let Some(metrics) = &self.metrics_address {
            config = config.with_metrics_addr(parse_address("server.metrics_address", metrics)?);
        }
        Ok(config)
    }

    /// The configured bind address with its port replaced.
    pub fn bind_address_with_port(&self, port: u16) -> Result<SocketAddr, ConfigError> {
        let mut addr = parse_address("server.bind_address", &self.bind_address)?;
        addr.set_port(port);
        Ok(addr)
    }
}

/// Settings for the reference pipelines run by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelinesSection {
    /// Lines starting with this prefix are dropped.
    pub comment_prefix: String,
    /// Reply sent when a bookmark cannot be decoded.
    pub error_reply: String,
    /// Ports joined by `actorflow join` when none are given.
    pub join_ports: Vec<u16>,
}

impl Default for PipelinesSection {
    fn default() -> Self {
        Self {
            comment_prefix: "#".to_string(),
            error_reply: "Error processing bookmark".to_string(),
            join_ports: vec![DEFAULT_PORT, DEFAULT_PORT + 1],
        }
    }
}

impl ActorflowConfig {
    /// Render as TOML, e.g. for `actorflow config`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }
}

fn parse_address(key: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key}: invalid address '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config() {
        let config = ActorflowConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:42042");
        assert_eq!(config.server.idle_timeout_secs, 300);
        assert_eq!(config.pipelines.comment_prefix, "#");
        assert_eq!(config.pipelines.join_ports, vec![42042, 42043]);
    }

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let runtime = ServerSection::default()
            .to_server_config()
            .expect("defaults are valid");
        assert_eq!(runtime, ServerConfig::default());
    }

    #[test]
    fn test_zero_idle_timeout_disables_sweep() {
        let section = ServerSection {
            idle_timeout_secs: 0,
            ..ServerSection::default()
        };
        let runtime = section.to_server_config().expect("valid");
        assert_eq!(runtime.idle_timeout, None);
    }

    #[test]
    fn test_read_budget_is_carried_over() {
        let section = ServerSection {
            max_read_per_dispatch: 8192,
            ..ServerSection::default()
        };
        let runtime = section.to_server_config().expect("valid");
        assert_eq!(runtime.max_read_per_dispatch, 8192);
    }

    #[test]
    fn test_metrics_address_is_parsed() {
        let section = ServerSection {
            metrics_address: Some("127.0.0.1:9090".to_string()),
            ..ServerSection::default()
        };
        let runtime = section.to_server_config().expect("valid");
        assert_eq!(runtime.metrics_addr, Some("127.0.0.1:9090".parse().unwrap()));
    }

    #[test_case(ServerSection { bind_address: "nowhere".into(), ..ServerSection::default() }; "bad bind address")]
    #[test_case(ServerSection { max_sessions: 0, ..ServerSection::default() }; "zero sessions")]
    #[test_case(ServerSection { max_line_length: 0, ..ServerSection::default() }; "zero line length")]
    #[test_case(ServerSection { tick_ms: 0, ..ServerSection::default() }; "zero tick")]
    #[test_case(ServerSection { metrics_address: Some("9090".into()), ..ServerSection::default() }; "bad metrics address")]
    fn test_invalid_sections_are_rejected(section: ServerSection) {
        let error = section.to_server_config().expect_err("must be rejected");
        assert!(matches!(error, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_bind_address_with_port() {
        let section = ServerSection::default();
        let addr = section.bind_address_with_port(7000).expect("valid");
        assert_eq!(addr, "0.0.0.0:7000".parse().unwrap());
    }

    #[test]
    fn test_to_toml_contains_sections() {
        let text = ActorflowConfig::default().to_toml().expect("serialize");
        assert!(text.contains("[server]"));
        assert!(text.contains("[pipelines]"));
        assert!(text.contains("bind_address = \"0.0.0.0:42042\""));
    }
}
