//! Simulator configuration
//!
//! Loaded once at startup from YAML, overridable from the command line.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// The network element the simulator impersonates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Mme,
    Sgw,
    Pgw,
}

impl NodeType {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mme => "MME",
            Self::Sgw => "SGW",
            Self::Pgw => "PGW",
        }
    }

    /// True when this node originates the call flow (sends the initial
    /// Create-Session-Request)
    pub fn is_originating(&self) -> bool {
        matches!(self, Self::Mme)
    }
}

impl std::str::FromStr for NodeType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mme" => Ok(Self::Mme),
            "sgw" => Ok(Self::Sgw),
            "pgw" => Ok(Self::Pgw),
            other => Err(ConfigError::Validation(format!(
                "unknown node type: {other}"
            ))),
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Local GTP-C IP address
    pub local_ip: Ipv4Addr,
    /// Local GTP-C port
    pub local_port: u16,
    /// Remote peer IP address
    pub remote_ip: Ipv4Addr,
    /// Remote peer GTP-C port
    pub remote_port: u16,
    /// Node the simulator impersonates
    pub node: NodeType,
    /// T3 retransmission timer (ms)
    pub t3_timer_ms: u64,
    /// N3 maximum request retries
    pub n3_requests: u32,
    /// Dashboard refresh interval (ms)
    pub display_refresh_ms: u64,
    /// Grace period after scenario completion (ms)
    pub dead_call_wait_ms: u64,
    /// UE sessions created per second by the load generator
    pub session_rate: u32,
    /// Stop creating sessions after this many (None = unbounded)
    pub max_sessions: Option<u64>,
    /// Access point name placed in session templates
    pub apn: String,
    /// First IMSI assigned by the load generator
    pub imsi_base: u64,
    /// Scenario file; the node-type default scenario applies when absent
    pub scenario: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_ip: Ipv4Addr::LOCALHOST,
            local_port: 2123,
            remote_ip: Ipv4Addr::LOCALHOST,
            remote_port: 2123,
            node: NodeType::Mme,
            t3_timer_ms: 1000,
            n3_requests: 3,
            display_refresh_ms: 1000,
            dead_call_wait_ms: 5000,
            session_rate: 1,
            max_sessions: None,
            apn: "internet".to_string(),
            imsi_base: 1_010_000_000_001,
            scenario: None,
        }
    }
}

impl Config {
    /// Load and validate a YAML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.t3_timer_ms == 0 {
            return Err(ConfigError::Validation("t3_timer_ms must be > 0".into()));
        }
        if self.display_refresh_ms == 0 {
            return Err(ConfigError::Validation(
                "display_refresh_ms must be > 0".into(),
            ));
        }
        if self.dead_call_wait_ms == 0 {
            return Err(ConfigError::Validation(
                "dead_call_wait_ms must be > 0".into(),
            ));
        }
        if self.session_rate == 0 {
            return Err(ConfigError::Validation("session_rate must be > 0".into()));
        }
        Ok(())
    }

    /// Local GTP-C endpoint
    pub fn local_endpoint(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.local_ip), self.local_port)
    }

    /// Remote GTP-C endpoint
    pub fn remote_endpoint(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.remote_ip), self.remote_port)
    }
}
