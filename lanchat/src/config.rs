//! Configuration system for the `LanChat` node.
//!
//! Supports layered configuration with the following priority (highest
//! first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/lanchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error. All values are fixed at
//! startup; there is no runtime reconfiguration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanchat_proto::peer::PeerId;

use crate::transport::lan::TransportConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// An address field in the config file is not a valid IP address.
    #[error("invalid {field} address in config file: {value}")]
    InvalidAddr {
        /// Which field was malformed.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    presence: PresenceFileConfig,
    chat: ChatFileConfig,
    limits: LimitsFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    listen_port: Option<u16>,
    group_port: Option<u16>,
    broadcast_addr: Option<String>,
    local_ip: Option<String>,
}

/// `[presence]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PresenceFileConfig {
    heartbeat_secs: Option<u64>,
    user_timeout_secs: Option<u64>,
    cleanup_secs: Option<u64>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    groups: Option<Vec<String>>,
}

/// `[limits]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LimitsFileConfig {
    private_send_timeout_secs: Option<u64>,
    shutdown_grace_ms: Option<u64>,
    channel_capacity: Option<usize>,
    max_concurrent_accepts: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the node.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Serverless LAN chat node")]
pub struct CliArgs {
    /// TCP port private messages are accepted on.
    #[arg(long, env = "LANCHAT_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// UDP port the group channel binds and sends to.
    #[arg(long, env = "LANCHAT_GROUP_PORT")]
    pub group_port: Option<u16>,

    /// Broadcast address group sends are addressed to.
    #[arg(long, env = "LANCHAT_BROADCAST_ADDR")]
    pub broadcast_addr: Option<IpAddr>,

    /// Local IP to advertise (overrides autodetection on multi-homed hosts).
    #[arg(long, env = "LANCHAT_LOCAL_IP")]
    pub local_ip: Option<IpAddr>,

    /// Group channel to declare (repeatable; replaces the default set).
    #[arg(long = "group")]
    pub groups: Vec<String>,

    /// Path to config file (default: `~/.config/lanchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "LANCHAT_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved node configuration. Fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// TCP port for the unicast (private message) listener.
    pub listen_port: u16,
    /// UDP port for the group channel (bind and send).
    pub group_port: u16,
    /// Broadcast address group sends are addressed to.
    pub broadcast_addr: IpAddr,
    /// Advertised local IP; autodetected when `None`.
    pub local_ip: Option<IpAddr>,
    /// Interval between presence broadcasts.
    pub heartbeat_interval: Duration,
    /// Silence after which a peer is shown offline; peers are forgotten
    /// after twice this.
    pub user_timeout: Duration,
    /// Interval between peer table sweeps.
    pub cleanup_interval: Duration,
    /// Connect/write timeout for one private send.
    pub private_send_timeout: Duration,
    /// Grace period for receive tasks on shutdown.
    pub shutdown_grace: Duration,
    /// Group channels declared at startup.
    pub groups: Vec<String>,
    /// Capacity of command/event/inbound channels.
    pub channel_capacity: usize,
    /// Cap on concurrently serviced inbound private connections.
    pub max_concurrent_accepts: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: 8888,
            group_port: 8889,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            local_ip: None,
            heartbeat_interval: Duration::from_secs(10),
            user_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(5),
            private_send_timeout: Duration::from_secs(3),
            shutdown_grace: Duration::from_secs(1),
            groups: vec!["general".to_string(), "support".to_string()],
            channel_capacity: 256,
            max_concurrent_accepts: 32,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Loads and resolves configuration from all layers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicitly given config file cannot be
    /// read, or any config file fails to parse.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = read_config_file(cli.config.as_deref())?;
        let mut config = Self::default();
        config.apply_file(file)?;
        config.apply_cli(cli);
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(port) = file.network.listen_port {
            self.listen_port = port;
        }
        if let Some(port) = file.network.group_port {
            self.group_port = port;
        }
        if let Some(addr) = file.network.broadcast_addr {
            self.broadcast_addr = addr.parse().map_err(|_| ConfigError::InvalidAddr {
                field: "broadcast",
                value: addr,
            })?;
        }
        if let Some(addr) = file.network.local_ip {
            self.local_ip = Some(addr.parse().map_err(|_| ConfigError::InvalidAddr {
                field: "local",
                value: addr,
            })?);
        }
        if let Some(secs) = file.presence.heartbeat_secs {
            self.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.presence.user_timeout_secs {
            self.user_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.presence.cleanup_secs {
            self.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(groups) = file.chat.groups
            && !groups.is_empty()
        {
            self.groups = groups;
        }
        if let Some(secs) = file.limits.private_send_timeout_secs {
            self.private_send_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = file.limits.shutdown_grace_ms {
            self.shutdown_grace = Duration::from_millis(ms);
        }
        if let Some(capacity) = file.limits.channel_capacity {
            self.channel_capacity = capacity;
        }
        if let Some(cap) = file.limits.max_concurrent_accepts {
            self.max_concurrent_accepts = cap;
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(port) = cli.listen_port {
            self.listen_port = port;
        }
        if let Some(port) = cli.group_port {
            self.group_port = port;
        }
        if let Some(addr) = cli.broadcast_addr {
            self.broadcast_addr = addr;
        }
        if let Some(addr) = cli.local_ip {
            self.local_ip = Some(addr);
        }
        if !cli.groups.is_empty() {
            self.groups = cli.groups.clone();
        }
        self.log_level.clone_from(&cli.log_level);
    }

    /// The local node's identity: advertised IP + unicast listen port.
    ///
    /// Established once at startup and compared structurally thereafter.
    #[must_use]
    pub fn self_id(&self) -> PeerId {
        let ip = self.local_ip.unwrap_or_else(detect_local_ip);
        PeerId::from_parts(ip, self.listen_port)
    }

    /// Socket-level settings derived from this configuration.
    #[must_use]
    pub fn transport_config(&self, self_id: PeerId) -> TransportConfig {
        TransportConfig {
            self_id,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.listen_port),
            group_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.group_port),
            group_target: SocketAddr::new(self.broadcast_addr, self.group_port),
            send_timeout: self.private_send_timeout,
            shutdown_grace: self.shutdown_grace,
            channel_capacity: self.channel_capacity,
            max_concurrent_accepts: self.max_concurrent_accepts,
        }
    }
}

/// Best-effort local IP detection via a connected (but silent) UDP socket.
///
/// No packets are sent; connecting just asks the OS which interface would
/// route to a public address. Falls back to loopback.
#[must_use]
pub fn detect_local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = std::net::UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(("8.8.8.8", 80))?;
        Ok(socket.local_addr()?.ip())
    };
    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Reads the config file, tolerating a missing default-path file.
fn read_config_file(explicit: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(ConfigFile::default()),
        },
    };
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
        path: path.clone(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

/// `~/.config/lanchat/config.toml` (platform equivalent).
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lanchat").join("config.toml"))
}
