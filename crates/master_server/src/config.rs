//! Configuration management.
//!
//! Settings load from a TOML file; a missing file is created with defaults
//! so a fresh checkout starts with `master_server` and nothing else. The
//! file-level [`AppConfig`] converts into the runtime [`ServerConfig`] the
//! rest of the binary consumes.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use plasma::SessionSettings;

/// Application configuration loaded from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network and connection settings
    pub server: ServerSettings,
    /// Timer and grace-window settings
    pub timing: TimingSettings,
    /// Endpoints advertised to clients in the hello transaction
    pub endpoints: EndpointSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address for the session service
    pub plasma_bind: String,
    /// Bind address for the game-hosting service
    pub theater_bind: String,
    /// Maximum concurrent client connections per service
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Whether to use SO_REUSEPORT multi-threaded accept loops (Linux only)
    #[serde(default)]
    pub use_reuse_port: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Seconds between server-initiated MemCheck keepalives
    #[serde(default = "default_memcheck_interval")]
    pub memcheck_interval_secs: u64,
    /// Seconds a disconnected identity keeps its presence entry
    #[serde(default = "default_presence_grace")]
    pub presence_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// Domain partition advertised to clients
    pub domain: String,
    pub sub_domain: String,
    /// Messenger endpoint advertised in the hello response
    pub messenger_host: String,
    pub messenger_port: u16,
    /// Theater endpoint advertised to game clients
    pub theater_client_host: String,
    pub theater_client_port: u16,
    /// Theater endpoint advertised to dedicated servers
    pub theater_server_host: String,
    pub theater_server_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_max_connections() -> usize {
    1000
}

fn default_memcheck_interval() -> u64 {
    90
}

fn default_presence_grace() -> u64 {
    2 * 60 * 60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                plasma_bind: "0.0.0.0:18270".to_string(),
                theater_bind: "0.0.0.0:18395".to_string(),
                max_connections: default_max_connections(),
                use_reuse_port: false,
            },
            timing: TimingSettings {
                memcheck_interval_secs: default_memcheck_interval(),
                presence_grace_secs: default_presence_grace(),
            },
            endpoints: EndpointSettings {
                domain: "eagames".to_string(),
                sub_domain: "BFBC2".to_string(),
                messenger_host: "127.0.0.1".to_string(),
                messenger_port: 13505,
                theater_client_host: "127.0.0.1".to_string(),
                theater_client_port: 18395,
                theater_server_host: "127.0.0.1".to_string(),
                theater_server_port: 18395,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating a default file when
    /// it does not exist yet.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts to the runtime configuration.
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        Ok(ServerConfig {
            plasma_bind: self.server.plasma_bind.parse()?,
            theater_bind: self.server.theater_bind.parse()?,
            max_connections: self.server.max_connections,
            use_reuse_port: self.server.use_reuse_port,
            memcheck_interval: Duration::from_secs(self.timing.memcheck_interval_secs),
            session: SessionSettings {
                domain: self.endpoints.domain.clone(),
                sub_domain: self.endpoints.sub_domain.clone(),
                messenger_host: self.endpoints.messenger_host.clone(),
                messenger_port: self.endpoints.messenger_port,
                theater_client_host: self.endpoints.theater_client_host.clone(),
                theater_client_port: self.endpoints.theater_client_port,
                theater_server_host: self.endpoints.theater_server_host.clone(),
                theater_server_port: self.endpoints.theater_server_port,
                presence_grace: Duration::from_secs(self.timing.presence_grace_secs),
            },
        })
    }
}

/// Runtime configuration consumed by the server proper.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub plasma_bind: SocketAddr,
    pub theater_bind: SocketAddr,
    pub max_connections: usize,
    pub use_reuse_port: bool,
    pub memcheck_interval: Duration,
    pub session: SessionSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        AppConfig::default()
            .to_server_config()
            .expect("default configuration is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.expect("load");
        assert!(path.exists(), "default file must be written");
        assert_eq!(config.server.max_connections, 1000);

        // A second load reads the file we just wrote.
        let reloaded = AppConfig::load_from_file(&path).await.expect("reload");
        assert_eq!(reloaded.server.plasma_bind, config.server.plasma_bind);
    }

    #[tokio::test]
    async fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
[server]
plasma_bind = "127.0.0.1:9000"
theater_bind = "127.0.0.1:9001"

[timing]

[endpoints]
domain = "eagames"
sub_domain = "BFBC2"
messenger_host = "127.0.0.1"
messenger_port = 13505
theater_client_host = "127.0.0.1"
theater_client_port = 9001
theater_server_host = "127.0.0.1"
theater_server_port = 9001

[logging]
level = "debug"
"#,
        )
        .await
        .expect("write");

        let config = AppConfig::load_from_file(&path).await.expect("load");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.timing.memcheck_interval_secs, 90);
        assert!(!config.logging.json_format);

        let server_config = config.to_server_config().expect("convert");
        assert_eq!(server_config.plasma_bind.port(), 9000);
        assert_eq!(server_config.session.presence_grace.as_secs(), 7200);
    }

    #[test]
    fn bad_addresses_fail_conversion() {
        let mut config = AppConfig::default();
        config.server.plasma_bind = "not-an-address".to_string();
        assert!(config.to_server_config().is_err());
    }
}
