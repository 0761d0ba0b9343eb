//! Server configuration from environment variables and CLI flags.

use std::net::SocketAddr;

/// Default listen port, matching the historical deployment.
pub const DEFAULT_PORT: u16 = 7887;

/// Default service name reported in method-not-found errors.
pub const DEFAULT_SERVICE_NAME: &str = "meshplane_service_discovery";

/// Runtime configuration for `meshplaned`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener on.
    pub bind: SocketAddr,
    /// Service name used in protocol error messages.
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Build a config from `MESHPLANE_PORT` and `MESHPLANE_SERVICE_NAME`,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = std::env::var("MESHPLANE_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
        {
            config.bind.set_port(port);
        }
        if let Ok(name) = std::env::var("MESHPLANE_SERVICE_NAME") {
            if !name.is_empty() {
                config.service_name = name;
            }
        }
        config
    }
}
