use std::str::FromStr;
use std::time::Duration;

/// Server configuration, read from the environment with defaults.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request budget for an outbound send before the dispatcher gives
    /// up waiting on slow devices.
    pub send_timeout: Duration,
    /// Capacity of the per-connection inbound frame buffer between the
    /// reader task and the pump loop.
    pub inbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            send_timeout: Duration::from_secs(10),
            inbound_buffer: 16,
        }
    }
}

impl ServerConfig {
    /// Read `RELAY_HOST`, `RELAY_PORT`, `RELAY_SEND_TIMEOUT_SECS` and
    /// `RELAY_INBOUND_BUFFER`, falling back to defaults for anything unset
    /// or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("RELAY_HOST").unwrap_or(defaults.host),
            port: env_or("RELAY_PORT", defaults.port),
            send_timeout: Duration::from_secs(env_or(
                "RELAY_SEND_TIMEOUT_SECS",
                defaults.send_timeout.as_secs(),
            )),
            inbound_buffer: env_or("RELAY_INBOUND_BUFFER", defaults.inbound_buffer),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
