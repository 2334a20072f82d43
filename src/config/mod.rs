use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete clubwire configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClubwireConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Realtime connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Fixed delay between automatic reconnect attempts (seconds)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_url() -> String {
    std::env::var("CLUBWIRE_URL").unwrap_or_else(|_| "ws://localhost:8080/realtime".to_string())
}

fn default_reconnect_delay() -> u64 {
    5
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

/// Pending send queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum sends buffered while disconnected before callers get an error
    #[serde(default = "default_pending_limit")]
    pub pending_limit: usize,
}

fn default_pending_limit() -> usize {
    256
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pending_limit: default_pending_limit(),
        }
    }
}

impl Default for ClubwireConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<ClubwireConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    let config: ClubwireConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClubwireConfig::default();
        assert_eq!(config.connection.reconnect_delay_secs, 5);
        assert_eq!(config.queue.pending_limit, 256);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [connection]
            url = "ws://club.example.com/realtime"
            reconnect_delay_secs = 10

            [queue]
            pending_limit = 64
        "#;

        let config: ClubwireConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.connection.url, "ws://club.example.com/realtime");
        assert_eq!(config.connection.reconnect_delay_secs, 10);
        assert_eq!(config.queue.pending_limit, 64);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [queue]
            pending_limit = 8
        "#;

        let config: ClubwireConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.pending_limit, 8);
        assert_eq!(config.connection.reconnect_delay_secs, 5); // Default
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[connection]\nurl = \"ws://localhost:9000/realtime\"\nreconnect_delay_secs = 2"
        )
        .unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.connection.url, "ws://localhost:9000/realtime");
        assert_eq!(config.connection.reconnect_delay_secs, 2);
        assert_eq!(config.queue.pending_limit, 256); // Default
    }
}
