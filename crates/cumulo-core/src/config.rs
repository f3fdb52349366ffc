// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Cumulo control plane configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// QUIC server address workers connect to
    pub worker_addr: SocketAddr,
    /// HTTP address for the shared trigger listener
    pub trigger_addr: SocketAddr,
    /// Optional path to the local port-mapping file
    pub ports_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `CUMULO_WORKER_PORT`: worker QUIC server port (default: 7420)
    /// - `CUMULO_TRIGGER_PORT`: trigger HTTP listener port (default: 7421)
    /// - `CUMULO_PORTS_FILE`: path to a JSON file mapping resource names to
    ///   fixed gateway ports
    pub fn from_env() -> Result<Self, ConfigError> {
        let worker_port: u16 = std::env::var("CUMULO_WORKER_PORT")
            .unwrap_or_else(|_| "7420".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("CUMULO_WORKER_PORT", "must be a valid port number")
            })?;

        let trigger_port: u16 = std::env::var("CUMULO_TRIGGER_PORT")
            .unwrap_or_else(|_| "7421".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("CUMULO_TRIGGER_PORT", "must be a valid port number")
            })?;

        let ports_file = std::env::var("CUMULO_PORTS_FILE").ok().map(PathBuf::from);

        Ok(Self {
            worker_addr: SocketAddr::from(([127, 0, 0, 1], worker_port)),
            trigger_addr: SocketAddr::from(([127, 0, 0, 1], trigger_port)),
            ports_file,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    /// The port-mapping file could not be read or parsed.
    #[error("invalid ports file {path}: {reason}")]
    PortsFile {
        /// Path that failed to load.
        path: String,
        /// Read or parse failure detail.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
        unsafe {
            env::remove_var("CUMULO_WORKER_PORT");
            env::remove_var("CUMULO_TRIGGER_PORT");
            env::remove_var("CUMULO_PORTS_FILE");
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.worker_addr.port(), 7420);
        assert_eq!(config.trigger_addr.port(), 7421);
        assert!(config.ports_file.is_none());
    }

    #[test]
    fn test_config_custom_ports() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: serialized via ENV_MUTEX
        unsafe {
            env::set_var("CUMULO_WORKER_PORT", "9001");
            env::set_var("CUMULO_PORTS_FILE", "/tmp/ports.json");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.worker_addr.port(), 9001);
        assert_eq!(config.ports_file, Some(PathBuf::from("/tmp/ports.json")));

        clear_env();
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: serialized via ENV_MUTEX
        unsafe {
            env::set_var("CUMULO_WORKER_PORT", "not_a_number");
        }

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("CUMULO_WORKER_PORT", _))
        ));

        clear_env();
    }
}
