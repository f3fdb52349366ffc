// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local port-mapping configuration.
//!
//! An optional JSON file pins gateway listeners to fixed ports:
//!
//! ```json
//! {
//!   "apis": { "public": 4001 },
//!   "http": { "storefront": 4100 },
//!   "websockets": { "chat": 4200 }
//! }
//! ```
//!
//! Names without a mapping get an ephemeral port. A mapped port that is
//! already in use is a startup error for that resource only.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

/// Resource-name to fixed-port mappings consumed by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortMap {
    /// Fixed ports per API name.
    #[serde(default)]
    pub apis: HashMap<String, u16>,
    /// Fixed ports per HTTP proxy host.
    #[serde(default)]
    pub http: HashMap<String, u16>,
    /// Fixed ports per websocket socket name.
    #[serde(default)]
    pub websockets: HashMap<String, u16>,
}

impl PortMap {
    /// Load a port map from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::PortsFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::PortsFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// The mapped port for an API, if any.
    pub fn api(&self, name: &str) -> Option<u16> {
        self.apis.get(name).copied()
    }

    /// The mapped port for an HTTP proxy host, if any.
    pub fn proxy(&self, name: &str) -> Option<u16> {
        self.http.get(name).copied()
    }

    /// The mapped port for a websocket socket, if any.
    pub fn websocket(&self, name: &str) -> Option<u16> {
        self.websockets.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_map() {
        let map: PortMap = serde_json::from_str(
            r#"{
                "apis": { "public": 4001, "internal": 4002 },
                "http": { "storefront": 4100 },
                "websockets": { "chat": 4200 }
            }"#,
        )
        .unwrap();

        assert_eq!(map.api("public"), Some(4001));
        assert_eq!(map.api("unmapped"), None);
        assert_eq!(map.proxy("storefront"), Some(4100));
        assert_eq!(map.websocket("chat"), Some(4200));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let map: PortMap = serde_json::from_str(r#"{ "apis": { "public": 4001 } }"#).unwrap();
        assert_eq!(map.api("public"), Some(4001));
        assert!(map.http.is_empty());
        assert!(map.websockets.is_empty());
    }

    #[test]
    fn test_load_rejects_bad_file() {
        let err = PortMap::load(Path::new("/nonexistent/ports.json")).unwrap_err();
        assert!(err.to_string().contains("ports file"));
    }
}
