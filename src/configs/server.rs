use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::protocol::{ResolutionTier, UnknownTier};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Seconds between periodic stats log lines. `0` disables them.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

/// TLS identity and trust settings, shared by the server and the player.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TlsConfig {
    /// PEM certificate chain of this process.
    pub cert_path: String,
    /// PEM private key matching `cert_path`.
    pub key_path: String,
    /// Trust root the player verifies servers against. Defaults to `cert_path`,
    /// which covers a pool sharing one self-signed certificate.
    #[serde(default)]
    pub ca_path: Option<String>,
    /// When set, the server requires client certificates signed by this CA.
    #[serde(default)]
    pub client_ca_path: Option<String>,
    /// When true the player presents `cert_path`/`key_path` to the server.
    #[serde(default)]
    pub mutual: bool,
    /// Name the player expects in the server certificate.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_min_tls_version")]
    pub min_tls_version: String,
}

/// One title and the frame directory of each of its tiers, keyed by wire name.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogEntry {
    pub title: String,
    pub tiers: BTreeMap<String, PathBuf>,
}

impl CatalogEntry {
    pub fn tier_paths(&self) -> Result<BTreeMap<ResolutionTier, PathBuf>, UnknownTier> {
        self.tiers
            .iter()
            .map(|(name, path)| Ok((name.parse::<ResolutionTier>()?, path.clone())))
            .collect()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_stats_interval() -> u64 {
    30
}

fn default_server_name() -> String {
    "localhost".to_string()
}

fn default_min_tls_version() -> String {
    "1.2".to_string()
}
