//! Remote file transfer capability
//!
//! The generic transfer source/target connectors move files through a
//! [`TransferClient`] rather than speaking a wire protocol themselves. Two
//! independent client implementations are provided, one per authentication
//! scheme (password and private key); both delegate the byte-level sftp
//! protocol to the system `curl` binary. Tests substitute an in-memory
//! client through [`TransferClientFactory`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TransferError;

pub mod curl;

pub use curl::{CurlClientFactory, KeyAuthClient, PasswordAuthClient};

/// Authentication scheme for a transfer endpoint. Each scheme has its own
/// independent client implementation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    Password,
    Key,
}

/// Endpoint description shared by the transfer source and target.
///
/// Kept flat so the admin surface's key→value overrides apply field by
/// field; which credential fields are used depends on `auth`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransferEndpoint {
    pub host: String,
    pub port: u16,
    pub auth: AuthScheme,
    pub username: String,
    pub password: String,
    pub key_path: String,
    pub passphrase: String,
}

impl Default for TransferEndpoint {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            auth: AuthScheme::Password,
            username: String::new(),
            password: String::new(),
            key_path: String::new(),
            passphrase: String::new(),
        }
    }
}

/// Uniform remote file operations.
///
/// Implementations are thin I/O wrappers; retry policy, filtering and
/// partial-failure handling belong to the connectors on top.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Probe connectivity and authentication.
    async fn connect(&mut self) -> Result<(), TransferError>;

    /// File names (not paths) within a remote directory.
    async fn list(&mut self, dir: &str) -> Result<Vec<String>, TransferError>;

    /// Download a remote file to a local path.
    async fn fetch(&mut self, remote: &str, local: &Path) -> Result<(), TransferError>;

    /// Upload a local file to a remote path.
    async fn push(&mut self, local: &Path, remote: &str) -> Result<(), TransferError>;

    /// Remove a remote file.
    async fn delete(&mut self, remote: &str) -> Result<(), TransferError>;
}

/// Builds a client for an endpoint, choosing the implementation that matches
/// the endpoint's authentication scheme.
pub trait TransferClientFactory: Send + Sync {
    fn create(&self, endpoint: &TransferEndpoint) -> Box<dyn TransferClient>;
}

pub type SharedClientFactory = Arc<dyn TransferClientFactory>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_settings_round_trip_as_json() {
        let endpoint = TransferEndpoint {
            host: "files.example.com".to_string(),
            port: 2222,
            auth: AuthScheme::Key,
            username: "etl".to_string(),
            key_path: "/etc/etl/id_ed25519".to_string(),
            ..TransferEndpoint::default()
        };
        let json = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(json["auth"], "key");
        assert_eq!(json["host"], "files.example.com");

        let parsed: TransferEndpoint = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, endpoint);
    }

    #[test]
    fn endpoint_deserializes_from_an_empty_map() {
        let endpoint: TransferEndpoint = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(endpoint, TransferEndpoint::default());
        assert_eq!(endpoint.auth, AuthScheme::Password);
        assert_eq!(endpoint.port, 22);
    }
}
