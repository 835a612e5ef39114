//! sftp transfer clients backed by the system curl binary
//!
//! curl speaks sftp natively and is present on every deployment platform we
//! target, so the two auth-scheme clients shell out to it instead of linking
//! an SSH stack. Each operation is a short-lived process; no connection is
//! held between calls.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{AuthScheme, TransferClient, TransferClientFactory, TransferEndpoint};
use crate::errors::TransferError;

/// Password-authenticated sftp client.
#[derive(Debug, Clone)]
pub struct PasswordAuthClient {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl PasswordAuthClient {
    pub fn new(host: String, port: u16, username: String, password: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
        }
    }

    fn base_url(&self, path: &str) -> String {
        format!("sftp://{}:{}/{}", self.host, self.port, path.trim_start_matches('/'))
    }

    fn auth_args(&self) -> Vec<String> {
        vec!["-u".to_string(), format!("{}:{}", self.username, self.password)]
    }
}

/// Key-authenticated sftp client.
#[derive(Debug, Clone)]
pub struct KeyAuthClient {
    host: String,
    port: u16,
    username: String,
    key_path: String,
    passphrase: String,
}

impl KeyAuthClient {
    pub fn new(
        host: String,
        port: u16,
        username: String,
        key_path: String,
        passphrase: String,
    ) -> Self {
        Self {
            host,
            port,
            username,
            key_path,
            passphrase,
        }
    }

    fn base_url(&self, path: &str) -> String {
        format!("sftp://{}:{}/{}", self.host, self.port, path.trim_start_matches('/'))
    }

    fn auth_args(&self) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            format!("{}:", self.username),
            "--key".to_string(),
            self.key_path.clone(),
        ];
        if !self.passphrase.is_empty() {
            args.push("--pass".to_string());
            args.push(self.passphrase.clone());
        }
        args
    }
}

async fn run_curl(host: &str, operation: &str, path: &str, args: Vec<String>) -> Result<Vec<u8>, TransferError> {
    let output = Command::new("curl")
        .args(["--silent", "--show-error", "--fail", "--connect-timeout", "30"])
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if operation == "connect" {
            Err(TransferError::connection_failed(host, stderr))
        } else {
            Err(TransferError::operation_failed(operation, path, stderr))
        }
    }
}

/// Parse the file names out of curl's directory listing output.
///
/// curl emits an `ls -l` style listing for sftp directories; the file name
/// is the last whitespace-separated column. Directory entries and the
/// `.`/`..` markers are skipped.
fn parse_listing(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .filter(|line| !line.starts_with('d'))
        .filter_map(|line| line.split_whitespace().last())
        .filter(|name| *name != "." && *name != "..")
        .map(str::to_string)
        .collect()
}

macro_rules! impl_transfer_client {
    ($client:ty) => {
        #[async_trait]
        impl TransferClient for $client {
            async fn connect(&mut self) -> Result<(), TransferError> {
                let mut args = self.auth_args();
                args.push(self.base_url(""));
                run_curl(&self.host, "connect", "/", args).await.map(|_| ())
            }

            async fn list(&mut self, dir: &str) -> Result<Vec<String>, TransferError> {
                let mut args = self.auth_args();
                args.push(self.base_url(&format!("{}/", dir.trim_end_matches('/'))));
                let raw = run_curl(&self.host, "list", dir, args).await?;
                Ok(parse_listing(&raw))
            }

            async fn fetch(&mut self, remote: &str, local: &Path) -> Result<(), TransferError> {
                let mut args = self.auth_args();
                args.push("--output".to_string());
                args.push(local.display().to_string());
                args.push(self.base_url(remote));
                run_curl(&self.host, "fetch", remote, args).await.map(|_| ())
            }

            async fn push(&mut self, local: &Path, remote: &str) -> Result<(), TransferError> {
                let mut args = self.auth_args();
                args.push("--upload-file".to_string());
                args.push(local.display().to_string());
                args.push(self.base_url(remote));
                run_curl(&self.host, "push", remote, args).await.map(|_| ())
            }

            async fn delete(&mut self, remote: &str) -> Result<(), TransferError> {
                let mut args = self.auth_args();
                args.push("--quote".to_string());
                args.push(format!("rm {remote}"));
                args.push(self.base_url(""));
                run_curl(&self.host, "delete", remote, args).await.map(|_| ())
            }
        }
    };
}

impl_transfer_client!(PasswordAuthClient);
impl_transfer_client!(KeyAuthClient);

/// Production factory: picks the client implementation matching the
/// endpoint's authentication scheme.
#[derive(Debug, Default, Clone)]
pub struct CurlClientFactory;

impl TransferClientFactory for CurlClientFactory {
    fn create(&self, endpoint: &TransferEndpoint) -> Box<dyn TransferClient> {
        match endpoint.auth {
            AuthScheme::Password => Box::new(PasswordAuthClient::new(
                endpoint.host.clone(),
                endpoint.port,
                endpoint.username.clone(),
                endpoint.password.clone(),
            )),
            AuthScheme::Key => Box::new(KeyAuthClient::new(
                endpoint.host.clone(),
                endpoint.port,
                endpoint.username.clone(),
                endpoint.key_path.clone(),
                endpoint.passphrase.clone(),
            )),
        }
    }
}
