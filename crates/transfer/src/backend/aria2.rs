//! aria2 JSON-RPC backend.
//!
//! Talks to a local `aria2c` daemon over its HTTP JSON-RPC endpoint and can
//! start the daemon when nothing is listening yet.
//!
//! # Secrets
//!
//! When the daemon runs with `--rpc-secret`, every call carries a leading
//! `token:<secret>` parameter.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{DownloadRequest, Gid, TransferState, TransferStatus};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

/// Default RPC port of aria2.
pub const DEFAULT_RPC_PORT: u16 = 6800;

/// Keys requested from `aria2.tellStatus`.
const STATUS_KEYS: [&str; 6] = [
    "status",
    "completedLength",
    "totalLength",
    "downloadSpeed",
    "errorCode",
    "errorMessage",
];

/// How to reach, and if needed start, the daemon.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Executable to launch
    pub program: String,
    /// RPC listen port
    pub port: u16,
    /// RPC secret, if the daemon requires one
    pub secret: Option<String>,
    /// Connection attempts after launching before giving up
    pub connect_attempts: u32,
    /// Delay before each connection attempt after launching
    pub connect_interval: Duration,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            program: "aria2c".to_string(),
            port: DEFAULT_RPC_PORT,
            secret: None,
            connect_attempts: 3,
            connect_interval: Duration::from_secs(2),
        }
    }
}

impl DaemonOptions {
    /// Command-line arguments for a daemonized aria2 with RPC enabled.
    ///
    /// One transfer at a time, each split across up to 16 connections, and
    /// resuming any partial file left by a previous run.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--daemon=true".to_string(),
            "--enable-rpc".to_string(),
            format!("--rpc-listen-port={}", self.port),
            "--max-concurrent-downloads=1".to_string(),
            "--max-connection-per-server=16".to_string(),
            "--split=16".to_string(),
            "--continue=true".to_string(),
            "--disable-ipv6=true".to_string(),
        ];
        if let Some(secret) = &self.secret {
            args.push(format!("--rpc-secret={secret}"));
        }
        args
    }
}

/// aria2 JSON-RPC client.
pub struct Aria2Client {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// JSON-RPC endpoint.
    endpoint: String,
    /// RPC secret.
    secret: Option<String>,
}

impl Aria2Client {
    /// Create a client for the daemon on `localhost:<port>`.
    #[must_use]
    pub fn new(port: u16, secret: Option<String>) -> Self {
        Self::with_endpoint(format!("http://localhost:{port}/jsonrpc"), secret)
    }

    /// Create a client for a custom endpoint.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>, secret: Option<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(10)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into(),
            secret,
        }
    }

    /// The JSON-RPC endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Connect to a running daemon, launching one when nothing answers.
    ///
    /// A freshly launched daemon has its finished-transfer list purged.
    pub fn connect_or_launch(opts: &DaemonOptions) -> Result<Self> {
        let client = Self::new(opts.port, opts.secret.clone());
        if client.ping().is_ok() {
            log::info!("aria2c is already running on port {}", opts.port);
            return Ok(client);
        }

        log::info!("Launching aria2c...");
        let status = Command::new(&opts.program)
            .args(opts.launch_args())
            .stdin(Stdio::null())
            .status()
            .map_err(|e| Error::DaemonUnavailable(format!("failed to run {}: {e}", opts.program)))?;
        if !status.success() {
            return Err(Error::DaemonUnavailable(format!(
                "{} exited with {status}",
                opts.program
            )));
        }

        for attempt in 1..=opts.connect_attempts {
            thread::sleep(opts.connect_interval);
            match client.ping() {
                Ok(()) => {
                    client.purge()?;
                    log::debug!("aria2c answered after {attempt} attempt(s)");
                    return Ok(client);
                }
                Err(e) => log::debug!("aria2c connection attempt {attempt}/{} failed: {e}", opts.connect_attempts),
            }
        }

        Err(Error::DaemonUnavailable(format!(
            "no answer on port {} after launching",
            opts.port
        )))
    }

    /// Check that the daemon answers.
    pub fn ping(&self) -> Result<()> {
        self.call::<Value>("aria2.getGlobalStat", Vec::new())
            .map(|_| ())
    }

    /// Build the JSON-RPC request body.
    fn request_body(&self, method: &str, params: Vec<Value>) -> Value {
        let mut all = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &self.secret {
            all.push(Value::String(format!("token:{secret}")));
        }
        all.extend(params);
        json!({
            "jsonrpc": "2.0",
            "id": "comfyboot",
            "method": method,
            "params": all,
        })
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let body = self.request_body(method, params);
        let response: RpcResponse<T> = self
            .agent
            .post(&self.endpoint)
            .send_json(&body)?
            .body_mut()
            .read_json()?;
        response.into_result()
    }
}

impl Backend for Aria2Client {
    fn add(&self, request: &DownloadRequest) -> Result<Gid> {
        let mut options = json!({
            "dir": request.dir.to_string_lossy(),
            "out": request.filename,
        });
        if let Some(header) = &request.header {
            options["header"] = json!([header]);
        }
        self.call("aria2.addUri", vec![json!([request.url]), options])
    }

    fn status(&self, gid: &Gid) -> Result<TransferStatus> {
        let raw: RawStatus = self.call("aria2.tellStatus", vec![json!(gid), json!(STATUS_KEYS)])?;
        Ok(raw.into())
    }

    fn remove(&self, gid: &Gid) -> Result<()> {
        // Already-stopped transfers reject forceRemove; only the result needs dropping.
        if let Err(e) = self.call::<Value>("aria2.forceRemove", vec![json!(gid)]) {
            log::debug!("forceRemove {gid}: {e}");
        }
        self.call::<Value>("aria2.removeDownloadResult", vec![json!(gid)])
            .map(|_| ())
    }

    fn purge(&self) -> Result<()> {
        self.call::<Value>("aria2.purgeDownloadResult", Vec::new())
            .map(|_| ())
    }
}

// =============================================================================
// JSON-RPC response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl<T> RpcResponse<T> {
    fn into_result(self) -> Result<T> {
        if let Some(err) = self.error {
            return Err(Error::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| Error::InvalidResponse("missing result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    status: TransferState,
    #[serde(default)]
    completed_length: String,
    #[serde(default)]
    total_length: String,
    #[serde(default)]
    download_speed: String,
    error_code: Option<String>,
    error_message: Option<String>,
}

impl From<RawStatus> for TransferStatus {
    fn from(raw: RawStatus) -> Self {
        Self {
            state: raw.status,
            completed: raw.completed_length.parse().unwrap_or(0),
            total: raw.total_length.parse().unwrap_or(0),
            speed: raw.download_speed.parse().unwrap_or(0),
            error_code: raw.error_code.filter(|code| code != "0"),
            error_message: raw.error_message.filter(|msg| !msg.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args() {
        let opts = DaemonOptions {
            port: 6900,
            secret: Some("s3cret".to_string()),
            ..DaemonOptions::default()
        };
        let args = opts.launch_args();
        assert_eq!(args[0], "--daemon=true");
        assert!(args.contains(&"--rpc-listen-port=6900".to_string()));
        assert!(args.contains(&"--split=16".to_string()));
        assert!(args.contains(&"--continue=true".to_string()));
        assert_eq!(args.last().unwrap(), "--rpc-secret=s3cret");
    }

    #[test]
    fn test_request_body_prepends_token() {
        let client = Aria2Client::new(6800, Some("abc".to_string()));
        let body = client.request_body("aria2.tellStatus", vec![json!("2089b05ecca3d829")]);
        assert_eq!(body["method"], "aria2.tellStatus");
        assert_eq!(body["params"][0], "token:abc");
        assert_eq!(body["params"][1], "2089b05ecca3d829");
    }

    #[test]
    fn test_request_body_without_secret() {
        let client = Aria2Client::new(6800, None);
        let body = client.request_body("aria2.getGlobalStat", Vec::new());
        assert_eq!(body["params"], json!([]));
        assert_eq!(client.endpoint(), "http://localhost:6800/jsonrpc");
    }

    #[test]
    fn test_raw_status_conversion() {
        let raw: RawStatus = serde_json::from_value(json!({
            "status": "error",
            "completedLength": "1024",
            "totalLength": "4096",
            "downloadSpeed": "0",
            "errorCode": "24",
            "errorMessage": "Authorization failed."
        }))
        .unwrap();
        let status = TransferStatus::from(raw);
        assert_eq!(status.state, TransferState::Error);
        assert_eq!(status.completed, 1024);
        assert_eq!(status.total, 4096);
        assert_eq!(status.error_code.as_deref(), Some("24"));
    }

    #[test]
    fn test_raw_status_zero_code_is_no_error() {
        let raw: RawStatus = serde_json::from_value(json!({
            "status": "complete",
            "completedLength": "10",
            "totalLength": "10",
            "downloadSpeed": "0",
            "errorCode": "0",
            "errorMessage": ""
        }))
        .unwrap();
        let status = TransferStatus::from(raw);
        assert_eq!(status.error_code, None);
        assert_eq!(status.error_message, None);
    }

    #[test]
    fn test_rpc_error_response() {
        let response: RpcResponse<Value> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "comfyboot",
            "error": {"code": 1, "message": "Unauthorized"}
        }))
        .unwrap();
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, Error::Rpc { code: 1, .. }));
    }

    #[test]
    fn test_rpc_gid_response() {
        let response: RpcResponse<Gid> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "comfyboot",
            "result": "2089b05ecca3d829"
        }))
        .unwrap();
        assert_eq!(response.into_result().unwrap(), Gid("2089b05ecca3d829".to_string()));
    }

    #[test]
    fn test_launch_failure_is_unavailable() {
        let opts = DaemonOptions {
            program: "definitely-not-aria2c-xyz".to_string(),
            port: 1,
            connect_attempts: 1,
            connect_interval: Duration::ZERO,
            ..DaemonOptions::default()
        };
        let err = Aria2Client::connect_or_launch(&opts).err().unwrap();
        assert!(matches!(err, Error::DaemonUnavailable(_)));
    }
}
