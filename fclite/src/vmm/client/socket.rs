//! HTTP client over the hypervisor's Unix control socket.

use super::VmmClient;
use crate::vmm::models::{
    ActionType, ApiFault, BootSource, Drive, InstanceAction, LoggerConfig, MachineSpec,
    NetworkInterface, SnapshotCreateParams, SnapshotLoadParams, VmState, VmStateUpdate,
};
use async_trait::async_trait;
use bytes::Bytes;
use fclite_shared::errors::{FcliteError, FcliteResult};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::path::PathBuf;
use tokio::net::UnixStream;

/// Default [`VmmClient`] talking JSON over HTTP/1.1 on a Unix socket.
///
/// Opens one connection per request; the API socket serves a single
/// client at a time.
#[derive(Debug, Clone)]
pub struct SocketClient {
    socket_path: PathBuf,
}

impl SocketClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    async fn send<T>(&self, method: Method, path: &str, body: &T) -> FcliteResult<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let payload = serde_json::to_vec(body)?;

        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            FcliteError::Transport(format!(
                "Failed to connect to {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;

        let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| FcliteError::Transport(format!("HTTP handshake failed: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("API connection closed with error: {}", e);
            }
        });

        let request = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(HOST, "localhost")
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| FcliteError::Internal(format!("Failed to build request: {}", e)))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| FcliteError::Transport(format!("{} {} failed: {}", method, path, e)))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FcliteError::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();

        if status.is_success() {
            tracing::trace!(method = %method, path, status = status.as_u16(), "API request done");
            return Ok(());
        }

        Err(api_error(status, &body))
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> FcliteError {
    let message = serde_json::from_slice::<ApiFault>(body)
        .map(|fault| fault.fault_message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    FcliteError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl VmmClient for SocketClient {
    async fn put_logger(&self, logger: &LoggerConfig) -> FcliteResult<()> {
        self.send(Method::PUT, "/logger", logger).await
    }

    async fn put_machine_config(&self, spec: &MachineSpec) -> FcliteResult<()> {
        self.send(Method::PUT, "/machine-config", spec).await
    }

    async fn put_boot_source(&self, boot_source: &BootSource) -> FcliteResult<()> {
        self.send(Method::PUT, "/boot-source", boot_source).await
    }

    async fn put_drive(&self, drive: &Drive) -> FcliteResult<()> {
        let path = format!("/drives/{}", drive.drive_id);
        self.send(Method::PUT, &path, drive).await
    }

    async fn put_network_interface(&self, iface: &NetworkInterface) -> FcliteResult<()> {
        let path = format!("/network-interfaces/{}", iface.iface_id);
        self.send(Method::PUT, &path, iface).await
    }

    async fn create_sync_action(&self, action: ActionType) -> FcliteResult<()> {
        let body = InstanceAction {
            action_type: action,
        };
        self.send(Method::PUT, "/actions", &body).await
    }

    async fn patch_vm_state(&self, state: VmState) -> FcliteResult<()> {
        self.send(Method::PATCH, "/vm", &VmStateUpdate { state }).await
    }

    async fn load_snapshot(&self, params: &SnapshotLoadParams) -> FcliteResult<()> {
        self.send(Method::PUT, "/snapshot/load", params).await
    }

    async fn create_snapshot(&self, params: &SnapshotCreateParams) -> FcliteResult<()> {
        self.send(Method::PUT, "/snapshot/create", params).await
    }
}
