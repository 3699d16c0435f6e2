use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::EngineError;
use crate::ratchet::PreKeyDevice;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("http {status}")]
    Http { status: u16 },
    #[error("mismatched devices")]
    MismatchedDevices {
        missing_devices: Vec<u32>,
        extra_devices: Vec<u32>,
    },
    #[error("stale devices")]
    StaleDevices { stale_devices: Vec<u32> },
    #[error("not found")]
    NotFound,
    #[error("network {0}")]
    Network(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceKeys {
    pub identity_key: Vec<u8>,
    pub devices: Vec<PreKeyDevice>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMessage {
    #[serde(rename = "type")]
    pub msg_type: u32,
    pub destination_device_id: u32,
    pub destination_registration_id: u32,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketResponse {
    pub status: u16,
    pub reason: String,
}

#[derive(Debug)]
pub struct SocketRequest {
    pub verb: String,
    pub path: String,
    pub body: Option<Vec<u8>>,
    responder: Option<oneshot::Sender<SocketResponse>>,
}

impl SocketRequest {
    pub fn new(
        verb: impl Into<String>,
        path: impl Into<String>,
        body: Option<Vec<u8>>,
        responder: Option<oneshot::Sender<SocketResponse>>,
    ) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            body,
            responder,
        }
    }

    pub fn respond(&mut self, status: u16, reason: &str) {
        if let Some(tx) = self.responder.take() {
            let _ = tx.send(SocketResponse {
                status,
                reason: reason.to_string(),
            });
        }
    }
}

#[derive(Debug)]
pub enum SocketEvent {
    Request(SocketRequest),
    Closed { code: u16, reason: String },
}

#[async_trait]
pub trait MessageSocket: Send + Sync {
    async fn recv(&self) -> Option<SocketEvent>;
    async fn send_request(
        &self,
        verb: &str,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<SocketResponse, EngineError>;
    async fn close(&self, code: u16, reason: &str);
}

#[async_trait]
pub trait ServerApi: Send + Sync {
    async fn get_keys_for_number(
        &self,
        number: &str,
        device_id: Option<u32>,
    ) -> Result<DeviceKeys, ServerError>;

    async fn send_messages(
        &self,
        number: &str,
        messages: &[DeviceMessage],
        timestamp: u64,
        silent: bool,
    ) -> Result<(), ServerError>;

    async fn get_attachment(&self, id: u64) -> Result<Vec<u8>, ServerError>;

    async fn get_devices(&self, number: &str) -> Result<Vec<u32>, ServerError>;

    async fn open_message_socket(&self) -> Result<Box<dyn MessageSocket>, ServerError>;
}

struct ChannelShared {
    fail_requests: AtomicBool,
    client_close: Mutex<Option<(u16, String)>>,
}

// In-memory socket pair, the test-side counterpart of a live message
// socket: the controller plays the service end.
pub struct ChannelSocket {
    rx: Mutex<mpsc::UnboundedReceiver<SocketEvent>>,
    shared: Arc<ChannelShared>,
}

#[derive(Clone)]
pub struct SocketController {
    tx: mpsc::UnboundedSender<SocketEvent>,
    shared: Arc<ChannelShared>,
}

pub fn channel_socket() -> (SocketController, ChannelSocket) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(ChannelShared {
        fail_requests: AtomicBool::new(false),
        client_close: Mutex::new(None),
    });
    (
        SocketController {
            tx,
            shared: shared.clone(),
        },
        ChannelSocket {
            rx: Mutex::new(rx),
            shared,
        },
    )
}

impl SocketController {
    pub fn deliver(&self, request: SocketRequest) -> bool {
        self.tx.send(SocketEvent::Request(request)).is_ok()
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(SocketEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn set_fail_requests(&self, fail: bool) {
        self.shared.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub async fn client_close(&self) -> Option<(u16, String)> {
        self.shared.client_close.lock().await.clone()
    }
}

#[async_trait]
impl MessageSocket for ChannelSocket {
    async fn recv(&self) -> Option<SocketEvent> {
        if self.shared.client_close.lock().await.is_some() {
            return None;
        }
        self.rx.lock().await.recv().await
    }

    async fn send_request(
        &self,
        _verb: &str,
        path: &str,
        _body: Option<Vec<u8>>,
    ) -> Result<SocketResponse, EngineError> {
        if self.shared.fail_requests.load(Ordering::SeqCst) {
            return Err(EngineError::transport(format!("request to {path} failed")));
        }
        Ok(SocketResponse {
            status: 200,
            reason: "OK".to_string(),
        })
    }

    async fn close(&self, code: u16, reason: &str) {
        *self.shared.client_close.lock().await = Some((code, reason.to_string()));
    }
}
