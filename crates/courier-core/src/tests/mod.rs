pub mod retry_tests;

use async_trait::async_trait;
use prost::Message;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use courier_proto::{envelope, Content, DataMessage, Envelope};

use crate::config::{Config, Credentials};
use crate::crypto::TransportCrypto;
use crate::error::EngineError;
use crate::events::{Event, EventReceiver};
use crate::padding::pad;
use crate::ratchet::{
    CipherOptions, EncryptedMessage, PreKeyDevice, ProtocolAddress, RatchetProvider,
    SessionBuilder, SessionCipher, MESSAGE_TYPE_WHISPER,
};
use crate::receiver::MessageReceiver;
use crate::sender::MessageSender;
use crate::store::Store;
use crate::server::{
    channel_socket, DeviceKeys, DeviceMessage, MessageSocket, ServerApi, ServerError,
    SocketController,
};
use crate::store::MemoryStore;

pub const LOCAL_NUMBER: &str = "+15550009999";
pub const LOCAL_DEVICE: u32 = 1;

pub fn creds() -> Credentials {
    Credentials {
        number: LOCAL_NUMBER.to_string(),
        device_id: LOCAL_DEVICE,
        signaling_key: vec![5u8; 52],
    }
}

pub fn test_config() -> Config {
    Config {
        keepalive_interval_ms: 60_000,
        task_timeout_ms: 5_000,
        worker_timeout_ms: 5_000,
        ..Default::default()
    }
}

// The fake ratchet passes ciphertext through unchanged, so tests feed
// pre-padded plaintext as the "ciphertext". Session state mirrors the
// store's session records.
#[derive(Default)]
pub struct RatchetState {
    pub process_failures: HashSet<String>,
    pub encrypt_failures: HashSet<String>,
    pub decrypt_failures: HashSet<String>,
    pub processed: Vec<String>,
    pub closed: Vec<String>,
    pub closed_now: HashSet<String>,
    pub deleted: Vec<String>,
}

#[derive(Clone)]
pub struct FakeRatchet {
    pub state: Arc<Mutex<RatchetState>>,
    store: MemoryStore,
}

impl FakeRatchet {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            state: Arc::new(Mutex::new(RatchetState::default())),
            store,
        }
    }

    pub async fn fail_process_pre_key(&self, address: &str) {
        self.state
            .lock()
            .await
            .process_failures
            .insert(address.to_string());
    }

    pub async fn fail_encrypt(&self, address: &str) {
        self.state
            .lock()
            .await
            .encrypt_failures
            .insert(address.to_string());
    }

    pub async fn fail_decrypt(&self, address: &str) {
        self.state
            .lock()
            .await
            .decrypt_failures
            .insert(address.to_string());
    }

    pub async fn mark_session_closed(&self, address: &str) {
        self.state
            .lock()
            .await
            .closed_now
            .insert(address.to_string());
    }
}

pub struct FakeCipher {
    address: ProtocolAddress,
    state: Arc<Mutex<RatchetState>>,
    store: MemoryStore,
}

#[async_trait]
impl SessionCipher for FakeCipher {
    async fn has_open_session(&self) -> Result<bool, EngineError> {
        let closed = self
            .state
            .lock()
            .await
            .closed_now
            .contains(&self.address.to_string());
        Ok(!closed
            && self
                .store
                .has_session(&self.address.number, self.address.device_id)
                .await)
    }

    async fn encrypt(&self, padded_plaintext: &[u8]) -> Result<EncryptedMessage, EngineError> {
        let guard = self.state.lock().await;
        if guard.encrypt_failures.contains(&self.address.to_string()) {
            return Err(EngineError::IdentityKeyChanged {
                identity_key: vec![0xee; 33],
            });
        }
        Ok(EncryptedMessage {
            msg_type: MESSAGE_TYPE_WHISPER,
            body: padded_plaintext.to_vec(),
            registration_id: self.address.device_id * 100,
        })
    }

    async fn decrypt_whisper_message(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EngineError> {
        let guard = self.state.lock().await;
        if guard.decrypt_failures.contains(&self.address.to_string()) {
            return Err(EngineError::IdentityKeyChanged {
                identity_key: vec![0xdd; 33],
            });
        }
        Ok(ciphertext.to_vec())
    }

    async fn decrypt_pre_key_whisper_message(
        &self,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.decrypt_whisper_message(ciphertext).await
    }

    async fn close_open_session(&self) -> Result<(), EngineError> {
        let mut guard = self.state.lock().await;
        let address = self.address.to_string();
        guard.closed.push(address.clone());
        guard.closed_now.insert(address);
        Ok(())
    }

    async fn delete_all_sessions(&self) -> Result<(), EngineError> {
        self.state
            .lock()
            .await
            .deleted
            .push(self.address.to_string());
        self.store.remove_session(&self.address).await
    }
}

pub struct FakeBuilder {
    address: ProtocolAddress,
    state: Arc<Mutex<RatchetState>>,
    store: MemoryStore,
}

#[async_trait]
impl SessionBuilder for FakeBuilder {
    async fn process_pre_key(&self, _device: &PreKeyDevice) -> Result<(), EngineError> {
        {
            let guard = self.state.lock().await;
            if guard.process_failures.contains(&self.address.to_string()) {
                return Err(EngineError::IdentityKeyChanged {
                    identity_key: vec![0xcc; 33],
                });
            }
        }
        {
            let mut guard = self.state.lock().await;
            let address = self.address.to_string();
            guard.processed.push(address.clone());
            // A freshly processed bundle reopens the session.
            guard.closed_now.remove(&address);
        }
        self.store
            .add_session(&self.address.number, self.address.device_id)
            .await;
        Ok(())
    }
}

impl RatchetProvider for FakeRatchet {
    fn session_cipher(
        &self,
        address: &ProtocolAddress,
        _options: CipherOptions,
    ) -> Arc<dyn SessionCipher> {
        Arc::new(FakeCipher {
            address: address.clone(),
            state: self.state.clone(),
            store: self.store.clone(),
        })
    }

    fn session_builder(&self, address: &ProtocolAddress) -> Arc<dyn SessionBuilder> {
        Arc::new(FakeBuilder {
            address: address.clone(),
            state: self.state.clone(),
            store: self.store.clone(),
        })
    }
}

pub enum ScriptedSend {
    Success,
    Mismatched {
        missing: Vec<u32>,
        extra: Vec<u32>,
    },
    Stale {
        stale: Vec<u32>,
    },
    NotFound,
    Http(u16),
}

#[derive(Clone, Debug)]
pub struct SendRecord {
    pub number: String,
    pub messages: Vec<DeviceMessage>,
    pub timestamp: u64,
    pub silent: bool,
}

#[derive(Default)]
pub struct ServerState {
    pub send_script: HashMap<String, VecDeque<ScriptedSend>>,
    pub sends: Vec<SendRecord>,
    pub key_404: HashSet<(String, u32)>,
    pub known_devices: HashMap<String, Vec<u32>>,
    pub attachments: HashMap<u64, Vec<u8>>,
    pub probe_fails: bool,
    pub controllers: Vec<SocketController>,
}

#[derive(Clone, Default)]
pub struct FakeServer {
    pub state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script_send(&self, number: &str, steps: Vec<ScriptedSend>) {
        self.state
            .lock()
            .await
            .send_script
            .insert(number.to_string(), steps.into());
    }

    pub async fn set_key_404(&self, number: &str, device_id: u32) {
        self.state
            .lock()
            .await
            .key_404
            .insert((number.to_string(), device_id));
    }

    pub async fn put_attachment(&self, id: u64, data: Vec<u8>) {
        self.state.lock().await.attachments.insert(id, data);
    }

    pub async fn sends(&self) -> Vec<SendRecord> {
        self.state.lock().await.sends.clone()
    }

    pub async fn last_controller(&self) -> SocketController {
        self.state
            .lock()
            .await
            .controllers
            .last()
            .cloned()
            .expect("no socket opened")
    }

    pub async fn controller_count(&self) -> usize {
        self.state.lock().await.controllers.len()
    }
}

#[async_trait]
impl ServerApi for FakeServer {
    async fn get_keys_for_number(
        &self,
        number: &str,
        device_id: Option<u32>,
    ) -> Result<DeviceKeys, ServerError> {
        let guard = self.state.lock().await;
        let devices = match device_id {
            Some(device_id) => {
                if guard.key_404.contains(&(number.to_string(), device_id)) {
                    return Err(ServerError::NotFound);
                }
                vec![device_id]
            }
            None => guard
                .known_devices
                .get(number)
                .cloned()
                .unwrap_or_else(|| vec![1]),
        };
        Ok(DeviceKeys {
            identity_key: vec![7u8; 33],
            devices: devices
                .into_iter()
                .map(|device_id| PreKeyDevice {
                    device_id,
                    registration_id: device_id * 10,
                    identity_key: Vec::new(),
                    pre_key: None,
                    signed_pre_key: None,
                })
                .collect(),
        })
    }

    async fn send_messages(
        &self,
        number: &str,
        messages: &[DeviceMessage],
        timestamp: u64,
        silent: bool,
    ) -> Result<(), ServerError> {
        let mut guard = self.state.lock().await;
        guard.sends.push(SendRecord {
            number: number.to_string(),
            messages: messages.to_vec(),
            timestamp,
            silent,
        });
        let step = guard
            .send_script
            .get_mut(number)
            .and_then(|steps| steps.pop_front());
        match step {
            None | Some(ScriptedSend::Success) => Ok(()),
            Some(ScriptedSend::Mismatched { missing, extra }) => {
                Err(ServerError::MismatchedDevices {
                    missing_devices: missing,
                    extra_devices: extra,
                })
            }
            Some(ScriptedSend::Stale { stale }) => Err(ServerError::StaleDevices {
                stale_devices: stale,
            }),
            Some(ScriptedSend::NotFound) => Err(ServerError::NotFound),
            Some(ScriptedSend::Http(status)) => Err(ServerError::Http { status }),
        }
    }

    async fn get_attachment(&self, id: u64) -> Result<Vec<u8>, ServerError> {
        self.state
            .lock()
            .await
            .attachments
            .get(&id)
            .cloned()
            .ok_or(ServerError::NotFound)
    }

    async fn get_devices(&self, _number: &str) -> Result<Vec<u32>, ServerError> {
        if self.state.lock().await.probe_fails {
            return Err(ServerError::Network("probe".to_string()));
        }
        Ok(vec![1])
    }

    async fn open_message_socket(&self) -> Result<Box<dyn MessageSocket>, ServerError> {
        let (controller, socket) = channel_socket();
        self.state.lock().await.controllers.push(controller);
        Ok(Box::new(socket))
    }
}

// Identity transforms: the websocket layer and attachment cipher are
// exercised structurally, not cryptographically.
pub struct PlainCrypto;

#[async_trait]
impl TransportCrypto for PlainCrypto {
    async fn decrypt_websocket_message(
        &self,
        _signaling_key: &[u8],
        body: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        Ok(body.to_vec())
    }

    async fn decrypt_attachment(&self, _key: &[u8], data: &[u8]) -> Result<Vec<u8>, EngineError> {
        Ok(data.to_vec())
    }
}

pub struct Harness {
    pub receiver: MessageReceiver,
    pub store: MemoryStore,
    pub server: FakeServer,
    pub ratchet: FakeRatchet,
}

pub fn harness(config: Config) -> Harness {
    let store = MemoryStore::new(LOCAL_NUMBER, LOCAL_DEVICE);
    let server = FakeServer::new();
    let ratchet = FakeRatchet::new(store.clone());
    let receiver = MessageReceiver::new(
        creds(),
        config,
        Arc::new(store.clone()),
        Arc::new(server.clone()),
        Arc::new(ratchet.clone()),
        Arc::new(PlainCrypto),
    );
    Harness {
        receiver,
        store,
        server,
        ratchet,
    }
}

pub fn sender_harness() -> (MessageSender, MemoryStore, FakeServer, FakeRatchet) {
    let store = MemoryStore::new(LOCAL_NUMBER, LOCAL_DEVICE);
    let server = FakeServer::new();
    let ratchet = FakeRatchet::new(store.clone());
    let sender = MessageSender::new(
        Arc::new(store.clone()),
        Arc::new(server.clone()),
        Arc::new(ratchet.clone()),
        LOCAL_NUMBER,
    );
    (sender, store, server, ratchet)
}

pub fn data_message(body: &str) -> DataMessage {
    DataMessage {
        body: Some(body.to_string()),
        ..Default::default()
    }
}

pub fn content_bytes(message: DataMessage) -> Vec<u8> {
    Content {
        data_message: Some(message),
        ..Default::default()
    }
    .encode_to_vec()
}

pub fn ciphertext_envelope(source: &str, device: u32, timestamp: u64, content: Vec<u8>) -> Envelope {
    Envelope {
        r#type: Some(envelope::Type::Ciphertext as i32),
        source: Some(source.to_string()),
        source_device: Some(device),
        timestamp: Some(timestamp),
        content: Some(pad(&content)),
        ..Default::default()
    }
}

pub async fn next_event(rx: &mut EventReceiver) -> Event {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

pub async fn eventually<F, Fut>(label: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {label}");
}

pub async fn no_event(rx: &mut EventReceiver) {
    let silent = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(silent.is_err(), "expected no event");
}

pub async fn deliver(
    controller: &SocketController,
    verb: &str,
    path: &str,
    body: Option<Vec<u8>>,
) -> crate::server::SocketResponse {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let request = crate::server::SocketRequest::new(verb, path, body, Some(tx));
    assert!(controller.deliver(request), "socket gone");
    tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("timed out waiting for response")
        .expect("request dropped without response")
}

pub async fn deliver_envelope(
    controller: &SocketController,
    envelope: &Envelope,
) -> crate::server::SocketResponse {
    deliver(
        controller,
        "PUT",
        "/api/v1/message",
        Some(envelope.encode_to_vec()),
    )
    .await
}
