use log::{debug, error, warn};
use prost::Message;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

use courier_proto::{envelope, Content, Envelope};

use crate::cache::EnvelopeCache;
use crate::config::{Config, Credentials};
use crate::crypto::TransportCrypto;
use crate::error::EngineError;
use crate::events::{
    DeliveryEvent, ErrorEvent, Event, EventBus, EventReceiver, MessageEvent, ReadEvent,
};
use crate::padding::unpad;
use crate::queue::TaskQueue;
use crate::ratchet::{CipherOptions, ProtocolAddress, RatchetProvider};
use crate::server::{ServerApi, SocketRequest};
use crate::socket::{run_socket, CloseCommand, SocketState};
use crate::store::Store;
use crate::time::now_ms;
use crate::worker::WorkerPool;

pub(crate) struct SocketLife {
    pub(crate) state: SocketState,
    pub(crate) has_connected: bool,
    pub(crate) called_close: bool,
    pub(crate) generation: u64,
    pub(crate) control: Option<mpsc::UnboundedSender<CloseCommand>>,
}

pub(crate) struct ReceiverInner {
    pub(crate) creds: Credentials,
    pub(crate) config: Config,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) server: Arc<dyn ServerApi>,
    pub(crate) ratchet: Arc<dyn RatchetProvider>,
    pub(crate) crypto: Arc<dyn TransportCrypto>,
    pub(crate) cache: EnvelopeCache,
    pub(crate) queue: TaskQueue,
    pub(crate) events: EventBus,
    pub(crate) life: Mutex<SocketLife>,
    // Tail of the in-flight receive chain; handler N waits on handler N-1
    // before queueing its dispatch task.
    incoming_tail: std::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

#[derive(Clone)]
pub struct MessageReceiver {
    inner: Arc<ReceiverInner>,
}

impl MessageReceiver {
    pub fn new(
        creds: Credentials,
        config: Config,
        store: Arc<dyn Store>,
        server: Arc<dyn ServerApi>,
        ratchet: Arc<dyn RatchetProvider>,
        crypto: Arc<dyn TransportCrypto>,
    ) -> Self {
        let events = EventBus::new(256);
        let worker = WorkerPool::spawn(config.worker_timeout_ms);
        let cache = EnvelopeCache::new(store.clone(), worker, &config);
        let queue = TaskQueue::spawn(config.task_timeout_ms, config.progress_every, events.clone());
        Self {
            inner: Arc::new(ReceiverInner {
                creds,
                config,
                store,
                server,
                ratchet,
                crypto,
                cache,
                queue,
                events,
                life: Mutex::new(SocketLife {
                    state: SocketState::Disconnected,
                    has_connected: false,
                    called_close: false,
                    generation: 0,
                    control: None,
                }),
                incoming_tail: std::sync::Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    pub async fn socket_state(&self) -> SocketState {
        self.inner.life.lock().await.state
    }

    pub async fn connect(&self) -> Result<(), EngineError> {
        self.inner.clone().connect().await
    }

    // Terminal close; resolves once the socket is down and the task chain
    // has drained.
    pub async fn close(&self) {
        let closed = {
            let mut life = self.inner.life.lock().await;
            life.called_close = true;
            life.state = SocketState::Closing;
            life.control.take().map(|control| {
                let (done, closed) = oneshot::channel();
                let _ = control.send(CloseCommand {
                    code: 3000,
                    reason: "called close".to_string(),
                    done: Some(done),
                });
                closed
            })
        };
        if let Some(closed) = closed {
            let _ = closed.await;
        }
        self.inner.drain().await;
        self.inner.life.lock().await.state = SocketState::Closed;
    }

    pub async fn drain(&self) {
        self.inner.drain().await;
    }

    pub async fn try_message_again(
        &self,
        from: &str,
        ciphertext: &[u8],
        sent_at: u64,
    ) -> Result<(), EngineError> {
        self.inner.try_message_again(from, ciphertext, sent_at).await
    }
}

impl ReceiverInner {
    pub(crate) async fn connect(self: Arc<Self>) -> Result<(), EngineError> {
        let reconnecting = {
            let life = self.life.lock().await;
            if life.called_close {
                return Ok(());
            }
            life.has_connected
        };
        if reconnecting {
            self.events.publish(Event::Reconnect);
        } else if self.config.retry_cached {
            self.queue_all_cached().await?;
        }
        {
            let mut life = self.life.lock().await;
            // At most one connection: invalidate the previous socket's
            // callbacks, then shut it down.
            life.generation += 1;
            if let Some(control) = life.control.take() {
                let _ = control.send(CloseCommand {
                    code: 1000,
                    reason: "reconnect".to_string(),
                    done: None,
                });
            }
            life.state = SocketState::Connecting;
        }
        let socket = self
            .server
            .open_message_socket()
            .await
            .map_err(|e| EngineError::transport(format!("socket open failed: {e}")))?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let generation = {
            let mut life = self.life.lock().await;
            life.control = Some(control_tx);
            life.state = SocketState::Open;
            life.has_connected = true;
            life.generation
        };
        tokio::spawn(run_socket(self.clone(), socket, control_rx, generation));
        Ok(())
    }

    pub(crate) async fn on_close(self: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        {
            let mut life = self.life.lock().await;
            if life.generation != generation {
                return;
            }
            life.state = SocketState::Closed;
            life.control = None;
            if life.called_close {
                return;
            }
        }
        debug!("socket closed: {code} {reason}");
        if code == 3000 {
            return;
        }
        if code == 3001 {
            self.on_empty().await;
            return;
        }
        // Transient close: probe connectivity, then either reconnect or
        // surface the failure.
        match self.server.get_devices(&self.creds.number).await {
            Ok(_) => {
                if let Err(e) = self.clone().connect().await {
                    self.publish_error(e, None);
                }
            }
            Err(e) => {
                self.publish_error(
                    EngineError::transport(format!("connectivity probe failed: {e}")),
                    None,
                );
            }
        }
    }

    // Called inline from the socket loop so that chain slots are claimed in
    // arrival order.
    pub(crate) fn handle_request(self: &Arc<Self>, mut request: SocketRequest) {
        if request.verb == "PUT" && request.path == "/api/v1/queue/empty" {
            request.respond(200, "OK");
            let (prev, slot) = self.chain_slot();
            let inner = self.clone();
            tokio::spawn(async move {
                if let Some(prev) = prev {
                    let _ = prev.await;
                }
                inner.queue_empty_signal().await;
                let _ = slot.send(());
            });
            return;
        }
        if request.verb != "PUT" || request.path != "/api/v1/message" {
            debug!("got request {} {}", request.verb, request.path);
            request.respond(200, "OK");
            return;
        }
        let (prev, slot) = self.chain_slot();
        let inner = self.clone();
        tokio::spawn(async move {
            inner.handle_message_request(request, prev).await;
            let _ = slot.send(());
        });
    }

    async fn handle_message_request(
        self: &Arc<Self>,
        mut request: SocketRequest,
        prev: Option<oneshot::Receiver<()>>,
    ) {
        let body = match request.body.take() {
            Some(body) => body,
            None => {
                request.respond(500, "Bad encrypted websocket message");
                self.publish_error(EngineError::MalformedEnvelope, None);
                return;
            }
        };
        let plaintext = match self
            .crypto
            .decrypt_websocket_message(&self.creds.signaling_key, &body)
            .await
        {
            Ok(plaintext) => plaintext,
            Err(e) => {
                request.respond(500, "Bad encrypted websocket message");
                self.publish_error(e, None);
                return;
            }
        };
        let envelope = match Envelope::decode(plaintext.as_slice()) {
            Ok(envelope) => envelope,
            Err(e) => {
                request.respond(500, "Bad encrypted websocket message");
                self.publish_error(EngineError::from(e), None);
                return;
            }
        };
        if self.is_blocked(envelope.source()).await {
            request.respond(200, "OK");
            return;
        }
        // The ack must not outrun the cache write; the cache is the
        // at-least-once boundary.
        match self.cache.add(&envelope, &plaintext).await {
            Ok(()) => {
                request.respond(200, "OK");
                if let Some(prev) = prev {
                    let _ = prev.await;
                }
                self.queue_envelope(envelope, None);
            }
            Err(e) => {
                error!("failed to cache envelope: {e}");
                request.respond(500, "Failed to cache message");
            }
        }
    }

    fn chain_slot(&self) -> (Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let prev = self
            .incoming_tail
            .lock()
            .map(|mut tail| tail.replace(rx))
            .unwrap_or(None);
        (prev, tx)
    }

    pub(crate) async fn on_empty(self: &Arc<Self>) {
        let (prev, slot) = self.chain_slot();
        if let Some(prev) = prev {
            let _ = prev.await;
        }
        self.queue_empty_signal().await;
        let _ = slot.send(());
    }

    async fn queue_empty_signal(&self) {
        let events = self.events.clone();
        let _ = self
            .queue
            .add_and_wait(async move {
                events.publish(Event::Empty);
                Ok(())
            })
            .await;
    }

    pub(crate) async fn drain(&self) {
        let (prev, slot) = self.chain_slot();
        if let Some(prev) = prev {
            let _ = prev.await;
        }
        let _ = slot.send(());
        self.queue.drain().await;
    }

    async fn queue_all_cached(self: &Arc<Self>) -> Result<(), EngineError> {
        for cached in self.cache.load_startup().await? {
            self.queue_envelope(cached.envelope, cached.decrypted);
        }
        Ok(())
    }

    fn queue_envelope(self: &Arc<Self>, envelope: Envelope, decrypted: Option<Vec<u8>>) {
        let inner = self.clone();
        let _ = self.queue.add(async move {
            let confirm = inner.cache.confirm_handle(&envelope);
            match inner.handle_envelope(&envelope, decrypted).await {
                Ok(()) => Ok(()),
                Err(e @ EngineError::IncomingIdentityKey { .. }) => {
                    // Already surfaced with its own error event inside
                    // decrypt(); the cached item stays for the caller.
                    debug!("envelope held for identity decision: {e}");
                    Err(e)
                }
                Err(e) => {
                    warn!("error handling envelope: {e}");
                    let error = Arc::new(e);
                    inner.events.publish(Event::Error(ErrorEvent {
                        error: error.clone(),
                        confirm: Some(confirm),
                    }));
                    Err(EngineError::transport(format!("envelope failed: {error}")))
                }
            }
        });
    }

    pub(crate) async fn handle_envelope(
        self: &Arc<Self>,
        envelope: &Envelope,
        decrypted: Option<Vec<u8>>,
    ) -> Result<(), EngineError> {
        if envelope.envelope_type() == envelope::Type::Receipt {
            self.events.publish(Event::Delivery(DeliveryEvent {
                timestamp: envelope.timestamp(),
                source: envelope.source().to_string(),
                source_device: envelope.source_device(),
                confirm: self.cache.confirm_handle(envelope),
            }));
            return Ok(());
        }
        if let Some(plaintext) = decrypted {
            return if envelope.content.is_some() {
                self.inner_handle_content_message(envelope, &plaintext).await
            } else {
                self.inner_handle_legacy_message(envelope, &plaintext).await
            };
        }
        if let Some(content) = envelope.content.clone() {
            let plaintext = self.decrypt(envelope, &content).await?;
            self.inner_handle_content_message(envelope, &plaintext).await
        } else if let Some(legacy) = envelope.legacy_message.clone() {
            let plaintext = self.decrypt(envelope, &legacy).await?;
            self.inner_handle_legacy_message(envelope, &plaintext).await
        } else {
            self.cache.remove(envelope).await?;
            Err(EngineError::MalformedEnvelope)
        }
    }

    pub(crate) async fn decrypt(
        self: &Arc<Self>,
        envelope: &Envelope,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let address = ProtocolAddress::new(envelope.source(), envelope.source_device());
        let options = CipherOptions {
            // Sibling devices sync through our own number; never drop their
            // message keys.
            unlimited_message_keys: envelope.source() == self.creds.number,
        };
        let cipher = self.ratchet.session_cipher(&address, options);
        let result = match envelope.envelope_type() {
            envelope::Type::Ciphertext => cipher.decrypt_whisper_message(ciphertext).await,
            envelope::Type::PrekeyBundle => {
                cipher.decrypt_pre_key_whisper_message(ciphertext).await
            }
            other => return Err(EngineError::UnknownMessageType(other as i32)),
        };
        match result {
            Ok(padded) => {
                let plaintext = unpad(&padded)?;
                if let Err(e) = self.cache.update_decrypted(envelope, &plaintext).await {
                    warn!("failed to persist decrypted payload: {e}");
                }
                Ok(plaintext)
            }
            Err(EngineError::IdentityKeyChanged { identity_key }) => {
                self.events.publish(Event::Error(ErrorEvent {
                    error: Arc::new(EngineError::IncomingIdentityKey {
                        address: address.to_string(),
                        ciphertext: ciphertext.to_vec(),
                        identity_key: identity_key.clone(),
                    }),
                    confirm: Some(self.cache.confirm_handle(envelope)),
                }));
                Err(EngineError::IncomingIdentityKey {
                    address: address.to_string(),
                    ciphertext: ciphertext.to_vec(),
                    identity_key,
                })
            }
            Err(other) => Err(other),
        }
    }

    pub(crate) async fn inner_handle_content_message(
        self: &Arc<Self>,
        envelope: &Envelope,
        plaintext: &[u8],
    ) -> Result<(), EngineError> {
        let content = Content::decode(plaintext)?;
        if let Some(sync) = content.sync_message {
            self.handle_sync_message(envelope, sync).await
        } else if let Some(data) = content.data_message {
            self.handle_data_message(envelope, data).await
        } else if content.null_message.is_some() {
            self.cache.remove(envelope).await
        } else if content.call_message.is_some() {
            debug!("dropping call message from {}", envelope.source());
            self.cache.remove(envelope).await
        } else if let Some(receipt) = content.receipt_message {
            self.handle_receipt_message(envelope, receipt)
        } else {
            self.cache.remove(envelope).await?;
            Err(EngineError::UnsupportedContent)
        }
    }

    pub(crate) async fn inner_handle_legacy_message(
        self: &Arc<Self>,
        envelope: &Envelope,
        plaintext: &[u8],
    ) -> Result<(), EngineError> {
        let message = courier_proto::DataMessage::decode(plaintext)?;
        self.handle_data_message(envelope, message).await
    }

    pub(crate) async fn handle_data_message(
        self: &Arc<Self>,
        envelope: &Envelope,
        message: courier_proto::DataMessage,
    ) -> Result<(), EngineError> {
        if message.flags() & courier_proto::data_message::FLAG_END_SESSION != 0 {
            self.handle_end_session(envelope.source()).await?;
        }
        let (message, attachments) = self.process_decrypted(envelope, message).await?;
        self.events.publish(Event::Message(MessageEvent {
            source: envelope.source().to_string(),
            source_device: envelope.source_device(),
            timestamp: envelope.timestamp(),
            received_at: now_ms(),
            message,
            attachments,
            confirm: self.cache.confirm_handle(envelope),
        }));
        Ok(())
    }

    fn handle_receipt_message(
        self: &Arc<Self>,
        envelope: &Envelope,
        receipt: courier_proto::ReceiptMessage,
    ) -> Result<(), EngineError> {
        use courier_proto::service::receipt_message::Type;
        for timestamp in receipt.timestamp.iter().copied() {
            match receipt.receipt_type() {
                Type::Delivery => self.events.publish(Event::Delivery(DeliveryEvent {
                    timestamp,
                    source: envelope.source().to_string(),
                    source_device: envelope.source_device(),
                    confirm: self.cache.confirm_handle(envelope),
                })),
                Type::Read => self.events.publish(Event::Read(ReadEvent {
                    timestamp,
                    reader: envelope.source().to_string(),
                    confirm: self.cache.confirm_handle(envelope),
                })),
            }
        }
        Ok(())
    }

    pub(crate) async fn handle_end_session(&self, number: &str) -> Result<(), EngineError> {
        for device_id in self.store.get_device_ids(number).await? {
            let address = ProtocolAddress::new(number, device_id);
            debug!("deleting all sessions for {address}");
            let cipher = self
                .ratchet
                .session_cipher(&address, CipherOptions::default());
            cipher.delete_all_sessions().await?;
        }
        Ok(())
    }

    pub(crate) async fn is_blocked(&self, number: &str) -> bool {
        match self.store.get_pref("blocked").await {
            Ok(Some(value)) => value
                .as_array()
                .map(|list| list.iter().any(|v| v.as_str() == Some(number)))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub(crate) fn publish_error(&self, error: EngineError, confirm: Option<crate::cache::Confirm>) {
        self.events.publish(Event::Error(ErrorEvent {
            error: Arc::new(error),
            confirm,
        }));
    }
}
