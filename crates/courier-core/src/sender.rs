use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, warn};
use prost::Message;
use std::sync::Arc;
use tokio::task::JoinSet;

use courier_proto::{sync_message, Content, DataMessage, SyncMessage};

use crate::error::EngineError;
use crate::padding::pad;
use crate::ratchet::{CipherOptions, ProtocolAddress, RatchetProvider};
use crate::server::{DeviceMessage, ServerApi, ServerError};
use crate::store::Store;

#[derive(Debug)]
pub struct SendError {
    pub number: String,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct SendReport {
    pub successful_numbers: Vec<String>,
    pub errors: Vec<SendError>,
}

#[derive(Clone)]
pub struct MessageSender {
    store: Arc<dyn Store>,
    server: Arc<dyn ServerApi>,
    ratchet: Arc<dyn RatchetProvider>,
    local_number: String,
}

// Per-batch state shared by every recipient: the same content bytes are
// encrypted to every device within one attempt.
struct OutgoingMessage {
    content: Arc<Vec<u8>>,
    padded: Arc<Vec<u8>>,
    timestamp: u64,
    silent: bool,
}

impl MessageSender {
    pub fn new(
        store: Arc<dyn Store>,
        server: Arc<dyn ServerApi>,
        ratchet: Arc<dyn RatchetProvider>,
        local_number: impl Into<String>,
    ) -> Self {
        Self {
            store,
            server,
            ratchet,
            local_number: local_number.into(),
        }
    }

    pub async fn send_data_message(
        &self,
        numbers: &[String],
        message: DataMessage,
        timestamp: u64,
        silent: bool,
    ) -> SendReport {
        let content = Content {
            data_message: Some(message),
            ..Default::default()
        };
        self.send_content(numbers, content, timestamp, silent).await
    }

    // Mirror a sent transcript to the local number's sibling devices.
    pub async fn send_sync_sent(
        &self,
        destination: &str,
        timestamp: u64,
        message: DataMessage,
        expiration_start_timestamp: Option<u64>,
    ) -> SendReport {
        let content = Content {
            sync_message: Some(SyncMessage {
                sent: Some(sync_message::Sent {
                    destination: Some(destination.to_string()),
                    timestamp: Some(timestamp),
                    message: Some(message),
                    expiration_start_timestamp,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let numbers = vec![self.local_number.clone()];
        self.send_content(&numbers, content, timestamp, true).await
    }

    pub async fn send_content(
        &self,
        numbers: &[String],
        content: Content,
        timestamp: u64,
        silent: bool,
    ) -> SendReport {
        let encoded = content.encode_to_vec();
        let batch = Arc::new(OutgoingMessage {
            padded: Arc::new(pad(&encoded)),
            content: Arc::new(encoded),
            timestamp,
            silent,
        });
        let mut tasks = JoinSet::new();
        for number in numbers {
            let sender = self.clone();
            let batch = batch.clone();
            let number = number.clone();
            tasks.spawn(async move {
                let result = sender.send_to_number(&number, &batch).await;
                (number, result)
            });
        }
        let mut report = SendReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((number, Ok(()))) => report.successful_numbers.push(number),
                Ok((number, Err(error))) => report.errors.push(SendError { number, error }),
                Err(join_err) => warn!("send task failed: {join_err}"),
            }
        }
        report
    }

    async fn send_to_number(
        &self,
        number: &str,
        batch: &OutgoingMessage,
    ) -> Result<(), EngineError> {
        let update_devices = self.get_stale_device_ids(number).await?;
        self.get_keys_for_number(number, Some(update_devices), batch)
            .await?;
        self.do_send_message(number, batch).await
    }

    // Devices without an open session need fresh key material before we can
    // encrypt to them. An unknown number bootstraps through device 1.
    async fn get_stale_device_ids(&self, number: &str) -> Result<Vec<u32>, EngineError> {
        let device_ids = self.store.get_device_ids(number).await?;
        if device_ids.is_empty() {
            return Ok(vec![1]);
        }
        let mut stale = Vec::new();
        for device_id in device_ids {
            let cipher = self.ratchet.session_cipher(
                &ProtocolAddress::new(number, device_id),
                self.cipher_options(number),
            );
            if !cipher.has_open_session().await? {
                stale.push(device_id);
            }
        }
        Ok(stale)
    }

    async fn get_keys_for_number(
        &self,
        number: &str,
        update_devices: Option<Vec<u32>>,
        batch: &OutgoingMessage,
    ) -> Result<(), EngineError> {
        match update_devices {
            None => {
                let keys = self
                    .server
                    .get_keys_for_number(number, None)
                    .await
                    .map_err(|e| self.key_fetch_error(number, e, batch))?;
                for mut device in keys.devices {
                    device.identity_key = keys.identity_key.clone();
                    self.process_pre_key(number, &device, batch).await?;
                }
                Ok(())
            }
            Some(devices) => {
                for device_id in devices {
                    match self.server.get_keys_for_number(number, Some(device_id)).await {
                        Ok(keys) => {
                            for mut device in keys.devices {
                                device.identity_key = keys.identity_key.clone();
                                self.process_pre_key(number, &device, batch).await?;
                            }
                        }
                        Err(ServerError::NotFound) | Err(ServerError::Http { status: 404 }) => {
                            if device_id != 1 {
                                debug!("removing missing device {number}.{device_id}");
                                self.store
                                    .remove_session(&ProtocolAddress::new(number, device_id))
                                    .await?;
                            } else {
                                return Err(EngineError::UnregisteredUser {
                                    number: number.to_string(),
                                    cause: Some(Box::new(EngineError::transport("404"))),
                                });
                            }
                        }
                        Err(e) => return Err(self.key_fetch_error(number, e, batch)),
                    }
                }
                Ok(())
            }
        }
    }

    async fn process_pre_key(
        &self,
        number: &str,
        device: &crate::ratchet::PreKeyDevice,
        batch: &OutgoingMessage,
    ) -> Result<(), EngineError> {
        let builder = self
            .ratchet
            .session_builder(&ProtocolAddress::new(number, device.device_id));
        builder.process_pre_key(device).await.map_err(|e| match e {
            EngineError::IdentityKeyChanged { identity_key } => EngineError::OutgoingIdentityKey {
                number: number.to_string(),
                content: batch.content.as_ref().clone(),
                timestamp: batch.timestamp,
                identity_key,
            },
            other => other,
        })
    }

    async fn do_send_message(
        &self,
        number: &str,
        batch: &OutgoingMessage,
    ) -> Result<(), EngineError> {
        // 409 recovery re-permits a retry; 410 recovery allows exactly one
        // more attempt.
        let mut recurse = true;
        loop {
            let messages = self.encrypt_to_devices(number, batch).await?;
            match self
                .server
                .send_messages(number, &messages, batch.timestamp, batch.silent)
                .await
            {
                Ok(()) => return Ok(()),
                Err(ServerError::MismatchedDevices {
                    missing_devices,
                    extra_devices,
                }) => {
                    if !recurse {
                        return Err(self.retry_limit_error(number, batch));
                    }
                    debug!(
                        "mismatched devices for {number}: extra {extra_devices:?} missing {missing_devices:?}"
                    );
                    for device_id in extra_devices {
                        self.store
                            .remove_session(&ProtocolAddress::new(number, device_id))
                            .await?;
                    }
                    self.get_keys_for_number(number, Some(missing_devices), batch)
                        .await?;
                    recurse = true;
                }
                Err(ServerError::StaleDevices { stale_devices }) => {
                    if !recurse {
                        return Err(self.retry_limit_error(number, batch));
                    }
                    debug!("stale devices for {number}: {stale_devices:?}");
                    for device_id in &stale_devices {
                        let cipher = self.ratchet.session_cipher(
                            &ProtocolAddress::new(number, *device_id),
                            self.cipher_options(number),
                        );
                        cipher.close_open_session().await?;
                    }
                    self.get_keys_for_number(number, Some(stale_devices), batch)
                        .await?;
                    recurse = false;
                }
                Err(ServerError::NotFound) | Err(ServerError::Http { status: 404 }) => {
                    return Err(EngineError::UnregisteredUser {
                        number: number.to_string(),
                        cause: Some(Box::new(EngineError::transport("404"))),
                    });
                }
                Err(e) => {
                    let bundle = serde_json::to_string(&messages).unwrap_or_default();
                    return Err(EngineError::SendNetwork {
                        number: number.to_string(),
                        bundle,
                        timestamp: batch.timestamp,
                        code: match e {
                            ServerError::Http { status } => Some(status),
                            _ => None,
                        },
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn encrypt_to_devices(
        &self,
        number: &str,
        batch: &OutgoingMessage,
    ) -> Result<Vec<DeviceMessage>, EngineError> {
        let device_ids = self.store.get_device_ids(number).await?;
        if device_ids.is_empty() {
            return Err(EngineError::OutgoingMessage {
                number: number.to_string(),
                content: batch.content.as_ref().clone(),
                timestamp: batch.timestamp,
                reason: "Got empty device list when loading device keys".to_string(),
            });
        }
        let mut messages = Vec::with_capacity(device_ids.len());
        for device_id in device_ids {
            let cipher = self.ratchet.session_cipher(
                &ProtocolAddress::new(number, device_id),
                self.cipher_options(number),
            );
            let encrypted = cipher.encrypt(&batch.padded).await.map_err(|e| match e {
                EngineError::IdentityKeyChanged { identity_key } => {
                    EngineError::OutgoingIdentityKey {
                        number: number.to_string(),
                        content: batch.content.as_ref().clone(),
                        timestamp: batch.timestamp,
                        identity_key,
                    }
                }
                other => EngineError::OutgoingMessage {
                    number: number.to_string(),
                    content: batch.content.as_ref().clone(),
                    timestamp: batch.timestamp,
                    reason: format!("Failed to create or send message: {other}"),
                },
            })?;
            messages.push(DeviceMessage {
                msg_type: encrypted.msg_type,
                destination_device_id: device_id,
                destination_registration_id: encrypted.registration_id,
                content: STANDARD.encode(&encrypted.body),
            });
        }
        Ok(messages)
    }

    fn cipher_options(&self, number: &str) -> CipherOptions {
        CipherOptions {
            unlimited_message_keys: number == self.local_number,
        }
    }

    fn retry_limit_error(&self, number: &str, batch: &OutgoingMessage) -> EngineError {
        EngineError::OutgoingMessage {
            number: number.to_string(),
            content: batch.content.as_ref().clone(),
            timestamp: batch.timestamp,
            reason: "Hit retry limit attempting to reload device list".to_string(),
        }
    }

    fn key_fetch_error(&self, number: &str, e: ServerError, batch: &OutgoingMessage) -> EngineError {
        match e {
            ServerError::NotFound | ServerError::Http { status: 404 } => {
                EngineError::UnregisteredUser {
                    number: number.to_string(),
                    cause: Some(Box::new(EngineError::transport("404"))),
                }
            }
            other => EngineError::OutgoingMessage {
                number: number.to_string(),
                content: batch.content.as_ref().clone(),
                timestamp: batch.timestamp,
                reason: format!("Failed to create or send message: {other}"),
            },
        }
    }
}
