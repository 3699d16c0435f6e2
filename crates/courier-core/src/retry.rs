use log::debug;
use prost::Message;
use std::sync::Arc;

use courier_proto::{Content, DataMessage, Envelope};

use crate::error::EngineError;
use crate::padding::unpad;
use crate::ratchet::{CipherOptions, ProtocolAddress};
use crate::receiver::ReceiverInner;

// Messages older than this cutoff predate the Content wrapper and are
// decoded as bare DataMessage (2017-06-01T07:00:00Z).
const CONTENT_CUTOFF_MS: u64 = 1_496_300_400_000;

impl ReceiverInner {
    // Re-decrypt a specific ciphertext after the caller accepted a stored
    // identity-key change.
    pub(crate) async fn try_message_again(
        self: &Arc<Self>,
        from: &str,
        ciphertext: &[u8],
        sent_at: u64,
    ) -> Result<(), EngineError> {
        let address = ProtocolAddress::parse(from)
            .ok_or_else(|| EngineError::validation(format!("bad address {from}")))?;
        let cipher = self
            .ratchet
            .session_cipher(&address, CipherOptions::default());
        let padded = cipher.decrypt_pre_key_whisper_message(ciphertext).await?;
        let plaintext = unpad(&padded)?;

        let envelope = Envelope {
            source: Some(address.number.clone()),
            source_device: Some(address.device_id),
            timestamp: Some(sent_at),
            ..Default::default()
        };

        if sent_at < CONTENT_CUTOFF_MS {
            debug!("handling message sent before content cutoff as legacy");
            let message = DataMessage::decode(plaintext.as_slice())?;
            return self.handle_data_message(&envelope, message).await;
        }

        match Content::decode(plaintext.as_slice()) {
            Ok(content) if validate_retry_content_message(&content) => {
                if let Some(message) = content.data_message {
                    self.handle_data_message(&envelope, message).await
                } else if content.null_message.is_some() || content.call_message.is_some() {
                    self.cache.remove(&envelope).await
                } else {
                    Err(EngineError::UnsupportedContent)
                }
            }
            _ => {
                let message = DataMessage::decode(plaintext.as_slice())?;
                self.handle_data_message(&envelope, message).await
            }
        }
    }
}

pub(crate) fn validate_retry_content_message(content: &Content) -> bool {
    if content.sync_message.is_some() {
        return false;
    }
    let set = [
        content.data_message.is_some(),
        content.call_message.is_some(),
        content.null_message.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    if set != 1 {
        return false;
    }
    if let Some(message) = &content.data_message {
        let meaningful = !message.attachments.is_empty()
            || message.body.is_some()
            || message.expire_timer.is_some()
            || message.flags.is_some()
            || message.group.is_some();
        if !meaningful {
            return false;
        }
    }
    true
}
