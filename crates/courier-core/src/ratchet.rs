use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::error::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProtocolAddress {
    pub number: String,
    pub device_id: u32,
}

impl ProtocolAddress {
    pub fn new(number: impl Into<String>, device_id: u32) -> Self {
        Self {
            number: number.into(),
            device_id,
        }
    }

    pub fn parse(encoded: &str) -> Option<Self> {
        let (number, device) = encoded.rsplit_once('.')?;
        Some(Self {
            number: number.to_string(),
            device_id: device.parse().ok()?,
        })
    }
}

impl Display for ProtocolAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.number, self.device_id)
    }
}

// Message type bytes on the wire: 1 = whisper, 3 = pre-key whisper.
pub const MESSAGE_TYPE_WHISPER: u32 = 1;
pub const MESSAGE_TYPE_PREKEY: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub msg_type: u32,
    pub body: Vec<u8>,
    pub registration_id: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CipherOptions {
    pub unlimited_message_keys: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeyEntry {
    pub key_id: u32,
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedPreKeyEntry {
    pub key_id: u32,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeyDevice {
    pub device_id: u32,
    pub registration_id: u32,
    pub identity_key: Vec<u8>,
    pub pre_key: Option<PreKeyEntry>,
    pub signed_pre_key: Option<SignedPreKeyEntry>,
}

#[async_trait]
pub trait SessionCipher: Send + Sync {
    async fn has_open_session(&self) -> Result<bool, EngineError>;
    async fn encrypt(&self, padded_plaintext: &[u8]) -> Result<EncryptedMessage, EngineError>;
    async fn decrypt_whisper_message(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EngineError>;
    async fn decrypt_pre_key_whisper_message(
        &self,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EngineError>;
    async fn close_open_session(&self) -> Result<(), EngineError>;
    async fn delete_all_sessions(&self) -> Result<(), EngineError>;
}

#[async_trait]
pub trait SessionBuilder: Send + Sync {
    async fn process_pre_key(&self, device: &PreKeyDevice) -> Result<(), EngineError>;
}

pub trait RatchetProvider: Send + Sync {
    fn session_cipher(
        &self,
        address: &ProtocolAddress,
        options: CipherOptions,
    ) -> Arc<dyn SessionCipher>;
    fn session_builder(&self, address: &ProtocolAddress) -> Arc<dyn SessionBuilder>;
}
