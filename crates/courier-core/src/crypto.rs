use async_trait::async_trait;

use crate::error::EngineError;

// Websocket-layer and attachment ciphers live outside the engine; both are
// reached through this seam.
#[async_trait]
pub trait TransportCrypto: Send + Sync {
    async fn decrypt_websocket_message(
        &self,
        signaling_key: &[u8],
        body: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    async fn decrypt_attachment(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EngineError>;
}
