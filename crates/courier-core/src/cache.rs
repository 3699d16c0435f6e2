use log::warn;
use prost::Message;
use std::sync::Arc;

use courier_proto::Envelope;

use crate::config::Config;
use crate::error::EngineError;
use crate::store::{Store, UnprocessedItem};
use crate::time::now_ms;
use crate::worker::WorkerPool;

pub fn envelope_id(envelope: &Envelope) -> String {
    format!(
        "{}.{} {}",
        envelope.source(),
        envelope.source_device(),
        envelope.timestamp()
    )
}

// Capability to delete one cached envelope. Consumers acknowledge a
// delivered event by calling confirm(); the id never leaves the handle.
#[derive(Clone)]
pub struct Confirm {
    id: String,
    store: Arc<dyn Store>,
}

impl Confirm {
    pub async fn confirm(&self) {
        if let Err(e) = self.store.remove_unprocessed(&self.id).await {
            warn!("failed to remove {} from cache: {}", self.id, e);
        }
    }
}

pub struct CachedEnvelope {
    pub envelope: Envelope,
    pub decrypted: Option<Vec<u8>>,
}

#[derive(Clone)]
pub struct EnvelopeCache {
    store: Arc<dyn Store>,
    worker: WorkerPool,
    purge_threshold: usize,
    max_attempts: u32,
}

impl EnvelopeCache {
    pub fn new(store: Arc<dyn Store>, worker: WorkerPool, config: &Config) -> Self {
        Self {
            store,
            worker,
            purge_threshold: config.cache_purge_threshold,
            max_attempts: config.max_cache_attempts,
        }
    }

    pub fn confirm_handle(&self, envelope: &Envelope) -> Confirm {
        Confirm {
            id: envelope_id(envelope),
            store: self.store.clone(),
        }
    }

    // Must complete before the envelope is acked; the cache is the
    // persistence boundary for at-least-once delivery.
    pub async fn add(&self, envelope: &Envelope, plaintext: &[u8]) -> Result<(), EngineError> {
        let item = UnprocessedItem {
            id: envelope_id(envelope),
            version: 2,
            envelope: plaintext.to_vec(),
            decrypted: None,
            timestamp: now_ms(),
            attempts: 1,
        };
        self.store.add_unprocessed(item).await
    }

    // Attach the session-decrypted payload so a redelivery after a crash
    // skips the ratchet.
    pub async fn update_decrypted(
        &self,
        envelope: &Envelope,
        plaintext: &[u8],
    ) -> Result<(), EngineError> {
        let id = envelope_id(envelope);
        let Some(mut item) = self.store.get_unprocessed(&id).await? else {
            return Err(EngineError::storage(format!("no cached item {id}")));
        };
        item.decrypted = Some(self.worker.encode_base64(plaintext).await?);
        self.store.update_unprocessed(item).await
    }

    pub async fn remove(&self, envelope: &Envelope) -> Result<(), EngineError> {
        self.store.remove_unprocessed(&envelope_id(envelope)).await
    }

    pub async fn load_startup(&self) -> Result<Vec<CachedEnvelope>, EngineError> {
        let count = self.store.count_unprocessed().await?;
        if count > self.purge_threshold {
            warn!("purging unprocessed cache, {count} items exceeds limit");
            self.store.remove_all_unprocessed().await?;
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for mut item in self.store.get_all_unprocessed().await? {
            item.attempts += 1;
            if item.attempts >= self.max_attempts {
                warn!("dropping cached envelope {} after {} attempts", item.id, item.attempts);
                self.store.remove_unprocessed(&item.id).await?;
                continue;
            }
            self.store.update_unprocessed(item.clone()).await?;
            let envelope = match Envelope::decode(item.envelope.as_slice()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("removing undecodable cached envelope {}: {}", item.id, e);
                    self.store.remove_unprocessed(&item.id).await?;
                    continue;
                }
            };
            let decrypted = match item.decrypted {
                Some(b64) => Some(self.worker.decode_base64(&b64).await?),
                None => None,
            };
            out.push(CachedEnvelope { envelope, decrypted });
        }
        Ok(out)
    }
}
