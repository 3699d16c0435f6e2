use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::warn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::EngineError;

#[derive(Debug)]
enum WorkerCall {
    EncodeBase64(Vec<u8>),
    DecodeBase64(String),
}

#[derive(Debug)]
enum WorkerReply {
    Text(String),
    Bytes(Vec<u8>),
}

struct WorkerRequest {
    id: u64,
    call: WorkerCall,
}

type Registry = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<WorkerReply, EngineError>>>>>;

// Codec jobs run on a dedicated task, matched to callers by job id. A job
// that outlives its timeout stays registered; the worker's eventual reply
// clears the entry.
#[derive(Clone)]
pub struct WorkerPool {
    jobs: mpsc::UnboundedSender<WorkerRequest>,
    registry: Registry,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl WorkerPool {
    pub fn spawn(timeout_ms: u64) -> Self {
        let (jobs, inbox) = mpsc::unbounded_channel();
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(run_worker(inbox, registry.clone()));
        Self {
            jobs,
            registry,
            next_id: Arc::new(AtomicU64::new(1)),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub async fn encode_base64(&self, bytes: &[u8]) -> Result<String, EngineError> {
        match self.call(WorkerCall::EncodeBase64(bytes.to_vec())).await? {
            WorkerReply::Text(text) => Ok(text),
            WorkerReply::Bytes(_) => Err(EngineError::transport("mismatched worker reply")),
        }
    }

    pub async fn decode_base64(&self, text: &str) -> Result<Vec<u8>, EngineError> {
        match self.call(WorkerCall::DecodeBase64(text.to_string())).await? {
            WorkerReply::Bytes(bytes) => Ok(bytes),
            WorkerReply::Text(_) => Err(EngineError::transport("mismatched worker reply")),
        }
    }

    async fn call(&self, call: WorkerCall) -> Result<WorkerReply, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.registry.lock().await.insert(id, tx);
        if self.jobs.send(WorkerRequest { id, call }).is_err() {
            self.registry.lock().await.remove(&id);
            return Err(EngineError::transport("worker unavailable"));
        }
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EngineError::transport("worker exited")),
            Err(_) => Err(EngineError::WorkerTimeout),
        }
    }
}

async fn run_worker(mut inbox: mpsc::UnboundedReceiver<WorkerRequest>, registry: Registry) {
    while let Some(request) = inbox.recv().await {
        let result = execute(request.call);
        if let Some(tx) = registry.lock().await.remove(&request.id) {
            let _ = tx.send(result);
        }
    }
    let mut guard = registry.lock().await;
    if !guard.is_empty() {
        warn!("worker exiting with {} outstanding jobs", guard.len());
    }
    for (_, tx) in guard.drain() {
        let _ = tx.send(Err(EngineError::transport("worker exited")));
    }
}

fn execute(call: WorkerCall) -> Result<WorkerReply, EngineError> {
    match call {
        WorkerCall::EncodeBase64(bytes) => Ok(WorkerReply::Text(STANDARD.encode(bytes))),
        WorkerCall::DecodeBase64(text) => STANDARD
            .decode(text)
            .map(WorkerReply::Bytes)
            .map_err(|_| EngineError::crypto("base64 decode")),
    }
}
