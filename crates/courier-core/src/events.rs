use std::sync::Arc;
use tokio::sync::broadcast;

use courier_proto::{service::verified, AttachmentPointer, ContactDetails, DataMessage, GroupDetails};

use crate::cache::Confirm;
use crate::error::EngineError;

#[derive(Clone)]
pub struct RetrievedAttachment {
    pub pointer: AttachmentPointer,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct MessageEvent {
    pub source: String,
    pub source_device: u32,
    pub timestamp: u64,
    pub received_at: u64,
    pub message: DataMessage,
    pub attachments: Vec<RetrievedAttachment>,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct SentEvent {
    pub destination: Option<String>,
    pub timestamp: u64,
    pub expiration_start_timestamp: Option<u64>,
    pub device: u32,
    pub message: DataMessage,
    pub attachments: Vec<RetrievedAttachment>,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct DeliveryEvent {
    pub timestamp: u64,
    pub source: String,
    pub source_device: u32,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct ReadEvent {
    pub timestamp: u64,
    pub reader: String,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct ReadSyncEvent {
    pub timestamp: u64,
    pub sender: String,
    pub read_at: u64,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct ContactEvent {
    pub contact: ContactDetails,
    pub avatar: Option<Vec<u8>>,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct GroupEvent {
    pub group: GroupDetails,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct VerifiedEvent {
    pub destination: String,
    pub identity_key: Vec<u8>,
    pub state: verified::State,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct ConfigurationEvent {
    pub read_receipts: bool,
    pub confirm: Confirm,
}

#[derive(Clone)]
pub struct ErrorEvent {
    pub error: Arc<EngineError>,
    pub confirm: Option<Confirm>,
}

#[derive(Clone)]
pub enum Event {
    Message(MessageEvent),
    Sent(SentEvent),
    Delivery(DeliveryEvent),
    Read(ReadEvent),
    ReadSync(ReadSyncEvent),
    Contact(ContactEvent),
    ContactSync(Confirm),
    Group(GroupEvent),
    GroupSync(Confirm),
    Verified(VerifiedEvent),
    Configuration(ConfigurationEvent),
    Empty,
    Progress { count: u64 },
    Reconnect,
    Error(ErrorEvent),
}

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(size: usize) -> Self {
        let (tx, _) = broadcast::channel(size);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
