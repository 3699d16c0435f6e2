pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod padding;
pub mod queue;
pub mod ratchet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod socket;
pub mod store;
pub mod time;
pub mod worker;

mod process;
mod retry;
mod sync;

pub use cache::{envelope_id, Confirm, EnvelopeCache};
pub use config::{Config, Credentials};
pub use error::EngineError;
pub use events::{Event, EventBus, EventReceiver};
pub use receiver::MessageReceiver;
pub use sender::{MessageSender, SendError, SendReport};
pub use socket::SocketState;
pub use store::{MemoryStore, Store, UnprocessedItem};

#[cfg(test)]
mod tests;
