pub mod service;
pub mod stream;

pub use service::{
    data_message, envelope, group_context, receipt_message, sync_message, verified,
    AttachmentPointer, CallMessage, ContactDetails, Content, DataMessage, Envelope, GroupContext,
    GroupDetails, NullMessage, ReceiptMessage, SyncMessage, Verified,
};
pub use stream::{ProtoStreamReader, StreamError};

#[cfg(test)]
mod tests;
