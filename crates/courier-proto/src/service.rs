// Hand-written mirror of the Signal Service protobuf schema. Field tags are
// wire-compatible with reference implementations; do not renumber.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(enumeration = "envelope::Type", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub source: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub relay: Option<String>,
    #[prost(uint64, optional, tag = "5")]
    pub timestamp: Option<u64>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub legacy_message: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "7")]
    pub source_device: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub content: Option<Vec<u8>>,
}

pub mod envelope {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Ciphertext = 1,
        KeyExchange = 2,
        PrekeyBundle = 3,
        Receipt = 5,
    }
}

impl Envelope {
    pub fn envelope_type(&self) -> envelope::Type {
        self.r#type
            .and_then(|raw| envelope::Type::try_from(raw).ok())
            .unwrap_or(envelope::Type::Unknown)
    }

}

#[derive(Clone, PartialEq, Message)]
pub struct Content {
    #[prost(message, optional, tag = "1")]
    pub data_message: Option<DataMessage>,
    #[prost(message, optional, tag = "2")]
    pub sync_message: Option<SyncMessage>,
    #[prost(message, optional, tag = "3")]
    pub call_message: Option<CallMessage>,
    #[prost(message, optional, tag = "4")]
    pub null_message: Option<NullMessage>,
    #[prost(message, optional, tag = "5")]
    pub receipt_message: Option<ReceiptMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DataMessage {
    #[prost(string, optional, tag = "1")]
    pub body: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub attachments: Vec<AttachmentPointer>,
    #[prost(message, optional, tag = "3")]
    pub group: Option<GroupContext>,
    #[prost(uint32, optional, tag = "4")]
    pub flags: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub expire_timer: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "7")]
    pub timestamp: Option<u64>,
    #[prost(message, optional, tag = "8")]
    pub quote: Option<data_message::Quote>,
    #[prost(message, repeated, tag = "9")]
    pub contact: Vec<data_message::Contact>,
}

pub mod data_message {
    pub const FLAG_END_SESSION: u32 = 1;
    pub const FLAG_EXPIRATION_TIMER_UPDATE: u32 = 2;
    pub const FLAG_PROFILE_KEY_UPDATE: u32 = 4;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Quote {
        #[prost(uint64, optional, tag = "1")]
        pub id: Option<u64>,
        #[prost(string, optional, tag = "2")]
        pub author: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub text: Option<String>,
        #[prost(message, repeated, tag = "4")]
        pub attachments: Vec<QuotedAttachment>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct QuotedAttachment {
        #[prost(string, optional, tag = "1")]
        pub content_type: Option<String>,
        #[prost(string, optional, tag = "2")]
        pub file_name: Option<String>,
        #[prost(message, optional, tag = "3")]
        pub thumbnail: Option<super::AttachmentPointer>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Contact {
        #[prost(string, optional, tag = "1")]
        pub display_name: Option<String>,
        #[prost(message, optional, tag = "2")]
        pub avatar: Option<Avatar>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Avatar {
        #[prost(message, optional, tag = "1")]
        pub avatar: Option<super::AttachmentPointer>,
        #[prost(bool, optional, tag = "2")]
        pub is_profile: Option<bool>,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct NullMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub padding: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CallMessage {
    #[prost(message, optional, tag = "1")]
    pub offer: Option<call_message::Offer>,
    #[prost(message, optional, tag = "2")]
    pub answer: Option<call_message::Answer>,
    #[prost(message, repeated, tag = "3")]
    pub ice_update: Vec<call_message::IceUpdate>,
    #[prost(message, optional, tag = "4")]
    pub hangup: Option<call_message::Hangup>,
    #[prost(message, optional, tag = "5")]
    pub busy: Option<call_message::Busy>,
}

pub mod call_message {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Offer {
        #[prost(uint64, optional, tag = "1")]
        pub id: Option<u64>,
        #[prost(string, optional, tag = "2")]
        pub description: Option<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Answer {
        #[prost(uint64, optional, tag = "1")]
        pub id: Option<u64>,
        #[prost(string, optional, tag = "2")]
        pub description: Option<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct IceUpdate {
        #[prost(uint64, optional, tag = "1")]
        pub id: Option<u64>,
        #[prost(string, optional, tag = "2")]
        pub sdp_mid: Option<String>,
        #[prost(uint32, optional, tag = "3")]
        pub sdp_m_line_index: Option<u32>,
        #[prost(string, optional, tag = "4")]
        pub sdp: Option<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Hangup {
        #[prost(uint64, optional, tag = "1")]
        pub id: Option<u64>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Busy {
        #[prost(uint64, optional, tag = "1")]
        pub id: Option<u64>,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ReceiptMessage {
    #[prost(enumeration = "receipt_message::Type", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(uint64, repeated, packed = "false", tag = "2")]
    pub timestamp: Vec<u64>,
}

pub mod receipt_message {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Delivery = 0,
        Read = 1,
    }
}

impl ReceiptMessage {
    pub fn receipt_type(&self) -> receipt_message::Type {
        self.r#type
            .and_then(|raw| receipt_message::Type::try_from(raw).ok())
            .unwrap_or(receipt_message::Type::Delivery)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct SyncMessage {
    #[prost(message, optional, tag = "1")]
    pub sent: Option<sync_message::Sent>,
    #[prost(message, optional, tag = "2")]
    pub contacts: Option<sync_message::Contacts>,
    #[prost(message, optional, tag = "3")]
    pub groups: Option<sync_message::Groups>,
    #[prost(message, optional, tag = "4")]
    pub request: Option<sync_message::Request>,
    #[prost(message, repeated, tag = "5")]
    pub read: Vec<sync_message::Read>,
    #[prost(message, optional, tag = "6")]
    pub blocked: Option<sync_message::Blocked>,
    #[prost(message, optional, tag = "7")]
    pub verified: Option<Verified>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub padding: Option<Vec<u8>>,
    #[prost(message, optional, tag = "9")]
    pub configuration: Option<sync_message::Configuration>,
}

pub mod sync_message {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Sent {
        #[prost(string, optional, tag = "1")]
        pub destination: Option<String>,
        #[prost(uint64, optional, tag = "2")]
        pub timestamp: Option<u64>,
        #[prost(message, optional, tag = "3")]
        pub message: Option<super::DataMessage>,
        #[prost(uint64, optional, tag = "4")]
        pub expiration_start_timestamp: Option<u64>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Contacts {
        #[prost(message, optional, tag = "1")]
        pub blob: Option<super::AttachmentPointer>,
        #[prost(bool, optional, tag = "2")]
        pub complete: Option<bool>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Groups {
        #[prost(message, optional, tag = "1")]
        pub blob: Option<super::AttachmentPointer>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Blocked {
        #[prost(string, repeated, tag = "1")]
        pub numbers: Vec<String>,
        #[prost(bytes = "vec", repeated, tag = "2")]
        pub group_ids: Vec<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Request {
        #[prost(enumeration = "request::Type", optional, tag = "1")]
        pub r#type: Option<i32>,
    }

    pub mod request {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            Contacts = 1,
            Groups = 2,
            Blocked = 3,
            Configuration = 4,
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Read {
        #[prost(string, optional, tag = "1")]
        pub sender: Option<String>,
        #[prost(uint64, optional, tag = "2")]
        pub timestamp: Option<u64>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Configuration {
        #[prost(bool, optional, tag = "1")]
        pub read_receipts: Option<bool>,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Verified {
    #[prost(string, optional, tag = "1")]
    pub destination: Option<String>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub identity_key: Option<Vec<u8>>,
    #[prost(enumeration = "verified::State", optional, tag = "3")]
    pub state: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub null_message: Option<Vec<u8>>,
}

pub mod verified {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum State {
        Default = 0,
        Verified = 1,
        Unverified = 2,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct AttachmentPointer {
    #[prost(fixed64, optional, tag = "1")]
    pub id: Option<u64>,
    #[prost(string, optional, tag = "2")]
    pub content_type: Option<String>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub key: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "4")]
    pub size: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub thumbnail: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub digest: Option<Vec<u8>>,
    #[prost(string, optional, tag = "7")]
    pub file_name: Option<String>,
    #[prost(uint32, optional, tag = "8")]
    pub flags: Option<u32>,
    #[prost(uint32, optional, tag = "9")]
    pub width: Option<u32>,
    #[prost(uint32, optional, tag = "10")]
    pub height: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GroupContext {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub id: Option<Vec<u8>>,
    #[prost(enumeration = "group_context::Type", optional, tag = "2")]
    pub r#type: Option<i32>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(string, repeated, tag = "4")]
    pub members: Vec<String>,
    #[prost(message, optional, tag = "5")]
    pub avatar: Option<AttachmentPointer>,
}

pub mod group_context {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Update = 1,
        Deliver = 2,
        Quit = 3,
        RequestInfo = 4,
    }
}

impl GroupContext {
    pub fn group_type(&self) -> group_context::Type {
        self.r#type
            .and_then(|raw| group_context::Type::try_from(raw).ok())
            .unwrap_or(group_context::Type::Unknown)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ContactDetails {
    #[prost(string, optional, tag = "1")]
    pub number: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub avatar: Option<contact_details::Avatar>,
    #[prost(string, optional, tag = "4")]
    pub color: Option<String>,
    #[prost(message, optional, tag = "5")]
    pub verified: Option<Verified>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "7")]
    pub blocked: Option<bool>,
    #[prost(uint32, optional, tag = "8")]
    pub expire_timer: Option<u32>,
}

pub mod contact_details {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Avatar {
        #[prost(string, optional, tag = "1")]
        pub content_type: Option<String>,
        #[prost(uint32, optional, tag = "2")]
        pub length: Option<u32>,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct GroupDetails {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub id: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub members: Vec<String>,
    #[prost(message, optional, tag = "4")]
    pub avatar: Option<group_details::Avatar>,
    #[prost(bool, optional, tag = "5")]
    pub active: Option<bool>,
    #[prost(uint32, optional, tag = "6")]
    pub expire_timer: Option<u32>,
    #[prost(string, optional, tag = "7")]
    pub color: Option<String>,
    #[prost(bool, optional, tag = "8")]
    pub blocked: Option<bool>,
}

pub mod group_details {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Avatar {
        #[prost(string, optional, tag = "1")]
        pub content_type: Option<String>,
        #[prost(uint32, optional, tag = "2")]
        pub length: Option<u32>,
    }
}
