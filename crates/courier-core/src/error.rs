use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid padding")]
    InvalidPadding,
    #[error("unknown data message flags {0:#x}")]
    UnknownFlags(u32),
    #[error("malformed envelope")]
    MalformedEnvelope,
    #[error("unsupported content")]
    UnsupportedContent,
    #[error("unknown envelope type {0}")]
    UnknownMessageType(i32),
    #[error("worker timeout")]
    WorkerTimeout,
    #[error("task timeout")]
    TaskTimeout,
    #[error("decode")]
    Decode(#[from] prost::DecodeError),
    #[error("storage {0}")]
    Storage(String),
    #[error("crypto {0}")]
    Crypto(String),
    #[error("transport {0}")]
    Transport(String),
    #[error("validation {0}")]
    Validation(String),
    #[error("identity key changed")]
    IdentityKeyChanged { identity_key: Vec<u8> },
    #[error("unregistered user {number}")]
    UnregisteredUser {
        number: String,
        #[source]
        cause: Option<Box<EngineError>>,
    },
    #[error("outgoing identity key changed for {number}")]
    OutgoingIdentityKey {
        number: String,
        content: Vec<u8>,
        timestamp: u64,
        identity_key: Vec<u8>,
    },
    #[error("incoming identity key changed for {address}")]
    IncomingIdentityKey {
        address: String,
        ciphertext: Vec<u8>,
        identity_key: Vec<u8>,
    },
    #[error("network error sending to {number}: {reason}")]
    SendNetwork {
        number: String,
        bundle: String,
        timestamp: u64,
        code: Option<u16>,
        reason: String,
    },
    #[error("send to {number} failed: {reason}")]
    OutgoingMessage {
        number: String,
        content: Vec<u8>,
        timestamp: u64,
        reason: String,
    },
}

impl EngineError {
    pub fn storage(reason: impl Into<String>) -> Self {
        EngineError::Storage(reason.into())
    }

    pub fn crypto(reason: impl Into<String>) -> Self {
        EngineError::Crypto(reason.into())
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        EngineError::Transport(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        EngineError::Validation(reason.into())
    }
}
