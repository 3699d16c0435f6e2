use prost::Message;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("decode")]
    Decode(#[from] prost::DecodeError),
    #[error("truncated stream")]
    Truncated,
}

// Varint-delimited message stream, the layout of contact and group sync
// blobs: each entry is a length delimiter followed by the encoded message.
pub struct ProtoStreamReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ProtoStreamReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn next<M: Message + Default>(&mut self) -> Result<Option<M>, StreamError> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let rest = &self.buf[self.pos..];
        let len = prost::decode_length_delimiter(rest)?;
        let header = prost::length_delimiter_len(len);
        if rest.len() < header + len {
            return Err(StreamError::Truncated);
        }
        let message = M::decode(&rest[header..header + len])?;
        self.pos += header + len;
        Ok(Some(message))
    }
}

pub fn write_delimited<M: Message>(out: &mut Vec<u8>, message: &M) {
    // Encoding into a Vec cannot fail.
    let _ = message.encode_length_delimited(out);
}
