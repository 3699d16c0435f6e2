use crate::error::EngineError;

const BLOCK: usize = 160;

// The service frames reserve one byte of header outside the padded region,
// so the padded length is the next multiple of 160 minus one.
pub fn pad(plaintext: &[u8]) -> Vec<u8> {
    let padded_len = (plaintext.len() + 2).div_ceil(BLOCK) * BLOCK - 1;
    let mut out = vec![0u8; padded_len];
    out[..plaintext.len()].copy_from_slice(plaintext);
    out[plaintext.len()] = 0x80;
    out
}

pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, EngineError> {
    for (idx, byte) in padded.iter().enumerate().rev() {
        match *byte {
            0x00 => continue,
            0x80 => return Ok(padded[..idx].to_vec()),
            _ => return Err(EngineError::InvalidPadding),
        }
    }
    Err(EngineError::InvalidPadding)
}
