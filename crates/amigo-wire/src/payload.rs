//! Payload codecs for message, delivery-ack, and announce packets.
//!
//! The message payload is the canonical application plaintext — the same
//! bytes are what the group AEAD encrypts. Layout (big-endian):
//!
//! ```text
//! timestamp (8) || id_len (1) || id || group_id_len (1) || group_id ||
//! sender_len (1) || sender || content_len (2) || content
//! ```
//!
//! String fields are UTF-8. Encoding truncates any over-long field at its
//! length cap (on a character boundary); decoding hard-fails when a length
//! prefix overruns the buffer.

use amigo_types::{ChatMessage, Credential};

use crate::{Result, WireError};

/// Length cap for the id, group id, and sender fields.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// Length cap for the message contents.
pub const MAX_CONTENT_LEN: usize = u16::MAX as usize;

/// A per-message delivery receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckPayload {
    /// Id of the acknowledged message.
    pub message_id: String,
    /// Hex verification key of the message's sender (the addressee).
    pub sender_verification_key: String,
    /// Unix ms at the acknowledging device.
    pub timestamp: i64,
}

/// Peer presence, carrying the full credential so receivers can attribute
/// traffic to a verified sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnouncePayload {
    /// The announcing device's credential.
    pub credential: Credential,
    /// Unix ms at the announcing device.
    pub timestamp: i64,
}

/// Encode a chat message to its binary payload.
pub fn encode_message(message: &ChatMessage) -> Vec<u8> {
    let id = truncate_utf8(&message.id, MAX_FIELD_LEN);
    let group_id = truncate_utf8(&message.group_id, MAX_FIELD_LEN);
    let sender = truncate_utf8(&message.sender, MAX_FIELD_LEN);
    let contents = truncate_utf8(&message.contents, MAX_CONTENT_LEN);

    let mut out = Vec::with_capacity(13 + id.len() + group_id.len() + sender.len() + contents.len());
    out.extend_from_slice(&message.timestamp.to_be_bytes());
    push_str_u8(&mut out, id);
    push_str_u8(&mut out, group_id);
    push_str_u8(&mut out, sender);
    out.extend_from_slice(&(contents.len() as u16).to_be_bytes());
    out.extend_from_slice(contents.as_bytes());
    out
}

/// Decode a binary payload back into a chat message.
pub fn decode_message(data: &[u8]) -> Result<ChatMessage> {
    let mut cursor = Cursor::new(data);
    let timestamp = cursor.read_i64()?;
    let id = cursor.read_str_u8()?;
    let group_id = cursor.read_str_u8()?;
    let sender = cursor.read_str_u8()?;
    let contents = cursor.read_str_u16()?;
    cursor.finish()?;

    Ok(ChatMessage {
        id,
        group_id,
        sender,
        contents,
        timestamp,
    })
}

/// Encode a delivery acknowledgment.
pub fn encode_ack(ack: &AckPayload) -> Vec<u8> {
    let message_id = truncate_utf8(&ack.message_id, MAX_FIELD_LEN);
    let key = truncate_utf8(&ack.sender_verification_key, MAX_FIELD_LEN);

    let mut out = Vec::with_capacity(10 + message_id.len() + key.len());
    out.extend_from_slice(&ack.timestamp.to_be_bytes());
    push_str_u8(&mut out, message_id);
    push_str_u8(&mut out, key);
    out
}

/// Decode a delivery acknowledgment.
pub fn decode_ack(data: &[u8]) -> Result<AckPayload> {
    let mut cursor = Cursor::new(data);
    let timestamp = cursor.read_i64()?;
    let message_id = cursor.read_str_u8()?;
    let sender_verification_key = cursor.read_str_u8()?;
    cursor.finish()?;

    Ok(AckPayload {
        message_id,
        sender_verification_key,
        timestamp,
    })
}

/// Encode an announce payload.
pub fn encode_announce(announce: &AnnouncePayload) -> Vec<u8> {
    let credential = &announce.credential;
    let mut out = Vec::with_capacity(
        12 + credential.verification_key.len()
            + credential.pseudonym.len()
            + credential.ecdh_public_key.len()
            + credential.signature.len(),
    );
    out.extend_from_slice(&announce.timestamp.to_be_bytes());
    push_str_u8(&mut out, truncate_utf8(&credential.verification_key, MAX_FIELD_LEN));
    push_str_u8(&mut out, truncate_utf8(&credential.pseudonym, MAX_FIELD_LEN));
    push_str_u8(&mut out, truncate_utf8(&credential.ecdh_public_key, MAX_FIELD_LEN));
    push_str_u8(&mut out, truncate_utf8(&credential.signature, MAX_FIELD_LEN));
    out
}

/// Decode an announce payload. The credential is not verified here — the
/// handler re-verifies before trusting it.
pub fn decode_announce(data: &[u8]) -> Result<AnnouncePayload> {
    let mut cursor = Cursor::new(data);
    let timestamp = cursor.read_i64()?;
    let verification_key = cursor.read_str_u8()?;
    let pseudonym = cursor.read_str_u8()?;
    let ecdh_public_key = cursor.read_str_u8()?;
    let signature = cursor.read_str_u8()?;
    cursor.finish()?;

    Ok(AnnouncePayload {
        credential: Credential {
            verification_key,
            pseudonym,
            signature,
            ecdh_public_key,
        },
        timestamp,
    })
}

/// Truncate a string to at most `max` bytes on a character boundary.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn push_str_u8(out: &mut Vec<u8>, s: &str) {
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

/// Bounds-checked forward reader over a payload buffer.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(WireError::MalformedPacket(format!(
                "need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_i64(&mut self) -> Result<i64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(bytes))
    }

    fn read_str_u8(&mut self) -> Result<String> {
        let len = self.take(1)?[0] as usize;
        self.read_str(len)
    }

    fn read_str_u16(&mut self) -> Result<String> {
        let raw = self.take(2)?;
        let len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        self.read_str(len)
    }

    fn read_str(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| WireError::MalformedPacket("string field is not UTF-8".into()))
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(WireError::MalformedPacket(format!(
                "{} trailing bytes after payload",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}
