//! Message framing: the 8-byte header and the receive-side accumulator.
//!
//! Every message starts with two 32-bit words:
//! - the target (request) or sender (event) object id
//! - `(total_size << 16) | opcode`
//!
//! On a little-endian host this lays out as object id, u16 opcode, u16 size.
//! `total_size` includes the header and is always a multiple of 4.

use crate::wire::{Decoder, Encoder, WireError};

/// Size of the fixed message header.
pub const HEADER_SIZE: usize = 8;

/// Largest message either side may send. Matches the peer's connection buffer.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Target or sender object id.
    pub object_id: u32,
    /// Request or event opcode within the object's interface.
    pub opcode: u16,
    /// Total message size in bytes, header included.
    pub size: u16,
}

impl MessageHeader {
    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.object_id.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.size_opcode_word().to_ne_bytes());
        buf
    }

    fn size_opcode_word(&self) -> u32 {
        (u32::from(self.size) << 16) | u32::from(self.opcode)
    }

    /// Parse a header from the front of `buf`.
    ///
    /// Returns `None` if fewer than [`HEADER_SIZE`] bytes are available.
    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let object_id = u32::from_ne_bytes(buf[0..4].try_into().ok()?);
        let word = u32::from_ne_bytes(buf[4..8].try_into().ok()?);
        Some(Self {
            object_id,
            opcode: (word & 0xffff) as u16,
            size: (word >> 16) as u16,
        })
    }

    /// Check the framing invariant: at least a header, word-aligned, and
    /// no larger than [`MAX_MESSAGE_SIZE`].
    pub fn validate(&self) -> Result<(), WireError> {
        let size = usize::from(self.size);
        if size < HEADER_SIZE || size % 4 != 0 || size > MAX_MESSAGE_SIZE {
            return Err(WireError::Malformed {
                object_id: self.object_id,
                opcode: self.opcode,
                size: self.size,
            });
        }
        Ok(())
    }

    /// Payload length following the header.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        usize::from(self.size).saturating_sub(HEADER_SIZE)
    }
}

/// Encode one complete message.
///
/// `args` writes the argument payload; the header size is filled in afterwards.
pub fn encode_message(
    object_id: u32,
    opcode: u16,
    args: impl FnOnce(&mut Encoder) -> Result<(), WireError>,
) -> Result<Vec<u8>, WireError> {
    let mut enc = Encoder::with_capacity(MAX_MESSAGE_SIZE);
    enc.write_u32(object_id)?;
    enc.write_u32(u32::from(opcode))?;
    args(&mut enc)?;

    let header = MessageHeader {
        object_id,
        opcode,
        size: enc.len() as u16,
    };
    enc.patch_u32(4, header.size_opcode_word());
    Ok(enc.into_bytes())
}

/// One complete message split off the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl RawMessage {
    /// Cursor over the argument payload.
    #[must_use]
    pub fn args(&self) -> Decoder<'_> {
        Decoder::new(&self.payload)
    }
}

/// Accumulates stream bytes and splits off complete messages.
///
/// A single read may deliver part of a message or several messages at once;
/// trailing partial bytes stay buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    buf: Vec<u8>,
}

impl MessageBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet framed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Split off the next complete message.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A header violating the
    /// framing invariant is an error: the stream cannot be resynchronised.
    pub fn next_message(&mut self) -> Result<Option<RawMessage>, WireError> {
        let Some(header) = MessageHeader::from_bytes(&self.buf) else {
            return Ok(None);
        };
        header.validate()?;

        let size = usize::from(header.size);
        if self.buf.len() < size {
            return Ok(None);
        }

        let payload = self.buf[HEADER_SIZE..size].to_vec();
        self.buf.drain(..size);
        Ok(Some(RawMessage { header, payload }))
    }

    /// Drop any buffered partial message. Returns the number of bytes discarded.
    pub fn discard(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        encode_message(3, 0, |enc| {
            enc.write_u32(7)?;
            enc.write_string("wl_compositor")?;
            enc.write_u32(4)
        })
        .unwrap()
    }

    #[test]
    fn test_header_size() {
        assert_eq!(HEADER_SIZE, 8);
    }

    #[test]
    fn test_encoded_size_is_aligned() {
        let bytes = sample();
        let header = MessageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(usize::from(header.size), bytes.len());
        assert_eq!(bytes.len() % 4, 0);
        assert!(bytes.len() >= HEADER_SIZE);
    }

    #[test]
    fn test_empty_message_is_header_only() {
        let bytes = encode_message(5, 6, |_| Ok(())).unwrap();
        assert_eq!(bytes.len(), 8);
        let header = MessageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.object_id, 5);
        assert_eq!(header.opcode, 6);
        assert_eq!(header.size, 8);
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_header_field_order_little_endian() {
        let bytes = encode_message(1, 1, |enc| enc.write_u32(2)).unwrap();
        // object id, then u16 opcode, then u16 size
        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), 1);
        assert_eq!(u16::from_ne_bytes(bytes[4..6].try_into().unwrap()), 1);
        assert_eq!(u16::from_ne_bytes(bytes[6..8].try_into().unwrap()), 12);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = MessageHeader {
            object_id: 0xff00_0001,
            opcode: 9,
            size: 24,
        };
        assert_eq!(MessageHeader::from_bytes(&header.to_bytes()), Some(header));
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        for size in [0u16, 4, 10, 4100] {
            let header = MessageHeader {
                object_id: 2,
                opcode: 0,
                size,
            };
            assert!(header.validate().is_err(), "size {size}");
        }
    }

    #[test]
    fn test_buffer_single_message() {
        let bytes = sample();
        let mut inbox = MessageBuffer::new();
        inbox.push(&bytes);

        let msg = inbox.next_message().unwrap().unwrap();
        assert_eq!(msg.header.object_id, 3);
        let mut args = msg.args();
        assert_eq!(args.read_u32().unwrap(), 7);
        assert_eq!(args.read_string().unwrap(), "wl_compositor");
        assert_eq!(args.read_u32().unwrap(), 4);
        assert!(inbox.is_empty());
        assert_eq!(inbox.next_message().unwrap(), None);
    }

    #[test]
    fn test_buffer_split_read_matches_single_read() {
        let bytes = sample();

        let mut whole = MessageBuffer::new();
        whole.push(&bytes);
        let expected = whole.next_message().unwrap().unwrap();

        let mut split = MessageBuffer::new();
        split.push(&bytes[..5]);
        assert_eq!(split.next_message().unwrap(), None);
        split.push(&bytes[5..]);
        let got = split.next_message().unwrap().unwrap();

        assert_eq!(got, expected);
    }

    #[test]
    fn test_buffer_concatenated_messages() {
        let first = sample();
        let second = encode_message(9, 1, |enc| enc.write_u32(42)).unwrap();
        let mut stream = first.clone();
        stream.extend_from_slice(&second);
        // plus the start of a third message
        stream.extend_from_slice(&second[..6]);

        let mut inbox = MessageBuffer::new();
        inbox.push(&stream);
        assert_eq!(inbox.next_message().unwrap().unwrap().header.object_id, 3);
        assert_eq!(inbox.next_message().unwrap().unwrap().header.object_id, 9);
        assert_eq!(inbox.next_message().unwrap(), None);
        assert_eq!(inbox.len(), 6);
        assert_eq!(inbox.discard(), 6);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_buffer_malformed_header() {
        let header = MessageHeader {
            object_id: 2,
            opcode: 0,
            size: 6,
        };
        let mut inbox = MessageBuffer::new();
        inbox.push(&header.to_bytes());
        assert!(matches!(
            inbox.next_message(),
            Err(WireError::Malformed { size: 6, .. })
        ));
    }
}
