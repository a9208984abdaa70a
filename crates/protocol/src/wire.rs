//! Byte cursors for encoding and decoding protocol primitives.
//!
//! All values use the host's native byte order, which is what the peer on
//! the other end of a local socket expects. Every argument occupies a whole
//! number of 32-bit words: strings and arrays are length-prefixed and
//! zero-padded to the next 4-byte boundary.

use thiserror::Error;

/// Error type for wire-level encode/decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// An encode would exceed the cursor's capacity.
    #[error("encode overflow: need {needed} bytes, {remaining} remaining")]
    Overflow { needed: usize, remaining: usize },

    /// A decode ran past the end of the available bytes.
    #[error("truncated argument: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A string argument was not valid (embedded NUL, missing terminator, bad UTF-8).
    #[error("invalid string argument: {0}")]
    InvalidString(&'static str),

    /// A message header declared an impossible size.
    #[error("malformed message for object {object_id} opcode {opcode}: declared size {size}")]
    Malformed {
        object_id: u32,
        opcode: u16,
        size: u16,
    },
}

/// Round `n` up to the next multiple of 4.
#[must_use]
pub const fn roundup_4(n: usize) -> usize {
    (n + 3) & !3
}

/// Decode a 24.8 signed fixed-point value into a double.
///
/// The upper 24 bits hold the signed integer part and the lower 8 bits the
/// fraction, so the value is the two's-complement integer divided by 256.
/// Every representable fixed value converts exactly.
#[must_use]
pub fn fixed_to_double(f: u32) -> f64 {
    f64::from(f as i32) / 256.0
}

/// Encode a double as a 24.8 fixed-point value, rounding to the nearest 1/256.
#[must_use]
pub fn double_to_fixed(d: f64) -> u32 {
    (d * 256.0).round() as i32 as u32
}

/// Append-only encoder over a bounded byte buffer.
#[derive(Debug, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
    capacity: usize,
}

impl Encoder {
    /// Create an empty encoder that refuses to grow past `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(crate::MAX_MESSAGE_SIZE)),
            capacity,
        }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes that can still be written.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    fn reserve(&mut self, needed: usize) -> Result<(), WireError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(WireError::Overflow { needed, remaining });
        }
        Ok(())
    }

    /// Write a 32-bit unsigned integer.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not 4-byte aligned. Misalignment can only come
    /// from a caller mixing 16-bit writes incorrectly and is a programming error.
    pub fn write_u32(&mut self, x: u32) -> Result<(), WireError> {
        assert!(self.buf.len() % 4 == 0, "u32 write at unaligned offset {}", self.buf.len());
        self.reserve(4)?;
        self.buf.extend_from_slice(&x.to_ne_bytes());
        Ok(())
    }

    /// Write a 32-bit signed integer.
    pub fn write_i32(&mut self, x: i32) -> Result<(), WireError> {
        self.write_u32(x as u32)
    }

    /// Write a 16-bit unsigned integer.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not 2-byte aligned.
    pub fn write_u16(&mut self, x: u16) -> Result<(), WireError> {
        assert!(self.buf.len() % 2 == 0, "u16 write at unaligned offset {}", self.buf.len());
        self.reserve(2)?;
        self.buf.extend_from_slice(&x.to_ne_bytes());
        Ok(())
    }

    /// Write a double as a 24.8 fixed-point value.
    pub fn write_fixed(&mut self, d: f64) -> Result<(), WireError> {
        self.write_u32(double_to_fixed(d))
    }

    /// Write a string: u32 length including the NUL terminator, the bytes,
    /// the terminator, then zero padding to the next 4-byte boundary.
    pub fn write_string(&mut self, s: &str) -> Result<(), WireError> {
        if s.as_bytes().contains(&0) {
            return Err(WireError::InvalidString("embedded NUL"));
        }
        let len_with_nul = s.len() + 1;
        self.reserve(4 + roundup_4(len_with_nul))?;
        self.write_u32(len_with_nul as u32)?;
        let start = self.buf.len();
        self.buf.extend_from_slice(s.as_bytes());
        // terminator and padding
        self.buf.resize(start + roundup_4(len_with_nul), 0);
        Ok(())
    }

    /// Write an array: u32 byte length, the bytes, then zero padding.
    pub fn write_array(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.reserve(4 + roundup_4(bytes.len()))?;
        self.write_u32(bytes.len() as u32)?;
        let start = self.buf.len();
        self.buf.extend_from_slice(bytes);
        self.buf.resize(start + roundup_4(bytes.len()), 0);
        Ok(())
    }

    /// Patch a previously written u32 at `offset`.
    pub(crate) fn patch_u32(&mut self, offset: usize, x: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&x.to_ne_bytes());
    }

    /// Consume the encoder and return the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Read cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(WireError::Truncated { needed, remaining });
        }
        let slice = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    /// Read a 32-bit unsigned integer.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not 4-byte aligned.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        assert!(self.pos % 4 == 0, "u32 read at unaligned offset {}", self.pos);
        let bytes = self.take(4)?;
        Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 32-bit signed integer.
    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        self.read_u32().map(|x| x as i32)
    }

    /// Read a 16-bit unsigned integer.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not 2-byte aligned.
    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        assert!(self.pos % 2 == 0, "u16 read at unaligned offset {}", self.pos);
        let bytes = self.take(2)?;
        Ok(u16::from_ne_bytes([bytes[0], bytes[1]]))
    }

    /// Read a 24.8 fixed-point value as a double.
    pub fn read_fixed(&mut self) -> Result<f64, WireError> {
        self.read_u32().map(fixed_to_double)
    }

    /// Copy out `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, WireError> {
        self.take(n).map(<[u8]>::to_vec)
    }

    /// Read a length-prefixed, NUL-terminated, padded string.
    ///
    /// A zero length (the null string) decodes as an empty string.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let padded = self.take(roundup_4(len))?;
        let (body, terminator) = padded[..len].split_at(len - 1);
        if terminator != [0] {
            return Err(WireError::InvalidString("missing NUL terminator"));
        }
        String::from_utf8(body.to_vec()).map_err(|_| WireError::InvalidString("not UTF-8"))
    }

    /// Read a length-prefixed, padded byte array.
    pub fn read_array(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_u32()? as usize;
        let padded = self.take(roundup_4(len))?;
        Ok(padded[..len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The libwayland conversion: place the value in the mantissa of a double
    // whose exponent puts bit 8 at the units position, then remove the bias.
    fn fixed_to_double_bits(f: u32) -> f64 {
        let bits = (((1023i64 + 44) << 52) + (1i64 << 51) + i64::from(f as i32)) as u64;
        f64::from_bits(bits) - (3i64 << 43) as f64
    }

    #[test]
    fn test_fixed_to_double_known_values() {
        assert_eq!(fixed_to_double(256), 1.0);
        assert_eq!(fixed_to_double(128), 0.5);
        assert_eq!(fixed_to_double(0), 0.0);
        assert_eq!(fixed_to_double((-256i32) as u32), -1.0);
        assert_eq!(fixed_to_double(1), 1.0 / 256.0);
    }

    #[test]
    fn test_fixed_matches_bias_trick() {
        for raw in [0i32, 1, -1, 127, 128, 255, 256, -256, 1234567, -8_388_608, 8_388_607] {
            let f = raw as u32;
            assert_eq!(fixed_to_double(f), fixed_to_double_bits(f), "raw {raw}");
        }
    }

    #[test]
    fn test_double_to_fixed_roundtrip() {
        for raw in [0i32, 1, -1, 300, -300, 65536] {
            let f = raw as u32;
            assert_eq!(double_to_fixed(fixed_to_double(f)), f);
        }
    }

    #[test]
    fn test_roundup_4() {
        assert_eq!(roundup_4(0), 0);
        assert_eq!(roundup_4(1), 4);
        assert_eq!(roundup_4(4), 4);
        assert_eq!(roundup_4(5), 8);
    }

    #[test]
    fn test_string_layout() {
        let mut enc = Encoder::with_capacity(64);
        enc.write_string("wl_shm").unwrap();
        let bytes = enc.into_bytes();

        // "wl_shm" (6) + NUL = 7, padded to 8
        assert_eq!(bytes.len(), 4 + 8);
        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), 7);
        assert_eq!(&bytes[4..10], b"wl_shm");
        assert_eq!(&bytes[10..12], &[0, 0]);

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_string().unwrap(), "wl_shm");
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn test_string_exact_word() {
        // "abc" + NUL fills one word, no padding
        let mut enc = Encoder::with_capacity(64);
        enc.write_string("abc").unwrap();
        assert_eq!(enc.len(), 8);
    }

    #[test]
    fn test_string_rejects_nul() {
        let mut enc = Encoder::with_capacity(64);
        assert_eq!(
            enc.write_string("a\0b"),
            Err(WireError::InvalidString("embedded NUL"))
        );
    }

    #[test]
    fn test_encoder_overflow() {
        let mut enc = Encoder::with_capacity(4);
        enc.write_u32(1).unwrap();
        assert_eq!(
            enc.write_u32(2),
            Err(WireError::Overflow {
                needed: 4,
                remaining: 0
            })
        );
    }

    #[test]
    fn test_decoder_truncated() {
        let bytes = [1u8, 2, 3, 4];
        let mut dec = Decoder::new(&bytes);
        dec.read_u32().unwrap();
        assert!(matches!(dec.read_u32(), Err(WireError::Truncated { .. })));
        assert!(matches!(dec.read_bytes(1), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn test_array_roundtrip() {
        let mut enc = Encoder::with_capacity(64);
        enc.write_array(&[1, 2, 3, 4, 5]).unwrap();
        enc.write_i32(-7).unwrap();
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 4 + 8 + 4);

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_array().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(dec.read_i32().unwrap(), -7);
    }

    #[test]
    fn test_u16_pairs() {
        let mut enc = Encoder::with_capacity(8);
        enc.write_u16(3).unwrap();
        enc.write_u16(12).unwrap();
        enc.write_u32(9).unwrap();
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_u16().unwrap(), 3);
        assert_eq!(dec.read_u16().unwrap(), 12);
        assert_eq!(dec.read_u32().unwrap(), 9);
    }

    #[test]
    #[should_panic(expected = "unaligned")]
    fn test_unaligned_u32_write_panics() {
        let mut enc = Encoder::with_capacity(8);
        enc.write_u16(1).unwrap();
        let _ = enc.write_u32(2);
    }

    #[test]
    fn test_null_string_decodes_empty() {
        let bytes = 0u32.to_ne_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_string().unwrap(), "");
    }
}
