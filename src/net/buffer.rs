//! Packet buffer implementation
//!
//! Provides a byte buffer with the relay's wire primitives:
//! - Little-endian integer types (byte, short, int, long)
//! - Single-byte booleans
//! - Strings prefixed with a 7-bit variable-length byte count
//! - Length-prefixed byte blobs
//!
//! Reads never invent data: running past the end of the frame is an
//! `InsufficientData` error so a truncated packet cannot decode.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Maximum frame size (64KB)
pub const MAX_PACKET_SIZE: usize = 65536;

/// Longest 7-bit encoded length prefix for a 32-bit value
const MAX_VARINT_BYTES: usize = 5;

/// Result of a buffer read
pub type ReadResult<T> = std::result::Result<T, ProtocolError>;

/// Packet buffer for reading and writing relay protocol data
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            read_pos: 0,
        }
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    // ============ Properties ============

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the written bytes into a shareable frame
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    fn take(&mut self, count: usize) -> ReadResult<&[u8]> {
        if self.remaining() < count {
            return Err(ProtocolError::InsufficientData {
                expected: count,
                actual: self.remaining(),
            });
        }
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..start + count])
    }

    fn take_array<const N: usize>(&mut self) -> ReadResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    // ============ Reading Methods (Little-Endian) ============

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> ReadResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read a boolean (any non-zero byte is true)
    pub fn read_bool(&mut self) -> ReadResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read an unsigned little-endian short (2 bytes)
    pub fn read_u16(&mut self) -> ReadResult<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read an unsigned little-endian int (4 bytes)
    pub fn read_u32(&mut self) -> ReadResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a signed little-endian int (4 bytes)
    pub fn read_i32(&mut self) -> ReadResult<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Read an unsigned little-endian long (8 bytes)
    pub fn read_u64(&mut self) -> ReadResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read a 7-bit variable-length unsigned int
    pub fn read_varint(&mut self) -> ReadResult<u32> {
        let mut value = 0u32;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::Malformed(
            "variable-length integer exceeds 5 bytes".to_string(),
        ))
    }

    // ============ String / Blob Reading ============

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> ReadResult<String> {
        let len = self.read_varint()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidStringEncoding)
    }

    /// Read a `u32` length-prefixed byte blob
    pub fn read_blob(&mut self) -> ReadResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    // ============ Writing Methods (Little-Endian) ============

    /// Write an unsigned byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write a boolean as a single byte
    pub fn write_bool(&mut self, value: bool) {
        self.data.put_u8(value as u8);
    }

    /// Write an unsigned little-endian short (2 bytes)
    pub fn write_u16(&mut self, value: u16) {
        self.data.put_u16_le(value);
    }

    /// Write an unsigned little-endian int (4 bytes)
    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32_le(value);
    }

    /// Write a signed little-endian int (4 bytes)
    pub fn write_i32(&mut self, value: i32) {
        self.data.put_i32_le(value);
    }

    /// Write an unsigned little-endian long (8 bytes)
    pub fn write_u64(&mut self, value: u64) {
        self.data.put_u64_le(value);
    }

    /// Write a 7-bit variable-length unsigned int
    pub fn write_varint(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.data.put_u8((value as u8) | 0x80);
            value >>= 7;
        }
        self.data.put_u8(value as u8);
    }

    // ============ String / Blob Writing ============

    /// Write a length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) {
        self.write_varint(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Write a `u32` length-prefixed byte blob
    pub fn write_blob(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.data.extend_from_slice(bytes);
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&[u8]> for PacketBuffer {
    fn from(slice: &[u8]) -> Self {
        Self::from_bytes(slice)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
