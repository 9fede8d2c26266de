use crate::error::{Error, Result};

/// Bounds-checked cursor over an in-memory byte stream.
///
/// Decoders advance this cursor instead of copying the input; every read
/// that would pass the end of the stream fails with
/// [`Error::TruncatedInput`] naming the container section being parsed.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    section: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            section: "stream",
        }
    }

    /// Name the container section subsequent reads belong to
    pub fn set_section(&mut self, section: &'static str) {
        self.section = section;
    }

    /// Current offset from the start of the stream
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left in the stream
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self) -> Error {
        Error::TruncatedInput {
            section: self.section,
        }
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.truncated());
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Advance past `len` bytes without inspecting them
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_slice(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.read_slice(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let b = self.read_slice(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.read_slice(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.read_slice(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        let b = self.read_slice(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Expect an exact byte pattern next, otherwise corrupt data
    pub fn expect(&mut self, expected: &[u8]) -> Result<()> {
        let actual = self.read_slice(expected.len())?;
        if actual != expected {
            return Err(Error::corrupt(
                self.section,
                format!("expected {expected:02X?}, found {actual:02X?}"),
            ));
        }
        Ok(())
    }
}
