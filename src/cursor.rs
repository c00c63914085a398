use crate::error::{Error, Result};

/// Bounds-checked forward reader over a binary PDU. Every read names the
/// field it was after so truncated data produces a useful error.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    pub fn read_u8(&mut self, field: &str) -> Result<u8> {
        let byte = self.peek().ok_or_else(|| truncated(field, 1, 0))?;
        self.position += 1;
        Ok(byte)
    }

    pub fn take(&mut self, length: usize, field: &str) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(truncated(field, length, self.remaining()));
        }
        let slice = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(slice)
    }

    pub fn skip(&mut self, length: usize, field: &str) -> Result<()> {
        self.take(length, field).map(|_| ())
    }

    /// Everything not read yet, without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.position..]
    }
}

fn truncated(field: &str, needed: usize, available: usize) -> Error {
    Error::format(format!(
        "data ends inside the {field} field ({needed} bytes needed, {available} left)"
    ))
}
