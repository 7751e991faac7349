//! FIFO byte buffer with typed, endianness-aware reads and writes.
//!
//! Writes append to the back, reads consume from the front. Text is
//! Latin-1: one byte per character, which is what the engine sends.

use std::collections::VecDeque;

use crate::BufferError;

/// Byte order used for every multi-byte value in a [`ByteBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// An ordered byte accumulator.
///
/// Every `put_*` succeeds. Every `get_*` either consumes exactly the bytes
/// it decodes or fails with [`BufferError::Underflow`] and leaves the
/// buffer untouched.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: VecDeque<u8>,
    endian: Endian,
}

/// Generates a `put_*`/`get_*` pair for a fixed-width numeric type.
macro_rules! numeric_access {
    ($($put:ident, $get:ident => $ty:ty;)*) => {
        $(
            #[doc = concat!("Appends a `", stringify!($ty), "`.")]
            pub fn $put(&mut self, value: $ty) {
                let bytes = match self.endian {
                    Endian::Little => value.to_le_bytes(),
                    Endian::Big => value.to_be_bytes(),
                };
                self.data.extend(bytes);
            }

            #[doc = concat!("Removes and decodes a `", stringify!($ty), "` from the front.")]
            pub fn $get(&mut self) -> Result<$ty, BufferError> {
                let bytes = self.take::<{ size_of::<$ty>() }>()?;
                Ok(match self.endian {
                    Endian::Little => <$ty>::from_le_bytes(bytes),
                    Endian::Big => <$ty>::from_be_bytes(bytes),
                })
            }
        )*
    };
}

impl ByteBuffer {
    /// Creates an empty buffer with the given byte order.
    pub fn new(endian: Endian) -> Self {
        Self {
            data: VecDeque::new(),
            endian,
        }
    }

    /// Creates a buffer pre-filled with `bytes`.
    pub fn from_bytes(endian: Endian, bytes: &[u8]) -> Self {
        Self {
            data: bytes.iter().copied().collect(),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Number of unread bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend(bytes);
    }

    /// Appends `text` as Latin-1, optionally followed by a zero byte.
    ///
    /// Characters outside Latin-1 are written as `?`.
    pub fn put_string(&mut self, text: &str, null_terminated: bool) {
        self.data
            .extend(text.chars().map(|c| u8::try_from(c).unwrap_or(b'?')));
        if null_terminated {
            self.data.push_back(0);
        }
    }

    numeric_access! {
        put_i8, get_i8 => i8;
        put_u8, get_u8 => u8;
        put_i16, get_i16 => i16;
        put_u16, get_u16 => u16;
        put_i32, get_i32 => i32;
        put_u32, get_u32 => u32;
        put_i64, get_i64 => i64;
        put_u64, get_u64 => u64;
        put_f32, get_f32 => f32;
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Returns the next byte without consuming it.
    pub fn peek_front_byte(&self) -> Option<u8> {
        self.data.front().copied()
    }

    /// Drains and returns every unread byte.
    pub fn get_all_bytes(&mut self) -> Vec<u8> {
        self.data.drain(..).collect()
    }

    /// Removes exactly `len` bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>, BufferError> {
        self.ensure(len)?;
        Ok(self.data.drain(..len).collect())
    }

    /// Removes `len` bytes and decodes them as Latin-1.
    pub fn get_string(&mut self, len: usize) -> Result<String, BufferError> {
        Ok(latin1(self.get_bytes(len)?))
    }

    /// Removes bytes up to and including the next zero byte and decodes
    /// everything before it.
    ///
    /// # Errors
    /// [`BufferError::MissingTerminator`] if no zero byte remains; nothing
    /// is consumed in that case.
    pub fn get_string_null_terminated(&mut self) -> Result<String, BufferError> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or(BufferError::MissingTerminator {
                remaining: self.data.len(),
            })?;
        let text: Vec<u8> = self.data.drain(..end).collect();
        self.data.pop_front();
        Ok(latin1(text))
    }

    fn ensure(&self, needed: usize) -> Result<(), BufferError> {
        if self.data.len() < needed {
            return Err(BufferError::Underflow {
                needed,
                remaining: self.data.len(),
            });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        for (slot, byte) in out.iter_mut().zip(self.data.drain(..N)) {
            *slot = byte;
        }
        Ok(out)
    }
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::new(Endian::Little)
    }
}

fn latin1(bytes: Vec<u8>) -> String {
    bytes.into_iter().map(char::from).collect()
}
