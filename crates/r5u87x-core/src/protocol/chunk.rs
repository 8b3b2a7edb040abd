//! Firmware file chunk framing.
//!
//! A microcode file is a back-to-back sequence of records:
//!
//! ```text
//! +--------+-----------+-----------+------------------+
//! | length | addr (lo) | addr (hi) | payload (length) |
//! +--------+-----------+-----------+------------------+
//! ```
//!
//! There is no magic, no record count and no trailer. The file ends when EOF
//! is reached exactly on a record boundary.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

use super::constants::CHUNK_HEADER_SIZE;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Microcode file is incomplete: truncated header at chunk {index}")]
    TruncatedHeader { index: usize },

    #[error("Bad payload length {length} at chunk {index}: only {available} bytes available")]
    InvalidChunkLength {
        index: usize,
        length: usize,
        available: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One microcode record destined for device memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareChunk {
    pub address: u16,
    pub payload: Vec<u8>,
}

impl FirmwareChunk {
    pub fn new(address: u16, payload: Vec<u8>) -> Self {
        Self { address, payload }
    }

    /// Serialize into the on-disk record layout.
    ///
    /// Payloads longer than a length byte can declare are rejected.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let length = u8::try_from(self.payload.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload of {} bytes does not fit a chunk", self.payload.len()),
            )
        })?;
        w.write_u8(length)?;
        w.write_u16::<LittleEndian>(self.address)?;
        w.write_all(&self.payload)
    }
}

/// Reads chunks from a firmware file of known on-disk size.
///
/// Yields `Ok(chunk)` per record, `Err` once on malformed input, then `None`.
pub struct ChunkReader<R: Read> {
    reader: R,
    remaining: u64,
    index: usize,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: R, size: u64) -> Self {
        Self {
            reader,
            remaining: size,
            index: 0,
            done: false,
        }
    }

    fn next_chunk(&mut self) -> Result<Option<FirmwareChunk>, ChunkError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.remaining < CHUNK_HEADER_SIZE as u64 {
            return Err(ChunkError::TruncatedHeader { index: self.index });
        }

        let mut header = [0u8; CHUNK_HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            CHUNK_HEADER_SIZE => {}
            _ => return Err(ChunkError::TruncatedHeader { index: self.index }),
        }
        self.remaining -= CHUNK_HEADER_SIZE as u64;

        let mut cursor = Cursor::new(&header[..]);
        let length = cursor.read_u8()? as usize;
        let address = cursor.read_u16::<LittleEndian>()?;

        let mut payload = vec![0u8; length];
        let available = read_full(&mut self.reader, &mut payload)?;
        if available != length {
            return Err(ChunkError::InvalidChunkLength {
                index: self.index,
                length,
                available,
            });
        }
        self.remaining = self.remaining.saturating_sub(length as u64);
        self.index += 1;

        Ok(Some(FirmwareChunk { address, payload }))
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<FirmwareChunk, ChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` from `reader`, stopping early only at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
