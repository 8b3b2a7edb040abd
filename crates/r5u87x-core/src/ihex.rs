//! Raw microcode dump to Intel HEX conversion.
//!
//! Microcode captured from the vendor driver is a flat array of 32-bit
//! little-endian storage words, each holding one byte value. Chunks are laid
//! out as three header words (length, address low, address high) followed by
//! `length` payload words, packed back to back. Offsets are always counted in
//! words; the serialized record uses one byte per word.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::protocol::FirmwareChunk;

/// Capture buffer size of the dump tool. A dump that fills it may be truncated.
pub const MAX_CAPTURE_SIZE: usize = 32768;

/// Width of one storage word in the raw dump.
pub const DUMP_WORD_SIZE: usize = 4;

/// Header words per raw chunk: length, address low, address high.
pub const DUMP_HEADER_WORDS: usize = 3;

pub const RECORD_TYPE_DATA: u8 = 0x00;
pub const RECORD_TYPE_EOF: u8 = 0x01;

/// End-of-file record terminating every hex image.
pub const EOF_RECORD: &str = ":00000001FF";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to write hex image: {0}")]
    Write(#[source] io::Error),

    #[error("Microcode dump is empty")]
    EmptyInput,

    #[error("Dump of {size} bytes filled the capture buffer and may be truncated")]
    CapacityExceeded { size: usize },

    #[error("Malformed chunk at byte offset {offset}: {reason}")]
    MalformedChunk { offset: usize, reason: &'static str },

    #[error("Record of {length} data bytes does not fit the LL field")]
    RecordTooLong { length: usize },

    #[error("Invalid hex record on line {line}: {reason}")]
    InvalidRecord { line: usize, reason: &'static str },

    #[error("Checksum mismatch on line {line}: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { line: usize, expected: u8, actual: u8 },

    #[error("Hex image has no end-of-file record")]
    MissingEof,
}

impl ExtractError {
    /// Process exit code for the extraction tool.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExtractError::CapacityExceeded { .. } => 1,
            ExtractError::Io(_) => 3,
            ExtractError::EmptyInput => 4,
            ExtractError::MalformedChunk { .. }
            | ExtractError::RecordTooLong { .. }
            | ExtractError::InvalidRecord { .. }
            | ExtractError::ChecksumMismatch { .. }
            | ExtractError::MissingEof => 5,
            ExtractError::Write(_) => 6,
        }
    }
}

/// Two's-complement checksum of a record's byte values.
pub fn record_checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u32, |acc, &b| acc + b as u32);
    (((sum ^ 0xFF) + 1) & 0xFF) as u8
}

/// A single Intel HEX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub record_type: u8,
    pub address: u16,
    pub data: Vec<u8>,
}

impl HexRecord {
    pub fn data(address: u16, data: Vec<u8>) -> Self {
        Self {
            record_type: RECORD_TYPE_DATA,
            address,
            data,
        }
    }

    pub fn eof() -> Self {
        Self {
            record_type: RECORD_TYPE_EOF,
            address: 0,
            data: Vec::new(),
        }
    }

    /// Record bytes preceding the checksum: LL, AA (hi), AA (lo), TT, DD...
    fn body(&self) -> Result<Vec<u8>, ExtractError> {
        let length = u8::try_from(self.data.len()).map_err(|_| ExtractError::RecordTooLong {
            length: self.data.len(),
        })?;
        let mut body = Vec::with_capacity(4 + self.data.len());
        body.push(length);
        body.extend_from_slice(&self.address.to_be_bytes());
        body.push(self.record_type);
        body.extend_from_slice(&self.data);
        Ok(body)
    }

    pub fn checksum(&self) -> Result<u8, ExtractError> {
        Ok(record_checksum(&self.body()?))
    }

    /// Render as a `:LLAAAATTDD..CC` line.
    pub fn encode(&self) -> Result<String, ExtractError> {
        let body = self.body()?;
        let mut line = String::with_capacity(1 + 2 * (body.len() + 1));
        line.push(':');
        for b in body.iter().chain(std::iter::once(&record_checksum(&body))) {
            line.push_str(&format!("{:02X}", b));
        }
        Ok(line)
    }

    /// Parse one `:LLAAAATTDD..CC` line. `line_no` is used for error reports.
    pub fn parse(line: &str, line_no: usize) -> Result<Self, ExtractError> {
        let invalid = |reason| ExtractError::InvalidRecord {
            line: line_no,
            reason,
        };

        let digits = line
            .trim_end()
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing ':' start code"))?;
        if !digits.is_ascii() {
            return Err(invalid("non-hex character"));
        }
        if digits.len() % 2 != 0 {
            return Err(invalid("odd number of hex digits"));
        }

        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| invalid("non-hex character"))?;

        // LL + AAAA + TT + CC
        if bytes.len() < 5 {
            return Err(invalid("record too short"));
        }
        let count = bytes[0] as usize;
        if bytes.len() != count + 5 {
            return Err(invalid("byte count does not match record length"));
        }

        let (body, cc) = bytes.split_at(bytes.len() - 1);
        let expected = record_checksum(body);
        if expected != cc[0] {
            return Err(ExtractError::ChecksumMismatch {
                line: line_no,
                expected,
                actual: cc[0],
            });
        }

        Ok(Self {
            record_type: body[3],
            address: u16::from_be_bytes([body[1], body[2]]),
            data: body[4..].to_vec(),
        })
    }
}

/// Read a raw dump, bounded by the capture buffer size.
pub fn read_dump<R: Read>(reader: R) -> Result<Vec<u8>, ExtractError> {
    let mut buf = Vec::with_capacity(MAX_CAPTURE_SIZE);
    reader.take(MAX_CAPTURE_SIZE as u64).read_to_end(&mut buf)?;
    if buf.is_empty() {
        return Err(ExtractError::EmptyInput);
    }
    Ok(buf)
}

/// Lazy encoder producing one hex line per raw chunk, then the EOF record.
pub struct HexEncoder<'a> {
    dump: &'a [u8],
    cursor: usize,
    finished: bool,
}

impl<'a> HexEncoder<'a> {
    /// `dump` holds exactly the captured bytes.
    pub fn new(dump: &'a [u8]) -> Result<Self, ExtractError> {
        if dump.len() >= MAX_CAPTURE_SIZE {
            return Err(ExtractError::CapacityExceeded { size: dump.len() });
        }
        Ok(Self {
            dump,
            cursor: 0,
            finished: false,
        })
    }

    fn word(&self, index: usize) -> u32 {
        let offset = index * DUMP_WORD_SIZE;
        LittleEndian::read_u32(&self.dump[offset..offset + DUMP_WORD_SIZE])
    }

    fn byte_word(&self, index: usize, reason: &'static str) -> Result<u8, ExtractError> {
        u8::try_from(self.word(index)).map_err(|_| ExtractError::MalformedChunk {
            offset: index * DUMP_WORD_SIZE,
            reason,
        })
    }

    fn next_record(&mut self) -> Result<Option<HexRecord>, ExtractError> {
        let offset = self.cursor * DUMP_WORD_SIZE;
        if offset >= self.dump.len() {
            return Ok(None);
        }

        let words = self.dump.len() / DUMP_WORD_SIZE;
        if self.cursor + DUMP_HEADER_WORDS > words {
            return Err(ExtractError::MalformedChunk {
                offset,
                reason: "chunk header overruns dump",
            });
        }

        let length = self.byte_word(self.cursor, "length does not fit a byte")?;
        let lo = self.byte_word(self.cursor + 1, "address word does not fit a byte")?;
        let hi = self.byte_word(self.cursor + 2, "address word does not fit a byte")?;

        let payload_start = self.cursor + DUMP_HEADER_WORDS;
        let next = payload_start + length as usize;
        if next > words {
            return Err(ExtractError::MalformedChunk {
                offset,
                reason: "payload overruns dump",
            });
        }

        let data = (payload_start..next)
            .map(|i| self.byte_word(i, "payload word does not fit a byte"))
            .collect::<Result<Vec<u8>, _>>()?;

        let address = u16::from_le_bytes([lo, hi]);
        debug!(offset, address, length, "Encoded chunk");
        self.cursor = next;
        Ok(Some(HexRecord::data(address, data)))
    }
}

impl Iterator for HexEncoder<'_> {
    type Item = Result<String, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(record.encode()),
            Ok(None) => {
                self.finished = true;
                Some(HexRecord::eof().encode())
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Encode the whole dump into hex lines, EOF record included.
pub fn encode_dump(dump: &[u8]) -> Result<Vec<String>, ExtractError> {
    HexEncoder::new(dump)?.collect()
}

/// Encode a raw dump into `out`, one record per line. Returns the number of
/// data records written. Nothing reaches `out` unless the whole dump encodes.
#[instrument(skip(dump, out), fields(size = dump.len()))]
pub fn write_hex<W: Write>(dump: &[u8], out: &mut W) -> Result<usize, ExtractError> {
    let lines = encode_dump(dump)?;
    for line in &lines {
        writeln!(out, "{}", line).map_err(ExtractError::Write)?;
    }
    out.flush().map_err(ExtractError::Write)?;
    Ok(lines.len() - 1)
}

/// Decode hex text back into chunks. Parsing stops at the EOF record.
pub fn decode_hex(text: &str) -> Result<Vec<FirmwareChunk>, ExtractError> {
    let mut chunks = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = HexRecord::parse(line, i + 1)?;
        match record.record_type {
            RECORD_TYPE_DATA => chunks.push(FirmwareChunk::new(record.address, record.data)),
            RECORD_TYPE_EOF => return Ok(chunks),
            _ => {
                return Err(ExtractError::InvalidRecord {
                    line: i + 1,
                    reason: "unsupported record type",
                });
            }
        }
    }
    Err(ExtractError::MissingEof)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a raw dump the way the capture tool lays it out.
    fn raw_dump(chunks: &[FirmwareChunk]) -> Vec<u8> {
        let mut words: Vec<u32> = Vec::new();
        for chunk in chunks {
            words.push(chunk.payload.len() as u32);
            words.push((chunk.address & 0xFF) as u32);
            words.push((chunk.address >> 8) as u32);
            words.extend(chunk.payload.iter().map(|&b| b as u32));
        }
        let mut buf = vec![0u8; words.len() * DUMP_WORD_SIZE];
        LittleEndian::write_u32_into(&words, &mut buf);
        buf
    }

    #[test]
    fn test_two_chunk_dump() {
        let dump = raw_dump(&[
            FirmwareChunk::new(0x0010, vec![0xAA, 0xBB]),
            FirmwareChunk::new(0x0020, vec![0xCC]),
        ]);
        let lines = encode_dump(&dump).unwrap();
        assert_eq!(
            lines,
            vec![":02001000AABB89", ":01002000CC13", ":00000001FF"]
        );
    }

    #[test]
    fn test_every_line_checksums_to_zero() {
        let dump = raw_dump(&[
            FirmwareChunk::new(0x1234, vec![0x00, 0xFF, 0x80, 0x7F]),
            FirmwareChunk::new(0xFFFF, vec![0xFF; 16]),
            FirmwareChunk::new(0x0000, vec![]),
            FirmwareChunk::new(0xA55A, vec![0x01]),
        ]);
        for line in encode_dump(&dump).unwrap() {
            let bytes: Vec<u8> = (1..line.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&line[i..i + 2], 16).unwrap())
                .collect();
            let sum = bytes.iter().fold(0u32, |acc, &b| acc + b as u32);
            assert_eq!(sum & 0xFF, 0, "line {} does not validate", line);
        }
    }

    #[test]
    fn test_round_trip_reproduces_chunks() {
        let source = vec![
            FirmwareChunk::new(0x0010, vec![0xAA, 0xBB]),
            FirmwareChunk::new(0x0100, vec![0x01, 0x02, 0x03, 0x04, 0x05]),
            FirmwareChunk::new(0xBEEF, vec![0x00]),
        ];
        let dump = raw_dump(&source);
        let mut text = Vec::new();
        assert_eq!(write_hex(&dump, &mut text).unwrap(), 3);

        let chunks = decode_hex(std::str::from_utf8(&text).unwrap()).unwrap();
        assert_eq!(chunks, source);
    }

    #[test]
    fn test_empty_dump_is_only_eof() {
        let lines = encode_dump(&[]).unwrap();
        assert_eq!(lines, vec![EOF_RECORD]);
    }

    #[test]
    fn test_full_capture_buffer_rejected() {
        let dump = vec![0u8; MAX_CAPTURE_SIZE];
        assert!(matches!(
            HexEncoder::new(&dump),
            Err(ExtractError::CapacityExceeded { size: MAX_CAPTURE_SIZE })
        ));
    }

    #[test]
    fn test_read_dump_bounds() {
        assert!(matches!(
            read_dump(std::io::Cursor::new(Vec::<u8>::new())),
            Err(ExtractError::EmptyInput)
        ));
        let oversized = vec![0u8; MAX_CAPTURE_SIZE + 100];
        let buf = read_dump(std::io::Cursor::new(oversized)).unwrap();
        assert_eq!(buf.len(), MAX_CAPTURE_SIZE);
        assert!(HexEncoder::new(&buf).is_err());
    }

    #[test]
    fn test_payload_overrun_is_malformed() {
        let mut dump = raw_dump(&[FirmwareChunk::new(0x0010, vec![0xAA, 0xBB, 0xCC])]);
        dump.truncate(dump.len() - DUMP_WORD_SIZE);
        let err = encode_dump(&dump).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedChunk { offset: 0, .. }));
    }

    #[test]
    fn test_header_overrun_is_malformed() {
        let mut dump = raw_dump(&[FirmwareChunk::new(0x0010, vec![0xAA])]);
        dump.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
        let mut encoder = HexEncoder::new(&dump).unwrap();
        assert!(encoder.next().unwrap().is_ok());
        assert!(matches!(
            encoder.next().unwrap(),
            Err(ExtractError::MalformedChunk { offset: 16, .. })
        ));
        assert!(encoder.next().is_none());
    }

    #[test]
    fn test_wide_word_is_malformed() {
        let mut dump = raw_dump(&[FirmwareChunk::new(0x0010, vec![0xAA])]);
        // Payload word carries a value wider than a byte.
        dump[12..16].copy_from_slice(&0x1AAu32.to_le_bytes());
        assert!(matches!(
            encode_dump(&dump).unwrap_err(),
            ExtractError::MalformedChunk { offset: 12, .. }
        ));
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let err = HexRecord::parse(":01002000CC14", 7).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::ChecksumMismatch {
                line: 7,
                expected: 0x13,
                actual: 0x14
            }
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        for line in ["01002000CC13", ":0100200", ":01002000CC1", ":02002000CC12", ":0100200GCC13"] {
            assert!(
                matches!(
                    HexRecord::parse(line, 1),
                    Err(ExtractError::InvalidRecord { .. })
                ),
                "accepted {}",
                line
            );
        }
    }

    #[test]
    fn test_decode_requires_eof() {
        assert!(matches!(
            decode_hex(":01002000CC13\n"),
            Err(ExtractError::MissingEof)
        ));
    }

    #[test]
    fn test_malformed_dump_writes_nothing() {
        // A good chunk followed by one whose payload runs off the end.
        let words: [u32; 7] = [1, 0x10, 0, 0xAA, 5, 0x20, 0];
        let mut dump = vec![0u8; words.len() * DUMP_WORD_SIZE];
        LittleEndian::write_u32_into(&words, &mut dump);

        let mut out = Vec::new();
        let err = write_hex(&dump, &mut out).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedChunk { offset: 16, .. }));
        assert!(out.is_empty());
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_output_failure_is_not_an_input_error() {
        let dump = raw_dump(&[FirmwareChunk::new(0x0010, vec![0xAA])]);
        let err = write_hex(&dump, &mut FailingSink).unwrap_err();
        assert!(matches!(err, ExtractError::Write(_)));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_oversized_record_rejected() {
        let record = HexRecord::data(0x0000, vec![0u8; 256]);
        assert!(matches!(
            record.encode(),
            Err(ExtractError::RecordTooLong { length: 256 })
        ));
        assert!(record.checksum().is_err());

        let full = HexRecord::data(0x0000, vec![0u8; 255]);
        assert!(full.encode().unwrap().starts_with(":FF000000"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExtractError::CapacityExceeded { size: 0 }.exit_code(), 1);
        assert_eq!(
            ExtractError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).exit_code(),
            3
        );
        assert_eq!(ExtractError::EmptyInput.exit_code(), 4);
        assert_eq!(ExtractError::RecordTooLong { length: 256 }.exit_code(), 5);
    }
}
