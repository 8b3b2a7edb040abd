//! Chunk transmitter: streams a microcode file into camera memory.

use std::io::{Read, Write};

use tracing::{debug, info, instrument};

use crate::error::LoaderError;
use crate::events::{LoaderEvent, LoaderObserver};
use crate::protocol::constants::{CHUNK_HEADER_SIZE, REQ_UCODE_WRITE};
use crate::protocol::ChunkReader;
use crate::transport::UsbTransport;

/// Totals for one upload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub chunks: usize,
    pub payload_bytes: u64,
}

/// Upload every chunk of `firmware` (of on-disk `size`) to the camera.
///
/// With `pretend` set, chunks are parsed (and dumped) but nothing is sent.
/// Any transfer error or short write aborts the whole upload.
#[instrument(skip_all, fields(size = size, pretend = pretend))]
pub fn upload_firmware<T, R, O>(
    transport: &T,
    firmware: R,
    size: u64,
    pretend: bool,
    mut dump: Option<&mut dyn Write>,
    observer: &O,
) -> Result<UploadStats, LoaderError>
where
    T: UsbTransport + ?Sized,
    R: Read,
    O: LoaderObserver + ?Sized,
{
    info!("Sending microcode to camera");
    let mut stats = UploadStats::default();
    let mut consumed = 0u64;

    for (index, chunk) in ChunkReader::new(firmware, size).enumerate() {
        let chunk = chunk?;
        let length = chunk.payload.len();

        if let Some(sink) = dump.as_mut() {
            sink.write_all(&chunk.payload)?;
            debug!(index, length, "Wrote chunk to dump");
        }

        if !pretend {
            let written = transport
                .control_out(REQ_UCODE_WRITE, chunk.address, 0, &chunk.payload)
                .map_err(|e| LoaderError::UploadFailed {
                    index,
                    address: chunk.address,
                    reason: e.to_string(),
                })?;
            if written != length {
                return Err(LoaderError::UploadFailed {
                    index,
                    address: chunk.address,
                    reason: format!("short write: {} of {} bytes", written, length),
                });
            }
        }

        stats.chunks += 1;
        stats.payload_bytes += length as u64;
        consumed += (CHUNK_HEADER_SIZE + length) as u64;
        observer.on_event(&LoaderEvent::Progress {
            chunk: index,
            current: consumed,
            total: size,
        });
    }

    if let Some(sink) = dump.as_mut() {
        sink.flush()?;
        info!("Completed dumping of microcode");
    }
    info!(chunks = stats.chunks, bytes = stats.payload_bytes, "Microcode sent");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::{ChunkError, FirmwareChunk};
    use crate::transport::MockTransport;
    use std::io::Cursor;

    fn firmware(chunks: &[FirmwareChunk]) -> Vec<u8> {
        let mut buf = Vec::new();
        for chunk in chunks {
            chunk.write_to(&mut buf).unwrap();
        }
        buf
    }

    fn sample() -> Vec<FirmwareChunk> {
        vec![
            FirmwareChunk::new(0x0000, vec![0x02, 0x00, 0x30]),
            FirmwareChunk::new(0x0100, vec![0x90; 64]),
            FirmwareChunk::new(0x0200, vec![0xE4]),
        ]
    }

    #[test]
    fn test_uploads_every_chunk() {
        let mock = MockTransport::new();
        let data = firmware(&sample());
        let stats = upload_firmware(
            &mock,
            Cursor::new(&data),
            data.len() as u64,
            false,
            None,
            &NullObserver,
        )
        .unwrap();

        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.payload_bytes, 68);
        let memory = mock.memory();
        for chunk in sample() {
            assert_eq!(memory.get(&chunk.address), Some(&chunk.payload));
        }
        assert!(mock.get_log().iter().all(|r| r.index == 0));
    }

    #[test]
    fn test_pretend_sends_nothing_but_dumps() {
        let mock = MockTransport::new();
        let data = firmware(&sample());
        let mut dump = Vec::new();
        upload_firmware(
            &mock,
            Cursor::new(&data),
            data.len() as u64,
            true,
            Some(&mut dump),
            &NullObserver,
        )
        .unwrap();

        assert!(mock.get_log().is_empty());
        let expected: Vec<u8> = sample().into_iter().flat_map(|c| c.payload).collect();
        assert_eq!(dump, expected);
    }

    #[test]
    fn test_short_write_aborts() {
        let mock = MockTransport::new();
        mock.set_short_write(1);
        let data = firmware(&sample());
        let err = upload_firmware(
            &mock,
            Cursor::new(&data),
            data.len() as u64,
            false,
            None,
            &NullObserver,
        )
        .unwrap_err();

        assert!(matches!(err, LoaderError::UploadFailed { index: 0, .. }));
        assert_eq!(mock.count(REQ_UCODE_WRITE), 1);
    }

    #[test]
    fn test_transfer_error_aborts() {
        let mock = MockTransport::new();
        mock.fail_request(REQ_UCODE_WRITE);
        let data = firmware(&sample());
        let err = upload_firmware(
            &mock,
            Cursor::new(&data),
            data.len() as u64,
            false,
            None,
            &NullObserver,
        )
        .unwrap_err();
        assert!(err.is_device_error());
        assert_eq!(mock.count(REQ_UCODE_WRITE), 1);
    }

    #[test]
    fn test_truncated_file_stops_after_good_chunks() {
        let mock = MockTransport::new();
        let mut data = firmware(&sample());
        data.truncate(data.len() - 2);
        let err = upload_firmware(
            &mock,
            Cursor::new(&data),
            data.len() as u64,
            false,
            None,
            &NullObserver,
        )
        .unwrap_err();

        assert!(matches!(err, LoaderError::Chunk(ChunkError::TruncatedHeader { index: 2 })));
        assert_eq!(mock.count(REQ_UCODE_WRITE), 2);
    }
}
