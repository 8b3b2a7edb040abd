//! Mock USB transport for testing.
//!
//! Simulates the microcode-related behaviour of an R5U87x camera: a status
//! flag, a reported version, chunk writes into a memory image, clear and
//! enable. Every request is logged so tests can assert on the exact command
//! sequence.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::*;

/// One captured control transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct CameraState {
    present: bool,
    version: u16,
    /// Version reported after the next enable.
    enabled_version: u16,
    /// Camera keeps reporting microcode after a clear.
    sticky_ucode: bool,
    memory: BTreeMap<u16, Vec<u8>>,
    /// Request code that fails with a transfer error.
    fail_request: Option<u8>,
    /// Accept this many bytes less than requested on chunk writes.
    short_write: usize,
    /// Answer IN requests with this many bytes instead of the requested length.
    truncated_reply: Option<usize>,
}

/// Mock transport for unit testing loader logic.
pub struct MockTransport {
    state: Arc<Mutex<CameraState>>,
    log: Arc<Mutex<Vec<ControlRecord>>>,
}

impl MockTransport {
    /// A camera with no microcode loaded.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CameraState {
                present: false,
                version: 0,
                enabled_version: 0,
                sticky_ucode: false,
                memory: BTreeMap::new(),
                fail_request: None,
                short_write: 0,
                truncated_reply: None,
            })),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A camera already running microcode of `version`.
    pub fn with_ucode(version: u16) -> Self {
        let mock = Self::new();
        {
            let mut state = mock.state.lock().unwrap();
            state.present = true;
            state.version = version;
        }
        mock
    }

    /// Set the version the camera reports once enabled.
    pub fn set_enabled_version(&self, version: u16) {
        self.state.lock().unwrap().enabled_version = version;
    }

    /// Keep reporting microcode after a clear.
    pub fn set_sticky_ucode(&self, sticky: bool) {
        self.state.lock().unwrap().sticky_ucode = sticky;
    }

    /// Make every transfer with `request` fail.
    pub fn fail_request(&self, request: u8) {
        self.state.lock().unwrap().fail_request = Some(request);
    }

    /// Accept `missing` bytes less than requested on chunk writes.
    pub fn set_short_write(&self, missing: usize) {
        self.state.lock().unwrap().short_write = missing;
    }

    /// Answer IN requests with exactly `len` bytes.
    pub fn set_truncated_reply(&self, len: usize) {
        self.state.lock().unwrap().truncated_reply = Some(len);
    }

    /// Get all captured transfers.
    pub fn get_log(&self) -> Vec<ControlRecord> {
        self.log.lock().unwrap().clone()
    }

    /// Captured request codes, in order.
    pub fn requests(&self) -> Vec<u8> {
        self.log.lock().unwrap().iter().map(|r| r.request).collect()
    }

    /// Number of transfers issued with `request`.
    pub fn count(&self, request: u8) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.request == request)
            .count()
    }

    /// Chunks written to device memory, keyed by address.
    pub fn memory(&self) -> BTreeMap<u16, Vec<u8>> {
        self.state.lock().unwrap().memory.clone()
    }

    pub fn is_present(&self) -> bool {
        self.state.lock().unwrap().present
    }

    fn record(&self, request: u8, value: u16, index: u16, data: &[u8]) {
        self.log.lock().unwrap().push(ControlRecord {
            request,
            value,
            index,
            data: data.to_vec(),
        });
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn control_in(
        &self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(request, value, index, &[]);
        let state = self.state.lock().unwrap();
        if state.fail_request == Some(request) {
            return Err(TransportError::Timeout {
                timeout_ms: TRANSFER_TIMEOUT.as_millis() as u64,
            });
        }

        let mut reply = match (request, index) {
            (REQ_UCODE_STATUS, _) => vec![state.present as u8],
            (REQ_REG_READ, UCODE_VERSION_INDEX) => state.version.to_le_bytes().to_vec(),
            _ => vec![0; length as usize],
        };
        reply.truncate(length as usize);
        if let Some(len) = state.truncated_reply {
            reply.resize(len, 0);
        }
        Ok(reply)
    }

    fn control_out(
        &self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        self.record(request, value, index, data);
        let mut state = self.state.lock().unwrap();
        if state.fail_request == Some(request) {
            return Err(TransportError::TransferFailed {
                request,
                message: "stall".into(),
            });
        }

        match request {
            REQ_UCODE_WRITE => {
                let accepted = data.len().saturating_sub(state.short_write);
                state.memory.insert(value, data[..accepted].to_vec());
                return Ok(accepted);
            }
            REQ_UCODE_CLEAR => {
                if !state.sticky_ucode {
                    state.present = false;
                    state.version = 0;
                }
                state.memory.clear();
            }
            REQ_UCODE_ENABLE => {
                state.present = true;
                state.version = state.enabled_version;
            }
            _ => {}
        }
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_status_and_version() {
        let mock = MockTransport::with_ucode(0x0115);
        assert_eq!(mock.control_in(REQ_UCODE_STATUS, 0, 0, 1).unwrap(), vec![1]);
        assert_eq!(
            mock.control_in(REQ_REG_READ, 0, UCODE_VERSION_INDEX, 2).unwrap(),
            vec![0x15, 0x01]
        );
        assert_eq!(mock.requests(), vec![REQ_UCODE_STATUS, REQ_REG_READ]);
    }

    #[test]
    fn test_mock_clear_then_enable() {
        let mock = MockTransport::with_ucode(0x0100);
        mock.set_enabled_version(0x0115);

        mock.control_out(REQ_UCODE_CLEAR, 0, 0, &[1]).unwrap();
        assert!(!mock.is_present());

        assert_eq!(mock.control_out(REQ_UCODE_WRITE, 0x0040, 0, &[1, 2, 3]).unwrap(), 3);
        mock.control_out(REQ_UCODE_ENABLE, 0, 0, &[0]).unwrap();
        assert!(mock.is_present());
        assert_eq!(mock.memory().get(&0x0040), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_mock_failure_injection() {
        let mock = MockTransport::new();
        mock.fail_request(REQ_UCODE_STATUS);
        assert!(matches!(
            mock.control_in(REQ_UCODE_STATUS, 0, 0, 1),
            Err(TransportError::Timeout { .. })
        ));

        mock.set_short_write(1);
        assert_eq!(mock.control_out(REQ_UCODE_WRITE, 0, 0, &[1, 2]).unwrap(), 1);
    }
}
