//! r5u87x-core: Ricoh R5U87x webcam microcode loader in Rust.
//!
//! The camera needs vendor microcode pushed over USB control transfers
//! before it will stream. This crate implements that bring-up, and the
//! conversion of raw microcode dumps into Intel HEX.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Vendor request codes, firmware chunk framing
//! - **Transport**: USB control transfer abstraction (nusb, mock)
//! - **State**: Bring-up states and the vendor commands
//! - **Upload**: Chunk transmitter
//! - **Session**: High-level orchestrator (status → clear → upload → enable → verify)
//! - **Events**: Observer pattern for UI decoupling
//! - **Ihex**: Raw dump to Intel HEX encoder and decoder
//!
//! # Example
//!
//! ```no_run
//! use r5u87x_core::session::{LoaderConfig, LoaderSession};
//! use r5u87x_core::transport::NusbTransport;
//!
//! let (transport, device) = NusbTransport::open().expect("no camera");
//! let mut session = LoaderSession::new(&transport, device, LoaderConfig::default());
//! session.run().expect("bring-up failed");
//! ```

pub mod device;
pub mod error;
pub mod events;
pub mod ihex;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod upload;

// Re-exports for convenience
pub use device::{DeviceInfo, expand_template, lookup};
pub use error::LoaderError;
pub use events::{LoaderEvent, LoaderObserver, LogLevel, NullObserver, TracingObserver};
pub use ihex::{ExtractError, HexEncoder, HexRecord, decode_hex, encode_dump, read_dump, write_hex};
pub use protocol::{ChunkError, ChunkReader, FirmwareChunk};
pub use session::{LoaderConfig, LoaderSession, Outcome};
pub use state::{LoaderState, VersionCheck};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
pub use upload::{UploadStats, upload_firmware};
