//! Protocol module - R5U87x vendor request definitions and chunk framing.

pub mod chunk;
pub mod constants;

pub use chunk::{ChunkError, ChunkReader, FirmwareChunk};
pub use constants::*;
