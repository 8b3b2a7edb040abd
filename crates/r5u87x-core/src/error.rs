//! Loader error taxonomy.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::ChunkError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to open firmware, tried: {}", display_paths(.tried))]
    FirmwareNotFound { tried: Vec<PathBuf> },

    #[error("Malformed microcode file: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Failed to get microcode status: {0}")]
    StatusReadFailed(String),

    #[error("Failed to get microcode version: {0}")]
    VersionReadFailed(String),

    #[error("Failed to reset microcode: {0}")]
    ClearFailed(TransportError),

    #[error("Failed to enable microcode: {0}")]
    EnableFailed(String),

    #[error("Upload of chunk {index} to 0x{address:04X} failed: {reason}")]
    UploadFailed {
        index: usize,
        address: u16,
        reason: String,
    },

    #[error("Camera returned unexpected ucode version 0x{actual:04X} - expected 0x{expected:04X}")]
    VersionMismatch { expected: u16, actual: u16 },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl LoaderError {
    /// Process exit code for the loader.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoaderError::Io(_) | LoaderError::FirmwareNotFound { .. } => 2,
            LoaderError::Chunk(_) => 3,
            LoaderError::StatusReadFailed(_)
            | LoaderError::VersionReadFailed(_)
            | LoaderError::ClearFailed(_)
            | LoaderError::EnableFailed(_)
            | LoaderError::UploadFailed { .. } => 4,
            LoaderError::VersionMismatch { .. } => 5,
        }
    }

    /// Whether the failure came from talking to the camera.
    pub fn is_device_error(&self) -> bool {
        self.exit_code() == 4
    }
}
