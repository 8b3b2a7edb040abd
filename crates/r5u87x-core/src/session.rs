//! Loader Session - orchestrates microcode bring-up for one camera.
//!
//! The sequence is status → version → conditional clear → upload → enable →
//! verify, followed by the orientation registers. Every branch is derived
//! from freshly queried camera state, so a failed run can simply be
//! repeated. Nothing is retried within a run.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::device::{self, DeviceInfo};
use crate::error::LoaderError;
use crate::events::{LoaderEvent, LoaderObserver, LogLevel, TracingObserver};
use crate::protocol::constants::CLEAR_SETTLE_TIME;
use crate::state::commands::{image_flip, ucode_clear, ucode_enable, ucode_status, ucode_version};
use crate::state::{LoaderState, StateMachineContext, VersionCheck};
use crate::transport::UsbTransport;
use crate::upload::upload_firmware;

/// Configuration for a loader session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Firmware path template; `%vid%` and `%pid%` are substituted.
    pub firmware: String,
    /// Fallback template tried when `firmware` does not exist.
    pub ucode_path: Option<String>,
    /// Clear loaded microcode even if it matches.
    pub force_clear: bool,
    /// Parse the firmware but do not upload, enable or verify.
    pub pretend: bool,
    /// Mirror uploaded payload bytes to `dump_path`.
    pub dump_ucode: bool,
    /// Dump path template.
    pub dump_path: String,
    /// Wait after a clear before the next command, in milliseconds.
    pub clear_settle_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            firmware: "ucode/r5u87x-%vid%-%pid%.fw".to_string(),
            ucode_path: None,
            force_clear: false,
            pretend: false,
            dump_ucode: false,
            dump_path: "r5u87x-dump-%pid%-%vid%.bin".to_string(),
            clear_settle_ms: CLEAR_SETTLE_TIME.as_millis() as u64,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LoaderConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn clear_settle(&self) -> Duration {
        Duration::from_millis(self.clear_settle_ms)
    }
}

/// How a successful bring-up ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Compatible microcode was already running; nothing uploaded.
    AlreadyLoaded,
    /// Microcode uploaded, enabled and verified.
    Uploaded,
    /// Pretend mode: firmware parsed, camera left alone after the upload step.
    Pretended,
}

/// Loader Session - drives one camera through the bring-up sequence.
pub struct LoaderSession<'a, T: UsbTransport + ?Sized, O: LoaderObserver = TracingObserver> {
    transport: &'a T,
    device: DeviceInfo,
    config: LoaderConfig,
    observer: Arc<O>,
    state: StateMachineContext,
}

impl<'a, T: UsbTransport + ?Sized> LoaderSession<'a, T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: &'a T, device: DeviceInfo, config: LoaderConfig) -> Self {
        Self::with_observer(transport, device, config, Arc::new(TracingObserver))
    }
}

impl<'a, T: UsbTransport + ?Sized, O: LoaderObserver> LoaderSession<'a, T, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(
        transport: &'a T,
        device: DeviceInfo,
        config: LoaderConfig,
        observer: Arc<O>,
    ) -> Self {
        Self {
            transport,
            device,
            config,
            observer,
            state: StateMachineContext::new(),
        }
    }

    /// Current state machine context.
    pub fn state(&self) -> &StateMachineContext {
        &self.state
    }

    fn emit(&self, event: LoaderEvent) {
        self.observer.on_event(&event);
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(LoaderEvent::Log {
            level,
            message: message.into(),
        });
    }

    fn goto_state(&mut self, to: LoaderState) {
        let from = self.state.goto_state(to);
        self.emit(LoaderEvent::StateChanged { from, to });
    }

    /// Resolve and open the firmware file, then run the bring-up.
    #[instrument(skip(self), fields(vid = %format!("{:04x}", self.device.vendor_id), pid = %format!("{:04x}", self.device.product_id)))]
    pub fn run(&mut self) -> Result<Outcome, LoaderError> {
        let (vid, pid) = (self.device.vendor_id, self.device.product_id);
        self.emit(LoaderEvent::DeviceFound { vid, pid });

        let path = device::resolve_firmware_path(
            &self.config.firmware,
            self.config.ucode_path.as_deref(),
            vid,
            pid,
        )
        .map_err(|tried| LoaderError::FirmwareNotFound { tried })?;
        info!(path = %path.display(), "Using firmware");

        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        let dump_path = self
            .config
            .dump_ucode
            .then(|| PathBuf::from(device::expand_template(&self.config.dump_path, vid, pid)));

        self.bring_up(file, size, dump_path.as_deref())
    }

    /// Run the bring-up against an already opened firmware source of `size` bytes.
    ///
    /// `dump_path` is created only once the upload step is reached. On
    /// success the orientation registers are written; their failure is
    /// logged and does not change the outcome.
    pub fn bring_up<R: Read>(
        &mut self,
        firmware: R,
        size: u64,
        dump_path: Option<&Path>,
    ) -> Result<Outcome, LoaderError> {
        match self.load(firmware, size, dump_path) {
            Ok(outcome) => {
                self.apply_orientation();
                self.emit(LoaderEvent::Complete);
                Ok(outcome)
            }
            Err(e) => {
                self.goto_state(LoaderState::Failed);
                self.log(LogLevel::Error, e.to_string());
                Err(e)
            }
        }
    }

    fn query_status(&mut self) -> Result<bool, LoaderError> {
        let present = ucode_status(self.transport)?;
        self.state.ucode_present = Some(present);
        Ok(present)
    }

    fn query_version(&mut self) -> Result<u16, LoaderError> {
        let version = ucode_version(self.transport)?;
        self.state.reported_version = Some(version);
        Ok(version)
    }

    fn clear(&mut self) -> Result<(), LoaderError> {
        ucode_clear(self.transport, self.config.clear_settle())?;
        self.goto_state(LoaderState::Cleared);
        Ok(())
    }

    fn load<R: Read>(
        &mut self,
        firmware: R,
        size: u64,
        dump_path: Option<&Path>,
    ) -> Result<Outcome, LoaderError> {
        let expected = self.device.ucode_version;

        let present = self.query_status()?;
        self.goto_state(LoaderState::Queried);

        match (present, self.config.force_clear) {
            (false, force) => {
                if force {
                    self.log(
                        LogLevel::Warn,
                        "Not force-clearing because the device has no ucode",
                    );
                }
                self.goto_state(LoaderState::NoUcode);
            }
            (true, true) => self.clear()?,
            (true, false) => {
                let version = self.query_version()?;
                let check = VersionCheck::classify(version, expected);
                if check == VersionCheck::WdmPlaceholder {
                    self.log(
                        LogLevel::Warn,
                        "Bad version returned. You appear to be running a WDM device. Skipping clear",
                    );
                }

                if check.is_compatible() {
                    self.goto_state(LoaderState::UcodeMatched);
                    self.log(LogLevel::Info, "Not doing anything - camera already set up");
                    return Ok(Outcome::AlreadyLoaded);
                }

                self.goto_state(LoaderState::UcodeMismatched);
                self.log(
                    LogLevel::Warn,
                    format!(
                        "Microcode versions don't match (0x{:04x} loaded, 0x{:04x} expected), clearing",
                        version, expected
                    ),
                );
                self.clear()?;
                if self.query_status()? {
                    self.log(
                        LogLevel::Warn,
                        "Camera still has microcode even though we cleared it",
                    );
                }
            }
        }

        let mut dump_file = match dump_path {
            Some(path) => {
                self.log(
                    LogLevel::Info,
                    format!("Dumping microcode to {}", path.display()),
                );
                Some(File::create(path)?)
            }
            None => None,
        };
        upload_firmware(
            self.transport,
            firmware,
            size,
            self.config.pretend,
            dump_file.as_mut().map(|f| f as &mut dyn Write),
            self.observer.as_ref(),
        )?;
        self.goto_state(LoaderState::Uploaded);

        if self.config.pretend {
            self.log(
                LogLevel::Warn,
                "Skipping enabling of microcode and version checks; in pretend mode",
            );
            return Ok(Outcome::Pretended);
        }

        ucode_enable(self.transport)?;
        self.goto_state(LoaderState::Enabled);

        let actual = self.query_version()?;
        if actual != expected {
            return Err(LoaderError::VersionMismatch { expected, actual });
        }
        self.goto_state(LoaderState::Verified);
        Ok(Outcome::Uploaded)
    }

    /// Write the device table's flip flags. Failure is only logged.
    pub fn apply_orientation(&self) {
        if let Err(e) = image_flip(self.transport, self.device.hflip, self.device.vflip) {
            self.log(
                LogLevel::Warn,
                format!("Unable to apply image orientation: {}", e),
            );
        }
    }
}
