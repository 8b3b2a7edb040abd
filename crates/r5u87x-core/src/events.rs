//! Event system for UI decoupling.
//!
//! Allows front-ends to follow the bring-up without tight coupling to the
//! core logic.

use crate::state::LoaderState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by the loader session.
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// Camera selected for bring-up.
    DeviceFound { vid: u16, pid: u16 },
    /// State machine transition.
    StateChanged { from: LoaderState, to: LoaderState },
    /// Upload progress in bytes of the firmware file.
    Progress { chunk: usize, current: u64, total: u64 },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Bring-up finished successfully.
    Complete,
}

/// Observer trait for receiving loader events.
pub trait LoaderObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &LoaderEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl LoaderObserver for NullObserver {
    fn on_event(&self, _event: &LoaderEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl LoaderObserver for TracingObserver {
    fn on_event(&self, event: &LoaderEvent) {
        match event {
            LoaderEvent::DeviceFound { vid, pid } => {
                tracing::info!(vid = %format!("{:04x}", vid), pid = %format!("{:04x}", pid), "Found camera");
            }
            LoaderEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "State changed");
            }
            LoaderEvent::Progress {
                chunk,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(chunk, progress = %format!("{}%", pct), "Upload progress");
            }
            LoaderEvent::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            LoaderEvent::Complete => {
                tracing::info!("Bring-up complete");
            }
        }
    }
}

/// Observer that keeps every event, for tests and front-ends that replay.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<LoaderEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<LoaderEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Messages logged at `level`, in order.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LoaderEvent::Log { level: l, message } if l == level => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl LoaderObserver for RecordingObserver {
    fn on_event(&self, event: &LoaderEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
