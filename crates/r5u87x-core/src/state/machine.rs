//! Bring-up state tracking.

use std::fmt;

use crate::protocol::constants::WDM_VERSION_SENTINEL;

/// Microcode bring-up state of one camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoaderState {
    /// Nothing known about the camera yet.
    #[default]
    Unknown,
    /// Status has been read.
    Queried,
    /// Camera reports no microcode.
    NoUcode,
    /// Loaded microcode is the expected one (or the WDM placeholder).
    UcodeMatched,
    /// Loaded microcode differs from the expected version.
    UcodeMismatched,
    /// Microcode has been cleared.
    Cleared,
    /// All chunks written.
    Uploaded,
    /// Enable command accepted.
    Enabled,
    /// Post-enable version check passed.
    Verified,
    /// A fatal error ended the bring-up.
    Failed,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderState::Unknown => write!(f, "UNKNOWN"),
            LoaderState::Queried => write!(f, "QUERIED"),
            LoaderState::NoUcode => write!(f, "NO_UCODE"),
            LoaderState::UcodeMatched => write!(f, "UCODE_MATCHED"),
            LoaderState::UcodeMismatched => write!(f, "UCODE_MISMATCHED"),
            LoaderState::Cleared => write!(f, "CLEARED"),
            LoaderState::Uploaded => write!(f, "UPLOADED"),
            LoaderState::Enabled => write!(f, "ENABLED"),
            LoaderState::Verified => write!(f, "VERIFIED"),
            LoaderState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Result of comparing a reported version against the device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    Matched,
    /// WDM-class cameras report a fixed placeholder; accepted as loaded.
    WdmPlaceholder,
    Mismatched,
}

impl VersionCheck {
    pub fn classify(reported: u16, expected: u16) -> Self {
        if reported == WDM_VERSION_SENTINEL {
            VersionCheck::WdmPlaceholder
        } else if reported == expected {
            VersionCheck::Matched
        } else {
            VersionCheck::Mismatched
        }
    }

    /// Whether the loaded microcode can be kept.
    pub fn is_compatible(&self) -> bool {
        !matches!(self, VersionCheck::Mismatched)
    }
}

/// State machine context holding the session's runtime state.
#[derive(Debug, Default)]
pub struct StateMachineContext {
    /// Current state.
    pub state: LoaderState,
    /// Last reported microcode presence.
    pub ucode_present: Option<bool>,
    /// Last reported microcode version.
    pub reported_version: Option<u16>,
    /// Every state entered, in order, starting with `Unknown`.
    pub history: Vec<LoaderState>,
}

impl StateMachineContext {
    pub fn new() -> Self {
        Self {
            history: vec![LoaderState::Unknown],
            ..Self::default()
        }
    }

    /// Transition to a new state. Returns the previous one.
    pub fn goto_state(&mut self, new_state: LoaderState) -> LoaderState {
        tracing::debug!(from = %self.state, to = %new_state, "State transition");
        let previous = self.state;
        self.state = new_state;
        self.history.push(new_state);
        previous
    }

    /// Whether `state` was entered at any point.
    pub fn visited(&self, state: LoaderState) -> bool {
        self.history.contains(&state)
    }
}
