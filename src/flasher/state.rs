//! Flashing run states.

use std::fmt;

use serde::Serialize;

/// Where a flashing run currently is.
///
/// ```text
/// Idle → VersionChecked → Writing → Verifying → Verified → Started
///                                             ↘ Mismatch → Aborted
/// ```
/// Any error moves the run straight to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashState {
    Idle,
    VersionChecked,
    Writing,
    Verifying,
    /// Checksums match. Final when the application is not started.
    Verified,
    Mismatch,
    Started,
    Aborted,
}

impl FlashState {
    /// The image on the device matches the local image.
    pub fn is_success(&self) -> bool {
        matches!(self, FlashState::Started | FlashState::Verified)
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlashState::Idle => "idle",
            FlashState::VersionChecked => "version checked",
            FlashState::Writing => "writing",
            FlashState::Verifying => "verifying",
            FlashState::Verified => "verified",
            FlashState::Mismatch => "mismatch",
            FlashState::Started => "started",
            FlashState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
