use std::fmt;

use crate::{NOTE_MAX, NOTE_MIN};

/// A note number outside `NOTE_MIN..=NOTE_MAX`. The call that produced it had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteOutOfRange(pub u8);

impl fmt::Display for NoteOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "note {} is outside the playable range {}..={}",
            self.0, NOTE_MIN, NOTE_MAX
        )
    }
}

impl std::error::Error for NoteOutOfRange {}

/// Failure to hand an event to the audio side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    OutOfRange(NoteOutOfRange),
    /// The event queue is full; the event was dropped and may be retried.
    Full,
    /// The audio side has been dropped.
    Disconnected,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::OutOfRange(e) => fmt::Display::fmt(e, f),
            ControlError::Full => f.write_str("envelope event queue is full"),
            ControlError::Disconnected => f.write_str("envelope voice has been dropped"),
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlError::OutOfRange(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NoteOutOfRange> for ControlError {
    fn from(e: NoteOutOfRange) -> Self {
        ControlError::OutOfRange(e)
    }
}

impl<T> From<crossbeam_channel::TrySendError<T>> for ControlError {
    fn from(e: crossbeam_channel::TrySendError<T>) -> Self {
        match e {
            crossbeam_channel::TrySendError::Full(_) => ControlError::Full,
            crossbeam_channel::TrySendError::Disconnected(_) => ControlError::Disconnected,
        }
    }
}

/// Failure to load a [`crate::EngineConfig`].
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read engine configuration: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid engine configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e)
    }
}
