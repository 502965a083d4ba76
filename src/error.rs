//! Error kinds for the timecode-to-motion core (spec §7).
//!
//! The realtime path itself never returns a `Result` — it cannot allocate or
//! fail fallibly by construction (§5) — these are the error values that
//! surface from the rig, device setup, configuration and controller layers.

use std::fmt;

/// A recoverable error from an external resource or a fatal one at startup.
///
/// See §7 for the recovery policy associated with each variant.
#[derive(Debug)]
pub enum Error {
    /// Audio device fault (xrun, stream failure). Recoverable: the device is
    /// restarted in place.
    Device(String),

    /// Track import failed or was incomplete. Non-fatal: the track plays
    /// back whatever audio was imported before the failure.
    Import(String),

    /// Malformed or missing startup configuration. Fatal at startup only.
    Config(String),

    /// A controller produced an error. The offending controller is disabled;
    /// other decks continue.
    Controller(String),

    /// An invariant the program relies on did not hold. Not recoverable.
    InvariantViolation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Device(msg) => write!(f, "device error: {msg}"),
            Error::Import(msg) => write!(f, "import error: {msg}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Controller(msg) => write!(f, "controller error: {msg}"),
            Error::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
