//! Timecode-to-motion core for a digital vinyl system: decodes a timecode
//! signal captured from vinyl into a playback position and pitch, and
//! drives resampled track playback to follow it.

pub mod config;
pub mod cues;
pub mod deck;
pub mod device;
pub mod error;
pub mod player;
pub mod realtime;
pub mod rig;
pub mod spin;
pub mod timecoder;
pub mod track;

pub use deck::Deck;
pub use error::{Error, Result};
pub use player::Player;
pub use realtime::Realtime;
pub use rig::Rig;
pub use timecoder::Timecoder;
pub use track::Track;
