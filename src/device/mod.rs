//! Audio device abstraction (spec §4.5). Grounded on `device.h`: a device
//! is either poll-driven (fds the realtime coordinator multiplexes) or
//! callback-driven (it runs its own thread and calls back into the
//! timecoder/player directly) — the contract accommodates both.

pub mod cpal_device;
pub mod dummy;

use std::sync::Arc;

use crate::error::Result;
use crate::player::Player;
use crate::spin::Spinlock;
use crate::timecoder::Timecoder;

/// A backend audio device, attached to exactly one timecoder and one
/// player (spec §4.5).
///
/// Poll-driven backends (ALSA/OSS-style) return file descriptors from
/// `poll_fds()` for the realtime coordinator to multiplex; callback-driven
/// backends (JACK-style, and this crate's `cpal` backend) return an empty
/// set and drive `submit`/`collect` from their own realtime thread instead.
pub trait Device: Send {
    fn sample_rate(&self) -> u32;

    /// Poll file descriptors this device wants multiplexed by the realtime
    /// coordinator. Empty for callback-driven backends.
    fn poll_fds(&self) -> Vec<std::os::unix::io::RawFd> {
        Vec::new()
    }

    /// Handle poll readiness for a poll-driven device. No-op for
    /// callback-driven backends (they never appear in the poll set).
    fn handle(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start the device rolling, connected to `timecoder` (for capture) and
    /// `player` (for playback). `timecoder` is spinlock-guarded because a
    /// callback-driven device's own realtime thread is the writer.
    fn start(&mut self, timecoder: Arc<Spinlock<Timecoder>>, player: Arc<Player>) -> Result<()>;

    fn stop(&mut self);
}
