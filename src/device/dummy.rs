//! The dummy device: zero file descriptors, a fixed reported rate, and all
//! operations no-ops. Grounded on `dummy.c`.

use std::sync::Arc;

use crate::error::Result;
use crate::player::Player;
use crate::spin::Spinlock;
use crate::timecoder::Timecoder;

use super::Device;

pub struct DummyDevice {
    rate: u32,
}

impl DummyDevice {
    pub fn new() -> Self {
        DummyDevice { rate: 48000 }
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for DummyDevice {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn start(&mut self, _timecoder: Arc<Spinlock<Timecoder>>, _player: Arc<Player>) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_fixed_sample_rate() {
        let d = DummyDevice::new();
        assert_eq!(d.sample_rate(), 48000);
        assert!(d.poll_fds().is_empty());
    }
}
