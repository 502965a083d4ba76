//! Callback-driven device backend (the spec's JACK-style variant of
//! §4.5), backed by `cpal`. Two full-duplex streams (capture from the
//! turntable's preamp, playback to the speakers) are opened on the default
//! host devices; both streams run their own realtime thread supplied by
//! `cpal`, so this backend reports an empty `poll_fds()` set.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crate::error::{Error, Result};
use crate::player::Player;
use crate::spin::{self, Spinlock};
use crate::timecoder::Timecoder;

use super::Device;

const CHANNELS: u16 = 2;

pub struct CpalDevice {
    rate: u32,
    input_config: StreamConfig,
    output_config: StreamConfig,
    input: Option<Stream>,
    output: Option<Stream>,
}

impl CpalDevice {
    /// Open the default input/output devices and negotiate a shared sample
    /// rate for both, matching `device_sample_rate()`'s single value per
    /// device (spec §4.5).
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let input_device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".into()))?;
        let output_device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".into()))?;

        let input_supported = input_device
            .default_input_config()
            .map_err(|e| Error::Device(format!("input config: {e}")))?;
        let output_supported = output_device
            .default_output_config()
            .map_err(|e| Error::Device(format!("output config: {e}")))?;

        require_i16_format(input_supported.sample_format())?;
        require_i16_format(output_supported.sample_format())?;

        let rate = input_supported.sample_rate().0;

        let mut input_config = input_supported.config();
        input_config.channels = CHANNELS;
        let mut output_config = output_supported.config();
        output_config.channels = CHANNELS;
        output_config.sample_rate = input_supported.sample_rate();

        Ok(CpalDevice {
            rate,
            input_config,
            output_config,
            input: None,
            output: None,
        })
    }
}

impl Device for CpalDevice {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn start(&mut self, timecoder: Arc<Spinlock<Timecoder>>, player: Arc<Player>) -> Result<()> {
        let host = cpal::default_host();
        let input_device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".into()))?;
        let output_device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".into()))?;

        let rate = self.rate;
        let tc_for_input = timecoder.clone();
        let input_stream = input_device
            .build_input_stream(
                &self.input_config,
                move |data: &[i16], _| {
                    // `cpal` gives each stream its own dedicated realtime
                    // thread and calls this closure repeatedly on it; marking
                    // is idempotent, so doing it on every callback (rather
                    // than needing a separate one-time hook) is harmless.
                    spin::mark_rt_thread();
                    tc_for_input.lock().submit(data, rate);
                },
                |err| eprintln!("input stream fault: {err}"),
                None,
            )
            .map_err(|e| Error::Device(format!("build input stream: {e}")))?;

        let tc_for_output = timecoder;
        let output_stream = output_device
            .build_output_stream(
                &self.output_config,
                move |data: &mut [i16], _| {
                    spin::mark_rt_thread();
                    let samples = data.len() / CHANNELS as usize;
                    let tc = tc_for_output.lock();
                    player.collect(data, samples, rate, &tc);
                },
                |err| eprintln!("output stream fault: {err}"),
                None,
            )
            .map_err(|e| Error::Device(format!("build output stream: {e}")))?;

        input_stream
            .play()
            .map_err(|e| Error::Device(format!("start input stream: {e}")))?;
        output_stream
            .play()
            .map_err(|e| Error::Device(format!("start output stream: {e}")))?;

        self.input = Some(input_stream);
        self.output = Some(output_stream);

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(s) = self.input.take() {
            let _ = s.pause();
        }
        if let Some(s) = self.output.take() {
            let _ = s.pause();
        }
    }
}

/// `cpal`'s negotiated format may be `i16`, `f32` or others; this crate's
/// internal PCM representation is `i16` throughout (spec §4.1, §4.4), so
/// `open()` only proceeds when the device's native format is one this
/// backend can use without an extra conversion layer.
pub fn require_i16_format(format: SampleFormat) -> Result<()> {
    if format == SampleFormat::I16 {
        Ok(())
    } else {
        Err(Error::Device(format!(
            "unsupported sample format {format:?}, expected I16"
        )))
    }
}
