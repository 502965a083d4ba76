//! Playback engine: decouples the clock of audio playback from the clock of
//! the timecode signal (spec §4.3). Grounded directly on `player.c`.

pub mod resample;

use std::sync::Arc;

use crate::spin::Spinlock;
use crate::timecoder::Timecoder;
use crate::track::Track;

const SYNC_TIME: f64 = 1.0 / 2.0;
const SYNC_PITCH: f64 = 0.05;
const SYNC_RC: f64 = 0.05;
const SKIP_THRESHOLD: f64 = 1.0 / 8.0;
const VOLUME: f32 = 7.0 / 8.0;

/// A pitch source external to the sine-wave timecode signal (spec's IMU
/// Open Question): read under the player's lock, overriding `pitch` when
/// present. No concrete implementation ships here; this is the seam a
/// collaborator (e.g. an IMU-over-Bluetooth controller) would fill.
pub trait ExternalPitch: Send {
    fn current(&self) -> f64;
}

struct State {
    track: Arc<Track>,

    position: f64,
    target_position: f64,
    target_valid: bool,
    offset: f64,
    last_difference: f64,

    pitch: f64,
    sync_pitch: f64,
    volume: f32,

    timecode_control: bool,
    recalibrate: bool,
}

/// A deck's playback state, guarded by a spinlock so the realtime audio
/// callback and control-thread operations (load, seek, recue) can both
/// reach it without the RT side ever blocking (spec §4.6).
pub struct Player {
    inner: Spinlock<State>,
    external_pitch: Spinlock<Option<Box<dyn ExternalPitch>>>,
}

impl Player {
    pub fn new(track: Arc<Track>) -> Self {
        Player {
            inner: Spinlock::new(State {
                track,
                position: 0.0,
                target_position: 0.0,
                target_valid: false,
                offset: 0.0,
                last_difference: 0.0,
                pitch: 0.0,
                sync_pitch: 1.0,
                volume: 0.0,
                timecode_control: true,
                recalibrate: true,
            }),
            external_pitch: Spinlock::new(None),
        }
    }

    pub fn set_external_pitch(&self, source: Option<Box<dyn ExternalPitch>>) {
        *self.external_pitch.lock() = source;
    }

    pub fn set_track(&self, track: Arc<Track>) {
        let mut s = self.inner.lock();
        s.track = track;
        s.offset = s.position;
    }

    pub fn set_timecode_control(&self, on: bool) {
        let mut s = self.inner.lock();
        if on && !s.timecode_control {
            s.recalibrate = true;
        }
        s.timecode_control = on;
    }

    pub fn toggle_timecode_control(&self) -> bool {
        let mut s = self.inner.lock();
        s.timecode_control = !s.timecode_control;
        if s.timecode_control {
            s.recalibrate = true;
        }
        s.timecode_control
    }

    pub fn recue(&self) {
        let mut s = self.inner.lock();
        s.offset = s.position;
    }

    pub fn seek_to(&self, seconds: f64) {
        let mut s = self.inner.lock();
        s.offset = s.position - seconds;
    }

    /// Elapsed playback position, in seconds, ignoring any timecode offset.
    pub fn get_elapsed(&self) -> f64 {
        let s = self.inner.lock();
        s.position - s.offset
    }

    pub fn get_remain(&self) -> f64 {
        let s = self.inner.lock();
        let track_len = s.track.length() as f64 / s.track.rate() as f64;
        track_len - (s.position - s.offset)
    }

    /// Active if the track is actually advancing (spec's `deck_is_locked`
    /// supplement treats a non-advancing deck as safe to reload).
    pub fn is_active(&self) -> bool {
        let s = self.inner.lock();
        s.pitch.abs() > 0.01
    }

    /// Make this player's playback state identical to `from`'s (spec's
    /// deck clone, used when handing off between decks).
    pub fn clone_state_from(&self, from: &Player) {
        let src = from.inner.lock();
        let mut dst = self.inner.lock();
        dst.track = src.track.clone();
        dst.position = src.position;
        dst.offset = src.offset;
        dst.target_position = src.target_position;
        dst.target_valid = src.target_valid;
        dst.pitch = src.pitch;
        dst.sync_pitch = src.sync_pitch;
        dst.volume = src.volume;
    }

    fn sync_to_timecode(state: &mut State, tc: &Timecoder) -> std::result::Result<(), ()> {
        let position = tc.get_position();

        if let Some((timecode, _)) = position {
            if timecode > tc.get_safe() {
                return Err(());
            }
        }

        state.pitch = tc.get_pitch();

        match position {
            None => state.target_valid = false,
            Some((timecode, when)) => {
                let tcpos = timecode as f64 / tc.get_resolution() as f64;
                state.target_position = tcpos + state.pitch * when;
                state.target_valid = true;
            }
        }

        Ok(())
    }

    fn calibrate_to_timecode_position(state: &mut State) {
        state.offset += state.target_position - state.position;
        state.position = state.target_position;
    }

    /// Fill `pcm` with `samples` stereo frames resampled from the current
    /// track, synchronising to `timecoder` if timecode control is enabled
    /// (spec §4.3's `collect()`). Called from the realtime audio callback.
    pub fn collect(&self, pcm: &mut [i16], samples: usize, rate: u32, timecoder: &Timecoder) {
        let mut s = self.inner.lock();

        if let Some(ext) = self.external_pitch.lock().as_ref() {
            s.pitch = ext.current();
        }

        let dt = samples as f64 / rate as f64;

        if s.timecode_control && Self::sync_to_timecode(&mut s, timecoder).is_err() {
            s.timecode_control = false;
        }

        if !s.target_valid {
            let alpha = dt / (SYNC_RC + dt);
            s.sync_pitch += alpha * (1.0 - s.sync_pitch);
        } else {
            if s.recalibrate {
                Self::calibrate_to_timecode_position(&mut s);
                s.recalibrate = false;
            }

            let diff = s.position - s.target_position;
            s.last_difference = diff;

            if diff.abs() > SKIP_THRESHOLD {
                s.position = s.target_position;
                eprintln!("Seek to new position {:.2}s.", s.position);
            } else if s.pitch.abs() > SYNC_PITCH {
                s.sync_pitch = s.pitch / (diff / SYNC_TIME + s.pitch);
            }

            s.target_valid = false;
        }

        let mut target_volume = (s.pitch.abs() as f32) * VOLUME;
        if target_volume > 1.0 {
            target_volume = 1.0;
        }

        let pitch = s.pitch * s.sync_pitch;
        let track = s.track.clone();
        let position = s.position - s.offset;
        let start_vol = s.volume;

        let advanced = resample::build_pcm(
            pcm,
            samples,
            rate,
            &track,
            position,
            pitch,
            start_vol,
            target_volume,
        );

        s.position += advanced;
        s.volume = target_volume;
    }
}
