//! Cubic-interpolated resampling and dither (spec §4.3). Grounded on
//! `player.c`'s `cubic_interpolate`/`build_pcm`.

use rand::Rng;

use crate::track::{Track, TRACK_CHANNELS};

/// Cubic (Catmull-Rom style) interpolation of the sample at position `2+mu`
/// within the 4-tap window `y`.
#[inline]
pub fn cubic_interpolate(y: [f32; 4], mu: f32) -> f32 {
    let mu2 = mu * mu;
    let a0 = y[3] - y[2] - y[0] + y[1];
    let a1 = y[0] - y[1] - a0;
    let a2 = y[2] - y[0];
    let a3 = y[1];

    (a0 * mu * mu2) + (a1 * mu2) + (a2 * mu) + a3
}

/// Build a block of interleaved stereo PCM, resampled from `track` starting
/// at `position` seconds, ramping volume linearly from `start_vol` to
/// `end_vol` over the block.
///
/// Returns the number of seconds advanced in the source track.
pub fn build_pcm(
    pcm: &mut [i16],
    samples: usize,
    rate: u32,
    track: &Track,
    position: f64,
    pitch: f64,
    start_vol: f32,
    end_vol: f32,
) -> f64 {
    let mut rng = rand::rng();

    let track_rate = track.rate() as f64;
    let mut sample = position * track_rate;
    let step = pitch * track_rate / rate as f64;

    let mut vol = start_vol;
    let gradient = (end_vol - start_vol) / samples as f32;

    for s in 0..samples {
        let mut sa = sample as i64;
        if sample < 0.0 {
            sa -= 1;
        }
        let f = (sample - sa as f64) as f32;
        let mut sa = sa - 1;

        let mut window = [[0f32; 4]; TRACK_CHANNELS];
        for q in 0..4 {
            if sa < 0 || sa >= track.length() as i64 {
                for c in window.iter_mut() {
                    c[q] = 0.0;
                }
            } else {
                let frame = track.get_sample(sa as u64);
                for c in 0..TRACK_CHANNELS {
                    window[c][q] = frame[c] as f32;
                }
            }
            sa += 1;
        }

        for c in 0..TRACK_CHANNELS {
            let dither: f32 = rng.random_range(0..32768) as f32 / 32768.0 - 0.5;
            let v = vol * cubic_interpolate(window[c], f) + dither;

            pcm[s * TRACK_CHANNELS + c] = v.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }

        sample += step;
        vol += gradient;
    }

    pitch * samples as f64 / rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_passes_through_exact_sample_points() {
        let y = [0.0, 10.0, 20.0, 30.0];
        // mu=0 returns y[1], the sample "at" the window's 2nd tap.
        assert!((cubic_interpolate(y, 0.0) - 10.0).abs() < 1e-4);
        // mu=1 returns y[2].
        assert!((cubic_interpolate(y, 1.0) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn interpolate_of_flat_signal_is_flat() {
        let y = [5.0, 5.0, 5.0, 5.0];
        for i in 0..10 {
            let mu = i as f32 / 10.0;
            assert!((cubic_interpolate(y, mu) - 5.0).abs() < 1e-4);
        }
    }
}
