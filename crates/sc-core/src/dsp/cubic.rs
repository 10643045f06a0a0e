//! Catmull-Rom cubic interpolation (4 taps).
//!
//! Fast path reads the four stereo taps through one contiguous block
//! pointer; the slow path falls back to per-sample fetches when the window
//! straddles a block boundary or the track loop point. Both paths are
//! bit-equivalent.

use crate::track::Track;

const TAPS: usize = 4;
/// Window is [-1, 0, +1, +2] relative to the integer position.
const CENTER_OFFSET: i64 = 1;

#[inline]
fn catmull_rom(t: [(f32, f32); 4], frac: f32) -> (f32, f32) {
    let mu = frac;
    let mu2 = mu * mu;
    let mu3 = mu2 * mu;

    let interp = |t0: f32, t1: f32, t2: f32, t3: f32| {
        let a0 = 0.5 * (-t0 + 3.0 * t1 - 3.0 * t2 + t3);
        let a1 = 0.5 * (2.0 * t0 - 5.0 * t1 + 4.0 * t2 - t3);
        let a2 = 0.5 * (-t0 + t2);
        let a3 = t1;
        a0 * mu3 + a1 * mu2 + a2 * mu + a3
    };

    (
        interp(t[0].0, t[1].0, t[2].0, t[3].0),
        interp(t[0].1, t[1].1, t[2].1, t[3].1),
    )
}

#[inline]
fn interpolate_direct(window: &[i16], frac: f32) -> (f32, f32) {
    let tap = |i: usize| (window[i * 2] as f32, window[i * 2 + 1] as f32);
    catmull_rom([tap(0), tap(1), tap(2), tap(3)], frac)
}

fn interpolate_slow(track: &Track, center: i64, len: usize, frac: f32) -> (f32, f32) {
    let start = center - CENTER_OFFSET;
    let mut taps = [(0.0f32, 0.0f32); TAPS];
    for (i, tap) in taps.iter_mut().enumerate() {
        let mut idx = start + i as i64;
        idx = idx.rem_euclid(len as i64);
        if idx >= 0 && (idx as usize) < len {
            let (l, r) = track.get_sample(idx as usize);
            *tap = (l as f32, r as f32);
        }
    }
    catmull_rom(taps, frac)
}

/// Interpolate one deck at a fractional sample position. `sample_pos` is
/// expected to be pre-wrapped to `[0, len)` by the engine's per-buffer
/// wrap; the interior modulo is the safety net for window overhang.
pub fn interpolate_track(track: &Track, sample_pos: f64, len: usize) -> (f32, f32) {
    if len == 0 {
        return (0.0, 0.0);
    }

    let mut center = sample_pos as i64;
    if sample_pos < 0.0 {
        center -= 1;
    }
    let frac = (sample_pos - center as f64) as f32;

    center = center.rem_euclid(len as i64);

    let start = center - CENTER_OFFSET;
    let end = center + (TAPS as i64 - CENTER_OFFSET) - 1;
    if start >= 0 && (end as usize) < len {
        if let Some(window) = track.sample_window(start as usize, TAPS) {
            return interpolate_direct(window, frac);
        }
    }
    interpolate_slow(track, center, len, frac)
}
