//! 16-tap windowed-sinc interpolation with phase-interpolated tables and
//! pitch-dependent bandwidth selection.
//!
//! Tables are generated at startup, indexed `[bandwidth][phase][tap]`. Each
//! bandwidth holds kernels whose cutoff scales with inverse pitch so that
//! playback above 1x stays anti-aliased. At runtime the two neighbouring
//! phase kernels are blended linearly, then convolved with the centred
//! 16-tap window; the fast path reads the window through one contiguous
//! block pointer.

use crate::track::Track;

pub const SINC_TAPS: usize = 16;
pub const SINC_PHASES: usize = 128;
const HALF_TAPS: i64 = SINC_TAPS as i64 / 2;

/// (maximum |pitch| served, kernel cutoff as a fraction of Nyquist)
const BANDWIDTHS: [(f32, f32); 8] = [
    (1.0, 1.0),
    (1.25, 0.8),
    (1.5, 1.0 / 1.5),
    (2.0, 0.5),
    (2.5, 0.4),
    (3.0, 1.0 / 3.0),
    (4.0, 0.25),
    (f32::INFINITY, 0.2),
];

pub const SINC_BANDWIDTHS: usize = BANDWIDTHS.len();

/// Pick the kernel set whose cutoff keeps `abs_pitch` alias-free.
#[inline]
pub fn select_bandwidth(abs_pitch: f32) -> usize {
    for (i, (max_pitch, _)) in BANDWIDTHS.iter().enumerate() {
        if abs_pitch <= *max_pitch {
            return i;
        }
    }
    SINC_BANDWIDTHS - 1
}

/// All kernels, flattened `[bandwidth][phase][tap]`.
pub struct SincTables {
    coeffs: Vec<f32>,
}

impl SincTables {
    /// Generate the full table set. Runs once at startup; the tables stay
    /// resident for the life of the engine.
    pub fn build() -> Self {
        let mut coeffs = vec![0.0f32; SINC_BANDWIDTHS * SINC_PHASES * SINC_TAPS];

        for (bw, (_, cutoff)) in BANDWIDTHS.iter().enumerate() {
            for phase in 0..SINC_PHASES {
                let frac = phase as f32 / SINC_PHASES as f32;
                let base = (bw * SINC_PHASES + phase) * SINC_TAPS;

                let mut sum = 0.0f32;
                for tap in 0..SINC_TAPS {
                    // Offset of this tap from the interpolation point; the
                    // window spans [center - 8, center + 7].
                    let d = tap as f32 - HALF_TAPS as f32 - frac;
                    let x = std::f32::consts::PI * d;
                    let sinc = if d.abs() < 1e-6 {
                        *cutoff
                    } else {
                        (cutoff * x).sin() / x
                    };
                    let window = if d.abs() < HALF_TAPS as f32 {
                        0.5 * (1.0 + (x / HALF_TAPS as f32).cos())
                    } else {
                        0.0
                    };
                    let c = sinc * window;
                    coeffs[base + tap] = c;
                    sum += c;
                }

                // Unity DC gain per phase kernel
                if sum.abs() > 1e-9 {
                    for tap in 0..SINC_TAPS {
                        coeffs[base + tap] /= sum;
                    }
                }
            }
        }

        Self { coeffs }
    }

    #[inline]
    fn kernel(&self, bw: usize, phase: usize) -> &[f32] {
        let base = (bw * SINC_PHASES + phase) * SINC_TAPS;
        &self.coeffs[base..base + SINC_TAPS]
    }

    /// Blend the two neighbouring phase kernels for `frac` in `[0, 1)`.
    #[inline]
    fn lerped_kernel(&self, frac: f32, bw: usize) -> [f32; SINC_TAPS] {
        let phase_f = frac * SINC_PHASES as f32;
        let mut phase0 = phase_f as i32;
        let mut w1 = phase_f - phase0 as f32;
        if phase0 >= SINC_PHASES as i32 - 1 {
            phase0 = SINC_PHASES as i32 - 2;
            w1 = 1.0;
        }
        if phase0 < 0 {
            phase0 = 0;
            w1 = 0.0;
        }
        let w0 = 1.0 - w1;

        let k0 = self.kernel(bw, phase0 as usize);
        let k1 = self.kernel(bw, phase0 as usize + 1);
        let mut out = [0.0f32; SINC_TAPS];
        for i in 0..SINC_TAPS {
            out[i] = k0[i] * w0 + k1[i] * w1;
        }
        out
    }

    /// Interpolate one deck. `sample_pos` is pre-wrapped by the engine;
    /// the interior modulo handles window overhang at the loop point.
    pub fn interpolate_track(
        &self,
        track: &Track,
        sample_pos: f64,
        len: usize,
        abs_pitch: f32,
    ) -> (f32, f32) {
        if len == 0 {
            return (0.0, 0.0);
        }

        let mut center = sample_pos as i64;
        if sample_pos < 0.0 {
            center -= 1;
        }
        let frac = (sample_pos - center as f64) as f32;

        center = center.rem_euclid(len as i64);

        let kernel = self.lerped_kernel(frac, select_bandwidth(abs_pitch));

        let start = center - HALF_TAPS;
        let end = center + HALF_TAPS - 1;
        if start >= 0 && (end as usize) < len {
            if let Some(window) = track.sample_window(start as usize, SINC_TAPS) {
                return convolve_direct(&kernel, window);
            }
        }
        convolve_slow(&kernel, track, start, len)
    }
}

/// Convolve the kernel with a contiguous interleaved window.
#[inline]
fn convolve_direct(kernel: &[f32; SINC_TAPS], window: &[i16]) -> (f32, f32) {
    let mut sum_l = 0.0f32;
    let mut sum_r = 0.0f32;
    for (i, k) in kernel.iter().enumerate() {
        sum_l += k * window[i * 2] as f32;
        sum_r += k * window[i * 2 + 1] as f32;
    }
    (sum_l, sum_r)
}

/// Per-sample fetch across block/track boundaries; out-of-range taps are
/// silence.
fn convolve_slow(kernel: &[f32; SINC_TAPS], track: &Track, start: i64, len: usize) -> (f32, f32) {
    let mut sum_l = 0.0f32;
    let mut sum_r = 0.0f32;
    for (i, k) in kernel.iter().enumerate() {
        let idx = (start + i as i64).rem_euclid(len as i64);
        if idx >= 0 && (idx as usize) < len {
            let (l, r) = track.get_sample(idx as usize);
            sum_l += k * l as f32;
            sum_r += k * r as f32;
        }
    }
    (sum_l, sum_r)
}
