//! Interpolation kernels and sample-format handling for the resampler.

pub mod cubic;
pub mod format;
pub mod sinc;

use crate::track::Track;
pub use format::{
    read_capture_sample, read_sample, FormatF32, FormatS16, FormatS24, FormatS24Packed, FormatS32,
    FormatWriter, SampleFormat,
};
pub use sinc::SincTables;

/// Which kernel the engine runs. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    /// 4-tap Catmull-Rom: fast, no anti-aliasing
    Cubic,
    /// 16-tap windowed sinc: anti-aliased above 1x
    #[default]
    Sinc,
}

impl InterpolationMode {
    pub fn name(self) -> &'static str {
        match self {
            InterpolationMode::Cubic => "cubic",
            InterpolationMode::Sinc => "sinc",
        }
    }
}

/// One deck's view for an interpolation call.
pub struct DeckTap<'a> {
    pub track: &'a Track,
    pub sample_pos: f64,
    pub len: usize,
    pub abs_pitch: f32,
}

/// Stereo output of both decks for one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct DualDeckSamples {
    pub l1: f32,
    pub r1: f32,
    pub l2: f32,
    pub r2: f32,
}

/// Interpolation policy; the engine's inner loop is monomorphized over an
/// implementation of this trait.
pub trait Interpolate: Send {
    fn interpolate_pair(&self, a: DeckTap<'_>, b: DeckTap<'_>) -> DualDeckSamples;
}

/// Catmull-Rom policy. Pitch is ignored (no bandwidth selection).
pub struct CubicInterpolation;

impl Interpolate for CubicInterpolation {
    #[inline]
    fn interpolate_pair(&self, a: DeckTap<'_>, b: DeckTap<'_>) -> DualDeckSamples {
        let (l1, r1) = cubic::interpolate_track(a.track, a.sample_pos, a.len);
        let (l2, r2) = cubic::interpolate_track(b.track, b.sample_pos, b.len);
        DualDeckSamples { l1, r1, l2, r2 }
    }
}

/// Windowed-sinc policy with runtime-generated tables.
pub struct SincInterpolation {
    tables: SincTables,
}

impl SincInterpolation {
    pub fn new() -> Self {
        Self {
            tables: SincTables::build(),
        }
    }
}

impl Default for SincInterpolation {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpolate for SincInterpolation {
    #[inline]
    fn interpolate_pair(&self, a: DeckTap<'_>, b: DeckTap<'_>) -> DualDeckSamples {
        let (l1, r1) = self
            .tables
            .interpolate_track(a.track, a.sample_pos, a.len, a.abs_pitch);
        let (l2, r2) = self
            .tables
            .interpolate_track(b.track, b.sample_pos, b.len, b.abs_pitch);
        DualDeckSamples { l1, r1, l2, r2 }
    }
}
