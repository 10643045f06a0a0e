//! Realtime audio engine: deck input/output state, the dual-deck
//! resampler/mixer, and the factory that picks a monomorphized instance.

mod engine;
mod input;
mod state;

pub use engine::{AudioCapture, AudioEngine, EngineCore, EngineParams};
pub use input::{BeepType, DeckInput, PlaybackSource};
pub use state::{DeckProcessingState, DeckSnapshot, DspStats, DspStatsSnapshot};

use std::sync::Arc;

use crate::dsp::{
    CubicInterpolation, FormatF32, FormatS16, FormatS24, FormatS24Packed, FormatS32,
    InterpolationMode, SampleFormat, SincInterpolation,
};
use crate::player::Player;
use crate::track::{Track, TrackError};

/// Build the engine variant for the selected kernel and device format.
///
/// Virtual dispatch happens once per buffer; everything inside the returned
/// engine is monomorphic. Also returns the pre-allocated loop tracks so the
/// control side can recall loops without reaching into the audio thread.
#[allow(clippy::type_complexity)]
pub fn create_engine(
    mode: InterpolationMode,
    format: SampleFormat,
    players: [Arc<Player>; 2],
    state: [Arc<DeckProcessingState>; 2],
    stats: Arc<DspStats>,
    params: EngineParams,
    has_capture: bool,
) -> Result<(Box<dyn EngineCore>, [Arc<Track>; 2]), TrackError> {
    macro_rules! engine {
        ($interp:expr, $format:ty) => {{
            let engine = AudioEngine::<_, $format>::new(
                $interp, players, state, stats, params, has_capture,
            )?;
            let loop_tracks = engine.loop_tracks();
            (Box::new(engine) as Box<dyn EngineCore>, loop_tracks)
        }};
    }

    Ok(match (mode, format) {
        (InterpolationMode::Sinc, SampleFormat::S16) => {
            engine!(SincInterpolation::new(), FormatS16)
        }
        (InterpolationMode::Sinc, SampleFormat::S24Packed) => {
            engine!(SincInterpolation::new(), FormatS24Packed)
        }
        (InterpolationMode::Sinc, SampleFormat::S24) => {
            engine!(SincInterpolation::new(), FormatS24)
        }
        (InterpolationMode::Sinc, SampleFormat::S32) => {
            engine!(SincInterpolation::new(), FormatS32)
        }
        (InterpolationMode::Sinc, SampleFormat::F32) => {
            engine!(SincInterpolation::new(), FormatF32)
        }
        (InterpolationMode::Cubic, SampleFormat::S16) => {
            engine!(CubicInterpolation, FormatS16)
        }
        (InterpolationMode::Cubic, SampleFormat::S24Packed) => {
            engine!(CubicInterpolation, FormatS24Packed)
        }
        (InterpolationMode::Cubic, SampleFormat::S24) => {
            engine!(CubicInterpolation, FormatS24)
        }
        (InterpolationMode::Cubic, SampleFormat::S32) => {
            engine!(CubicInterpolation, FormatS32)
        }
        (InterpolationMode::Cubic, SampleFormat::F32) => {
            engine!(CubicInterpolation, FormatF32)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_every_variant() {
        for mode in [InterpolationMode::Cubic, InterpolationMode::Sinc] {
            for format in [
                SampleFormat::S16,
                SampleFormat::S24Packed,
                SampleFormat::S24,
                SampleFormat::S32,
                SampleFormat::F32,
            ] {
                let players = [
                    Arc::new(Player::new(48_000, Track::acquire_empty(48_000), 1.0)),
                    Arc::new(Player::new(48_000, Track::acquire_empty(48_000), 1.0)),
                ];
                let state = [
                    Arc::new(DeckProcessingState::new()),
                    Arc::new(DeckProcessingState::new()),
                ];
                let params = EngineParams {
                    sample_rate: 48_000,
                    slippiness: 200.0,
                    brake_speed: 3000.0,
                    max_volume: 1.0,
                    loop_max_seconds: 1,
                };
                let (mut engine, loop_tracks) = create_engine(
                    mode,
                    format,
                    players,
                    state,
                    Arc::new(DspStats::new()),
                    params,
                    false,
                )
                .unwrap();
                assert_eq!(loop_tracks[0].length(), 0);

                let mut out = vec![0u8; 64 * 2 * format.bytes_per_sample()];
                engine.process(None, &mut out, 2, 64);
            }
        }
    }
}
