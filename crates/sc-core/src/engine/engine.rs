//! The realtime dual-deck resampler/mixer.
//!
//! `AudioEngine` is monomorphized over an interpolation policy and a device
//! sample format; runtime dispatch happens once per buffer through the
//! object-safe [`EngineCore`] trait. Inside a period the engine:
//!
//! 1. consumes one-shot inputs (seek, record start/stop, loop reset, beep),
//! 2. derives each deck's target pitch from the motor model, slipmat
//!    simulation or platter position error,
//! 3. smooths pitch and volume and pre-computes per-sample gradients,
//! 4. resamples and mixes both decks into the output buffer,
//! 5. threads the capture input into the active loop recorder and mixes
//!    live monitoring,
//! 6. renders feedback beeps and updates the DSP statistics.
//!
//! Nothing on this path allocates, blocks, or logs.

use std::marker::PhantomData;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crate::dsp::{
    read_capture_sample, DeckTap, FormatWriter, Interpolate, SampleFormat,
};
use crate::loop_buffer::LoopBuffer;
use crate::player::Player;
use crate::track::{Track, TrackError};

use super::input::{BeepType, PlaybackSource};
use super::state::{DeckProcessingState, DspStats};

/// Time the crossfader takes to glide to its target.
const FADER_DECAY_TIME: f64 = 0.020;
/// Headroom so pitch slightly above 1.0 does not clip.
const BASE_VOLUME: f64 = 7.0 / 8.0;
/// Scratch pitch ceiling.
const MAX_SCRATCH_PITCH: f64 = 5.0;
/// Pitch ceiling while the platter is released.
const SLIPMAT_PITCH_LIMIT: f64 = 20.0;

const INT16_SCALE: f32 = 1.0 / 32768.0;

/// Beep patterns: '-' = 440 Hz, '_' = 220 Hz, ' ' = rest. One character
/// lasts [`BEEP_CHAR_SAMPLES`] frames.
const BEEPS: [&str; 3] = [
    "----------",
    "- - - - - - - - -",
    "--__--__--__--__--__",
];
const BEEP_CHAR_SAMPLES: usize = 4800;
const BEEP_AMPLITUDE: f32 = 20000.0 / 32768.0;

/// Engine-side tuning copied from the settings at construction.
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    pub sample_rate: u32,
    pub slippiness: f64,
    pub brake_speed: f64,
    pub max_volume: f64,
    pub loop_max_seconds: u32,
}

/// Capture input for one period, in the device's wire format.
pub struct AudioCapture<'a> {
    pub buffer: &'a [u8],
    pub format: SampleFormat,
    pub channels: usize,
    pub left_channel: usize,
    pub right_channel: usize,
}

/// Runtime interface of a monomorphized engine. Dispatch cost is one
/// virtual call per buffer.
pub trait EngineCore: Send {
    /// Fill `playback` (`frames` x `channels` in the constructed format)
    /// and thread `capture` into the active loop recorder.
    fn process(
        &mut self,
        capture: Option<AudioCapture<'_>>,
        playback: &mut [u8],
        channels: usize,
        frames: usize,
    );
}

struct BeepVoice {
    pattern: Option<BeepType>,
    pos: usize,
}

pub struct AudioEngine<I: Interpolate, F: FormatWriter> {
    interp: I,
    players: [Arc<Player>; 2],
    state: [Arc<DeckProcessingState>; 2],
    loops: [LoopBuffer; 2],
    active_recording_deck: Option<usize>,
    beeps: [BeepVoice; 2],
    stats: Arc<DspStats>,
    params: EngineParams,
    has_capture: bool,
    _format: PhantomData<F>,
}

impl<I: Interpolate, F: FormatWriter> AudioEngine<I, F> {
    pub fn new(
        interp: I,
        players: [Arc<Player>; 2],
        state: [Arc<DeckProcessingState>; 2],
        stats: Arc<DspStats>,
        params: EngineParams,
        has_capture: bool,
    ) -> Result<Self, TrackError> {
        let loops = [
            LoopBuffer::new(params.sample_rate, params.loop_max_seconds)?,
            LoopBuffer::new(params.sample_rate, params.loop_max_seconds)?,
        ];
        Ok(Self {
            interp,
            players,
            state,
            loops,
            active_recording_deck: None,
            beeps: [
                BeepVoice { pattern: None, pos: 0 },
                BeepVoice { pattern: None, pos: 0 },
            ],
            stats,
            params,
            has_capture,
            _format: PhantomData,
        })
    }

    /// The pre-allocated loop tracks, shared with the control side so loop
    /// recall never has to reach into the engine.
    pub fn loop_tracks(&self) -> [Arc<Track>; 2] {
        [
            Arc::clone(self.loops[0].peek_track()),
            Arc::clone(self.loops[1].peek_track()),
        ]
    }

    fn publish_loop_state(&self, deck: usize) {
        let lb = &self.loops[deck];
        let state = &self.state[deck];
        state.is_recording.store(lb.is_recording(), Ordering::Relaxed);
        state.has_loop.store(lb.has_loop(), Ordering::Relaxed);
        state
            .loop_length
            .store(lb.length_seconds(), Ordering::Relaxed);
    }

    fn start_beep(&mut self, deck: usize, beep: BeepType) {
        self.beeps[deck] = BeepVoice {
            pattern: Some(beep),
            pos: 0,
        };
    }

    fn try_start_recording(&mut self, deck: usize) {
        if !self.has_capture {
            self.start_beep(deck, BeepType::RecordingError);
            return;
        }
        // Only one deck records at a time
        if self.active_recording_deck.is_some_and(|a| a != deck) {
            self.start_beep(deck, BeepType::RecordingError);
            return;
        }

        if self.loops[deck].has_loop() {
            // Punch-in: sync the write head to the playback position
            let pos = self.state[deck].position.load(Ordering::Relaxed);
            self.loops[deck].set_position(pos);
        }

        if self.loops[deck].start() {
            self.active_recording_deck = Some(deck);
            self.start_beep(deck, BeepType::RecordingStart);
        } else {
            self.start_beep(deck, BeepType::RecordingError);
        }
        self.publish_loop_state(deck);
    }

    fn stop_recording(&mut self, deck: usize) {
        if !self.loops[deck].is_recording() {
            return;
        }
        let was_first = !self.loops[deck].has_loop();
        self.loops[deck].stop();
        if self.active_recording_deck == Some(deck) {
            self.active_recording_deck = None;
        }
        if was_first && self.loops[deck].has_loop() {
            // The fresh loop starts playing from its beginning
            self.state[deck].position.store(0.0, Ordering::Relaxed);
            self.state[deck].position_offset.store(0.0, Ordering::Relaxed);
        }
        self.start_beep(deck, BeepType::RecordingStop);
        self.publish_loop_state(deck);
    }

    /// Consume the one-shot requests for both decks.
    fn apply_control(&mut self) {
        for deck in 0..2 {
            let player = Arc::clone(&self.players[deck]);
            let input = &player.input;

            if let Some(seek) = input.take_seek() {
                let state = &self.state[deck];
                state.position.store(seek, Ordering::Relaxed);
                state
                    .position_offset
                    .store(input.position_offset.load(Ordering::Relaxed), Ordering::Relaxed);
            }

            if crate::engine::DeckInput::take_flag(&input.loop_reset) {
                if self.active_recording_deck == Some(deck) {
                    self.active_recording_deck = None;
                }
                self.loops[deck].reset();
                self.publish_loop_state(deck);
            }

            if crate::engine::DeckInput::take_flag(&input.record_start) {
                self.try_start_recording(deck);
            }

            if crate::engine::DeckInput::take_flag(&input.record_stop) {
                self.stop_recording(deck);
            }

            if let Some(beep) = input.take_beep() {
                self.start_beep(deck, beep);
            }
        }
    }

    /// Derive target volume and smoothed pitch for one deck, advancing the
    /// motor, slipmat and fader models by one period.
    fn setup_player(&self, deck: usize, frames: usize, track_seconds: f64) -> (f64, f64) {
        let input = &self.players[deck].input;
        let state = &self.state[deck];

        // External pitch (MIDI note/bend/fader) transposes directly
        let external_speed = input.external_pitch();
        let external_changed =
            (external_speed - state.last_external_speed.load(Ordering::Relaxed)).abs() > 0.01;
        state
            .last_external_speed
            .store(external_speed, Ordering::Relaxed);

        let stopped = input.stopped.load(Ordering::Relaxed);
        let touched = input.touched.load(Ordering::Relaxed);
        let just_play = input.just_play.load(Ordering::Relaxed);
        let touched_prev = state.touched_prev.load(Ordering::Relaxed);

        // Motor model
        let mut motor = state.motor_speed.load(Ordering::Relaxed);
        if stopped {
            if motor > 0.1 {
                motor -= frames as f64 / (self.params.brake_speed * 10.0);
            } else {
                motor = 0.0;
            }
        } else {
            motor = external_speed;
        }
        state.motor_speed.store(motor, Ordering::Relaxed);

        let target_pitch;
        // Keep the second condition off the first touched period so
        // backspins release cleanly
        if just_play || (!touched && !touched_prev) {
            // Platter released: slipmat toward motor speed
            let pitch = state
                .pitch
                .load(Ordering::Relaxed)
                .clamp(-SLIPMAT_PITCH_LIMIT, SLIPMAT_PITCH_LIMIT);
            state.pitch.store(pitch, Ordering::Relaxed);

            let slip = frames as f64 / self.params.slippiness;
            if pitch < motor - 0.1 {
                target_pitch = pitch + slip;
            } else if pitch > motor + 0.1 {
                target_pitch = pitch - slip;
            } else {
                target_pitch = motor;
            }
        } else {
            // Platter touched: chase the platter-derived position
            let mut diff =
                state.position.load(Ordering::Relaxed) - input.target_position.load(Ordering::Relaxed);

            // Shortest signed path when the track has wrapped
            if track_seconds > 0.0 {
                let half = track_seconds / 2.0;
                if diff > half {
                    diff -= track_seconds;
                } else if diff < -half {
                    diff += track_seconds;
                }
            }

            target_pitch = (-diff * 40.0).clamp(-MAX_SCRATCH_PITCH, MAX_SCRATCH_PITCH);
        }
        state.touched_prev.store(touched, Ordering::Relaxed);

        let filtered_pitch = if external_changed && !touched {
            // Instant response for MIDI note/bend changes
            state.pitch.store(external_speed, Ordering::Relaxed);
            external_speed
        } else {
            0.1 * target_pitch + 0.9 * state.pitch.load(Ordering::Relaxed)
        };

        // Crossfader glide
        let decay = frames as f64 / (FADER_DECAY_TIME * self.params.sample_rate as f64);
        let fader_target = input.crossfader.load(Ordering::Relaxed);
        let mut fader = state.fader_current.load(Ordering::Relaxed);
        if (fader_target - fader).abs() < decay {
            fader = fader_target;
        } else if fader_target > fader {
            fader += decay;
        } else {
            fader -= decay;
        }
        state.fader_current.store(fader, Ordering::Relaxed);

        let target_volume = (state.pitch.load(Ordering::Relaxed).abs()
            * BASE_VOLUME
            * fader
            * input.volume_knob.load(Ordering::Relaxed))
        .min(self.params.max_volume);

        (target_volume, filtered_pitch)
    }

    fn process_players(
        &mut self,
        capture: Option<AudioCapture<'_>>,
        playback: &mut [u8],
        channels: usize,
        frames: usize,
    ) {
        let bps = F::BYTES_PER_SAMPLE;
        let frame_size = bps * channels;
        let out = &mut playback[..frames * frame_size];

        let p1 = Arc::clone(&self.players[0]);
        let p2 = Arc::clone(&self.players[1]);

        let use_loop_1 = p1.input.source() == PlaybackSource::Loop && self.loops[0].has_loop();
        let use_loop_2 = p2.input.source() == PlaybackSource::Loop && self.loops[1].has_loop();
        let active_1 = if use_loop_1 { PlaybackSource::Loop } else { PlaybackSource::File };
        let active_2 = if use_loop_2 { PlaybackSource::Loop } else { PlaybackSource::File };
        self.state[0].source.store(active_1 as u8, Ordering::Relaxed);
        self.state[1].source.store(active_2 as u8, Ordering::Relaxed);

        let g1 = p1.try_lock_track();
        let g2 = p2.try_lock_track();

        if let (Some(g1), Some(g2)) = (g1, g2) {
            let tr1: &Track = if use_loop_1 {
                self.loops[0].peek_track().as_ref()
            } else {
                &g1
            };
            let tr2: &Track = if use_loop_2 {
                self.loops[1].peek_track().as_ref()
            } else {
                &g2
            };

            let len1 = tr1.length();
            let len2 = tr2.length();
            let rate1 = tr1.rate() as f64;
            let rate2 = tr2.rate() as f64;
            let secs1 = if len1 > 0 && rate1 > 0.0 { len1 as f64 / rate1 } else { 0.0 };
            let secs2 = if len2 > 0 && rate2 > 0.0 { len2 as f64 / rate2 } else { 0.0 };

            let (mut target_volume_1, filtered_pitch_1) = self.setup_player(0, frames, secs1);
            let (mut target_volume_2, filtered_pitch_2) = self.setup_player(1, frames, secs2);

            // A fresh recording without a loop yet plays nothing of its own
            let rec_1 = self.state[0].is_recording.load(Ordering::Relaxed);
            let rec_2 = self.state[1].is_recording.load(Ordering::Relaxed);
            if rec_1 && !self.loops[0].has_loop() {
                target_volume_1 = 0.0;
            }
            if rec_2 && !self.loops[1].has_loop() {
                target_volume_2 = 0.0;
            }

            let dt_rate_1 = p1.sample_dt * rate1;
            let dt_rate_2 = p2.sample_dt * rate2;

            let pos_1 = self.state[0].position.load(Ordering::Relaxed);
            let off_1 = self.state[0].position_offset.load(Ordering::Relaxed);
            let pos_2 = self.state[1].position.load(Ordering::Relaxed);
            let off_2 = self.state[1].position_offset.load(Ordering::Relaxed);

            let mut sample_1 = (pos_1 - off_1) * rate1;
            let mut sample_2 = (pos_2 - off_2) * rate2;

            // Wrap once per buffer; the per-sample wrap below only fires
            // on boundary crossings. Positions ahead of the track start
            // stay negative: they are lead-in silence (preseeded decks),
            // not a wrap onto the tail.
            if len1 > 0 && sample_1 >= 0.0 {
                sample_1 = sample_1.rem_euclid(len1 as f64);
            }
            if len2 > 0 && sample_2 >= 0.0 {
                sample_2 = sample_2.rem_euclid(len2 as f64);
            }

            let one_over_frames = 1.0 / frames as f32;

            let mut pitch_1 = self.state[0].pitch.load(Ordering::Relaxed) as f32;
            let mut pitch_2 = self.state[1].pitch.load(Ordering::Relaxed) as f32;
            let mut vol_1 = self.state[0].volume.load(Ordering::Relaxed) as f32;
            let mut vol_2 = self.state[1].volume.load(Ordering::Relaxed) as f32;

            let volume_gradient_1 = (target_volume_1 as f32 - vol_1) * one_over_frames;
            let volume_gradient_2 = (target_volume_2 as f32 - vol_2) * one_over_frames;
            let pitch_gradient_1 = (filtered_pitch_1 as f32 - pitch_1) * one_over_frames;
            let pitch_gradient_2 = (filtered_pitch_2 as f32 - pitch_2) * one_over_frames;

            for s in 0..frames {
                let step_1 = dt_rate_1 * pitch_1 as f64;
                let step_2 = dt_rate_2 * pitch_2 as f64;

                // A deck still in its lead-in reads as an empty track
                let samples = self.interp.interpolate_pair(
                    DeckTap {
                        track: tr1,
                        sample_pos: sample_1,
                        len: if sample_1 < 0.0 { 0 } else { len1 },
                        abs_pitch: pitch_1.abs(),
                    },
                    DeckTap {
                        track: tr2,
                        sample_pos: sample_2,
                        len: if sample_2 < 0.0 { 0 } else { len2 },
                        abs_pitch: pitch_2.abs(),
                    },
                );

                let sum_l = (samples.l1 * vol_1 + samples.l2 * vol_2) * INT16_SCALE;
                let sum_r = (samples.r1 * vol_1 + samples.r2 * vol_2) * INT16_SCALE;

                let off = s * frame_size;
                F::write(&mut out[off..off + bps], sum_l);
                F::write(&mut out[off + bps..off + 2 * bps], sum_r);
                for ch in 2..channels {
                    F::write(&mut out[off + ch * bps..off + (ch + 1) * bps], 0.0);
                }

                sample_1 += step_1;
                sample_2 += step_2;

                // Boundary crossing: modulo handles high pitch on short
                // loops. Going below zero wraps only under backwards
                // motion; forward motion from a lead-in crosses into the
                // track at its real start.
                if len1 > 0
                    && (sample_1 >= len1 as f64 || (sample_1 < 0.0 && step_1 < 0.0))
                {
                    sample_1 = sample_1.rem_euclid(len1 as f64);
                }
                if len2 > 0
                    && (sample_2 >= len2 as f64 || (sample_2 < 0.0 && step_2 < 0.0))
                {
                    sample_2 = sample_2.rem_euclid(len2 as f64);
                }

                vol_1 += volume_gradient_1;
                vol_2 += volume_gradient_2;
                pitch_1 += pitch_gradient_1;
                pitch_2 += pitch_gradient_2;
            }

            let advance_1 = if rate1 > 0.0 { sample_1 / rate1 - (pos_1 - off_1) } else { 0.0 };
            let advance_2 = if rate2 > 0.0 { sample_2 / rate2 - (pos_2 - off_2) } else { 0.0 };

            self.state[0].pitch.store(filtered_pitch_1, Ordering::Relaxed);
            self.state[1].pitch.store(filtered_pitch_2, Ordering::Relaxed);
            self.state[0]
                .position
                .store(pos_1 + advance_1, Ordering::Relaxed);
            self.state[1]
                .position
                .store(pos_2 + advance_2, Ordering::Relaxed);
            self.state[0].volume.store(target_volume_1, Ordering::Relaxed);
            self.state[1].volume.store(target_volume_2, Ordering::Relaxed);
        } else {
            // Lost the race against a track swap: silence for this period
            out.fill(0);
        }

        self.process_capture(capture, out, channels, frames);
        self.render_beeps(out, channels, frames);
    }

    /// Thread the capture input into the active loop recorder and mix live
    /// monitoring into the output.
    fn process_capture(
        &mut self,
        capture: Option<AudioCapture<'_>>,
        out: &mut [u8],
        channels: usize,
        frames: usize,
    ) {
        let Some(deck) = self.active_recording_deck else {
            return;
        };
        // A missing capture buffer writes nothing: punch-in content stays
        // intact and fresh recordings do not pick up zeros.
        let Some(cap) = capture else {
            return;
        };

        let bps = F::BYTES_PER_SAMPLE;
        let frame_size = bps * channels;

        // Monitor at the recording deck's current fader volume
        let monitor = (self.state[deck].fader_current.load(Ordering::Relaxed)
            * self.players[deck].input.volume_knob.load(Ordering::Relaxed))
            as f32;

        for i in 0..frames {
            let cap_l =
                read_capture_sample(cap.buffer, cap.format, i, cap.left_channel, cap.channels);
            let cap_r =
                read_capture_sample(cap.buffer, cap.format, i, cap.right_channel, cap.channels);

            let l = (cap_l * 32768.0).clamp(-32768.0, 32767.0) as i16;
            let r = (cap_r * 32768.0).clamp(-32768.0, 32767.0) as i16;
            self.loops[deck].write_frame(l, r);

            if monitor > 0.0 {
                let off = i * frame_size;
                let out_l = F::read(&out[off..off + bps]) + cap_l * monitor;
                let out_r = F::read(&out[off + bps..off + 2 * bps]) + cap_r * monitor;
                F::write(&mut out[off..off + bps], out_l);
                F::write(&mut out[off + bps..off + 2 * bps], out_r);
            }
        }

        // Track length grows while a fresh take runs
        self.publish_loop_state(deck);
    }

    fn render_beeps(&mut self, out: &mut [u8], channels: usize, frames: usize) {
        let bps = F::BYTES_PER_SAMPLE;
        let frame_size = bps * channels;
        let rate = self.params.sample_rate as f64;

        for voice in &mut self.beeps {
            let Some(pattern) = voice.pattern else {
                continue;
            };
            let chars = BEEPS[pattern as usize].as_bytes();

            for i in 0..frames {
                let idx = voice.pos / BEEP_CHAR_SAMPLES;
                if idx >= chars.len() {
                    voice.pattern = None;
                    voice.pos = 0;
                    break;
                }
                let freq = match chars[idx] {
                    b'-' => 440.0,
                    b'_' => 220.0,
                    _ => 0.0,
                };
                if freq > 0.0 {
                    let phase = voice.pos as f64 / (rate / freq);
                    let v = (phase * std::f64::consts::TAU).sin() as f32 * BEEP_AMPLITUDE;
                    let off = i * frame_size;
                    let l = F::read(&out[off..off + bps]) + v;
                    let r = F::read(&out[off + bps..off + 2 * bps]) + v;
                    F::write(&mut out[off..off + bps], l);
                    F::write(&mut out[off + bps..off + 2 * bps], r);
                }
                voice.pos += 1;
            }
        }
    }
}

impl<I: Interpolate, F: FormatWriter> EngineCore for AudioEngine<I, F> {
    fn process(
        &mut self,
        capture: Option<AudioCapture<'_>>,
        playback: &mut [u8],
        channels: usize,
        frames: usize,
    ) {
        let start = Instant::now();

        self.apply_control();
        self.process_players(capture, playback, channels, frames);

        let process_time_us = start.elapsed().as_secs_f64() * 1e6;
        let budget_time_us = frames as f64 / self.params.sample_rate as f64 * 1e6;
        self.stats.update(process_time_us, budget_time_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{CubicInterpolation, FormatF32};
    use crate::engine::DeckInput;

    const RATE: u32 = 48_000;
    const FRAMES: usize = 256;

    fn params() -> EngineParams {
        EngineParams {
            sample_rate: RATE,
            slippiness: 200.0,
            brake_speed: 3000.0,
            max_volume: 1.0,
            loop_max_seconds: 4,
        }
    }

    struct Bench {
        engine: AudioEngine<CubicInterpolation, FormatF32>,
        players: [Arc<Player>; 2],
        state: [Arc<DeckProcessingState>; 2],
        out: Vec<u8>,
    }

    fn sine_track(seconds: f64, freq: f64, amplitude: f64) -> Arc<Track> {
        let n = (seconds * RATE as f64) as usize;
        let t = Track::acquire_for_recording(RATE, n).unwrap();
        for s in 0..n {
            let v = ((s as f64 / RATE as f64) * freq * std::f64::consts::TAU).sin() * amplitude;
            let v = (v * 32767.0) as i16;
            t.write_sample(s, v, v);
        }
        t.set_length(n);
        t
    }

    fn bench(track0: Arc<Track>, track1: Arc<Track>, has_capture: bool) -> Bench {
        let players = [
            Arc::new(Player::new(RATE, track0, 1.0)),
            Arc::new(Player::new(RATE, track1, 1.0)),
        ];
        let state = [
            Arc::new(DeckProcessingState::new()),
            Arc::new(DeckProcessingState::new()),
        ];
        let engine = AudioEngine::new(
            CubicInterpolation,
            [Arc::clone(&players[0]), Arc::clone(&players[1])],
            [Arc::clone(&state[0]), Arc::clone(&state[1])],
            Arc::new(DspStats::new()),
            params(),
            has_capture,
        )
        .unwrap();
        Bench {
            engine,
            players,
            state,
            out: vec![0u8; FRAMES * 2 * 4],
        }
    }

    fn run_periods(b: &mut Bench, periods: usize) {
        for _ in 0..periods {
            b.engine.process(None, &mut b.out, 2, FRAMES);
        }
    }

    fn run_periods_with_capture(b: &mut Bench, periods: usize, level: f32) {
        let mut cap = Vec::with_capacity(FRAMES * 2 * 4);
        for _ in 0..FRAMES * 2 {
            cap.extend_from_slice(&level.to_le_bytes());
        }
        for _ in 0..periods {
            let capture = AudioCapture {
                buffer: &cap,
                format: SampleFormat::F32,
                channels: 2,
                left_channel: 0,
                right_channel: 1,
            };
            b.engine.process(Some(capture), &mut b.out, 2, FRAMES);
        }
    }

    fn out_frames(b: &Bench) -> Vec<(f32, f32)> {
        b.out
            .chunks_exact(8)
            .map(|f| {
                (
                    f32::from_le_bytes([f[0], f[1], f[2], f[3]]),
                    f32::from_le_bytes([f[4], f[5], f[6], f[7]]),
                )
            })
            .collect()
    }

    #[test]
    fn constant_playback_reaches_one_second() {
        let mut b = bench(sine_track(1.5, 1000.0, 0.5), Track::acquire_empty(RATE), false);
        let input = &b.players[0].input;
        input.just_play.store(true, Ordering::Relaxed);
        input.crossfader.store(1.0, Ordering::Relaxed);

        let periods = RATE as usize / FRAMES; // one second
        let mut tail_energy = 0.0f64;
        let mut tail_count = 0usize;
        for p in 0..periods {
            b.engine.process(None, &mut b.out, 2, FRAMES);
            if p >= periods / 2 {
                for (l, _) in out_frames(&b) {
                    tail_energy += (l as f64) * (l as f64);
                    tail_count += 1;
                }
            }
        }

        let snap = b.state[0].snapshot();
        // Pitch spins up from zero over the first few periods, so the
        // travelled distance lands just below one second
        assert!(snap.position > 0.85 && snap.position <= 1.01, "{}", snap.position);
        assert!((snap.pitch - 1.0).abs() < 0.01, "{}", snap.pitch);

        // Output RMS of the steady tail ~ amplitude * BASE_VOLUME / sqrt(2)
        let rms = (tail_energy / tail_count as f64).sqrt();
        let expected = 0.5 * BASE_VOLUME / std::f64::consts::SQRT_2;
        assert!((rms - expected).abs() < 0.05, "rms {rms} expected {expected}");

        // No sample beyond full scale
        assert!(out_frames(&b).iter().all(|(l, r)| l.abs() <= 1.0 && r.abs() <= 1.0));
    }

    #[test]
    fn seek_applies_within_one_period() {
        let mut b = bench(sine_track(2.0, 440.0, 0.5), Track::acquire_empty(RATE), false);
        // Hold the platter at the seek target so pitch stays at zero
        let input = &b.players[0].input;
        input.touched.store(true, Ordering::Relaxed);
        input.target_position.store(1.25, Ordering::Relaxed);
        input.request_seek(1.25);
        run_periods(&mut b, 1);
        let pos = b.state[0].snapshot().position;
        assert!((pos - 1.25).abs() < 1.0 / RATE as f64 + 1e-9, "{pos}");
    }

    #[test]
    fn scratch_chase_saturates_and_returns() {
        let mut b = bench(Track::acquire_empty(RATE), sine_track(2.0, 440.0, 0.5), false);
        let input = &b.players[1].input;
        input.touched.store(true, Ordering::Relaxed);
        input.crossfader.store(1.0, Ordering::Relaxed);

        // Triangle: 0 -> 0.25 -> 0 over two seconds
        let periods = 2 * RATE as usize / FRAMES;
        let mut max_pitch = 0.0f64;
        let mut min_pitch = 0.0f64;
        for p in 0..periods {
            let phase = p as f64 / periods as f64;
            let target = if phase < 0.5 {
                0.25 * (phase * 2.0)
            } else {
                0.25 * (2.0 - phase * 2.0)
            };
            input.target_position.store(target, Ordering::Relaxed);
            b.engine.process(None, &mut b.out, 2, FRAMES);
            let pitch = b.state[1].snapshot().pitch;
            max_pitch = max_pitch.max(pitch);
            min_pitch = min_pitch.min(pitch);
            for (l, r) in out_frames(&b) {
                assert!(l.abs() <= 1.0 && r.abs() <= 1.0);
            }
        }

        let snap = b.state[1].snapshot();
        assert!(snap.position.abs() < 0.05, "final position {}", snap.position);
        assert!(max_pitch <= MAX_SCRATCH_PITCH + 0.01);
        assert!(min_pitch >= -MAX_SCRATCH_PITCH - 0.01);
    }

    #[test]
    fn preseeded_negative_position_advances_through_zero() {
        let mut b = bench(sine_track(1.5, 1000.0, 0.5), Track::acquire_empty(RATE), false);
        let input = &b.players[0].input;
        input.just_play.store(true, Ordering::Relaxed);
        input.crossfader.store(1.0, Ordering::Relaxed);

        // Start before the track, as the emergency-sample path does
        b.state[0].position.store(-0.6, Ordering::Relaxed);
        b.state[0].position_offset.store(0.0, Ordering::Relaxed);

        // After half a second the deck is still ahead of the start and
        // has produced nothing but silence
        let half_second = RATE as usize / FRAMES / 2;
        let mut silent = true;
        for _ in 0..half_second {
            b.engine.process(None, &mut b.out, 2, FRAMES);
            silent &= out_frames(&b).iter().all(|(l, r)| *l == 0.0 && *r == 0.0);
        }
        let mid = b.state[0].snapshot().position;
        assert!(mid < 0.0, "started early: {mid}");
        assert!(silent, "lead-in produced audio");

        // Another half second carries it past zero at motor speed
        run_periods(&mut b, half_second);
        let end = b.state[0].snapshot().position;
        assert!(end > 0.25 && end < 0.45, "{end}");
    }

    #[test]
    fn loop_source_without_loop_falls_back_to_file() {
        let mut b = bench(sine_track(0.5, 440.0, 0.5), Track::acquire_empty(RATE), false);
        let input = &b.players[0].input;
        input.set_source(PlaybackSource::Loop);
        input.just_play.store(true, Ordering::Relaxed);
        run_periods(&mut b, 4);
        assert_eq!(b.state[0].snapshot().source, PlaybackSource::File);
    }

    #[test]
    fn fresh_recording_defines_loop() {
        let mut b = bench(Track::acquire_empty(RATE), Track::acquire_empty(RATE), true);
        b.players[0].input.record_start.store(true, Ordering::Release);

        let periods = 2 * RATE as usize / FRAMES; // two seconds
        run_periods_with_capture(&mut b, periods, 0.25);
        assert!(b.state[0].snapshot().is_recording);

        b.players[0].input.record_stop.store(true, Ordering::Release);
        run_periods(&mut b, 1);

        let snap = b.state[0].snapshot();
        assert!(!snap.is_recording);
        assert!(snap.has_loop);

        let expected = periods * FRAMES;
        let tracks = b.engine.loop_tracks();
        let track = &tracks[0];
        assert_eq!(track.length(), expected);
        assert!((snap.loop_length - expected as f64 / RATE as f64).abs() < 1e-9);

        // Recorded content matches the capture level
        let (l, _) = track.get_sample(1000);
        assert!((l as f32 / 32768.0 - 0.25).abs() < 1e-3);
    }

    #[test]
    fn punch_in_overwrites_without_extending() {
        let mut b = bench(Track::acquire_empty(RATE), Track::acquire_empty(RATE), true);

        // Record two seconds at level 0.25
        b.players[0].input.record_start.store(true, Ordering::Release);
        let two_seconds = 2 * RATE as usize / FRAMES;
        run_periods_with_capture(&mut b, two_seconds, 0.25);
        b.players[0].input.record_stop.store(true, Ordering::Release);
        run_periods(&mut b, 1);

        // Punch in at 1.0s with silence for 0.5s
        b.players[0].input.request_seek(1.0);
        b.players[0].input.record_start.store(true, Ordering::Release);
        let half_second = RATE as usize / FRAMES / 2;
        run_periods_with_capture(&mut b, half_second, 0.0);
        b.players[0].input.record_stop.store(true, Ordering::Release);
        run_periods(&mut b, 1);

        let tracks = b.engine.loop_tracks();
        let track = &tracks[0];
        let rate = RATE as usize;
        assert_eq!(track.length(), two_seconds * FRAMES);

        let level = |s: usize| track.get_sample(s).0;
        // Before the punch region: original take
        assert!((level(rate / 2) as f32 / 32768.0 - 0.25).abs() < 1e-3);
        // Punch region: silence
        assert_eq!(level(rate + rate / 4), 0);
        // After the punch region: original take
        assert!((level(rate + (3 * rate) / 4) as f32 / 32768.0 - 0.25).abs() < 1e-3);
    }

    #[test]
    fn second_deck_record_request_is_rejected() {
        let mut b = bench(Track::acquire_empty(RATE), Track::acquire_empty(RATE), true);
        b.players[0].input.record_start.store(true, Ordering::Release);
        run_periods_with_capture(&mut b, 2, 0.1);
        assert!(b.state[0].snapshot().is_recording);

        b.players[1].input.record_start.store(true, Ordering::Release);
        run_periods_with_capture(&mut b, 2, 0.1);
        assert!(!b.state[1].snapshot().is_recording);
        assert!(b.state[0].snapshot().is_recording);
    }

    #[test]
    fn recording_without_capture_fails() {
        let mut b = bench(Track::acquire_empty(RATE), Track::acquire_empty(RATE), false);
        b.players[0].input.record_start.store(true, Ordering::Release);
        run_periods(&mut b, 1);
        assert!(!b.state[0].snapshot().is_recording);
        // Error beep fires
        assert!(b.engine.beeps[0].pattern == Some(BeepType::RecordingError));
    }

    #[test]
    fn take_flag_clears_requests() {
        let input = DeckInput::new();
        input.record_start.store(true, Ordering::Release);
        assert!(DeckInput::take_flag(&input.record_start));
        assert!(!DeckInput::take_flag(&input.record_start));
    }
}
