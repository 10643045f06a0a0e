//! CPAL implementation of the audio hardware port.
//!
//! The output callback owns the monomorphized engine; the capture stream
//! (when the selected interface declares input channels) feeds a lock-free
//! ring that the output callback drains one period at a time. If a full
//! period of capture is not available the engine is handed no capture
//! block, which preserves loop content during punch-in.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};

use crate::config::Settings;
use crate::dsp::{InterpolationMode, SampleFormat};
use crate::engine::{
    create_engine, AudioCapture, DeckProcessingState, DspStats, EngineCore, EngineParams,
};
use crate::player::Player;

use super::config::select_interface;
use super::error::{AudioError, AudioResult};
use super::hardware::{AudioHardware, EngineHandle};

/// Largest period we pre-allocate scratch space for.
const MAX_FRAMES: usize = 8192;

struct CallbackState {
    engine: Box<dyn EngineCore>,
    capture_rx: Option<rtrb::Consumer<f32>>,
    capture_scratch: Vec<f32>,
}

pub struct CpalHardware {
    handle: EngineHandle,
    output_stream: Stream,
    input_stream: Option<Stream>,
    sample_rate: u32,
    running: bool,
}

impl CpalHardware {
    /// Select a device from the configured priority list, build the engine
    /// for its format, and wire the streams. Streams stay paused until
    /// [`AudioHardware::start`].
    pub fn open(settings: &Settings, mode: InterpolationMode) -> AudioResult<Self> {
        let host = cpal::default_host();

        let mut available = Vec::new();
        let mut devices = Vec::new();
        if let Ok(iter) = host.output_devices() {
            for device in iter {
                let name = device.name().unwrap_or_default();
                available.push(name);
                devices.push(device);
            }
        }

        let (interface, device) = match select_interface(&settings.audio_interfaces, &available) {
            Some((config, name)) => {
                log::info!("audio interface '{}' matched device {}", config.device, name);
                let idx = available.iter().position(|n| *n == name).unwrap();
                (Some(config.clone()), devices.swap_remove(idx))
            }
            None => {
                let device = host.default_output_device().ok_or(AudioError::NoDevices)?;
                log::info!(
                    "no configured interface matched, using default device {}",
                    device.name().unwrap_or_default()
                );
                (None, device)
            }
        };

        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;

        let format = match default_config.sample_format() {
            cpal::SampleFormat::F32 => SampleFormat::F32,
            cpal::SampleFormat::I16 => SampleFormat::S16,
            cpal::SampleFormat::I32 => SampleFormat::S32,
            other => return Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
        };

        let requested_rate = interface
            .as_ref()
            .and_then(|i| i.sample_rate)
            .unwrap_or(settings.sample_rate);
        let sample_rate = if default_config.sample_rate().0 == requested_rate {
            requested_rate
        } else {
            log::warn!(
                "device runs at {}Hz, not the requested {}Hz",
                default_config.sample_rate().0,
                requested_rate
            );
            default_config.sample_rate().0
        };

        let period_size = interface
            .as_ref()
            .and_then(|i| i.period_size)
            .unwrap_or(settings.period_size);

        let channels = default_config.channels() as usize;
        let stream_config = StreamConfig {
            channels: channels as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Fixed(period_size),
        };

        log::info!(
            "audio config: {} channels, {}Hz, {} frames, {} output",
            channels,
            sample_rate,
            period_size,
            format_name(format)
        );

        // Capture stream, if the interface declares input channels
        let wants_capture = interface.as_ref().map_or(false, |i| i.input_channels > 0);
        let (input_left, input_right) = interface
            .as_ref()
            .map_or((0, 1), |i| (i.input_left, i.input_right));

        let mut capture_rx = None;
        let mut input_stream = None;
        if wants_capture {
            match Self::open_capture(&host, sample_rate, input_left, input_right) {
                Ok((stream, rx)) => {
                    input_stream = Some(stream);
                    capture_rx = Some(rx);
                }
                Err(e) => {
                    // Absent capture hardware: recording requests will fail
                    // with the error beep, playback continues
                    log::warn!("no capture available: {e}");
                }
            }
        }
        let has_capture = capture_rx.is_some();

        // Engine and its shared state
        let players = [
            Arc::new(Player::new(sample_rate, crate::track::Track::acquire_empty(sample_rate), settings.initial_volume)),
            Arc::new(Player::new(sample_rate, crate::track::Track::acquire_empty(sample_rate), settings.initial_volume)),
        ];
        let state = [
            Arc::new(DeckProcessingState::new()),
            Arc::new(DeckProcessingState::new()),
        ];
        let stats = Arc::new(DspStats::new());

        let params = EngineParams {
            sample_rate,
            slippiness: settings.slippiness,
            brake_speed: settings.brake_speed,
            max_volume: settings.max_volume,
            loop_max_seconds: settings.loop_max_seconds,
        };

        let (engine, loop_tracks) = create_engine(
            mode,
            format,
            [Arc::clone(&players[0]), Arc::clone(&players[1])],
            [Arc::clone(&state[0]), Arc::clone(&state[1])],
            Arc::clone(&stats),
            params,
            has_capture,
        )?;

        let handle = EngineHandle::new(players, state, loop_tracks, stats, sample_rate, has_capture);

        let callback_state = Arc::new(Mutex::new(CallbackState {
            engine,
            capture_rx,
            capture_scratch: Vec::with_capacity(MAX_FRAMES * 2),
        }));

        let output_stream = match format {
            SampleFormat::F32 => {
                build_output_stream::<f32>(&device, &stream_config, callback_state)?
            }
            SampleFormat::S16 => {
                build_output_stream::<i16>(&device, &stream_config, callback_state)?
            }
            SampleFormat::S32 => {
                build_output_stream::<i32>(&device, &stream_config, callback_state)?
            }
            other => return Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
        };

        Ok(Self {
            handle,
            output_stream,
            input_stream,
            sample_rate,
            running: false,
        })
    }

    fn open_capture(
        host: &cpal::Host,
        sample_rate: u32,
        input_left: usize,
        input_right: usize,
    ) -> AudioResult<(Stream, rtrb::Consumer<f32>)> {
        let device = host.default_input_device().ok_or(AudioError::NoDevices)?;
        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;
        if default_config.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?}",
                default_config.sample_format()
            )));
        }

        let channels = default_config.channels() as usize;
        let stream_config = StreamConfig {
            channels: channels as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };

        // Two periods of headroom between the callbacks
        let (mut tx, rx) = rtrb::RingBuffer::<f32>::new(MAX_FRAMES * 4);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        let l = frame.get(input_left).copied().unwrap_or(0.0);
                        let r = frame.get(input_right).copied().unwrap_or(0.0);
                        // Drop on full; the output side will catch up
                        if tx.push(l).is_err() || tx.push(r).is_err() {
                            break;
                        }
                    }
                },
                |err| log::error!("capture stream error: {err}"),
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        log::info!(
            "capture open: {} channels, using {} (L) and {} (R)",
            channels,
            input_left,
            input_right
        );
        Ok((stream, rx))
    }
}

fn format_name(format: SampleFormat) -> &'static str {
    match format {
        SampleFormat::S16 => "s16",
        SampleFormat::S24Packed => "s24_3",
        SampleFormat::S24 => "s24",
        SampleFormat::S32 => "s32",
        SampleFormat::F32 => "f32",
    }
}

fn build_output_stream<T: cpal::SizedSample + bytemuck::Pod>(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<CallbackState>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut guard = state.lock().unwrap();
                let CallbackState {
                    engine,
                    capture_rx,
                    capture_scratch,
                } = &mut *guard;

                let frames = (data.len() / channels).min(MAX_FRAMES);

                // Hand over capture only when a full period is available
                let capture = match capture_rx.as_mut() {
                    Some(rx) if rx.slots() >= frames * 2 => {
                        capture_scratch.clear();
                        for _ in 0..frames * 2 {
                            capture_scratch.push(rx.pop().unwrap_or(0.0));
                        }
                        Some(AudioCapture {
                            buffer: bytemuck::cast_slice(capture_scratch.as_slice()),
                            format: SampleFormat::F32,
                            channels: 2,
                            left_channel: 0,
                            right_channel: 1,
                        })
                    }
                    _ => None,
                };

                let bytes = bytemuck::cast_slice_mut::<T, u8>(data);
                engine.process(capture, bytes, channels, frames);
            },
            |err| log::error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

impl AudioHardware for CpalHardware {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) -> AudioResult<()> {
        if let Some(input) = &self.input_stream {
            input
                .play()
                .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
        }
        self.output_stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
        self.running = true;
        log::info!("audio started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            let _ = self.output_stream.pause();
            if let Some(input) = &self.input_stream {
                let _ = input.pause();
            }
            self.running = false;
        }
    }

    fn has_capture(&self) -> bool {
        self.handle.has_capture()
    }

    fn engine(&self) -> EngineHandle {
        self.handle.clone()
    }
}
