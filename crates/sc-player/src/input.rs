//! The input thread: GPIO debounce, PIC ADC/button handling, rotary
//! sensor filtering and MIDI dispatch.
//!
//! Runs at roughly 1 kHz (paced by `update_rate`). Everything the thread
//! derives lands in the decks' `DeckInput` atomics; the audio engine picks
//! the values up at its next period boundary.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sc_core::audio::EngineHandle;
use sc_core::config::Settings;
use sc_core::control::{
    dispatch_event, ActionType, DispatchContext, EventType, InputState, Mapping, MappingRegistry,
    MappingSource,
};
use sc_core::platform::{PicReadings, PlatformInputs};
use sc_core::player::Deck;
use sc_midi::{MidiCommand, MidiSystem};

/// What a button's debounce machine decided this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonPhase {
    Pressed,
    Released,
    Held,
}

/// PIC front-button scanning phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PicButtonPhase {
    Idle,
    Pressing,
    ActingInstant,
    ActingHeld,
    Waiting,
}

pub struct InputContext {
    platform: Box<dyn PlatformInputs>,
    registry: MappingRegistry,
    gpio_indices: Vec<usize>,
    /// Pins parked by the expander/SoC overlap workaround
    disabled_mappings: HashSet<usize>,
    decks: [Arc<Mutex<Deck>>; 2],
    engine: EngineHandle,
    settings: Arc<Settings>,
    state: InputState,
    midi: MidiSystem,
    show_stats: bool,
    disable_volume_adc: bool,
    disable_pic_buttons: bool,

    picskip: u8,
    pic: PicReadings,
    fader_open: [bool; 2],
    button_phase: PicButtonPhase,
    button_counter: i32,
    total_buttons: [bool; 4],
    num_blips: u32,
    old_pitch_mode: i32,
    last_fallback_time: Option<Instant>,
    last_stat: Instant,
    frame_count: u32,
    seconds_up: u32,
}

impl InputContext {
    pub fn new(
        platform: Box<dyn PlatformInputs>,
        registry: MappingRegistry,
        decks: [Arc<Mutex<Deck>>; 2],
        engine: EngineHandle,
        settings: Arc<Settings>,
        show_stats: bool,
    ) -> Self {
        let gpio_indices = registry.gpio_indices();
        let mut ctx = Self {
            platform,
            registry,
            gpio_indices,
            disabled_mappings: HashSet::new(),
            decks,
            engine,
            state: InputState {
                shifted: false,
                pitch_mode: 0,
                jog_reverse: settings.jog_reverse,
            },
            midi: MidiSystem::new(),
            show_stats,
            disable_volume_adc: settings.disable_volume_adc,
            disable_pic_buttons: settings.disable_pic_buttons,
            settings,
            picskip: 0,
            pic: PicReadings::neutral(),
            fader_open: [true; 2],
            button_phase: PicButtonPhase::Idle,
            button_counter: 0,
            total_buttons: [false; 4],
            num_blips: 0,
            old_pitch_mode: 0,
            last_fallback_time: None,
            last_stat: Instant::now(),
            frame_count: 0,
            seconds_up: 0,
        };
        ctx.init_io();
        ctx
    }

    /// Configure pin directions and pullups from the mappings.
    fn init_io(&mut self) {
        if self.platform.expander_present() {
            for pin in 0..16u8 {
                let mapping = self
                    .registry
                    .find_gpio(0, pin, EventType::ButtonPressed)
                    .map(|i| *self.registry.get(i));
                // Ground pins are driven low as outputs
                let output = mapping.is_some_and(|m| m.action == ActionType::Gnd);
                let pullup = mapping.map_or(true, |m| match m.source {
                    MappingSource::Gpio { pullup, .. } => pullup,
                    _ => true,
                });
                self.platform.configure_expander_pin(pin, output, pullup);
            }
        }

        if self.platform.soc_gpio_present() {
            for port in 1..=6u8 {
                for pin in 0..28u8 {
                    let Some(idx) = self.registry.find_gpio(port, pin, EventType::ButtonPressed)
                    else {
                        continue;
                    };
                    // J7's SCL/SDA pins carry the expander bus when it is
                    // fitted; park those mappings
                    if self.platform.expander_present() && port == 1 && (pin == 15 || pin == 16) {
                        self.disabled_mappings.insert(idx);
                        continue;
                    }
                    let pullup = match self.registry.get(idx).source {
                        MappingSource::Gpio { pullup, .. } => pullup,
                        _ => true,
                    };
                    self.platform.configure_soc_pin(port, pin, pullup);
                }
            }

            if self.platform.sc500_strap() {
                log::info!("SC500 detected");
                self.disable_volume_adc = true;
                self.disable_pic_buttons = true;
            }
        }
    }

    /// Loop forever until `stop` flips; paced by `update_rate`.
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        let pace = Duration::from_micros(self.settings.update_rate as u64);
        while !stop.load(Ordering::Relaxed) {
            self.step();
            std::thread::sleep(pace);
        }
        log::info!("input thread stopped");
    }

    /// One input iteration.
    pub fn step(&mut self) {
        self.frame_count += 1;

        if self.last_stat.elapsed() >= Duration::from_secs(1) {
            self.last_stat = Instant::now();
            if self.show_stats {
                self.print_stats();
            }
            self.frame_count = 0;

            // Give USB controllers a moment to enumerate, then keep
            // picking up hot-plugged devices
            if self.seconds_up < self.settings.midi_init_delay {
                self.seconds_up += 1;
            } else {
                self.midi.scan();
            }
        }

        if self.platform.pic_present() {
            self.picskip += 1;
            if self.picskip > 4 {
                self.picskip = 0;
                self.process_pic();
            }
            self.process_rot();
        } else {
            self.fallback_inputs();
        }

        self.process_io();
        self.drain_midi();
    }

    fn print_stats(&self) {
        let dsp = self.engine.stats();
        let scratch = self.engine.deck_state(1);
        let deck = self.decks[1].lock().unwrap();
        log::info!(
            "fps {:5} adc {:?} | dsp {:5.1}% (peak {:5.1}%, {:4.0}us/{:4.0}us, xruns {}) | \
             enc {:04} cap {} | target {:8.3} pos {:8.3} | vol {:.2}/{:.2}",
            self.frame_count,
            self.pic.adc,
            dsp.load_percent,
            dsp.load_peak,
            dsp.process_time_us,
            dsp.budget_time_us,
            dsp.xruns,
            deck.encoder.angle,
            self.pic.cap_touched,
            deck.player.input.target_position.load(Ordering::Relaxed),
            scratch.position,
            self.engine.volume(0),
            self.engine.volume(1),
        );
        for connection in self.midi.connections() {
            log::info!("midi: {}", connection.port_name());
        }
    }

    fn dispatch(&mut self, mapping: &Mapping, command: Option<&MidiCommand>) {
        let Self {
            decks,
            engine,
            settings,
            state,
            ..
        } = self;
        let mut deck0 = decks[0].lock().unwrap();
        let mut deck1 = decks[1].lock().unwrap();
        let mut ctx = DispatchContext {
            decks: [&mut deck0, &mut deck1],
            engine: &*engine,
            settings: &**settings,
            state,
        };
        dispatch_event(mapping, command, &mut ctx);
    }

    /// Debounce every GPIO mapping against the current pin states.
    fn process_io(&mut self) {
        let expander = self.platform.expander_present();
        let soc = self.platform.soc_gpio_present();
        if !expander && !soc {
            return;
        }

        let mcp_pins = if expander {
            self.platform.read_expander_bulk()
        } else {
            0
        };

        let debounce_time = self.settings.debounce_time;
        let hold_time = self.settings.hold_time;

        for slot in 0..self.gpio_indices.len() {
            let idx = self.gpio_indices[slot];
            if self.disabled_mappings.contains(&idx) {
                continue;
            }
            let mapping = *self.registry.get(idx);
            let MappingSource::Gpio { port, pin, .. } = mapping.source else {
                continue;
            };
            if port == 0 && !expander {
                continue;
            }

            let pin_value = if port == 0 {
                (mcp_pins >> pin) & 1 == 1
            } else if soc {
                self.platform.read_soc_pin(port, pin)
            } else {
                false
            };

            // debounce = 0 idle; 1..debounce_time debouncing the press;
            // debounce_time..hold_time pressed; == hold_time fires hold;
            // > hold_time waiting for release; < 0 debouncing the release
            let mut phase = None;
            let mut latched_shift = self.state.shifted;
            {
                let shifted = self.state.shifted;
                let button = self.registry.button_mut(idx);
                if button.debounce == 0 {
                    if pin_value {
                        log::debug!("button {port}.{pin} pressed");
                        phase = Some(ButtonPhase::Pressed);
                        button.debounce = 1;
                        button.shifted_at_press = shifted;
                    }
                } else if button.debounce > 0 && button.debounce < debounce_time {
                    button.debounce += 1;
                } else if button.debounce >= debounce_time && button.debounce < hold_time {
                    if !pin_value {
                        log::debug!("button {port}.{pin} released");
                        phase = Some(ButtonPhase::Released);
                        button.debounce = -debounce_time;
                    } else {
                        button.debounce += 1;
                    }
                } else if button.debounce == hold_time {
                    log::debug!("button {port}.{pin} held");
                    phase = Some(ButtonPhase::Held);
                    button.debounce += 1;
                } else if button.debounce > hold_time {
                    if pin_value {
                        // Volume hold actions keep firing while pressed
                        if matches!(
                            mapping.action,
                            ActionType::VolumeUpHold | ActionType::VolumeDownHold
                        ) {
                            phase = Some(ButtonPhase::Held);
                        }
                    } else {
                        log::debug!("button {port}.{pin} released");
                        phase = Some(ButtonPhase::Released);
                        button.debounce = -debounce_time;
                    }
                } else {
                    // Negative: release debounce counts back to zero
                    button.debounce += 1;
                }
                latched_shift = button.shifted_at_press;
            }

            if let Some(phase) = phase {
                // Holds follow the shift state latched at press time
                let shifted = match phase {
                    ButtonPhase::Pressed => self.state.shifted,
                    _ => latched_shift,
                };
                if edge_fires(mapping.edge, phase, shifted) {
                    self.dispatch(&mapping, None);
                }
            }
        }
    }

    fn drain_midi(&mut self) {
        while let Some(command) = self.midi.poll() {
            let edge = if self.state.shifted {
                EventType::ButtonPressedShifted
            } else {
                EventType::ButtonPressed
            };
            if let Some(idx) = self.registry.find_midi(&command, edge) {
                let mapping = *self.registry.get(idx);
                self.dispatch(&mapping, Some(&command));
            }
        }
    }

    /// ADCs, crossfader hysteresis and the front buttons.
    fn process_pic(&mut self) {
        self.pic = self.platform.read_pic_all();
        let adc = self.pic.adc;

        if !self.disable_volume_adc {
            self.engine
                .input(0)
                .volume_knob
                .store(adc[2] as f64 / 1024.0, Ordering::Relaxed);
            self.engine
                .input(1)
                .volume_knob
                .store(adc[3] as f64 / 1024.0, Ordering::Relaxed);
        }

        // Hysteresis: the threshold depends on which side of it we are
        let cut_point_a = if self.fader_open[0] {
            self.settings.fader_close_point
        } else {
            self.settings.fader_open_point
        };
        let cut_point_b = if self.fader_open[1] {
            self.settings.fader_close_point
        } else {
            self.settings.fader_open_point
        };

        let mut crossfader = [1.0f64; 2];
        self.fader_open = [true, true];

        if (adc[0] as u32) < cut_point_a {
            if self.settings.cut_beats == 1 {
                crossfader[0] = 0.0;
            } else {
                crossfader[1] = 0.0;
            }
            self.fader_open[0] = false;
        }
        if (adc[1] as u32) < cut_point_b {
            if self.settings.cut_beats == 2 {
                crossfader[0] = 0.0;
            } else {
                crossfader[1] = 0.0;
            }
            self.fader_open[1] = false;
        }

        self.engine
            .input(0)
            .crossfader
            .store(crossfader[0], Ordering::Relaxed);
        self.engine
            .input(1)
            .crossfader
            .store(crossfader[1], Ordering::Relaxed);

        if !self.disable_pic_buttons {
            self.process_pic_buttons();
        }
    }

    /// Front button combos: instant presses navigate files, holds navigate
    /// folders, four buttons latch shift / toggle recording.
    fn process_pic_buttons(&mut self) {
        let buttons = self.pic.buttons;
        let any = buttons.iter().any(|b| *b);

        match self.button_phase {
            PicButtonPhase::Idle => {
                if any {
                    self.button_phase = PicButtonPhase::Pressing;
                }
            }
            PicButtonPhase::Pressing => {
                for (total, pressed) in self.total_buttons.iter_mut().zip(buttons) {
                    *total |= pressed;
                }
                if !any {
                    self.button_phase = PicButtonPhase::ActingInstant;
                }
                self.button_counter += 1;
                if self.button_counter > self.settings.hold_time {
                    self.button_counter = 0;
                    self.button_phase = PicButtonPhase::ActingHeld;
                }
            }
            PicButtonPhase::ActingInstant => {
                self.act_instant();
                self.button_phase = PicButtonPhase::Waiting;
            }
            PicButtonPhase::ActingHeld => {
                self.act_held();
                self.button_phase = PicButtonPhase::Waiting;
            }
            PicButtonPhase::Waiting => {
                self.button_counter += 1;
                if any {
                    self.button_counter = 0;
                }
                if self.button_counter > 20 {
                    self.button_counter = 0;
                    self.button_phase = PicButtonPhase::Idle;
                    self.total_buttons = [false; 4];
                }
            }
        }
    }

    fn act_instant(&mut self) {
        let [b0, b1, b2, b3] = self.total_buttons;
        let scratch_files = self.decks[1].lock().unwrap().nav.files_present;
        let beat_files = self.decks[0].lock().unwrap().nav.files_present;

        if self.state.pitch_mode != 0 {
            // Any button leaves pitch mode
            self.state.pitch_mode = 0;
            self.old_pitch_mode = 0;
        } else if b0 && !b1 && !b2 && !b3 && scratch_files {
            self.decks[1].lock().unwrap().prev_file(&self.engine);
        } else if !b0 && b1 && !b2 && !b3 && scratch_files {
            self.decks[1].lock().unwrap().next_file(&self.engine);
        } else if b0 && b1 && !b2 && !b3 && scratch_files {
            self.state.pitch_mode = 2;
        } else if !b0 && !b1 && b2 && !b3 && beat_files {
            self.decks[0].lock().unwrap().prev_file(&self.engine);
        } else if !b0 && !b1 && !b2 && b3 && beat_files {
            self.decks[0].lock().unwrap().next_file(&self.engine);
        } else if !b0 && !b1 && b2 && b3 && beat_files {
            self.state.pitch_mode = 1;
        } else if b0 && b1 && b2 && b3 {
            self.state.shifted = true;
        }
    }

    fn act_held(&mut self) {
        let [b0, b1, b2, b3] = self.pic.buttons;
        let scratch_files = self.decks[1].lock().unwrap().nav.files_present;
        let beat_files = self.decks[0].lock().unwrap().nav.files_present;

        if b0 && !b1 && !b2 && !b3 && scratch_files {
            self.decks[1].lock().unwrap().prev_folder();
        } else if !b0 && b1 && !b2 && !b3 && scratch_files {
            self.decks[1].lock().unwrap().next_folder();
        } else if b0 && b1 && !b2 && !b3 && scratch_files {
            self.decks[1].lock().unwrap().random_file();
        } else if !b0 && !b1 && b2 && !b3 && beat_files {
            self.decks[0].lock().unwrap().prev_folder();
        } else if !b0 && !b1 && !b2 && b3 && beat_files {
            self.decks[0].lock().unwrap().next_folder();
        } else if !b0 && !b1 && b2 && b3 && beat_files {
            self.decks[0].lock().unwrap().random_file();
        } else if b0 && b1 && b2 && b3 && scratch_files {
            self.decks[0].lock().unwrap().record(&self.engine);
        }
    }

    /// Read the rotary sensor: wrap detection, glitch filtering, and
    /// either platter position tracking or direct pitch control.
    fn process_rot(&mut self) {
        if !self.platform.encoder_present() {
            return;
        }

        let mut new_angle = self.platform.read_encoder() as i32;
        if self.state.jog_reverse {
            new_angle = 4095 - new_angle;
        }

        let mut deck = self.decks[1].lock().unwrap();
        deck.encoder.angle_raw = new_angle;

        // First reading: adopt it so there is no initial jump
        if deck.encoder.angle == 0xffff {
            deck.encoder.angle = new_angle;
        }

        // Zero crossing: -1 anti-clockwise, +1 clockwise
        let (crossed_zero, wrapped_angle) = if new_angle < 1024 && deck.encoder.angle >= 3072 {
            (1, deck.encoder.angle - 4096)
        } else if new_angle >= 3072 && deck.encoder.angle < 1024 {
            (-1, deck.encoder.angle + 4096)
        } else {
            (0, deck.encoder.angle)
        };

        // The sensor sometimes returns spurious values: ignore jumps over
        // 100 ticks unless three arrive in a row
        if (new_angle - wrapped_angle).abs() > 100 && self.num_blips < 2 {
            self.num_blips += 1;
            return;
        }
        self.num_blips = 0;
        deck.encoder.angle = new_angle;

        if self.state.pitch_mode != 0 {
            if self.old_pitch_mode == 0 {
                // Entering pitch mode: rebase and neutralize
                let target = self.pitch_mode_deck();
                self.engine
                    .input(target)
                    .pitch_note
                    .store(1.0, Ordering::Relaxed);
                deck.encoder.offset = -deck.encoder.angle;
                self.old_pitch_mode = self.state.pitch_mode;
                deck.player.input.touched.store(false, Ordering::Relaxed);
            }

            if crossed_zero > 0 {
                deck.encoder.offset += 4096;
            } else if crossed_zero < 0 {
                deck.encoder.offset -= 4096;
            }

            // Platter angle becomes a direct pitch multiplier
            let pitch = (deck.encoder.angle + deck.encoder.offset) as f64 / 16384.0 + 1.0;
            self.engine
                .input(self.pitch_mode_deck())
                .pitch_note
                .store(pitch, Ordering::Relaxed);
        } else {
            let input = &deck.player.input;

            if self.settings.platter_enabled {
                let motor_stopped = self.engine.deck_state(1).motor_speed == 0.0;
                if self.pic.cap_touched || motor_stopped {
                    // Touching edge: rebase the offset so the current
                    // angle maps to the current position
                    let touched = input.touched.load(Ordering::Relaxed);
                    let stopped = input.stopped.load(Ordering::Relaxed);
                    if !touched || (self.old_pitch_mode != 0 && !stopped) {
                        let position = self.engine.position(1);
                        deck.encoder.offset = (position * self.settings.platter_speed as f64)
                            as i32
                            - deck.encoder.angle;
                        deck.player
                            .input
                            .target_position
                            .store(position, Ordering::Relaxed);
                        deck.player.input.touched.store(true, Ordering::Relaxed);
                        log::debug!("touch");
                    }
                } else {
                    deck.player.input.touched.store(false, Ordering::Relaxed);
                }
            } else {
                deck.player.input.touched.store(true, Ordering::Relaxed);
            }

            if crossed_zero > 0 {
                deck.encoder.offset += 4096;
            } else if crossed_zero < 0 {
                deck.encoder.offset -= 4096;
            }

            // Always publish the platter-derived target position
            let target = (deck.encoder.angle + deck.encoder.offset) as f64
                / self.settings.platter_speed as f64;
            deck.player
                .input
                .target_position
                .store(target, Ordering::Relaxed);

            self.old_pitch_mode = self.state.pitch_mode;
        }

        deck.player
            .input
            .encoder_angle
            .store(deck.encoder.angle, Ordering::Relaxed);
        deck.player
            .input
            .encoder_offset
            .store(deck.encoder.offset, Ordering::Relaxed);
    }

    fn pitch_mode_deck(&self) -> usize {
        if self.state.pitch_mode == 1 {
            0
        } else {
            1
        }
    }

    /// No input processor found: keep both decks playing.
    fn fallback_inputs(&mut self) {
        let now = Instant::now();
        self.engine.input(1).touched.store(true, Ordering::Relaxed);
        self.engine
            .input(0)
            .crossfader
            .store(0.0, Ordering::Relaxed);
        self.engine
            .input(1)
            .crossfader
            .store(0.5, Ordering::Relaxed);

        if let Some(last) = self.last_fallback_time {
            // Advance the scratch target in real time
            let dt = now.duration_since(last).as_secs_f64();
            let input = self.engine.input(1);
            let target = input.target_position.load(Ordering::Relaxed) + dt;
            input.target_position.store(target, Ordering::Relaxed);
        }
        self.last_fallback_time = Some(now);
    }
}

fn edge_fires(edge: EventType, phase: ButtonPhase, shifted: bool) -> bool {
    match phase {
        ButtonPhase::Pressed => {
            if shifted {
                edge == EventType::ButtonPressedShifted
            } else {
                edge == EventType::ButtonPressed
            }
        }
        ButtonPhase::Released => edge == EventType::ButtonReleased,
        ButtonPhase::Held => {
            if shifted {
                edge == EventType::ButtonHoldingShifted
            } else {
                edge == EventType::ButtonHolding
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_core::engine::{DeckProcessingState, DspStats};
    use sc_core::loader::TrackLoader;
    use sc_core::player::Player;
    use sc_core::track::Track;
    use std::path::PathBuf;

    const RATE: u32 = 48_000;

    #[derive(Clone, Default)]
    struct MockState {
        encoder: Vec<u16>,
        encoder_at: usize,
        pic: Option<PicReadings>,
        expander: u16,
    }

    #[derive(Clone)]
    struct MockInputs(Arc<Mutex<MockState>>);

    impl PlatformInputs for MockInputs {
        fn encoder_present(&self) -> bool {
            true
        }
        fn pic_present(&self) -> bool {
            true
        }
        fn expander_present(&self) -> bool {
            true
        }
        fn read_encoder(&mut self) -> u16 {
            let mut s = self.0.lock().unwrap();
            let v = if s.encoder_at < s.encoder.len() {
                s.encoder[s.encoder_at]
            } else {
                s.encoder.last().copied().unwrap_or(0)
            };
            if s.encoder_at + 1 < s.encoder.len() {
                s.encoder_at += 1;
            }
            v
        }
        fn read_pic_all(&mut self) -> PicReadings {
            self.0.lock().unwrap().pic.unwrap_or_else(PicReadings::neutral)
        }
        fn read_expander_bulk(&mut self) -> u16 {
            self.0.lock().unwrap().expander
        }
    }

    struct Bench {
        ctx: InputContext,
        mock: Arc<Mutex<MockState>>,
        engine: EngineHandle,
    }

    fn bench(registry: MappingRegistry) -> Bench {
        let players = [
            Arc::new(Player::new(RATE, Track::acquire_empty(RATE), 1.0)),
            Arc::new(Player::new(RATE, Track::acquire_empty(RATE), 1.0)),
        ];
        let state = [
            Arc::new(DeckProcessingState::new()),
            Arc::new(DeckProcessingState::new()),
        ];
        let loops = [
            Track::acquire_for_recording(RATE, 4).unwrap(),
            Track::acquire_for_recording(RATE, 4).unwrap(),
        ];
        let engine = EngineHandle::new(
            players,
            state,
            loops,
            Arc::new(DspStats::new()),
            RATE,
            true,
        );
        let loader = TrackLoader::new(PathBuf::from("/bin/cat"), RATE);
        let decks = [
            Arc::new(Mutex::new(Deck::new(
                0,
                Arc::clone(engine.player(0)),
                loader.clone(),
            ))),
            Arc::new(Mutex::new(Deck::new(
                1,
                Arc::clone(engine.player(1)),
                loader,
            ))),
        ];

        let mock = Arc::new(Mutex::new(MockState::default()));
        let ctx = InputContext::new(
            Box::new(MockInputs(Arc::clone(&mock))),
            registry,
            [Arc::clone(&decks[0]), Arc::clone(&decks[1])],
            engine.clone(),
            Arc::new(Settings::default()),
            false,
        );
        Bench { ctx, mock, engine }
    }

    #[test]
    fn encoder_glitch_is_rejected() {
        let mut b = bench(MappingRegistry::new());
        b.mock.lock().unwrap().encoder = vec![1000, 1005, 1010, 3500, 1020, 1025];

        for _ in 0..6 {
            b.ctx.step();
            let angle = b.ctx.decks[1].lock().unwrap().encoder.angle;
            assert_ne!(angle, 3500, "glitch value accepted");
        }
        // Steady readings keep flowing after the blip
        assert_eq!(b.ctx.decks[1].lock().unwrap().encoder.angle, 1025);
    }

    #[test]
    fn sustained_jump_is_accepted_after_three_blips() {
        let mut b = bench(MappingRegistry::new());
        b.mock.lock().unwrap().encoder = vec![1000, 3500, 3500, 3500, 3500];

        for _ in 0..5 {
            b.ctx.step();
        }
        assert_eq!(b.ctx.decks[1].lock().unwrap().encoder.angle, 3500);
    }

    #[test]
    fn gpio_press_fires_once_and_release_fires_released() {
        let mut registry = MappingRegistry::new();
        registry.add(Mapping {
            source: MappingSource::Gpio {
                port: 0,
                pin: 3,
                pullup: true,
            },
            edge: EventType::ButtonPressed,
            deck_no: 0,
            action: ActionType::StartStop,
            parameter: 0,
        });
        let mut b = bench(registry);

        b.mock.lock().unwrap().expander = 1 << 3;
        for _ in 0..10 {
            b.ctx.step();
        }
        // One press toggles exactly once despite being held
        assert!(b.engine.input(0).stopped.load(Ordering::Relaxed));

        b.mock.lock().unwrap().expander = 0;
        for _ in 0..20 {
            b.ctx.step();
        }
        b.mock.lock().unwrap().expander = 1 << 3;
        for _ in 0..5 {
            b.ctx.step();
        }
        assert!(!b.engine.input(0).stopped.load(Ordering::Relaxed));
    }

    #[test]
    fn gpio_hold_fires_after_hold_time() {
        let mut registry = MappingRegistry::new();
        registry.add(Mapping {
            source: MappingSource::Gpio {
                port: 0,
                pin: 1,
                pullup: true,
            },
            edge: EventType::ButtonHolding,
            deck_no: 1,
            action: ActionType::Record,
            parameter: 0,
        });
        let mut b = bench(registry);

        b.mock.lock().unwrap().expander = 1 << 1;
        // hold_time defaults to 100 iterations
        for _ in 0..90 {
            b.ctx.step();
        }
        assert!(!b.engine.input(1).record_start.load(Ordering::Relaxed));
        for _ in 0..20 {
            b.ctx.step();
        }
        assert!(b.engine.input(1).record_start.load(Ordering::Relaxed));
    }

    #[test]
    fn crossfader_cut_closes_scratch_deck_by_default() {
        let mut b = bench(MappingRegistry::new());
        let mut pic = PicReadings::neutral();
        pic.adc[0] = 0; // side A fully closed
        pic.adc[2] = 512;
        pic.adc[3] = 256;
        b.mock.lock().unwrap().pic = Some(pic);

        for _ in 0..6 {
            b.ctx.step();
        }

        // cut_beats == 0: a closed side cuts the scratch deck
        assert_eq!(b.engine.input(1).crossfader.load(Ordering::Relaxed), 0.0);
        assert_eq!(b.engine.input(0).crossfader.load(Ordering::Relaxed), 1.0);
        // Volume knobs track the ADCs
        assert_eq!(b.engine.input(0).volume_knob.load(Ordering::Relaxed), 0.5);
        assert_eq!(b.engine.input(1).volume_knob.load(Ordering::Relaxed), 0.25);
    }

    #[test]
    fn four_button_combo_latches_shift() {
        let mut b = bench(MappingRegistry::new());
        {
            let mut deck = b.ctx.decks[1].lock().unwrap();
            deck.nav.files_present = true;
        }

        let mut pic = PicReadings::neutral();
        pic.buttons = [true; 4];
        b.mock.lock().unwrap().pic = Some(pic);
        for _ in 0..15 {
            b.ctx.step();
        }

        let mut pic = PicReadings::neutral();
        pic.buttons = [false; 4];
        b.mock.lock().unwrap().pic = Some(pic);
        for _ in 0..15 {
            b.ctx.step();
        }

        assert!(b.ctx.state.shifted);
    }

    #[test]
    fn touch_rebases_encoder_offset() {
        let mut b = bench(MappingRegistry::new());
        b.mock.lock().unwrap().encoder = vec![1000];
        let mut pic = PicReadings::neutral();
        pic.cap_touched = true;
        b.mock.lock().unwrap().pic = Some(pic);

        // Position 2.0s, platter_speed 2275: offset maps angle to position
        b.engine
            .processing_state(1)
            .position
            .store(2.0, Ordering::Relaxed);
        for _ in 0..6 {
            b.ctx.step();
        }

        assert!(b.engine.input(1).touched.load(Ordering::Relaxed));
        let target = b.engine.input(1).target_position.load(Ordering::Relaxed);
        assert!((target - 2.0).abs() < 1.0 / 2275.0 + 1e-9, "{target}");
    }
}
