//! Hardware input port.
//!
//! The real drivers (I2C rotary sensor, PIC input processor, MCP23017
//! expander, memory-mapped SoC GPIO) live outside the core; this trait is
//! what the input thread consumes. Absent hardware reads as neutral
//! defaults per the error-handling policy.

/// One scan of the PIC input processor.
#[derive(Debug, Clone, Copy)]
pub struct PicReadings {
    /// 10-bit ADCs: crossfader side A, side B, volume knob 0, volume knob 1
    pub adc: [u16; 4],
    pub buttons: [bool; 4],
    pub cap_touched: bool,
}

impl PicReadings {
    /// Faders open, knobs up, nothing pressed.
    pub fn neutral() -> Self {
        Self {
            adc: [1023; 4],
            buttons: [false; 4],
            cap_touched: false,
        }
    }
}

pub trait PlatformInputs: Send {
    fn encoder_present(&self) -> bool {
        false
    }

    fn pic_present(&self) -> bool {
        false
    }

    fn expander_present(&self) -> bool {
        false
    }

    fn soc_gpio_present(&self) -> bool {
        false
    }

    /// 12-bit rotary sensor angle.
    fn read_encoder(&mut self) -> u16 {
        0
    }

    fn read_pic_all(&mut self) -> PicReadings {
        PicReadings::neutral()
    }

    /// All sixteen expander pins in one read, already inverted to
    /// pressed-is-high.
    fn read_expander_bulk(&mut self) -> u16 {
        0
    }

    fn read_soc_pin(&mut self, _port: u8, _pin: u8) -> bool {
        false
    }

    fn configure_expander_pin(&mut self, _pin: u8, _output: bool, _pullup: bool) {}

    fn configure_soc_pin(&mut self, _port: u8, _pin: u8, _pullup: bool) {}

    /// SC500 hardware strap: disables the volume ADCs and PIC buttons.
    fn sc500_strap(&mut self) -> bool {
        false
    }
}

/// Stand-in when no input hardware is found; everything neutral.
pub struct NullInputs;

impl PlatformInputs for NullInputs {}
