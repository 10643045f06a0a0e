//! Audio interface configuration.
//!
//! `sc_settings.json` lists interfaces in priority order; the first entry
//! whose device string matches an available output device wins. Each entry
//! can map hardware output channels to logical signals; only the audio
//! stereo pair is rendered here, the CV kinds are carried for external
//! post-processors.

use std::collections::BTreeMap;

use serde::Deserialize;

/// What a hardware output channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOutputKind {
    #[default]
    None,
    /// Main stereo mix; the pair starts at the mapped channel
    Audio,
    CvPlatterSpeed,
    CvSamplePosition,
    CvCrossfader,
    CvGateA,
    CvGateB,
    CvPlatterAngle,
    CvPlatterAccel,
    CvDirectionPulse,
}

fn default_channels() -> u16 {
    2
}

fn default_input_right() -> usize {
    1
}

/// One audio device entry, in priority order.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioInterfaceConfig {
    #[serde(default)]
    pub name: String,
    /// Device match string, e.g. "hw:0" or a substring of the device name
    pub device: String,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub period_size: Option<u32>,
    #[serde(default)]
    pub buffer_period_factor: Option<u32>,
    #[serde(default)]
    pub supports_cv: bool,
    /// Number of capture channels (0 = no capture)
    #[serde(default)]
    pub input_channels: usize,
    #[serde(default)]
    pub input_left: usize,
    #[serde(default = "default_input_right")]
    pub input_right: usize,
    /// Hardware channel -> logical signal (JSON object keys are channel
    /// numbers)
    #[serde(default)]
    pub output_map: BTreeMap<String, LogicalOutputKind>,
}

impl AudioInterfaceConfig {
    pub fn output_kind(&self, channel: u16) -> LogicalOutputKind {
        self.output_map
            .get(&channel.to_string())
            .copied()
            .unwrap_or_default()
    }

    /// Does this entry match the given device name?
    pub fn matches(&self, device_name: &str) -> bool {
        !self.device.is_empty()
            && (device_name.contains(&self.device)
                || (!self.name.is_empty() && device_name.contains(&self.name)))
    }
}

/// Pick the first configured interface that matches an available device.
/// Returns the config together with the matched device name.
pub fn select_interface<'a>(
    configs: &'a [AudioInterfaceConfig],
    available: &[String],
) -> Option<(&'a AudioInterfaceConfig, String)> {
    for config in configs {
        for name in available {
            if config.matches(name) {
                return Some((config, name.clone()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interface_with_output_map() {
        let json = r#"{
            "name": "Bitwig Connect",
            "device": "hw:1",
            "channels": 8,
            "supports_cv": true,
            "input_channels": 2,
            "output_map": {"0": "audio", "4": "cv_platter_speed", "5": "cv_gate_a"}
        }"#;
        let config: AudioInterfaceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.channels, 8);
        assert_eq!(config.output_kind(0), LogicalOutputKind::Audio);
        assert_eq!(config.output_kind(4), LogicalOutputKind::CvPlatterSpeed);
        assert_eq!(config.output_kind(1), LogicalOutputKind::None);
        assert_eq!(config.input_right, 1);
    }

    #[test]
    fn selection_respects_priority_order() {
        let configs: Vec<AudioInterfaceConfig> = serde_json::from_str(
            r#"[
                {"device": "USB Audio"},
                {"device": "sun4i-codec"}
            ]"#,
        )
        .unwrap();
        let available = vec!["sun4i-codec analog".to_string(), "Generic USB Audio".to_string()];
        let (config, name) = select_interface(&configs, &available).unwrap();
        assert_eq!(config.device, "USB Audio");
        assert_eq!(name, "Generic USB Audio");

        let none = select_interface(&configs, &["other".to_string()]);
        assert!(none.is_none());
    }
}
