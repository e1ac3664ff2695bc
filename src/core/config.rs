/// Engine configuration, loaded from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::schema::cue::CuePreset;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where a terminal redirect step hands the user off to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectConfig {
    pub url: String,
    /// Delay between the advance and the hand-off.
    #[serde(default = "default_redirect_delay")]
    pub delay_ms: u64,
    /// Redirect as soon as a terminal step finishes revealing, without
    /// waiting for an advance.
    #[serde(default)]
    pub on_reveal: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            url: "https://calendly.com/YOUR-CALENDLY-LINK".to_string(),
            delay_ms: default_redirect_delay(),
            on_reveal: false,
        }
    }
}

impl RedirectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_redirect_delay() -> u64 {
    1800
}

/// Cue presets for each event that makes a sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueConfig {
    pub typing: CuePreset,
    pub advance: CuePreset,
    pub back: CuePreset,
    pub jump: CuePreset,
    pub skip: CuePreset,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            typing: CuePreset {
                volume: 0.05,
                rate: 1.8,
                rate_spread: 0.3,
                randomize_rate: 0.2,
                clean: true,
                ..CuePreset::new("type")
            },
            advance: CuePreset {
                volume: 0.4,
                ..CuePreset::new("continue")
            },
            back: CuePreset {
                volume: 0.3,
                ..CuePreset::new("back")
            },
            jump: CuePreset {
                volume: 0.4,
                randomize_rate: 0.03,
                ..CuePreset::new("side")
            },
            skip: CuePreset {
                volume: 0.25,
                rate: 1.3,
                ..CuePreset::new("continue")
            },
        }
    }
}

/// Master SFX bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bus gain before the user touches the volume control.
    pub sfx_gain: f32,
    /// Bus gain per unit of user volume.
    pub volume_scale: f32,
    /// Background track volume before the user touches the volume control.
    #[serde(default = "default_background_volume")]
    pub background_volume: f32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            sfx_gain: 0.12,
            volume_scale: 0.2,
            background_volume: default_background_volume(),
        }
    }
}

fn default_background_volume() -> f32 {
    0.6
}

/// Constants of the two fixed signal chains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub sample_rate: u32,
    /// Drive `k` of the saturation curve.
    pub drive: f32,
    pub curve_len: usize,
    pub lowpass_hz: f32,
    pub highpass_hz: f32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            drive: 6.0,
            curve_len: 44_100,
            lowpass_hz: 1800.0,
            highpass_hz: 1200.0,
        }
    }
}

/// A sample the asset collaborator should fetch and register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Time between reveal ticks.
    pub tick_ms: u64,
    /// A typing cue may fire on every `cue_every`-th character.
    pub cue_every: usize,
    /// Characters that never fire a typing cue.
    pub silent_chars: String,
    pub redirect: RedirectConfig,
    pub cues: CueConfig,
    pub bus: BusConfig,
    pub chain: ChainConfig,
    pub samples: Vec<SampleSource>,
    /// Fixed RNG seed for cue jitter. Entropy when absent.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 42,
            cue_every: 3,
            silent_chars: " \n.,!?".to_string(),
            redirect: RedirectConfig::default(),
            cues: CueConfig::default(),
            bus: BusConfig::default(),
            chain: ChainConfig::default(),
            samples: [
                ("side", "audio/get1.mp3"),
                ("continue", "audio/select2.mp3"),
                ("back", "audio/select1.mp3"),
                ("type", "audio/blip.mp3"),
            ]
            .iter()
            .map(|(name, url)| SampleSource {
                name: name.to_string(),
                url: url.to_string(),
            })
            .collect(),
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".to_string()));
        }
        if self.cue_every == 0 {
            return Err(ConfigError::Invalid("cue_every must be positive".to_string()));
        }
        let presets = [
            ("typing", &self.cues.typing),
            ("advance", &self.cues.advance),
            ("back", &self.cues.back),
            ("jump", &self.cues.jump),
            ("skip", &self.cues.skip),
        ];
        for (name, preset) in presets {
            let values = [
                preset.volume,
                preset.rate,
                preset.rate_spread,
                preset.randomize_rate,
            ];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ConfigError::Invalid(format!("cue '{name}' has a non-finite value")));
            }
            if preset.volume < 0.0 {
                return Err(ConfigError::Invalid(format!("cue '{name}' has negative volume")));
            }
            if preset.randomize_rate < 0.0 || preset.rate_spread < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "cue '{name}' has a negative rate range"
                )));
            }
            // The lowest rate jitter can reach must still play forwards.
            if preset.rate - preset.randomize_rate <= 0.0 {
                return Err(ConfigError::Invalid(format!("cue '{name}' needs a positive rate")));
            }
        }
        let gains = [
            self.bus.sfx_gain,
            self.bus.volume_scale,
            self.bus.background_volume,
        ];
        if gains.iter().any(|g| !g.is_finite() || *g < 0.0) {
            return Err(ConfigError::Invalid(
                "bus gains must be finite and non-negative".to_string(),
            ));
        }
        let chain = [self.chain.drive, self.chain.lowpass_hz, self.chain.highpass_hz];
        if chain.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::Invalid(
                "chain values must be finite and non-negative".to_string(),
            ));
        }
        if self.chain.curve_len < 2 || self.chain.sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "chain needs a sample rate and at least two curve points".to_string(),
            ));
        }
        Ok(())
    }
}
