use rand::Rng;
use serde::{Deserialize, Serialize};

/// Per-trigger playback parameters. Built fresh for every cue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CueParams {
    pub volume: f32,
    pub rate: f32,
    pub randomize_rate: f32,
    pub clean: bool,
}

impl Default for CueParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
            randomize_rate: 0.0,
            clean: false,
        }
    }
}

impl CueParams {
    /// Effective playback rate: `rate` plus symmetric jitter in
    /// `[-randomize_rate, +randomize_rate]`.
    /// A range that is not finite, or whose width overflows, is treated as
    /// no jitter.
    pub fn jittered_rate<R: Rng>(&self, rng: &mut R) -> f32 {
        let r = self.randomize_rate;
        if !(r > 0.0 && (2.0 * r).is_finite()) {
            return self.rate;
        }
        self.rate + rng.gen_range(-r..=r)
    }

    pub fn path(&self) -> SignalPath {
        if self.clean {
            SignalPath::Clean
        } else {
            SignalPath::Processed
        }
    }
}

/// A named sample with its default parameters, as configured for one
/// kind of UI or typing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuePreset {
    pub sample: String,
    #[serde(default = "default_one")]
    pub volume: f32,
    #[serde(default = "default_one")]
    pub rate: f32,
    /// Upward shift drawn from `[0, rate_spread)` and added to `rate`
    /// before jitter.
    #[serde(default)]
    pub rate_spread: f32,
    #[serde(default)]
    pub randomize_rate: f32,
    #[serde(default)]
    pub clean: bool,
}

fn default_one() -> f32 {
    1.0
}

impl CuePreset {
    pub fn new(sample: impl Into<String>) -> Self {
        Self {
            sample: sample.into(),
            volume: 1.0,
            rate: 1.0,
            rate_spread: 0.0,
            randomize_rate: 0.0,
            clean: false,
        }
    }

    /// Draw the params for one trigger of this preset.
    pub fn params<R: Rng>(&self, rng: &mut R) -> CueParams {
        let shift = if self.rate_spread > 0.0 && self.rate_spread.is_finite() {
            rng.gen_range(0.0..self.rate_spread)
        } else {
            0.0
        };
        CueParams {
            volume: self.volume,
            rate: self.rate + shift,
            randomize_rate: self.randomize_rate,
            clean: self.clean,
        }
    }
}

/// The two fixed processing chains a voice can be routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPath {
    /// Highpass only. Used for typing blips.
    Clean,
    /// Soft saturation into a warm lowpass. Used for UI actions.
    Processed,
}

/// One fire-and-forget playback instance handed to the audio output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub sample: String,
    pub playback_rate: f32,
    pub gain: f32,
    /// Master SFX bus gain at the time the voice started.
    pub bus_gain: f32,
    pub path: SignalPath,
}
