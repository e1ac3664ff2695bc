/// Sound cue player: one-shot, independently controlled playback instances.
///
/// The player owns the sample registry and the master SFX bus. Decoding
/// and actual output belong to an `AudioOutput` implementation.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;

use crate::core::config::{BusConfig, EngineConfig};
use crate::schema::cue::{CueParams, CuePreset, Voice};

/// Starts playback instances. Each call to `start` is an independent,
/// fire-and-forget voice; overlapping voices of one sample are expected.
pub trait AudioOutput {
    /// Decoded sample handle, as supplied by the asset collaborator.
    type Sample;

    fn start(&mut self, sample: &Self::Sample, voice: Voice);

    /// Start the background track and resume output. Called once, on the
    /// first user intent.
    fn resume(&mut self) {}

    /// Set the background track volume (0.0 when muted).
    fn set_background_volume(&mut self, _volume: f32) {}
}

/// Plays named cues through an `AudioOutput`.
pub struct CuePlayer<O: AudioOutput> {
    output: O,
    samples: FxHashMap<String, O::Sample>,
    rng: StdRng,
    bus: BusConfig,
    bus_gain: f32,
    volume: Option<f32>,
    muted: bool,
    resumed: bool,
}

impl<O: AudioOutput> CuePlayer<O> {
    pub fn new(output: O, config: &EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            output,
            samples: FxHashMap::default(),
            rng,
            bus: config.bus,
            bus_gain: config.bus.sfx_gain,
            volume: None,
            muted: false,
            resumed: false,
        }
    }

    /// Resume output on the first user interaction. Later calls do nothing.
    pub fn unlock(&mut self) {
        if self.resumed {
            return;
        }
        self.resumed = true;
        tracing::debug!("audio resumed");
        self.output.resume();
        self.output.set_background_volume(self.background_volume());
    }

    pub fn is_unlocked(&self) -> bool {
        self.resumed
    }

    /// Background track volume: the user volume, or the configured
    /// initial volume, and 0.0 while muted.
    pub fn background_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume.unwrap_or(self.bus.background_volume)
        }
    }

    /// Make a decoded sample available. Samples may arrive in any order,
    /// at any time; a later registration replaces an earlier one.
    pub fn register_sample(&mut self, name: impl Into<String>, sample: O::Sample) {
        let name = name.into();
        tracing::debug!(sample = %name, "sample registered");
        self.samples.insert(name, sample);
    }

    pub fn has_sample(&self, name: &str) -> bool {
        self.samples.contains_key(name)
    }

    /// Start one voice of `name`. Missing samples and a silent bus are
    /// skipped without error.
    pub fn play(&mut self, name: &str, params: CueParams) {
        let Some(sample) = self.samples.get(name) else {
            tracing::trace!(sample = %name, "cue skipped: sample not loaded");
            return;
        };
        if self.bus_gain <= 0.0 {
            tracing::trace!(sample = %name, "cue skipped: bus silent");
            return;
        }

        let voice = Voice {
            sample: name.to_string(),
            playback_rate: params.jittered_rate(&mut self.rng),
            gain: params.volume,
            bus_gain: self.bus_gain,
            path: params.path(),
        };
        tracing::trace!(
            sample = %name,
            rate = voice.playback_rate,
            gain = voice.gain,
            path = ?voice.path,
            "cue"
        );
        self.output.start(sample, voice);
    }

    /// Draw params from `preset` and play its sample.
    pub fn play_preset(&mut self, preset: &CuePreset) {
        let params = preset.params(&mut self.rng);
        self.play(&preset.sample, params);
    }

    /// Set the user volume (0.0..=1.0). Takes effect immediately unless muted.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume = Some(volume);
        if !self.muted {
            self.bus_gain = volume * self.bus.volume_scale;
        }
        self.output.set_background_volume(self.background_volume());
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.bus_gain = if muted {
            0.0
        } else {
            self.volume
                .map(|v| v * self.bus.volume_scale)
                .unwrap_or(self.bus.sfx_gain)
        };
        self.output.set_background_volume(self.background_volume());
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn bus_gain(&self) -> f32 {
        self.bus_gain
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}

/// An output that keeps every started voice. Samples carry no data.
#[derive(Debug, Clone, Default)]
pub struct CueLog {
    pub voices: Vec<Voice>,
    pub resumes: usize,
    /// Background volumes, in the order they were set.
    pub background: Vec<f32>,
}

impl AudioOutput for CueLog {
    type Sample = ();

    fn start(&mut self, _sample: &(), voice: Voice) {
        self.voices.push(voice);
    }

    fn resume(&mut self) {
        self.resumes += 1;
    }

    fn set_background_volume(&mut self, volume: f32) {
        self.background.push(volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::cue::SignalPath;

    fn player() -> CuePlayer<CueLog> {
        let config = EngineConfig {
            seed: Some(11),
            ..EngineConfig::default()
        };
        let mut player = CuePlayer::new(CueLog::default(), &config);
        player.register_sample("type", ());
        player.register_sample("back", ());
        player
    }

    #[test]
    fn missing_sample_is_silent() {
        let mut player = player();
        player.play("side", CueParams::default());
        assert!(player.output().voices.is_empty());
    }

    #[test]
    fn voice_carries_params_and_path() {
        let mut player = player();
        player.play(
            "type",
            CueParams {
                volume: 0.05,
                rate: 2.0,
                randomize_rate: 0.0,
                clean: true,
            },
        );
        let voice = &player.output().voices[0];
        assert_eq!(voice.sample, "type");
        assert_eq!(voice.gain, 0.05);
        assert_eq!(voice.playback_rate, 2.0);
        assert_eq!(voice.path, SignalPath::Clean);
        assert_eq!(voice.bus_gain, 0.12);
    }

    #[test]
    fn overlapping_voices_are_independent() {
        let mut player = player();
        for _ in 0..3 {
            player.play("back", CueParams::default());
        }
        assert_eq!(player.output().voices.len(), 3);
    }

    #[test]
    fn mute_skips_and_unmute_restores_volume() {
        let mut player = player();
        player.set_volume(0.5);
        assert!((player.bus_gain() - 0.1).abs() < 1e-6);

        player.set_muted(true);
        player.play("back", CueParams::default());
        assert!(player.output().voices.is_empty());

        player.set_volume(1.0);
        assert_eq!(player.bus_gain(), 0.0);

        player.set_muted(false);
        assert!((player.bus_gain() - 0.2).abs() < 1e-6);
        player.play("back", CueParams::default());
        assert_eq!(player.output().voices.len(), 1);
    }

    #[test]
    fn unmute_without_volume_uses_initial_gain() {
        let mut player = player();
        player.set_muted(true);
        player.set_muted(false);
        assert_eq!(player.bus_gain(), 0.12);
    }

    #[test]
    fn unlock_resumes_once_at_initial_volume() {
        let mut player = player();
        assert!(!player.is_unlocked());
        player.unlock();
        player.unlock();
        assert!(player.is_unlocked());
        assert_eq!(player.output().resumes, 1);
        assert_eq!(player.output().background, vec![0.6]);
    }

    #[test]
    fn background_follows_volume_and_mute() {
        let mut player = player();
        player.set_volume(0.3);
        player.set_muted(true);
        player.set_muted(false);
        assert_eq!(player.output().background, vec![0.3, 0.0, 0.3]);
        assert_eq!(player.background_volume(), 0.3);
    }

    #[test]
    fn huge_jitter_range_does_not_panic() {
        let mut player = player();
        player.play(
            "type",
            CueParams {
                randomize_rate: f32::MAX,
                ..CueParams::default()
            },
        );
        assert_eq!(player.output().voices[0].playback_rate, 1.0);
    }

    #[test]
    fn same_seed_same_jitter() {
        let preset = CuePreset {
            rate_spread: 0.3,
            randomize_rate: 0.2,
            ..CuePreset::new("type")
        };
        let mut a = player();
        let mut b = player();
        for _ in 0..5 {
            a.play_preset(&preset);
            b.play_preset(&preset);
        }
        assert_eq!(a.output().voices, b.output().voices);
    }
}
