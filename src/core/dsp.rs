/// Signal chains for cue playback, plus an offline mixer over them.

use std::f32::consts::PI;
use std::sync::Arc;

use crate::core::audio::AudioOutput;
use crate::core::config::ChainConfig;
use crate::schema::cue::{SignalPath, Voice};

/// Precomputed soft-saturation table for `f(x) = (1 + k)x / (1 + k|x|)`
/// over `x` in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct SaturationCurve {
    table: Vec<f32>,
}

impl SaturationCurve {
    pub fn new(drive: f32, len: usize) -> Self {
        let n = len.max(2);
        let table = (0..n)
            .map(|i| {
                let x = (i as f32 * 2.0) / n as f32 - 1.0;
                Self::transfer(drive, x)
            })
            .collect();
        Self { table }
    }

    /// The exact transfer function.
    pub fn transfer(drive: f32, x: f32) -> f32 {
        (1.0 + drive) * x / (1.0 + drive * x.abs())
    }

    pub fn table(&self) -> &[f32] {
        &self.table
    }

    /// Shape one sample by table lookup with linear interpolation.
    /// Input outside `[-1, 1]` is clamped.
    pub fn shape(&self, x: f32) -> f32 {
        let last = self.table.len() - 1;
        let pos = (x.clamp(-1.0, 1.0) + 1.0) * 0.5 * last as f32;
        let i = (pos.floor() as usize).min(last - 1);
        let frac = pos - i as f32;
        self.table[i] + (self.table[i + 1] - self.table[i]) * frac
    }
}

/// Second-order IIR section, RBJ cookbook coefficients.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    const Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

    pub fn lowpass(sample_rate: f32, freq: f32) -> Self {
        let (cos_w0, alpha) = Self::prewarp(sample_rate, freq);
        Self::normalized(
            (1.0 - cos_w0) / 2.0,
            1.0 - cos_w0,
            (1.0 - cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    pub fn highpass(sample_rate: f32, freq: f32) -> Self {
        let (cos_w0, alpha) = Self::prewarp(sample_rate, freq);
        Self::normalized(
            (1.0 + cos_w0) / 2.0,
            -(1.0 + cos_w0),
            (1.0 + cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    fn prewarp(sample_rate: f32, freq: f32) -> (f32, f32) {
        let w0 = 2.0 * PI * (freq / sample_rate).clamp(0.0, 0.49);
        (w0.cos(), w0.sin() / (2.0 * Self::Q))
    }

    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// The clean and processed chains, each fed by the sum of its voices.
#[derive(Debug, Clone)]
pub struct SignalChain {
    curve: SaturationCurve,
    lowpass: Biquad,
    highpass: Biquad,
}

impl SignalChain {
    pub fn new(config: &ChainConfig) -> Self {
        let sr = config.sample_rate as f32;
        Self {
            curve: SaturationCurve::new(config.drive, config.curve_len),
            lowpass: Biquad::lowpass(sr, config.lowpass_hz),
            highpass: Biquad::highpass(sr, config.highpass_hz),
        }
    }

    pub fn curve(&self) -> &SaturationCurve {
        &self.curve
    }

    /// Process one frame of each path's input and return the summed output.
    pub fn process(&mut self, clean: f32, processed: f32) -> f32 {
        let clean = self.highpass.process(clean);
        let processed = self.lowpass.process(self.curve.shape(processed));
        clean + processed
    }
}

struct ActiveVoice {
    frames: Arc<[f32]>,
    pos: f64,
    rate: f64,
    gain: f32,
    path: SignalPath,
}

/// Renders started voices offline into mono buffers. Voices are read
/// with linear interpolation at their playback rate.
pub struct Mixer {
    chain: SignalChain,
    voices: Vec<ActiveVoice>,
}

impl Mixer {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            chain: SignalChain::new(config),
            voices: Vec::new(),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Fill `out` with the next frames. Finished voices are dropped.
    pub fn render(&mut self, out: &mut [f32]) {
        for frame in out.iter_mut() {
            let mut clean = 0.0;
            let mut processed = 0.0;
            for voice in &mut self.voices {
                let i = voice.pos as usize;
                if i + 1 >= voice.frames.len() {
                    voice.pos = voice.frames.len() as f64;
                    continue;
                }
                let frac = (voice.pos - i as f64) as f32;
                let s = voice.frames[i] + (voice.frames[i + 1] - voice.frames[i]) * frac;
                match voice.path {
                    SignalPath::Clean => clean += s * voice.gain,
                    SignalPath::Processed => processed += s * voice.gain,
                }
                voice.pos += voice.rate;
            }
            *frame = self.chain.process(clean, processed);
        }
        self.voices
            .retain(|voice| (voice.pos as usize) + 1 < voice.frames.len());
    }
}

impl AudioOutput for Mixer {
    type Sample = Arc<[f32]>;

    /// Voices that would never reach the end of their sample are dropped.
    fn start(&mut self, sample: &Arc<[f32]>, voice: Voice) {
        if !(voice.playback_rate > 0.0 && voice.playback_rate.is_finite()) {
            tracing::trace!(sample = %voice.sample, rate = voice.playback_rate, "voice dropped");
            return;
        }
        self.voices.push(ActiveVoice {
            frames: Arc::clone(sample),
            pos: 0.0,
            rate: f64::from(voice.playback_rate),
            gain: voice.gain * voice.bus_gain,
            path: voice.path,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_matches_transfer() {
        let curve = SaturationCurve::new(6.0, 44_100);
        assert_eq!(curve.table().len(), 44_100);
        assert_eq!(curve.table()[0], -1.0);
        for x in [-0.9f32, -0.3, 0.0, 0.25, 0.8] {
            let exact = SaturationCurve::transfer(6.0, x);
            assert!((curve.shape(x) - exact).abs() < 1e-3, "x = {x}");
        }
    }

    #[test]
    fn transfer_is_odd_and_bounded() {
        for x in [0.1f32, 0.5, 1.0] {
            let y = SaturationCurve::transfer(6.0, x);
            assert_eq!(SaturationCurve::transfer(6.0, -x), -y);
            assert!(y <= 1.0 && y >= x);
        }
        assert_eq!(SaturationCurve::transfer(6.0, 1.0), 1.0);
    }

    #[test]
    fn shape_clamps_input() {
        let curve = SaturationCurve::new(6.0, 1024);
        assert_eq!(curve.shape(5.0), curve.shape(1.0));
        assert_eq!(curve.shape(-5.0), curve.shape(-1.0));
    }

    #[test]
    fn lowpass_passes_dc_highpass_blocks_it() {
        let mut lp = Biquad::lowpass(44_100.0, 1800.0);
        let mut hp = Biquad::highpass(44_100.0, 1200.0);
        let (mut l, mut h) = (0.0, 0.0);
        for _ in 0..4096 {
            l = lp.process(0.5);
            h = hp.process(0.5);
        }
        assert!((l - 0.5).abs() < 1e-3);
        assert!(h.abs() < 1e-3);
    }

    #[test]
    fn mixer_drops_finished_voices() {
        let mut mixer = Mixer::new(&ChainConfig::default());
        let sample: Arc<[f32]> = Arc::from(vec![0.5f32; 100]);
        let voice = Voice {
            sample: "back".to_string(),
            playback_rate: 2.0,
            gain: 1.0,
            bus_gain: 1.0,
            path: SignalPath::Processed,
        };
        mixer.start(&sample, voice.clone());
        mixer.start(&sample, voice);
        assert_eq!(mixer.active_voices(), 2);

        let mut out = vec![0.0; 64];
        mixer.render(&mut out);
        assert_eq!(mixer.active_voices(), 0);
        assert!(out.iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn mixer_refuses_voices_that_never_advance() {
        let mut mixer = Mixer::new(&ChainConfig::default());
        let sample: Arc<[f32]> = Arc::from(vec![0.5f32; 100]);
        for rate in [-0.1, 0.0, f32::NAN, f32::INFINITY] {
            mixer.start(
                &sample,
                Voice {
                    sample: "back".to_string(),
                    playback_rate: rate,
                    gain: 1.0,
                    bus_gain: 1.0,
                    path: SignalPath::Clean,
                },
            );
        }
        assert_eq!(mixer.active_voices(), 0);

        let mut out = vec![0.0; 44_100];
        mixer.render(&mut out);
        assert_eq!(mixer.active_voices(), 0);
    }
}
