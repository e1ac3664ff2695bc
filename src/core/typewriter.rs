/// Typewriter renderer: a tick-driven, skippable character reveal.
///
/// The renderer never sleeps. A host calls `tick()` once per cadence
/// interval; each call performs one reveal step and reports what happened.
/// Starting a new render abandons the previous one silently: the state is
/// replaced and the generation counter moves on, so a superseded render
/// can never report completion.

use rustc_hash::FxHashSet;
use std::time::Duration;

use crate::core::audio::{AudioOutput, CuePlayer};
use crate::core::config::EngineConfig;
use crate::core::presenter::Presenter;
use crate::schema::cue::CuePreset;

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing is being revealed.
    Idle,
    /// One more character is on screen.
    Revealed(char),
    /// The render finished. Returned exactly once per `render` call.
    Completed { generation: u64, skipped: bool },
}

/// Decides which revealed characters fire a typing cue.
#[derive(Debug, Clone)]
pub struct CuePolicy {
    every: usize,
    silent: FxHashSet<char>,
}

impl CuePolicy {
    pub fn new(every: usize, silent: &str) -> Self {
        Self {
            every: every.max(1),
            silent: silent.chars().collect(),
        }
    }

    pub fn fires(&self, index: usize, ch: char) -> bool {
        index % self.every == 0 && !self.silent.contains(&ch)
    }
}

/// Per-render state. Reset at the start of every render.
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    full_text: Vec<char>,
    revealed: usize,
    is_revealing: bool,
    skip_requested: bool,
}

impl RenderState {
    fn start(text: &str) -> Self {
        Self {
            full_text: text.chars().collect(),
            revealed: 0,
            is_revealing: true,
            skip_requested: false,
        }
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed
    }

    pub fn is_revealing(&self) -> bool {
        self.is_revealing
    }

    pub fn skip_requested(&self) -> bool {
        self.skip_requested
    }

    pub fn revealed_text(&self) -> String {
        self.full_text[..self.revealed].iter().collect()
    }
}

pub struct Typewriter {
    state: RenderState,
    generation: u64,
    cadence: Duration,
    policy: CuePolicy,
    typing_cue: CuePreset,
    skip_cue: CuePreset,
}

impl Typewriter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: RenderState::default(),
            generation: 0,
            cadence: config.tick_interval(),
            policy: CuePolicy::new(config.cue_every, &config.silent_chars),
            typing_cue: config.cues.typing.clone(),
            skip_cue: config.cues.skip.clone(),
        }
    }

    /// Start revealing `text`, abandoning any reveal in progress.
    /// Returns the generation of the new render.
    pub fn render<P: Presenter>(&mut self, text: &str, presenter: &mut P) -> u64 {
        if self.state.is_revealing {
            tracing::debug!(generation = self.generation, "render superseded");
        }
        self.generation += 1;
        self.state = RenderState::start(text);
        presenter.clear_text();
        tracing::debug!(
            generation = self.generation,
            chars = self.state.full_text.len(),
            "render started"
        );
        self.generation
    }

    /// Perform one reveal step.
    pub fn tick<P, O>(&mut self, presenter: &mut P, cues: &mut CuePlayer<O>) -> Tick
    where
        P: Presenter,
        O: AudioOutput,
    {
        let state = &mut self.state;
        if !state.is_revealing {
            return Tick::Idle;
        }

        if state.skip_requested {
            let rest: String = state.full_text[state.revealed..].iter().collect();
            if !rest.is_empty() {
                presenter.append_text(&rest);
            }
            state.revealed = state.full_text.len();
            state.is_revealing = false;
            tracing::debug!(generation = self.generation, "render skipped to end");
            return Tick::Completed {
                generation: self.generation,
                skipped: true,
            };
        }

        if let Some(&ch) = state.full_text.get(state.revealed) {
            let mut buf = [0u8; 4];
            presenter.append_text(ch.encode_utf8(&mut buf));
            if self.policy.fires(state.revealed, ch) {
                cues.play_preset(&self.typing_cue);
            }
            state.revealed += 1;
            return Tick::Revealed(ch);
        }

        state.is_revealing = false;
        tracing::debug!(generation = self.generation, "render completed");
        Tick::Completed {
            generation: self.generation,
            skipped: false,
        }
    }

    /// Ask the current reveal to jump to its end on the next tick. Each
    /// call while revealing plays the skip cue. Returns `false` (and does
    /// nothing) when no reveal is in progress.
    pub fn request_skip<O: AudioOutput>(&mut self, cues: &mut CuePlayer<O>) -> bool {
        if !self.state.is_revealing {
            return false;
        }
        self.state.skip_requested = true;
        cues.play_preset(&self.skip_cue);
        true
    }

    /// Tick until the current render completes.
    pub fn finish<P, O>(&mut self, presenter: &mut P, cues: &mut CuePlayer<O>) -> Tick
    where
        P: Presenter,
        O: AudioOutput,
    {
        loop {
            match self.tick(presenter, cues) {
                Tick::Revealed(_) => continue,
                other => return other,
            }
        }
    }

    pub fn is_revealing(&self) -> bool {
        self.state.is_revealing
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::CueLog;
    use crate::core::presenter::Transcript;

    fn setup() -> (Typewriter, Transcript, CuePlayer<CueLog>) {
        let config = EngineConfig {
            seed: Some(5),
            ..EngineConfig::default()
        };
        let mut cues = CuePlayer::new(CueLog::default(), &config);
        for name in ["type", "continue"] {
            cues.register_sample(name, ());
        }
        (Typewriter::new(&config), Transcript::default(), cues)
    }

    fn typing_voices(cues: &CuePlayer<CueLog>) -> usize {
        cues.output()
            .voices
            .iter()
            .filter(|v| v.sample == "type")
            .count()
    }

    #[test]
    fn policy_skips_punctuation_and_unaligned() {
        let policy = CuePolicy::new(3, " \n.,!?");
        let fired: Vec<usize> = "ab.cd"
            .chars()
            .enumerate()
            .filter(|&(i, ch)| policy.fires(i, ch))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![0, 3]);
        assert!(!policy.fires(3, '.'));
        assert!(!policy.fires(0, ' '));
    }

    #[test]
    fn reveals_one_char_per_tick_then_completes_once() {
        let (mut tw, mut screen, mut cues) = setup();
        let generation = tw.render("ab.cd", &mut screen);

        for expected in "ab.cd".chars() {
            assert_eq!(tw.tick(&mut screen, &mut cues), Tick::Revealed(expected));
        }
        assert_eq!(screen.text, "ab.cd");
        assert!(tw.is_revealing());

        assert_eq!(
            tw.tick(&mut screen, &mut cues),
            Tick::Completed {
                generation,
                skipped: false
            }
        );
        assert!(!tw.is_revealing());
        assert_eq!(tw.tick(&mut screen, &mut cues), Tick::Idle);
        assert_eq!(typing_voices(&cues), 2);
    }

    #[test]
    fn typing_cue_uses_clean_path_and_shifted_rate() {
        let (mut tw, mut screen, mut cues) = setup();
        tw.render("a", &mut screen);
        tw.tick(&mut screen, &mut cues);
        let voice = &cues.output().voices[0];
        assert_eq!(voice.path, crate::schema::cue::SignalPath::Clean);
        assert_eq!(voice.gain, 0.05);
        assert!(voice.playback_rate >= 1.6 && voice.playback_rate <= 2.3);
    }

    #[test]
    fn skip_reveals_rest_and_completes_once() {
        let (mut tw, mut screen, mut cues) = setup();
        let generation = tw.render("hello there", &mut screen);
        tw.tick(&mut screen, &mut cues);
        tw.tick(&mut screen, &mut cues);

        assert!(tw.request_skip(&mut cues));
        assert!(tw.request_skip(&mut cues));
        assert_eq!(
            tw.tick(&mut screen, &mut cues),
            Tick::Completed {
                generation,
                skipped: true
            }
        );
        assert_eq!(screen.text, "hello there");
        assert_eq!(tw.state().revealed_count(), 11);
        assert_eq!(tw.tick(&mut screen, &mut cues), Tick::Idle);

        let skip_cues = cues
            .output()
            .voices
            .iter()
            .filter(|v| v.sample == "continue")
            .count();
        assert_eq!(skip_cues, 2);
    }

    #[test]
    fn skip_when_idle_is_noop() {
        let (mut tw, _screen, mut cues) = setup();
        assert!(!tw.request_skip(&mut cues));
        assert!(cues.output().voices.is_empty());
    }

    #[test]
    fn new_render_abandons_previous() {
        let (mut tw, mut screen, mut cues) = setup();
        let first = tw.render("first text", &mut screen);
        tw.tick(&mut screen, &mut cues);
        let second = tw.render("second", &mut screen);
        assert_ne!(first, second);
        assert_eq!(screen.text, "");

        let mut completions = Vec::new();
        loop {
            match tw.tick(&mut screen, &mut cues) {
                Tick::Completed { generation, .. } => completions.push(generation),
                Tick::Idle => break,
                Tick::Revealed(_) => {}
            }
        }
        assert_eq!(completions, vec![second]);
        assert_eq!(screen.text, "second");
    }

    #[test]
    fn empty_text_completes_on_first_tick() {
        let (mut tw, mut screen, mut cues) = setup();
        let generation = tw.render("", &mut screen);
        assert_eq!(
            tw.finish(&mut screen, &mut cues),
            Tick::Completed {
                generation,
                skipped: false
            }
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        let (mut tw, mut screen, mut cues) = setup();
        tw.render("✰ a", &mut screen);
        assert_eq!(tw.tick(&mut screen, &mut cues), Tick::Revealed('✰'));
        assert_eq!(tw.state().revealed_text(), "✰");
        tw.finish(&mut screen, &mut cues);
        assert_eq!(screen.text, "✰ a");
    }

    #[test]
    fn cadence_from_config() {
        let (tw, _, _) = setup();
        assert_eq!(tw.cadence(), Duration::from_millis(42));
    }
}
