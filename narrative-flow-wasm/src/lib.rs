//! WASM bindings for narrative-flow. Drives the landing page from JS.
//!
//! The session runs inside WASM. Everything it asks of the page is queued
//! as effects that the JS side drains as JSON after each call and applies
//! to the DOM and the Web Audio graph.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

use narrative_flow::core::audio::AudioOutput;
use narrative_flow::core::config::{EngineConfig, RedirectConfig};
use narrative_flow::core::dsp::SaturationCurve;
use narrative_flow::core::graph::FlowGraph;
use narrative_flow::core::presenter::{Affordances, Presenter};
use narrative_flow::core::session::{Session, Transition};
use narrative_flow::schema::cue::{SignalPath, Voice};

// ---------------------------------------------------------------------------
// Embedded content, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const LANDING_FLOWS: &str = include_str!("../../content/landing.ron");
    pub const ENGINE_CONFIG: &str = include_str!("../../content/engine.ron");
}

// ---------------------------------------------------------------------------
// Effects queued for the JS side
// ---------------------------------------------------------------------------
#[derive(Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Effect {
    Clear,
    Append {
        text: String,
    },
    Affordances {
        back: bool,
        advance: Option<String>,
    },
    Play {
        sample: String,
        rate: f32,
        gain: f32,
        bus_gain: f32,
        path: SignalPath,
    },
    Redirect {
        url: String,
        delay_ms: u64,
    },
    /// Start the background track and resume the `AudioContext`. Queued
    /// once, on the first intent.
    StartAudio,
    BackgroundVolume {
        volume: f32,
    },
}

type Effects = Rc<RefCell<Vec<Effect>>>;

struct DomPresenter {
    effects: Effects,
}

impl Presenter for DomPresenter {
    fn clear_text(&mut self) {
        self.effects.borrow_mut().push(Effect::Clear);
    }

    fn append_text(&mut self, text: &str) {
        let mut effects = self.effects.borrow_mut();
        // Coalesce consecutive appends between drains.
        if let Some(Effect::Append { text: pending }) = effects.last_mut() {
            pending.push_str(text);
        } else {
            effects.push(Effect::Append {
                text: text.to_string(),
            });
        }
    }

    fn show_affordances(&mut self, affordances: &Affordances) {
        self.effects.borrow_mut().push(Effect::Affordances {
            back: affordances.back,
            advance: affordances.advance.clone(),
        });
    }

    fn redirect(&mut self, target: &RedirectConfig) {
        self.effects.borrow_mut().push(Effect::Redirect {
            url: target.url.clone(),
            delay_ms: target.delay_ms,
        });
    }
}

/// Samples live in JS as decoded `AudioBuffer`s; WASM only tracks names.
struct WebAudioOutput {
    effects: Effects,
}

impl AudioOutput for WebAudioOutput {
    type Sample = ();

    fn start(&mut self, _sample: &(), voice: Voice) {
        self.effects.borrow_mut().push(Effect::Play {
            sample: voice.sample,
            rate: voice.playback_rate,
            gain: voice.gain,
            bus_gain: voice.bus_gain,
            path: voice.path,
        });
    }

    fn resume(&mut self) {
        self.effects.borrow_mut().push(Effect::StartAudio);
    }

    fn set_background_volume(&mut self, volume: f32) {
        self.effects
            .borrow_mut()
            .push(Effect::BackgroundVolume { volume });
    }
}

fn js_error(context: &str, e: impl Display) -> JsError {
    JsError::new(&format!("{context}: {e}"))
}

fn transition_name(transition: &Transition) -> &'static str {
    match transition {
        Transition::Ignored => "ignored",
        Transition::Moved(_) => "moved",
        Transition::Redirected => "redirected",
    }
}

// ---------------------------------------------------------------------------
// LandingSession: the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct LandingSession {
    session: Session<DomPresenter, WebAudioOutput>,
    effects: Effects,
    curve: SaturationCurve,
}

#[wasm_bindgen]
impl LandingSession {
    /// Start a session on the embedded landing script.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<LandingSession, JsError> {
        Self::from_ron(data::LANDING_FLOWS, data::ENGINE_CONFIG)
    }

    /// Start a session on the embedded script with deterministic cue jitter.
    pub fn with_seed(seed: u64) -> Result<LandingSession, JsError> {
        let mut config = EngineConfig::parse_ron(data::ENGINE_CONFIG)
            .map_err(|e| js_error("Config parse error", e))?;
        config.seed = Some(seed);
        Self::build(data::LANDING_FLOWS, config)
    }

    /// Start a session on caller-supplied flow and config RON.
    pub fn from_ron(flows: &str, config: &str) -> Result<LandingSession, JsError> {
        let config =
            EngineConfig::parse_ron(config).map_err(|e| js_error("Config parse error", e))?;
        Self::build(flows, config)
    }

    /// Milliseconds between `tick()` calls.
    pub fn tick_ms(&self) -> u32 {
        u32::try_from(self.session.tick_interval().as_millis()).unwrap_or(u32::MAX)
    }

    /// One reveal step. Returns whether a reveal is still in progress.
    pub fn tick(&mut self) -> bool {
        self.session.tick();
        self.session.is_busy()
    }

    /// Returns "ignored", "moved" or "redirected".
    pub fn advance(&mut self) -> Result<String, JsError> {
        let transition = self
            .session
            .advance()
            .map_err(|e| js_error("Flow error", e))?;
        Ok(transition_name(&transition).to_string())
    }

    pub fn go_back(&mut self) -> Result<String, JsError> {
        let transition = self
            .session
            .go_back()
            .map_err(|e| js_error("Flow error", e))?;
        Ok(transition_name(&transition).to_string())
    }

    pub fn jump_to(&mut self, flow: &str) -> Result<String, JsError> {
        let transition = self
            .session
            .jump_to(flow)
            .map_err(|e| js_error("Flow error", e))?;
        Ok(transition_name(&transition).to_string())
    }

    pub fn skip(&mut self) -> bool {
        self.session.request_skip()
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    /// JSON `{ "flow": ..., "step": ... }`.
    pub fn position(&self) -> Result<String, JsError> {
        serde_json::to_string(self.session.position())
            .map_err(|e| js_error("Serialization error", e))
    }

    /// Mark a sample as decoded and playable.
    pub fn sample_loaded(&mut self, name: &str) {
        self.session.cues_mut().register_sample(name, ());
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.session.cues_mut().set_volume(volume);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.session.cues_mut().set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.session.cues().is_muted()
    }

    /// Volume for the background track element.
    pub fn background_volume(&self) -> f32 {
        self.session.cues().background_volume()
    }

    /// Current master SFX gain, for the shared bus gain node.
    pub fn bus_gain(&self) -> f32 {
        self.session.cues().bus_gain()
    }

    /// Return and clear the queued effects as a JSON array.
    pub fn drain_effects(&mut self) -> Result<String, JsError> {
        let effects: Vec<Effect> = self.effects.borrow_mut().drain(..).collect();
        serde_json::to_string(&effects).map_err(|e| js_error("Serialization error", e))
    }

    /// JSON array of `{ name, url }` samples to fetch and decode.
    pub fn sample_manifest(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.session.config().samples)
            .map_err(|e| js_error("Serialization error", e))
    }

    /// JSON array of flow names in declaration order.
    pub fn flows(&self) -> Result<String, JsError> {
        let names: Vec<&str> = self.session.graph().flow_names().collect();
        serde_json::to_string(&names).map_err(|e| js_error("Serialization error", e))
    }

    /// Waveshaper table for the processed path.
    pub fn distortion_curve(&self) -> Vec<f32> {
        self.curve.table().to_vec()
    }

    /// JSON object of the chain constants (filter cutoffs, sample rate).
    pub fn chain(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.session.config().chain)
            .map_err(|e| js_error("Serialization error", e))
    }
}

// Private helpers
impl LandingSession {
    fn build(flows: &str, config: EngineConfig) -> Result<LandingSession, JsError> {
        let graph = FlowGraph::parse_ron(flows).map_err(|e| js_error("Flow parse error", e))?;
        let effects: Effects = Rc::new(RefCell::new(Vec::new()));
        let curve = SaturationCurve::new(config.chain.drive, config.chain.curve_len);

        let session = Session::start(
            Arc::new(graph),
            config,
            DomPresenter {
                effects: Rc::clone(&effects),
            },
            WebAudioOutput {
                effects: Rc::clone(&effects),
            },
        )
        .map_err(|e| js_error("Session error", e))?;

        Ok(LandingSession {
            session,
            effects,
            curve,
        })
    }
}

