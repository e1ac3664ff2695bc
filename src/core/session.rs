/// Navigation controller: position, history and the transition rules.
///
/// A `Session` owns everything one visitor's interaction needs: the
/// current position, the back-navigation history, the typewriter, the cue
/// player and the presenter. The flow graph is shared and read-only.

use std::sync::Arc;
use std::time::Duration;

use crate::core::audio::{AudioOutput, CuePlayer};
use crate::core::config::EngineConfig;
use crate::core::graph::{FlowError, FlowGraph};
use crate::core::presenter::{Affordances, Presenter};
use crate::core::typewriter::{Tick, Typewriter};
use crate::schema::step::{Position, StepAction};

/// Result of a user intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The intent was redundant (busy, empty history, unknown target).
    Ignored,
    /// Position changed and a render started.
    Moved(Position),
    /// The redirect collaborator was invoked. Position is unchanged.
    Redirected,
}

pub struct Session<P: Presenter, O: AudioOutput> {
    graph: Arc<FlowGraph>,
    config: EngineConfig,
    opening: Position,
    position: Position,
    history: Vec<Position>,
    typewriter: Typewriter,
    cues: CuePlayer<O>,
    presenter: P,
    /// Generation of the render whose completion updates affordances.
    rendering: Option<u64>,
    affordances: Affordances,
}

impl<P: Presenter, O: AudioOutput> Session<P, O> {
    /// Create a session at the graph's opening position and start
    /// rendering it.
    pub fn start(
        graph: Arc<FlowGraph>,
        config: EngineConfig,
        presenter: P,
        output: O,
    ) -> Result<Self, FlowError> {
        let opening = graph.opening();
        let mut session = Self {
            typewriter: Typewriter::new(&config),
            cues: CuePlayer::new(output, &config),
            position: opening.clone(),
            opening,
            history: Vec::new(),
            graph,
            config,
            presenter,
            rendering: None,
            affordances: Affordances::hidden(),
        };
        session.render_current()?;
        Ok(session)
    }

    /// Move forward from the current step: fall through, branch, or redirect.
    pub fn advance(&mut self) -> Result<Transition, FlowError> {
        self.cues.unlock();
        if self.is_busy() {
            return Ok(Transition::Ignored);
        }
        self.cues.play_preset(&self.config.cues.advance);

        let step = self.graph.step_at(&self.position)?;
        let next = match &step.action {
            StepAction::Redirect => {
                tracing::debug!(
                    position = %self.position,
                    url = %self.config.redirect.url,
                    "redirect"
                );
                self.presenter.redirect(&self.config.redirect);
                return Ok(Transition::Redirected);
            }
            StepAction::Branch(target) => Position::start_of(target.clone()),
            StepAction::Continue => {
                let next = Position::new(self.position.flow.clone(), self.position.step + 1);
                if next.step >= self.graph.flow_length(&next.flow)? {
                    return Err(FlowError::FallsOffEnd(next.flow));
                }
                next
            }
        };

        self.push_history();
        self.move_to(next)
    }

    /// Return to the most recently pushed position.
    pub fn go_back(&mut self) -> Result<Transition, FlowError> {
        self.cues.unlock();
        if self.is_busy() || self.history.is_empty() {
            return Ok(Transition::Ignored);
        }
        self.cues.play_preset(&self.config.cues.back);

        let Some(previous) = self.history.pop() else {
            return Ok(Transition::Ignored);
        };
        self.move_to(previous)
    }

    /// Jump to step 0 of `flow` without touching history. Allowed while a
    /// reveal is in progress; the new render supersedes it.
    pub fn jump_to(&mut self, flow: &str) -> Result<Transition, FlowError> {
        self.cues.unlock();
        self.cues.play_preset(&self.config.cues.jump);
        if !self.graph.contains(flow) {
            tracing::debug!(flow = %flow, "jump to unknown flow ignored");
            return Ok(Transition::Ignored);
        }
        self.move_to(Position::start_of(flow))
    }

    /// Skip the reveal in progress. Returns `false` when nothing is revealing.
    ///
    /// Every intent, even an ignored one, counts as the user interaction
    /// that resumes audio.
    pub fn request_skip(&mut self) -> bool {
        self.cues.unlock();
        self.typewriter.request_skip(&mut self.cues)
    }

    /// Drive the reveal one step. Call once per `tick_interval()`.
    pub fn tick(&mut self) -> Tick {
        let tick = self.typewriter.tick(&mut self.presenter, &mut self.cues);
        if let Tick::Completed { generation, .. } = tick {
            if self.rendering == Some(generation) {
                self.rendering = None;
                self.on_render_complete();
            }
        }
        tick
    }

    /// Tick until the current reveal completes.
    pub fn finish_render(&mut self) -> Tick {
        loop {
            match self.tick() {
                Tick::Revealed(_) => continue,
                other => return other,
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.typewriter.is_revealing()
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn history(&self) -> &[Position] {
        &self.history
    }

    pub fn affordances(&self) -> &Affordances {
        &self.affordances
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tick_interval(&self) -> Duration {
        self.typewriter.cadence()
    }

    pub fn typewriter(&self) -> &Typewriter {
        &self.typewriter
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn cues(&self) -> &CuePlayer<O> {
        &self.cues
    }

    pub fn cues_mut(&mut self) -> &mut CuePlayer<O> {
        &mut self.cues
    }

    fn push_history(&mut self) {
        // The opening screen is never a back-navigation target.
        if self.position != self.opening {
            self.history.push(self.position.clone());
        }
    }

    fn move_to(&mut self, position: Position) -> Result<Transition, FlowError> {
        tracing::debug!(from = %self.position, to = %position, "transition");
        self.position = position;
        self.render_current()?;
        Ok(Transition::Moved(self.position.clone()))
    }

    fn render_current(&mut self) -> Result<(), FlowError> {
        let step = self.graph.step_at(&self.position)?;
        self.affordances = Affordances::hidden();
        self.presenter.show_affordances(&self.affordances);
        let generation = self.typewriter.render(&step.text, &mut self.presenter);
        self.rendering = Some(generation);
        Ok(())
    }

    fn on_render_complete(&mut self) {
        let Ok(step) = self.graph.step_at(&self.position) else {
            return;
        };
        self.affordances = Affordances {
            back: !self.history.is_empty() && self.position != self.opening,
            advance: step.advance_label.clone(),
        };
        self.presenter.show_affordances(&self.affordances);

        if step.action.is_terminal() && self.config.redirect.on_reveal {
            tracing::debug!(
                position = %self.position,
                url = %self.config.redirect.url,
                "redirect on reveal"
            );
            self.presenter.redirect(&self.config.redirect);
        }
    }
}
