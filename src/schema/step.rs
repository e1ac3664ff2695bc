use serde::{Deserialize, Serialize};
use std::fmt;

/// What happens when the user advances past a step.
///
/// Decided once when the graph is built, never inferred during navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    /// Move to the next step of the same flow.
    Continue,
    /// Jump to step 0 of the named flow.
    Branch(String),
    /// Hand off to the external redirect target. Terminal.
    Redirect,
}

impl StepAction {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Redirect)
    }
}

/// One screen of text plus its transition behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    /// Label of the advance affordance. `None` hides it.
    pub advance_label: Option<String>,
    pub action: StepAction,
}

impl Step {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            advance_label: None,
            action: StepAction::Continue,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.advance_label = Some(label.into());
        self
    }

    pub fn branch(mut self, flow: impl Into<String>) -> Self {
        self.action = StepAction::Branch(flow.into());
        self
    }

    pub fn redirect(mut self) -> Self {
        self.action = StepAction::Redirect;
        self
    }
}

/// A location in the flow graph: flow name plus 0-based step index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub flow: String,
    pub step: usize,
}

impl Position {
    pub fn new(flow: impl Into<String>, step: usize) -> Self {
        Self {
            flow: flow.into(),
            step,
        }
    }

    /// Step 0 of `flow`.
    pub fn start_of(flow: impl Into<String>) -> Self {
        Self::new(flow, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.flow, self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_action_and_label() {
        let step = Step::new("hi").labeled("GO").branch("next");
        assert_eq!(step.advance_label.as_deref(), Some("GO"));
        assert_eq!(step.action, StepAction::Branch("next".to_string()));
        assert!(!step.action.is_terminal());
        assert!(Step::new("bye").redirect().action.is_terminal());
    }

    #[test]
    fn position_display() {
        assert_eq!(Position::new("how", 3).to_string(), "how/3");
        assert_eq!(Position::start_of("what"), Position::new("what", 0));
    }
}
