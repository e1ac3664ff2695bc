/// Presentation seam: what the engine asks of the display.

use serde::{Deserialize, Serialize};

use crate::core::config::RedirectConfig;

/// Which intents the display should currently offer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordances {
    pub back: bool,
    /// Advance label, or `None` to hide the advance affordance.
    pub advance: Option<String>,
}

impl Affordances {
    pub fn hidden() -> Self {
        Self::default()
    }
}

/// The display collaborator. Implementations own the rendering technology.
pub trait Presenter {
    fn clear_text(&mut self);

    /// Append revealed text to what is already displayed.
    fn append_text(&mut self, text: &str);

    fn show_affordances(&mut self, affordances: &Affordances);

    /// Hand the user off to `target` after `target.delay_ms`.
    fn redirect(&mut self, target: &RedirectConfig);
}

/// A headless presenter that keeps the displayed state.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub text: String,
    pub affordances: Affordances,
    /// Redirect URLs, in the order they were requested.
    pub redirects: Vec<String>,
    /// Number of times the display was cleared.
    pub clears: usize,
}

impl Presenter for Transcript {
    fn clear_text(&mut self) {
        self.text.clear();
        self.clears += 1;
    }

    fn append_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn show_affordances(&mut self, affordances: &Affordances) {
        self.affordances = affordances.clone();
    }

    fn redirect(&mut self, target: &RedirectConfig) {
        self.redirects.push(target.url.clone());
    }
}
