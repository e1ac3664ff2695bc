//! Narrative Flow: a typewriter-style engine for scripted, branching dialogue.
//!
//! Steps are revealed one character at a time on a fixed cadence, with
//! intermittent typing cues, skip-to-end, back-navigation history, and
//! terminal redirects. Display and audio output are collaborators behind
//! the `Presenter` and `AudioOutput` traits.

pub mod core;
pub mod schema;
