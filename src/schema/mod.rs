pub mod cue;
pub mod step;
