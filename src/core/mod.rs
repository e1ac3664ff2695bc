pub mod audio;
pub mod config;
pub mod dsp;
pub mod graph;
pub mod presenter;
pub mod session;
pub mod typewriter;
