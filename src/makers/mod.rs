//! Producers that fill timelines from per-utterance source files.

pub mod frames;
pub mod wave;

pub use frames::feed_frames;
pub use wave::{Waveform, feed_pitch_periods};
