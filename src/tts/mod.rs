//! Text-to-speech using sherpa-rs Kokoro models.

mod synthesizer;

pub use synthesizer::{Synthesizer, speakable, split_sentences};
