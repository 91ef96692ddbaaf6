//! Speech-to-text using sherpa-rs: Silero VAD segmentation and Whisper.

mod recognizer;

pub use recognizer::Recognizer;
