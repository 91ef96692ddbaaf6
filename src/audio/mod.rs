//! Audio I/O: microphone capture and speaker playback with cpal, rubato
//! resampling and generated tones.

mod capture;
mod playback;
pub mod resampler;
pub mod util;

pub use capture::Capturer;
pub use playback::Player;
