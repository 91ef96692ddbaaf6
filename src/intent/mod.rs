//! Intent model and extraction.
//!
//! Text is matched against fast rules first, then sent to the language model
//! with a memory-aware prompt, and finally run through rule-based fallbacks
//! when the model is unavailable.

mod extractor;
mod model;
mod prompt;

pub use extractor::{IntentExtractor, is_cancel, is_confirm, step_name};
pub use model::{Intent, IntentKind};
