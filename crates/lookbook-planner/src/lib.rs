//! Query planning and result summarization on top of a [`ReasoningProvider`].
//!
//! [`QueryPlanner`] never trusts provider output: replies are parsed,
//! validated, and clamped, and any failure degrades to a deterministic plan.
//!
//! [`ReasoningProvider`]: lookbook_core::traits::ReasoningProvider

pub mod gemini;
pub mod parse;
pub mod planner;
pub mod prompt;
pub mod summary;

pub use gemini::GeminiProvider;
pub use planner::{QueryPlanner, IMAGE_ONLY_PLACEHOLDER};
pub use summary::Summarizer;
