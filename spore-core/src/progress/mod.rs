//! Progress extraction from unstructured tool output
//!
//! A [`RuleSet`] is an ordered, declarative table of numeric patterns, phase
//! rules, terminal markers and error/warning markers. [`ProgressExtractor`]
//! evaluates one table against a chunk of output and never holds state of
//! its own, so the same extractor can serve many jobs.

pub mod extractor;
pub mod presets;
pub mod rule;

pub use extractor::{ProgressExtractor, ProgressUpdate};
pub use rule::{Matcher, PercentPattern, PhaseRule, RuleSet};
