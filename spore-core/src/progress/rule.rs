//! Declarative progress rules

use regex::{Captures, Regex};

use crate::domain::log::LogKind;

/// Predicate over one chunk of tool output
#[derive(Debug, Clone)]
pub enum Matcher {
    Contains(String),
    AnyOf(Vec<String>),
    AllOf(Vec<String>),
    Regex(Regex),
}

impl Matcher {
    pub fn contains(needle: impl Into<String>) -> Self {
        Matcher::Contains(needle.into())
    }

    pub fn any_of<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::AnyOf(needles.into_iter().map(Into::into).collect())
    }

    pub fn all_of<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::AllOf(needles.into_iter().map(Into::into).collect())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Regex(Regex::new(pattern)?))
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Contains(needle) => text.contains(needle.as_str()),
            Matcher::AnyOf(needles) => needles.iter().any(|n| text.contains(n.as_str())),
            Matcher::AllOf(needles) => needles.iter().all(|n| text.contains(n.as_str())),
            Matcher::Regex(re) => re.is_match(text),
        }
    }

    /// Capture groups of the first match, only for regex matchers
    fn captures<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        match self {
            Matcher::Regex(re) => re.captures(text),
            _ => None,
        }
    }
}

/// Expands `$1`-style references in `template` against `caps`
///
/// Templates without captures are returned verbatim.
fn render(template: &str, caps: Option<&Captures<'_>>) -> String {
    match caps {
        Some(caps) => {
            let mut out = String::new();
            caps.expand(template, &mut out);
            out
        }
        None => template.to_string(),
    }
}

/// Maps a numeric percentage found in the output onto job progress
///
/// The value captured by `group` is transformed as
/// `offset + floor(value * scale)`.
#[derive(Debug, Clone)]
pub struct PercentPattern {
    regex: Regex,
    group: usize,
    offset: u32,
    scale: f64,
    phase: Option<String>,
    message: Option<String>,
}

impl PercentPattern {
    /// A pattern reporting the captured value as is
    pub fn new(pattern: &str, group: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            group,
            offset: 0,
            scale: 1.0,
            phase: None,
            message: None,
        })
    }

    /// Projects the captured value into the `[offset, offset + 100 * scale]` band
    pub fn scaled(mut self, offset: u32, scale: f64) -> Self {
        self.offset = offset;
        self.scale = scale;
        self
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    pub(crate) fn phase_label(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    /// Evaluates the last match in `text`
    ///
    /// Returns `None` when the pattern does not match at all. A match whose
    /// mapped value is unparsable or above 100 yields `Some((None, ..))` so
    /// the caller still treats this pattern as the one that matched.
    pub(crate) fn evaluate(&self, text: &str) -> Option<(Option<u8>, Option<String>)> {
        let caps = self.regex.captures_iter(text).last()?;
        let value = caps
            .get(self.group)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| self.offset as f64 + (v * self.scale).floor())
            .filter(|v| *v <= 100.0)
            .map(|v| v as u8);
        let message = self.message.as_deref().map(|t| render(t, Some(&caps)));
        Some((value, message))
    }
}

/// One row of a tool's phase table
#[derive(Debug, Clone)]
pub struct PhaseRule {
    matcher: Matcher,
    min_progress: Option<u8>,
    phase: Option<String>,
    message: Option<String>,
    kind: LogKind,
}

impl PhaseRule {
    pub fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            min_progress: None,
            phase: None,
            message: None,
            kind: LogKind::Info,
        }
    }

    pub fn progress(mut self, min_progress: u8) -> Self {
        self.min_progress = Some(min_progress.min(100));
        self
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    pub fn kind(mut self, kind: LogKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    pub(crate) fn min_progress(&self) -> Option<u8> {
        self.min_progress
    }

    pub(crate) fn phase_label(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    pub(crate) fn log_kind(&self) -> LogKind {
        self.kind
    }

    /// Renders the log text for a matching chunk
    pub(crate) fn render_message(&self, text: &str) -> Option<String> {
        let template = self.message.as_deref()?;
        let caps = self.matcher.captures(text);
        Some(render(template, caps.as_ref()))
    }
}

/// Complete progress table for one tool
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub percent_patterns: Vec<PercentPattern>,
    pub phases: Vec<PhaseRule>,
    pub terminal: Vec<Matcher>,
    pub errors: Vec<Matcher>,
    pub warnings: Vec<Matcher>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(mut self, pattern: PercentPattern) -> Self {
        self.percent_patterns.push(pattern);
        self
    }

    pub fn rule(mut self, rule: PhaseRule) -> Self {
        self.phases.push(rule);
        self
    }

    pub fn terminal(mut self, matcher: Matcher) -> Self {
        self.terminal.push(matcher);
        self
    }

    pub fn error(mut self, matcher: Matcher) -> Self {
        self.errors.push(matcher);
        self
    }

    pub fn warning(mut self, matcher: Matcher) -> Self {
        self.warnings.push(matcher);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matchers() {
        assert!(Matcher::contains("GeneMark").is_match("Starting GeneMark-EX"));
        assert!(Matcher::any_of(["foo", "Summary"]).is_match("Summary of run"));
        assert!(!Matcher::all_of(["Writing", ".gff"]).is_match("Writing report.txt"));
        assert!(Matcher::all_of(["Writing", ".gff"]).is_match("Writing braker.gff"));
        assert!(Matcher::regex(r"^\d+ bins").unwrap().is_match("12 bins"));
    }

    #[test]
    fn test_percent_uses_last_match() {
        let pattern = PercentPattern::new(r"(\d+)%", 1).unwrap();
        let (value, _) = pattern.evaluate("80% ... 20% ... 35%").unwrap();
        assert_eq!(value, Some(35));
        let (value, _) = pattern.evaluate("57% then 30%").unwrap();
        assert_eq!(value, Some(30));
        assert!(pattern.evaluate("no numbers here").is_none());
    }

    #[test]
    fn test_percent_scaling_and_message() {
        let pattern = PercentPattern::new(r"extracting (\d+) of (\d+) \(([0-9.]+)%\)", 3)
            .unwrap()
            .scaled(15, 0.15)
            .message("Extracting HMMs: $1 of $2 ($3%)");
        let (value, message) = pattern
            .evaluate("Finished extracting 43 of 100 (43.0%)")
            .unwrap();
        assert_eq!(value, Some(21));
        assert_eq!(message.as_deref(), Some("Extracting HMMs: 43 of 100 (43.0%)"));
    }

    #[test]
    fn test_percent_above_hundred_is_ignored() {
        let pattern = PercentPattern::new(r"(\d+)%", 1).unwrap();
        let (value, _) = pattern.evaluate("250%").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_rule_message_expands_captures() {
        let rule = PhaseRule::new(Matcher::regex(r"Current stage: ([0-9:.]+)").unwrap())
            .message("Elapsed time: $1")
            .kind(LogKind::Time);
        assert!(rule.matches("Current stage: 0:01:12.345"));
        assert_eq!(
            rule.render_message("Current stage: 0:01:12.345").as_deref(),
            Some("Elapsed time: 0:01:12.345")
        );
    }
}
