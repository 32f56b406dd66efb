//! Progress extraction over rule tables

use std::sync::Arc;

use crate::domain::log::{LogEntry, LogKind};
use crate::domain::tool::ToolKind;
use crate::progress::presets;
use crate::progress::rule::RuleSet;

/// Result of inspecting one output chunk
///
/// `progress`, when present, is already `max(current, extracted)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub progress: Option<u8>,
    pub phase: Option<String>,
    pub log: Option<LogEntry>,
}

impl ProgressUpdate {
    pub fn is_empty(&self) -> bool {
        self.progress.is_none() && self.phase.is_none() && self.log.is_none()
    }
}

/// Stateless interpreter of one tool's [`RuleSet`]
#[derive(Debug, Clone)]
pub struct ProgressExtractor {
    rules: Arc<RuleSet>,
}

impl ProgressExtractor {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// Extractor using the preset table for `tool`
    pub fn for_tool(tool: ToolKind) -> Self {
        Self::new(presets::for_tool(tool))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Derives a progress update from `text` given the job's `current` progress
    ///
    /// Numeric percentages take precedence over the phase table. Terminal
    /// markers force 100. Error and warning markers only retag the log entry.
    /// Chunks nothing recognises produce an empty update.
    pub fn extract(&self, text: &str, current: u8) -> ProgressUpdate {
        let line = text.trim();
        if line.is_empty() {
            return ProgressUpdate::default();
        }

        let mut recognised = false;
        let mut extracted: Option<u8> = None;
        let mut phase: Option<String> = None;
        let mut message: Option<String> = None;
        let mut kind = LogKind::Info;

        let numeric = self
            .rules
            .percent_patterns
            .iter()
            .find_map(|p| p.evaluate(line).map(|result| (p, result)));

        if let Some((pattern, (value, rendered))) = numeric {
            recognised = true;
            extracted = value;
            phase = pattern.phase_label().map(str::to_string);
            message = rendered;
            kind = LogKind::Progress;
        } else if let Some(rule) = self.rules.phases.iter().find(|r| r.matches(line)) {
            recognised = true;
            extracted = rule.min_progress();
            phase = rule.phase_label().map(str::to_string);
            message = rule.render_message(line);
            kind = rule.log_kind();
        }

        if self.rules.terminal.iter().any(|m| m.is_match(line)) {
            recognised = true;
            extracted = Some(100);
            kind = LogKind::Success;
        }

        if self.rules.errors.iter().any(|m| m.is_match(line)) {
            recognised = true;
            kind = LogKind::Error;
            // Error lines are kept verbatim so the cause stays visible
            message = None;
        } else if self.rules.warnings.iter().any(|m| m.is_match(line)) {
            recognised = true;
            kind = LogKind::Warning;
            message = None;
        }

        if !recognised {
            return ProgressUpdate::default();
        }

        ProgressUpdate {
            progress: extracted.map(|value| value.max(current).min(100)),
            phase,
            log: Some(LogEntry::new(kind, message.unwrap_or_else(|| line.to_string()))),
        }
    }
}
