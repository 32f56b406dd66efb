//! Rule tables for the wrapped tools
//!
//! Each table is built once on first use and shared by every job of that
//! tool. Patterns are literals, so a failure to compile is a programming
//! error and panics at first use.

use std::sync::{Arc, LazyLock};

use crate::domain::log::LogKind;
use crate::domain::tool::ToolKind;
use crate::progress::rule::{Matcher, PercentPattern, PhaseRule, RuleSet};

const PLAIN_PERCENT: &str = r"(\d+(?:\.\d+)?)%";

fn regex(pattern: &str) -> Matcher {
    Matcher::regex(pattern).expect("preset regex must compile")
}

fn percent(pattern: &str, group: usize) -> PercentPattern {
    PercentPattern::new(pattern, group).expect("preset regex must compile")
}

/// Error and warning markers shared by every tool
fn with_markers(rules: RuleSet) -> RuleSet {
    rules
        .error(Matcher::any_of(["ERROR", "FATAL", "Error:", "Traceback"]))
        .warning(Matcher::any_of(["WARNING", "WARN"]))
}

fn phase(matcher: Matcher, progress: u8, label: &str, message: &str) -> PhaseRule {
    PhaseRule::new(matcher)
        .progress(progress)
        .phase(label)
        .message(message)
}

pub static BINDASH: LazyLock<Arc<RuleSet>> = LazyLock::new(|| {
    let rules = RuleSet::new()
        .percent(percent(PLAIN_PERCENT, 1))
        .rule(phase(
            regex(r"(?i)\b(reading|loading) (genomes?|sequences?|list)"),
            10,
            "Reading genomes",
            "Reading input genomes",
        ))
        .rule(phase(
            regex(r"(?i)\bsketch(ing)?\b"),
            30,
            "Sketching",
            "Building genome sketches",
        ))
        .rule(phase(
            regex(r"(?i)\b(dist|distances?)\b"),
            75,
            "Computing distances",
            "Estimating pairwise distances",
        ))
        .rule(
            phase(
                regex(r"(?i)\b(wrote|written|writing)\b"),
                95,
                "Writing results",
                "Writing output file",
            )
            .kind(LogKind::Success),
        );
    Arc::new(with_markers(rules))
});

pub static BRAKER3: LazyLock<Arc<RuleSet>> = LazyLock::new(|| {
    let rules = RuleSet::new()
        .rule(phase(
            Matcher::contains("BRAKER PIPELINE STARTED"),
            5,
            "Starting",
            "BRAKER3 pipeline started",
        ))
        .rule(phase(
            Matcher::any_of(["Preparing genome", "softmasking"]),
            10,
            "Preparing genome",
            "Preparing genome and applying softmasking",
        ))
        .rule(phase(
            Matcher::any_of(["GeneMark-EX", "Starting GeneMark"]),
            20,
            "GeneMark",
            "Running GeneMark-EX for initial gene prediction",
        ))
        .rule(phase(
            Matcher::any_of(["Training AUGUSTUS", "augustus training"]),
            40,
            "Training AUGUSTUS",
            "Training AUGUSTUS model",
        ))
        .rule(phase(
            Matcher::any_of(["Running AUGUSTUS", "augustus prediction"]),
            60,
            "AUGUSTUS prediction",
            "Predicting genes with AUGUSTUS",
        ))
        .rule(phase(
            Matcher::any_of(["Integrating", "evidence integration"]),
            75,
            "Integrating evidence",
            "Integrating evidence and refining predictions",
        ))
        .rule(
            PhaseRule::new(regex(r"Writing.*\.(gff|gtf)|\.(gff|gtf).*Writing"))
                .progress(85)
                .phase("Writing annotation")
                .message("Writing final annotation files"),
        )
        .rule(phase(
            Matcher::any_of(["Statistics", "Summary"]),
            95,
            "Summary",
            "Computing statistics and final summary",
        ))
        .rule(PhaseRule::new(Matcher::any_of(["INFO", "Processing"])))
        .terminal(Matcher::any_of([
            "BRAKER PIPELINE FINISHED",
            "braker.pl finished",
        ]));
    Arc::new(with_markers(rules))
});

pub static CHECKM: LazyLock<Arc<RuleSet>> = LazyLock::new(|| {
    let rules = RuleSet::new()
        .percent(
            percent(
                r"Finished extracting (\d+) of (\d+) \(([0-9.]+)%\) HMMs",
                3,
            )
            .scaled(15, 0.15)
            .phase("Extracting HMMs")
            .message("Extracting HMMs: $1 of $2 ($3%)"),
        )
        .percent(
            percent(
                r"Finished aligning (\d+) of (\d+) \(([0-9.]+)%\) marker genes",
                3,
            )
            .scaled(30, 0.2)
            .phase("Aligning marker genes")
            .message("Aligning marker genes: $1 of $2 ($3%)"),
        )
        .rule(phase(
            Matcher::contains("[CheckM - tree]"),
            5,
            "Placing bins",
            "Placing genomes in the reference tree",
        ))
        .rule(phase(
            Matcher::contains("Identifying marker genes"),
            10,
            "Identifying marker genes",
            "Identifying marker genes in genomes",
        ))
        .rule(phase(
            Matcher::all_of(["Placing", "bins into the genome tree"]),
            50,
            "Tree placement",
            "Placing genomes in the phylogenetic tree",
        ))
        .rule(
            PhaseRule::new(regex(r"Current stage: ([0-9:.]+)"))
                .message("Elapsed time: $1")
                .kind(LogKind::Time),
        )
        .rule(phase(
            Matcher::contains("[CheckM - lineage_set]"),
            70,
            "Lineage set",
            "Inferring lineage-specific marker sets",
        ))
        .rule(phase(
            Matcher::contains("[CheckM - analyze]"),
            80,
            "Analyze",
            "Identifying marker genes in bins",
        ))
        .rule(phase(
            Matcher::contains("[CheckM - qa]"),
            90,
            "Quality assessment",
            "Running quality assessment",
        ))
        // 100 is left to the process exit
        .rule(
            phase(
                Matcher::any_of(["...done.", "Results written to", "Output table written to"]),
                99,
                "Writing results",
                "Analysis finished, writing results",
            )
            .kind(LogKind::Success),
        );
    Arc::new(with_markers(rules))
});

pub static EGGNOG: LazyLock<Arc<RuleSet>> = LazyLock::new(|| {
    let rules = RuleSet::new()
        .percent(
            percent(r"(\d+)%\s+[\d.]+[KMG]?\s+\d+[ms]\d+s", 1)
                .phase("Downloading")
                .message("Downloading database: $1%"),
        )
        .percent(percent(PLAIN_PERCENT, 1))
        .rule(phase(
            Matcher::contains("Downloading"),
            5,
            "Downloading",
            "Downloading eggNOG data",
        ))
        .rule(phase(
            Matcher::contains("Functional annotation of input sequences"),
            10,
            "Annotating",
            "Functional annotation of input sequences",
        ))
        .terminal(Matcher::any_of(["Done", "completed"]));
    Arc::new(with_markers(rules))
});

pub static NCBI_DATASETS: LazyLock<Arc<RuleSet>> = LazyLock::new(|| {
    let rules = RuleSet::new()
        .percent(percent(PLAIN_PERCENT, 1).phase("Downloading"))
        .rule(phase(
            Matcher::contains("Collecting"),
            5,
            "Collecting",
            "Collecting genome records",
        ))
        .rule(phase(
            Matcher::contains("Downloading"),
            10,
            "Downloading",
            "Downloading genome package",
        ))
        .rule(phase(
            Matcher::contains("Validating"),
            90,
            "Validating",
            "Validating downloaded package",
        ))
        .terminal(Matcher::contains("Download complete"));
    Arc::new(with_markers(rules))
});

pub static GENERIC: LazyLock<Arc<RuleSet>> = LazyLock::new(|| {
    let rules = RuleSet::new()
        .percent(percent(PLAIN_PERCENT, 1))
        .terminal(regex(r"\bDone\b"));
    Arc::new(with_markers(rules))
});

/// The rule table interpreting output of `tool`
pub fn for_tool(tool: ToolKind) -> Arc<RuleSet> {
    let preset: &Arc<RuleSet> = match tool {
        ToolKind::Bindash => &BINDASH,
        ToolKind::Braker3 => &BRAKER3,
        ToolKind::Checkm => &CHECKM,
        ToolKind::Eggnog | ToolKind::EggnogDownload => &EGGNOG,
        ToolKind::NcbiDatasets => &NCBI_DATASETS,
        ToolKind::Command => &GENERIC,
    };
    Arc::clone(preset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::extractor::ProgressExtractor;

    fn extractor(tool: ToolKind) -> ProgressExtractor {
        ProgressExtractor::for_tool(tool)
    }

    #[test]
    fn test_every_preset_builds() {
        for tool in ToolKind::ALL {
            let rules = for_tool(tool);
            assert!(!rules.errors.is_empty());
            assert!(!rules.warnings.is_empty());
        }
    }

    #[test]
    fn test_braker3_phases() {
        let ex = extractor(ToolKind::Braker3);
        let update = ex.extract("Starting GeneMark-EX on genome.fa", 5);
        assert_eq!(update.progress, Some(20));
        assert_eq!(update.phase.as_deref(), Some("GeneMark"));

        assert_eq!(ex.extract("Writing braker.gtf", 60).progress, Some(85));
        assert_eq!(ex.extract("Writing hints.txt", 60).progress, None);
    }

    #[test]
    fn test_braker3_info_lines_are_logged_without_progress() {
        let update = extractor(ToolKind::Braker3).extract("INFO: loading hints", 20);
        assert_eq!(update.progress, None);
        assert_eq!(update.log.map(|l| l.kind), Some(LogKind::Info));
    }

    #[test]
    fn test_checkm_scaled_extraction() {
        let ex = extractor(ToolKind::Checkm);
        let update = ex.extract("    Finished extracting 50 of 100 (50.00%) HMMs.", 10);
        assert_eq!(update.progress, Some(22));
        assert_eq!(update.phase.as_deref(), Some("Extracting HMMs"));
        assert_eq!(update.log.unwrap().kind, LogKind::Progress);

        let update = ex.extract("Finished aligning 100 of 100 (100.00%) marker genes.", 22);
        assert_eq!(update.progress, Some(50));
    }

    #[test]
    fn test_checkm_time_entry() {
        let update = extractor(ToolKind::Checkm).extract("  { Current stage: 0:02:13.458 }", 50);
        assert_eq!(update.progress, None);
        let log = update.log.unwrap();
        assert_eq!(log.kind, LogKind::Time);
        assert_eq!(log.text, "Elapsed time: 0:02:13.458");
    }

    #[test]
    fn test_checkm_results_stop_short_of_hundred() {
        let update = extractor(ToolKind::Checkm).extract("  Output table written to: /output/qa.tsv", 90);
        assert_eq!(update.progress, Some(99));
        assert_eq!(update.log.map(|l| l.kind), Some(LogKind::Success));
    }

    #[test]
    fn test_eggnog_download_format() {
        let ex = extractor(ToolKind::Eggnog);
        let update = ex.extract("  47%  3.1G  2m14s", 5);
        assert_eq!(update.progress, Some(47));
        assert_eq!(update.phase.as_deref(), Some("Downloading"));
        assert_eq!(ex.extract("Functional annotation of input sequences", 3).progress, Some(10));
        assert_eq!(ex.extract("emapper run completed", 40).progress, Some(100));
    }

    #[test]
    fn test_ncbi_datasets_phases() {
        let ex = extractor(ToolKind::NcbiDatasets);
        assert_eq!(ex.extract("Collecting 3 genome records", 0).progress, Some(5));
        assert_eq!(ex.extract("Validating package", 40).progress, Some(90));
        assert_eq!(ex.extract("Download complete", 90).progress, Some(100));
    }

    #[test]
    fn test_bindash_phases() {
        let ex = extractor(ToolKind::Bindash);
        let update = ex.extract("Sketching 12 genomes with k=21", 0);
        assert_eq!(update.progress, Some(30));
        assert_eq!(update.phase.as_deref(), Some("Sketching"));
        assert_eq!(ex.extract("computing distances between sketches", 30).progress, Some(75));
        // Output file names are not phase markers
        assert!(ex.extract("/output/sketchy.txt", 30).is_empty());
    }

    #[test]
    fn test_generic_done_is_a_word_marker() {
        let ex = extractor(ToolKind::Command);
        assert_eq!(ex.extract("Done", 55).progress, Some(100));
        assert!(ex.extract("Donezo", 55).is_empty());
    }

    #[test]
    fn test_traceback_is_error() {
        let update = extractor(ToolKind::Eggnog).extract("Traceback (most recent call last):", 10);
        assert_eq!(update.log.map(|l| l.kind), Some(LogKind::Error));
    }
}
