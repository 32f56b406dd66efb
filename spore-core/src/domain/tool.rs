//! Wrapped tool kinds

use serde::{Deserialize, Serialize};

/// The external tool a job wraps
///
/// Selects both how the command line is built and which progress rules
/// interpret its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Bindash,
    Braker3,
    Checkm,
    Eggnog,
    EggnogDownload,
    NcbiDatasets,
    Command,
}

impl ToolKind {
    pub const ALL: [ToolKind; 7] = [
        ToolKind::Bindash,
        ToolKind::Braker3,
        ToolKind::Checkm,
        ToolKind::Eggnog,
        ToolKind::EggnogDownload,
        ToolKind::NcbiDatasets,
        ToolKind::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Bindash => "bindash",
            ToolKind::Braker3 => "braker3",
            ToolKind::Checkm => "checkm",
            ToolKind::Eggnog => "eggnog",
            ToolKind::EggnogDownload => "eggnog_download",
            ToolKind::NcbiDatasets => "ncbi_datasets",
            ToolKind::Command => "command",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown tool '{}'", s))
    }
}
