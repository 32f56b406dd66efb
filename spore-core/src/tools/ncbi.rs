//! NCBI datasets genome download

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::command::CommandSpec;
use crate::tools::{ToolError, container_run, host_path, one_of, safe_value};

pub const IMAGE: &str = "ensemblorg/datasets-cli";

const INCLUDE: &[&str] = &[
    "genome",
    "rna",
    "protein",
    "cds",
    "gff3",
    "gtf",
    "gbff",
    "seq-report",
    "none",
];
const ASSEMBLY_LEVELS: &[&str] = &["chromosome", "complete", "contig", "scaffold"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NcbiQuery {
    Accession,
    Taxon,
}

impl NcbiQuery {
    fn as_str(&self) -> &'static str {
        match self {
            NcbiQuery::Accession => "accession",
            NcbiQuery::Taxon => "taxon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NcbiDatasetsParams {
    pub query: NcbiQuery,
    /// Accession number or taxon name
    pub value: String,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub assembly_level: Option<String>,
}

impl NcbiDatasetsParams {
    pub fn build(&self, engine: &str) -> Result<CommandSpec, ToolError> {
        safe_value("value", &self.value)?;
        if self.query == NcbiQuery::Accession && self.value.contains(char::is_whitespace) {
            return Err(ToolError::Invalid {
                field: "value",
                reason: "accessions cannot contain whitespace".to_string(),
            });
        }
        let output = host_path("output_dir", &self.output_dir)?;

        let mut cmd = container_run(engine)?
            .arg("-v")
            .arg(format!("{}:/data", output))
            .arg(IMAGE)
            .args(["download", "genome", self.query.as_str()])
            .arg(self.value.trim());

        if !self.include.is_empty() {
            for item in &self.include {
                one_of("include", item, INCLUDE)?;
            }
            cmd = cmd.arg("--include").arg(self.include.join(","));
        }
        if let Some(level) = &self.assembly_level {
            for part in level.split(',') {
                one_of("assembly_level", part.trim(), ASSEMBLY_LEVELS)?;
            }
            cmd = cmd.arg("--assembly-level").arg(level.as_str());
        }

        Ok(cmd.args(["--output-dir", "/data"]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_accession_download() {
        let cmd = NcbiDatasetsParams {
            query: NcbiQuery::Accession,
            value: "GCF_000146045.2".to_string(),
            output_dir: PathBuf::from("/data/genomes"),
            include: vec!["genome".to_string(), "gff3".to_string()],
            assembly_level: Some("complete".to_string()),
        }
        .build("docker")
        .unwrap();
        assert_eq!(
            cmd.display(),
            "docker run --rm -v /data/genomes:/data ensemblorg/datasets-cli \
             download genome accession GCF_000146045.2 --include genome,gff3 \
             --assembly-level complete --output-dir /data"
        );
    }

    #[test]
    fn test_taxon_keeps_spaces_as_one_argument() {
        let cmd = NcbiDatasetsParams {
            query: NcbiQuery::Taxon,
            value: "Saccharomyces cerevisiae".to_string(),
            output_dir: PathBuf::from("/data/genomes"),
            include: Vec::new(),
            assembly_level: None,
        }
        .build("docker")
        .unwrap();
        assert!(cmd.args.contains(&"Saccharomyces cerevisiae".to_string()));
    }

    #[test]
    fn test_rejects_unknown_include() {
        let result = NcbiDatasetsParams {
            query: NcbiQuery::Accession,
            value: "GCF_1".to_string(),
            output_dir: PathBuf::from("/data"),
            include: vec!["everything".to_string()],
            assembly_level: None,
        }
        .build("docker");
        assert!(matches!(
            result,
            Err(ToolError::Invalid { field: "include", .. })
        ));
    }
}
