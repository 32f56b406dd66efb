//! BRAKER3 genome annotation

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::command::CommandSpec;
use crate::tools::{ToolError, container_run, host_path, positive, safe_flag, safe_name};

pub const IMAGE: &str = "teambraker/braker3:latest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Braker3Params {
    pub species: String,
    /// Genome file name inside `input_dir`
    pub genome: String,
    pub threads: u32,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// RNA-Seq alignment file name inside `input_dir`
    #[serde(default)]
    pub bam: Option<String>,
    /// Protein database file name inside `input_dir`
    #[serde(default)]
    pub prot_seq: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Braker3Params {
    pub fn build(&self, engine: &str) -> Result<CommandSpec, ToolError> {
        safe_name("species", &self.species)?;
        safe_name("genome", &self.genome)?;
        positive("threads", self.threads)?;
        let input = host_path("input_dir", &self.input_dir)?;
        let output = host_path("output_dir", &self.output_dir)?;

        let mut cmd = container_run(engine)?
            .arg("-v")
            .arg(format!("{}:/input", input))
            .arg("-v")
            .arg(format!("{}:/output", output))
            .arg(IMAGE)
            .arg("braker.pl")
            .arg(format!("--species={}", self.species))
            .arg(format!("--genome=/input/{}", self.genome))
            .arg(format!("--threads={}", self.threads));

        if let Some(bam) = &self.bam {
            safe_name("bam", bam)?;
            cmd = cmd.arg(format!("--bam=/input/{}", bam));
        }
        if let Some(prot_seq) = &self.prot_seq {
            safe_name("prot_seq", prot_seq)?;
            cmd = cmd.arg(format!("--prot_seq=/input/{}", prot_seq));
        }
        for flag in &self.flags {
            safe_flag("flags", flag)?;
            cmd = cmd.arg(flag.as_str());
        }

        Ok(cmd.arg("--workingdir=/output"))
    }
}
