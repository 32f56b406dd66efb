//! CheckM genome quality assessment

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::command::CommandSpec;
use crate::tools::{ToolError, container_run, host_path, one_of, positive};

pub const IMAGE: &str = "nanozoo/checkm:latest";

const WORKFLOWS: &[&str] = &["lineage_wf", "taxonomy_wf"];
const EXTENSIONS: &[&str] = &["fna", "fa", "fasta"];
const FLAGS: &[&str] = &["--reduced_tree", "--quiet", "--tab_table"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckmParams {
    pub workflow: String,
    pub threads: u32,
    pub extension: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl CheckmParams {
    pub fn build(&self, engine: &str) -> Result<CommandSpec, ToolError> {
        one_of("workflow", &self.workflow, WORKFLOWS)?;
        positive("threads", self.threads)?;
        one_of("extension", &self.extension, EXTENSIONS)?;
        let input = host_path("input_dir", &self.input_dir)?;
        let output = host_path("output_dir", &self.output_dir)?;
        for flag in &self.flags {
            one_of("flags", flag, FLAGS)?;
        }

        Ok(container_run(engine)?
            .arg("-v")
            .arg(format!("{}:/input", input))
            .arg("-v")
            .arg(format!("{}:/output", output))
            .arg(IMAGE)
            .arg("checkm")
            .arg(self.workflow.as_str())
            .arg("-t")
            .arg(self.threads.to_string())
            .arg("-x")
            .arg(self.extension.as_str())
            .args(self.flags.iter().map(String::as_str))
            .args(["/input", "/output"]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CheckmParams {
        CheckmParams {
            workflow: "lineage_wf".to_string(),
            threads: 4,
            extension: "fna".to_string(),
            input_dir: PathBuf::from("/data/bins"),
            output_dir: PathBuf::from("/data/checkm"),
            flags: vec!["--reduced_tree".to_string(), "--tab_table".to_string()],
        }
    }

    #[test]
    fn test_build_command() {
        let cmd = params().build("podman").unwrap();
        assert_eq!(
            cmd.display(),
            "podman run --rm -v /data/bins:/input -v /data/checkm:/output \
             nanozoo/checkm:latest checkm lineage_wf -t 4 -x fna \
             --reduced_tree --tab_table /input /output"
        );
    }

    #[test]
    fn test_rejects_unknown_workflow() {
        let mut p = params();
        p.workflow = "qa_wf".to_string();
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Invalid { field: "workflow", .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_flag() {
        let mut p = params();
        p.flags.push("--force".to_string());
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Invalid { field: "flags", .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let mut p = params();
        p.extension = "gbk".to_string();
        assert!(p.build("docker").is_err());
    }
}
