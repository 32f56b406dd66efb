//! eggNOG-mapper functional annotation and database download

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::command::CommandSpec;
use crate::tools::{
    ToolError, container_run, host_path, one_of, positive, safe_name, safe_value,
};

pub const IMAGE: &str = "nanozoo/eggnog-mapper:2.1.9--4f2b6c0";

/// Database location inside the container
const DB_DIR: &str = "/data/eggnog_db";

const MODES: &[&str] = &["diamond", "hmmer", "mmseqs", "novel_fams"];
const INPUT_TYPES: &[&str] = &["CDS", "proteins", "genome", "metagenome"];

fn default_tax_scope() -> String {
    "auto".to_string()
}

fn default_mode() -> String {
    "diamond".to_string()
}

fn default_evalue() -> f64 {
    0.001
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EggnogParams {
    /// Absolute path of the query FASTA on the host
    pub input_file: PathBuf,
    pub output_name: String,
    pub output_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cpu: u32,
    #[serde(default = "default_tax_scope")]
    pub tax_scope: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_evalue")]
    pub evalue: f64,
    #[serde(default)]
    pub itype: Option<String>,
}

impl EggnogParams {
    pub fn build(&self, engine: &str) -> Result<CommandSpec, ToolError> {
        let input_dir = self
            .input_file
            .parent()
            .ok_or(ToolError::Missing("input_file"))?;
        let file_name = self
            .input_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(ToolError::Missing("input_file"))?;
        let input_dir = host_path("input_file", input_dir)?;
        safe_name("input_file", &file_name)?;
        safe_name("output_name", &self.output_name)?;
        let output = host_path("output_dir", &self.output_dir)?;
        let data = host_path("data_dir", &self.data_dir)?;
        positive("cpu", self.cpu)?;
        safe_value("tax_scope", &self.tax_scope)?;
        one_of("mode", &self.mode, MODES)?;
        if !(self.evalue.is_finite() && self.evalue > 0.0) {
            return Err(ToolError::Invalid {
                field: "evalue",
                reason: "must be a positive number".to_string(),
            });
        }

        let mut cmd = container_run(engine)?
            .arg("-v")
            .arg(format!("{}:/input:ro", input_dir))
            .arg("-v")
            .arg(format!("{}:/output", output))
            .arg("-v")
            .arg(format!("{}:{}:ro", data, DB_DIR))
            .arg(IMAGE)
            .arg("emapper.py")
            .arg("-i")
            .arg(format!("/input/{}", file_name))
            .arg("-o")
            .arg(self.output_name.as_str())
            .args(["--output_dir", "/output", "--data_dir", DB_DIR])
            .arg("--tax_scope")
            .arg(self.tax_scope.as_str())
            .arg("--cpu")
            .arg(self.cpu.to_string());

        if let Some(itype) = &self.itype {
            one_of("itype", itype, INPUT_TYPES)?;
            cmd = cmd.arg("--itype").arg(itype.as_str());
        }

        Ok(cmd
            .arg("-m")
            .arg(self.mode.as_str())
            .arg("--evalue")
            .arg(self.evalue.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EggnogDownloadParams {
    pub data_dir: PathBuf,
}

impl EggnogDownloadParams {
    pub fn build(&self, engine: &str) -> Result<CommandSpec, ToolError> {
        let data = host_path("data_dir", &self.data_dir)?;
        Ok(container_run(engine)?
            .arg("-v")
            .arg(format!("{}:{}", data, DB_DIR))
            .arg(IMAGE)
            .arg("download_eggnog_data.py")
            .args(["--data_dir", DB_DIR, "-y"]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EggnogParams {
        EggnogParams {
            input_file: PathBuf::from("/data/proteins/sample.faa"),
            output_name: "sample".to_string(),
            output_dir: PathBuf::from("/data/eggnog_results/run1"),
            data_dir: PathBuf::from("/data/eggnog_db"),
            cpu: 4,
            tax_scope: default_tax_scope(),
            mode: default_mode(),
            evalue: default_evalue(),
            itype: Some("proteins".to_string()),
        }
    }

    #[test]
    fn test_build_mapper_command() {
        let cmd = params().build("docker").unwrap();
        let args = cmd.args.join(" ");
        assert!(args.contains("-v /data/proteins:/input:ro"));
        assert!(args.contains("-v /data/eggnog_db:/data/eggnog_db:ro"));
        assert!(args.contains("emapper.py -i /input/sample.faa -o sample"));
        assert!(args.contains("--itype proteins"));
        assert!(args.ends_with("-m diamond --evalue 0.001"));
    }

    #[test]
    fn test_rejects_bad_mode_and_evalue() {
        let mut p = params();
        p.mode = "blast".to_string();
        assert!(p.build("docker").is_err());

        let mut p = params();
        p.evalue = 0.0;
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Invalid { field: "evalue", .. })
        ));
    }

    #[test]
    fn test_rejects_option_like_values() {
        let mut p = params();
        p.output_name = "--override".to_string();
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Unsafe { field: "output_name", .. })
        ));

        let mut p = params();
        p.tax_scope = "--dbmem".to_string();
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Unsafe { field: "tax_scope", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_cpu() {
        let mut p = params();
        p.cpu = 0;
        assert!(p.build("docker").is_err());
    }

    #[test]
    fn test_build_download_command() {
        let cmd = EggnogDownloadParams {
            data_dir: PathBuf::from("/srv/eggnog"),
        }
        .build("docker")
        .unwrap();
        assert_eq!(
            cmd.display(),
            "docker run --rm -v /srv/eggnog:/data/eggnog_db \
             nanozoo/eggnog-mapper:2.1.9--4f2b6c0 download_eggnog_data.py \
             --data_dir /data/eggnog_db -y"
        );
    }

    #[test]
    fn test_defaults_apply_when_deserializing() {
        let p: EggnogParams = serde_json::from_value(serde_json::json!({
            "input_file": "/data/in/a.faa",
            "output_name": "a",
            "output_dir": "/data/out",
            "data_dir": "/data/db",
            "cpu": 2
        }))
        .unwrap();
        assert_eq!(p.mode, "diamond");
        assert_eq!(p.tax_scope, "auto");
        assert_eq!(p.itype, None);
    }
}
