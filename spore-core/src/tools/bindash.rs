//! BinDash genome sketching and distance estimation
//!
//! `sketch` turns a genome (or a list file of genomes) from `input_dir` into
//! a sketch written to `output_dir`. `dist` compares sketches found in
//! `input_dir` and writes the distance table to `output_dir`. Paths inside a
//! list file must be container paths under `/input`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::command::CommandSpec;
use crate::tools::{ToolError, container_run, host_path, one_of, positive, safe_name};

pub const IMAGE: &str = "quay.io/biocontainers/bindash:2.3--h43eeafb_0";

const MODES: &[&str] = &["sketch", "dist"];

fn default_threads() -> u32 {
    1
}

fn default_kmer_len() -> u32 {
    21
}

fn default_sketch_size64() -> u32 {
    32
}

fn default_bbits() -> u32 {
    14
}

fn default_ithres() -> u32 {
    2
}

fn default_mthres() -> f64 {
    2.5
}

fn default_pthres() -> f64 {
    1.0001
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindashParams {
    /// `sketch` or `dist`
    pub mode: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// File written to `output_dir`; `sketch` or `distances.tsv` by default
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Genome file in `input_dir` to sketch
    #[serde(default)]
    pub input: Option<String>,
    /// Read `input` as a list of genome paths
    #[serde(default)]
    pub list_file: bool,
    #[serde(default = "default_kmer_len")]
    pub kmer_len: u32,
    #[serde(default = "default_sketch_size64")]
    pub sketch_size64: u32,
    #[serde(default = "default_bbits")]
    pub bbits: u32,

    /// Query sketch in `input_dir`
    #[serde(default)]
    pub query: Option<String>,
    /// Target sketch in `input_dir`; the query is compared with itself when absent
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_ithres")]
    pub ithres: u32,
    #[serde(default = "default_mthres")]
    pub mthres: f64,
    #[serde(default)]
    pub nneighbors: u32,
    #[serde(default = "default_pthres")]
    pub pthres: f64,
}

impl BindashParams {
    pub fn build(&self, engine: &str) -> Result<CommandSpec, ToolError> {
        one_of("mode", &self.mode, MODES)?;
        let input = host_path("input_dir", &self.input_dir)?;
        let output = host_path("output_dir", &self.output_dir)?;
        positive("threads", self.threads)?;

        let cmd = container_run(engine)?
            .arg("-v")
            .arg(format!("{}:/input:ro", input))
            .arg("-v")
            .arg(format!("{}:/output", output))
            .arg(IMAGE)
            .arg("bindash");

        if self.mode == "sketch" {
            self.sketch(cmd)
        } else {
            self.dist(cmd)
        }
    }

    fn sketch(&self, cmd: CommandSpec) -> Result<CommandSpec, ToolError> {
        let input = self.input.as_deref().ok_or(ToolError::Missing("input"))?;
        safe_name("input", input)?;
        let output = self.output.as_deref().unwrap_or("sketch");
        safe_name("output", output)?;
        within("kmer_len", self.kmer_len, 64)?;
        positive("sketch_size64", self.sketch_size64)?;
        within("bbits", self.bbits, 64)?;

        let source = if self.list_file {
            format!("--listfname=/input/{}", input)
        } else {
            format!("/input/{}", input)
        };

        Ok(cmd
            .arg("sketch")
            .arg(source)
            .arg(format!("--outfname=/output/{}", output))
            .arg(format!("--kmerlen={}", self.kmer_len))
            .arg(format!("--sketchsize64={}", self.sketch_size64))
            .arg(format!("--bbits={}", self.bbits))
            .arg(format!("--nthreads={}", self.threads)))
    }

    fn dist(&self, cmd: CommandSpec) -> Result<CommandSpec, ToolError> {
        let query = self.query.as_deref().ok_or(ToolError::Missing("query"))?;
        safe_name("query", query)?;
        if let Some(target) = &self.target {
            safe_name("target", target)?;
        }
        let output = self.output.as_deref().unwrap_or("distances.tsv");
        safe_name("output", output)?;
        if !(self.mthres.is_finite() && self.mthres >= 0.0) {
            return Err(ToolError::Invalid {
                field: "mthres",
                reason: "must be a non-negative number".to_string(),
            });
        }
        if !(self.pthres.is_finite() && self.pthres > 0.0) {
            return Err(ToolError::Invalid {
                field: "pthres",
                reason: "must be a positive number".to_string(),
            });
        }

        let mut cmd = cmd.arg("dist").arg(format!("/input/{}", query));
        if let Some(target) = &self.target {
            cmd = cmd.arg(format!("/input/{}", target));
        }
        Ok(cmd
            .arg(format!("--outfname=/output/{}", output))
            .arg(format!("--ithres={}", self.ithres))
            .arg(format!("--mthres={}", self.mthres))
            .arg(format!("--nneighbors={}", self.nneighbors))
            .arg(format!("--nthreads={}", self.threads))
            .arg(format!("--pthres={}", self.pthres)))
    }
}

fn within(field: &'static str, value: u32, max: u32) -> Result<(), ToolError> {
    if value == 0 || value > max {
        return Err(ToolError::Invalid {
            field,
            reason: format!("must be between 1 and {}", max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sketch() -> BindashParams {
        serde_json::from_value(json!({
            "mode": "sketch",
            "input_dir": "/data/genomes",
            "output_dir": "/data/bindash",
            "input": "genomes.txt",
            "list_file": true,
            "threads": 4
        }))
        .unwrap()
    }

    fn dist() -> BindashParams {
        serde_json::from_value(json!({
            "mode": "dist",
            "input_dir": "/data/bindash",
            "output_dir": "/data/bindash/out",
            "query": "sketch"
        }))
        .unwrap()
    }

    #[test]
    fn test_build_sketch_command_with_defaults() {
        let cmd = sketch().build("podman").unwrap();
        assert_eq!(
            cmd.display(),
            "podman run --rm -v /data/genomes:/input:ro -v /data/bindash:/output \
             quay.io/biocontainers/bindash:2.3--h43eeafb_0 bindash sketch \
             --listfname=/input/genomes.txt --outfname=/output/sketch \
             --kmerlen=21 --sketchsize64=32 --bbits=14 --nthreads=4"
        );
    }

    #[test]
    fn test_sketch_single_genome_is_positional() {
        let mut p = sketch();
        p.list_file = false;
        p.input = Some("ecoli.fna".to_string());
        let cmd = p.build("docker").unwrap();
        assert!(cmd.args.contains(&"/input/ecoli.fna".to_string()));
        assert!(!cmd.display().contains("--listfname"));
    }

    #[test]
    fn test_build_dist_command_with_defaults() {
        let cmd = dist().build("docker").unwrap();
        assert_eq!(
            cmd.display(),
            "docker run --rm -v /data/bindash:/input:ro -v /data/bindash/out:/output \
             quay.io/biocontainers/bindash:2.3--h43eeafb_0 bindash dist /input/sketch \
             --outfname=/output/distances.tsv --ithres=2 --mthres=2.5 \
             --nneighbors=0 --nthreads=1 --pthres=1.0001"
        );
    }

    #[test]
    fn test_dist_with_target() {
        let mut p = dist();
        p.target = Some("refs".to_string());
        let cmd = p.build("docker").unwrap();
        assert!(cmd.display().contains("dist /input/sketch /input/refs --outfname"));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let mut p = sketch();
        p.mode = "triangle".to_string();
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Invalid { field: "mode", .. })
        ));
    }

    #[test]
    fn test_mode_needs_its_input() {
        let mut p = sketch();
        p.input = None;
        assert_eq!(p.build("docker"), Err(ToolError::Missing("input")));

        let mut p = dist();
        p.query = None;
        assert_eq!(p.build("docker"), Err(ToolError::Missing("query")));
    }

    #[test]
    fn test_rejects_out_of_range_sketch_params() {
        let mut p = sketch();
        p.kmer_len = 0;
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Invalid { field: "kmer_len", .. })
        ));

        let mut p = sketch();
        p.bbits = 65;
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Invalid { field: "bbits", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let mut p = dist();
        p.mthres = f64::NAN;
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Invalid { field: "mthres", .. })
        ));

        let mut p = dist();
        p.pthres = 0.0;
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Invalid { field: "pthres", .. })
        ));
    }

    #[test]
    fn test_names_stay_inside_mounts() {
        let mut p = dist();
        p.target = Some("../etc/passwd".to_string());
        assert!(matches!(
            p.build("docker"),
            Err(ToolError::Unsafe { field: "target", .. })
        ));
    }
}
