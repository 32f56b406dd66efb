//! Tool job requests and their command builders
//!
//! A [`JobRequest`] is what `POST /jobs` accepts. Each containerised tool
//! turns its validated parameters into a [`CommandSpec`] that runs the tool
//! image through the configured container engine.

pub mod bindash;
pub mod braker3;
pub mod checkm;
pub mod eggnog;
pub mod ncbi;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::command::CommandSpec;
use crate::domain::tool::ToolKind;

pub use bindash::BindashParams;
pub use braker3::Braker3Params;
pub use checkm::CheckmParams;
pub use eggnog::{EggnogDownloadParams, EggnogParams};
pub use ncbi::{NcbiDatasetsParams, NcbiQuery};

/// Characters never accepted in user-supplied names, values or flags
const UNSAFE_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '^', '"', '\'', '*', '?',
    '~',
];

#[derive(Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("missing required field '{0}'")]
    Missing(&'static str),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("field '{field}' contains forbidden characters: {value}")]
    Unsafe { field: &'static str, value: String },
}

/// Body of a job submission, tagged by `tool`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum JobRequest {
    Bindash(BindashParams),
    Braker3(Braker3Params),
    Checkm(CheckmParams),
    Eggnog(EggnogParams),
    EggnogDownload(EggnogDownloadParams),
    NcbiDatasets(NcbiDatasetsParams),
    Command(CommandSpec),
}

impl JobRequest {
    pub fn tool(&self) -> ToolKind {
        match self {
            JobRequest::Bindash(_) => ToolKind::Bindash,
            JobRequest::Braker3(_) => ToolKind::Braker3,
            JobRequest::Checkm(_) => ToolKind::Checkm,
            JobRequest::Eggnog(_) => ToolKind::Eggnog,
            JobRequest::EggnogDownload(_) => ToolKind::EggnogDownload,
            JobRequest::NcbiDatasets(_) => ToolKind::NcbiDatasets,
            JobRequest::Command(_) => ToolKind::Command,
        }
    }

    /// Validates the parameters and builds the command to execute
    ///
    /// `engine` is the container binary (`docker` or `podman`) used by the
    /// containerised tools. Raw commands ignore it.
    pub fn build(&self, engine: &str) -> Result<CommandSpec, ToolError> {
        match self {
            JobRequest::Bindash(params) => params.build(engine),
            JobRequest::Braker3(params) => params.build(engine),
            JobRequest::Checkm(params) => params.build(engine),
            JobRequest::Eggnog(params) => params.build(engine),
            JobRequest::EggnogDownload(params) => params.build(engine),
            JobRequest::NcbiDatasets(params) => params.build(engine),
            JobRequest::Command(spec) => {
                required("program", &spec.program)?;
                Ok(spec.clone())
            }
        }
    }
}

pub(crate) fn required(field: &'static str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::Missing(field));
    }
    Ok(())
}

fn no_metachars(field: &'static str, value: &str) -> Result<(), ToolError> {
    required(field, value)?;
    if value.contains(UNSAFE_CHARS) {
        return Err(ToolError::Unsafe {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// A free-form value such as a taxon name or an e-value
///
/// Values are passed as their own argument, so a leading `-` would be read
/// as an option by the tool.
pub(crate) fn safe_value(field: &'static str, value: &str) -> Result<(), ToolError> {
    no_metachars(field, value)?;
    if value.trim_start().starts_with('-') {
        return Err(ToolError::Unsafe {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// A single `--long-option` passed through to a tool
pub(crate) fn safe_flag(field: &'static str, flag: &str) -> Result<(), ToolError> {
    no_metachars(field, flag)?;
    if !flag.starts_with("--") || flag.contains(char::is_whitespace) {
        return Err(ToolError::Invalid {
            field,
            reason: format!("'{}' is not a long option", flag),
        });
    }
    Ok(())
}

/// A single name that ends up inside a container path
pub(crate) fn safe_name(field: &'static str, value: &str) -> Result<(), ToolError> {
    safe_value(field, value)?;
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(ToolError::Unsafe {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn positive(field: &'static str, value: u32) -> Result<(), ToolError> {
    if value == 0 {
        return Err(ToolError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn one_of(field: &'static str, value: &str, allowed: &[&str]) -> Result<(), ToolError> {
    if !allowed.contains(&value) {
        return Err(ToolError::Invalid {
            field,
            reason: format!("'{}' is not one of {}", value, allowed.join(", ")),
        });
    }
    Ok(())
}

/// A host directory or file to bind-mount into the tool container
///
/// Returns the path as a string usable on the left side of `-v host:guest`.
pub(crate) fn host_path(field: &'static str, path: &Path) -> Result<String, ToolError> {
    let text = path.to_string_lossy().into_owned();
    safe_value(field, &text)?;
    if !path.is_absolute() {
        return Err(ToolError::Invalid {
            field,
            reason: "must be an absolute path".to_string(),
        });
    }
    if text.contains(':') {
        return Err(ToolError::Unsafe { field, value: text });
    }
    Ok(text)
}

/// The `<engine> run --rm` prefix shared by every containerised tool
pub(crate) fn container_run(engine: &str) -> Result<CommandSpec, ToolError> {
    safe_name("engine", engine)?;
    Ok(CommandSpec::new(engine).args(["run", "--rm"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_is_tagged_by_tool() {
        let request: JobRequest = serde_json::from_value(json!({
            "tool": "eggnog_download",
            "data_dir": "/data/eggnog_db"
        }))
        .unwrap();
        assert_eq!(request.tool(), ToolKind::EggnogDownload);

        let request: JobRequest = serde_json::from_value(json!({
            "tool": "command",
            "program": "sh",
            "args": ["-c", "echo 10%"]
        }))
        .unwrap();
        assert_eq!(request.tool(), ToolKind::Command);
        assert_eq!(request.build("docker").unwrap().display(), "sh -c 'echo 10%'");
    }

    #[test]
    fn test_unknown_tool_is_rejected() {
        let result = serde_json::from_value::<JobRequest>(json!({ "tool": "blast" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_command_needs_program() {
        let request = JobRequest::Command(CommandSpec::new("  "));
        assert_eq!(request.build("docker"), Err(ToolError::Missing("program")));
    }

    #[test]
    fn test_safe_value_rejects_metacharacters() {
        for value in ["a;b", "$(id)", "x|y", "`id`", "a>b", "*"] {
            assert!(matches!(
                safe_value("species", value),
                Err(ToolError::Unsafe { .. })
            ));
        }
        assert!(safe_value("taxon", "Saccharomyces cerevisiae").is_ok());
    }

    #[test]
    fn test_values_cannot_become_options() {
        for value in ["--override", "-o", " --workingdir=/"] {
            assert!(matches!(
                safe_value("species", value),
                Err(ToolError::Unsafe { field: "species", .. })
            ));
        }
        assert!(safe_name("output_name", "-annotations").is_err());
        assert!(safe_value("evalue", "1e-5").is_ok());
    }

    #[test]
    fn test_safe_flag_needs_a_long_option() {
        assert!(safe_flag("flags", "--gff3").is_ok());
        assert!(safe_flag("flags", "-x").is_err());
        assert!(safe_flag("flags", "--a --b").is_err());
        assert!(safe_flag("flags", "--x;id").is_err());
    }

    #[test]
    fn test_bindash_request_is_tagged() {
        let request: JobRequest = serde_json::from_value(json!({
            "tool": "bindash",
            "mode": "dist",
            "input_dir": "/data/sketches",
            "output_dir": "/data/out",
            "query": "all"
        }))
        .unwrap();
        assert_eq!(request.tool(), ToolKind::Bindash);
        assert!(request.build("docker").unwrap().display().contains("bindash dist /input/all"));
    }

    #[test]
    fn test_host_path_must_be_absolute_without_colon() {
        assert!(host_path("input_dir", Path::new("/data/in")).is_ok());
        assert!(host_path("input_dir", Path::new("data/in")).is_err());
        assert!(host_path("input_dir", Path::new("/data/in:/etc")).is_err());
    }

    #[test]
    fn test_engine_must_be_a_plain_name() {
        assert!(container_run("podman").is_ok());
        assert!(container_run("docker;rm").is_err());
    }
}
