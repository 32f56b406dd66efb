//! Job command handlers
//!
//! Handles submitting tool jobs, inspecting and cancelling them, and
//! following their progress streams.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use colored::*;
use futures::StreamExt;
use serde_json::{Map, Value};
use spore_client::SporeClient;
use spore_core::domain::command::CommandSpec;
use spore_core::domain::job::{JobId, JobSnapshot, JobStatus, ProgressEvent};
use spore_core::domain::log::{LogEntry, LogKind};
use spore_core::domain::tool::ToolKind;
use spore_core::tools::JobRequest;

use crate::id_resolver::resolve_job_id;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Submit a tool job
    Submit {
        /// Tool to run (bindash, braker3, checkm, eggnog, eggnog_download, ncbi_datasets)
        tool: ToolKind,

        /// Tool parameter as key=value; values are read as JSON when they parse
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Follow the job's progress after submitting
        #[arg(short, long)]
        watch: bool,
    },
    /// Run an arbitrary command (the server must allow raw commands)
    Run {
        /// Working directory on the server
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Environment variable as KEY=VALUE
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Follow the job's progress after submitting
        #[arg(short, long)]
        watch: bool,

        /// Program and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// List all jobs
    List,
    /// Get job details
    Status {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Cancel a running job
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Follow a job's progress until it finishes
    Watch {
        /// Job ID or unambiguous prefix
        id: String,
    },
}

/// Routes job subcommands to their respective handlers
pub async fn handle_job_command(command: JobCommands, client: &SporeClient) -> Result<()> {
    match command {
        JobCommands::Submit {
            tool,
            params,
            watch,
        } => {
            let request = tool_request(tool, &params)?;
            submit(client, &request, watch).await
        }
        JobCommands::Run {
            workdir,
            env,
            watch,
            command,
        } => {
            let request = JobRequest::Command(command_spec(command, workdir, &env)?);
            submit(client, &request, watch).await
        }
        JobCommands::List => list_jobs(client).await,
        JobCommands::Status { id } => {
            let id = resolve_job_id(client, &id).await?;
            let job = client.get_job(id).await?;
            print_job_details(&job);
            Ok(())
        }
        JobCommands::Cancel { id } => {
            let id = resolve_job_id(client, &id).await?;
            let job = client.cancel_job(id).await?;
            println!(
                "{} Job {} {}",
                "✓".green(),
                job.id.to_string().cyan(),
                colorize_status(job.status)
            );
            Ok(())
        }
        JobCommands::Watch { id } => {
            let id = resolve_job_id(client, &id).await?;
            watch_job(client, id).await
        }
    }
}

/// Builds a tool request from `key=value` pairs
fn tool_request(tool: ToolKind, params: &[String]) -> Result<JobRequest> {
    if tool == ToolKind::Command {
        bail!("Use `spore job run -- <program> <args>` for raw commands");
    }

    let mut body = Map::new();
    body.insert("tool".to_string(), Value::String(tool.as_str().to_string()));
    for param in params {
        let (key, value) = split_pair(param)?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        body.insert(key.to_string(), value);
    }

    serde_json::from_value(Value::Object(body))
        .with_context(|| format!("Invalid parameters for {}", tool))
}

fn command_spec(
    command: Vec<String>,
    workdir: Option<PathBuf>,
    env: &[String],
) -> Result<CommandSpec> {
    let mut parts = command.into_iter();
    let program = parts.next().ok_or_else(|| anyhow!("No program given"))?;
    let mut spec = CommandSpec::new(program).args(parts);
    if let Some(dir) = workdir {
        spec = spec.working_dir(dir);
    }
    for pair in env {
        let (key, value) = split_pair(pair)?;
        spec = spec.env(key, value);
    }
    Ok(spec)
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(anyhow!("Expected KEY=VALUE, got '{}'", pair)),
    }
}

async fn submit(client: &SporeClient, request: &JobRequest, watch: bool) -> Result<()> {
    let id = client.submit_job(request).await?;
    println!(
        "{} Submitted {} job {}",
        "✓".green(),
        request.tool(),
        id.to_string().cyan()
    );

    if watch {
        println!();
        watch_job(client, id).await?;
    }
    Ok(())
}

async fn list_jobs(client: &SporeClient) -> Result<()> {
    let jobs = client.list_jobs().await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} job(s):", jobs.len()).bold());
    println!();
    for job in jobs {
        print_job_summary(&job);
    }
    Ok(())
}

/// Follows the progress stream, printing new log lines as they arrive
///
/// Fails when the job ends in the `failed` state.
async fn watch_job(client: &SporeClient, id: JobId) -> Result<()> {
    let mut events = Box::pin(client.stream_job(id).await?);
    let mut last_log: Option<LogEntry> = None;
    let mut last_line = String::new();
    let mut final_event: Option<ProgressEvent> = None;

    while let Some(event) = events.next().await {
        let event = event?;

        for entry in unseen_logs(&event.logs, last_log.as_ref()) {
            print_log_entry(entry);
        }
        if let Some(entry) = event.logs.last() {
            last_log = Some(entry.clone());
        }

        let line = progress_line(&event);
        if line != last_line {
            println!("{}", line);
            last_line = line;
        }

        if event.completed {
            final_event = Some(event);
        }
    }

    let event = final_event.ok_or_else(|| anyhow!("Stream for job {} ended early", id))?;
    println!();
    match event.status {
        JobStatus::Failed => bail!(
            "Job {} failed: {}",
            id,
            event.error.as_deref().unwrap_or("unknown error")
        ),
        status => {
            println!("Job {} {}", id.to_string().cyan(), colorize_status(status));
            if let Some(error) = &event.error {
                println!("  {}", error.dimmed());
            }
            Ok(())
        }
    }
}

/// Entries of `logs` newer than `last_seen`
///
/// Events carry only the newest few entries; when `last_seen` has already
/// scrolled out of the window every entry is new.
fn unseen_logs<'a>(logs: &'a [LogEntry], last_seen: Option<&LogEntry>) -> &'a [LogEntry] {
    let Some(last_seen) = last_seen else {
        return logs;
    };
    match logs.iter().rposition(|entry| entry == last_seen) {
        Some(pos) => &logs[pos + 1..],
        None => logs,
    }
}

fn progress_line(event: &ProgressEvent) -> String {
    let width = 30;
    let filled = usize::from(event.progress.min(100)) * width / 100;
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(width - filled));
    let phase = event.phase.as_deref().unwrap_or("");
    format!(
        "{} {:>3}% {} {}",
        bar.cyan(),
        event.progress,
        colorize_status(event.status),
        phase.dimmed()
    )
}

/// Print a job summary line block
fn print_job_summary(job: &JobSnapshot) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Tool:     {}", job.tool);
    println!(
        "    Status:   {} ({}%)",
        colorize_status(job.status),
        job.progress
    );
    println!(
        "    Started:  {}",
        job.started_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

/// Print detailed job information
fn print_job_details(job: &JobSnapshot) {
    println!("{}", "Job Details:".bold());
    println!("  ID:        {}", job.id.to_string().cyan());
    println!("  Tool:      {}", job.tool);
    println!("  Command:   {}", job.command.dimmed());
    println!("  Status:    {}", colorize_status(job.status));
    println!("  Progress:  {}%", job.progress);
    if let Some(phase) = &job.phase {
        println!("  Phase:     {}", phase);
    }
    println!("  Started:   {}", job.started_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(completed) = job.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
        let seconds = completed.signed_duration_since(job.started_at).num_seconds();
        println!("  Duration:  {}s", seconds);
    }
    if let Some(code) = job.exit_code {
        println!("  Exit Code: {}", code);
    }
    if let Some(error) = &job.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }

    if !job.logs.is_empty() {
        println!("\n{}", "Logs:".bold());
        println!("{}", "─".repeat(80).dimmed());
        for entry in &job.logs {
            print_log_entry(entry);
        }
        println!("{}", "─".repeat(80).dimmed());
    }
}

fn print_log_entry(entry: &LogEntry) {
    let kind = entry.kind.as_str().to_uppercase();
    let kind = match entry.kind {
        LogKind::Stdout | LogKind::Info => kind.normal(),
        LogKind::Stderr => kind.dimmed(),
        LogKind::Warning => kind.yellow(),
        LogKind::Error => kind.red(),
        LogKind::Success => kind.green(),
        LogKind::Progress | LogKind::Time => kind.cyan(),
    };

    println!(
        "{} [{}] {}",
        entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
        kind,
        entry.text
    );
}

fn colorize_status(status: JobStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        JobStatus::Queued => text.yellow(),
        JobStatus::Running => text.cyan(),
        JobStatus::Completed => text.green(),
        JobStatus::Failed => text.red(),
        JobStatus::Cancelled => text.dimmed(),
    }
}
