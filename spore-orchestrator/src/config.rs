//! Orchestrator configuration
//!
//! Defines all configurable parameters for the orchestrator including the
//! listen address, the container engine used by tool jobs, concurrency and
//! retention limits.

use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// Container binary used for tool jobs (`docker` or `podman`)
    pub container_engine: String,

    /// Number of jobs that may run at the same time
    pub max_concurrent_jobs: usize,

    /// Log entries kept per job before the oldest are dropped
    pub log_capacity: usize,

    /// Most recent log entries carried by each streamed event
    pub stream_log_tail: usize,

    /// Finished jobs kept in memory before the oldest is evicted
    pub max_retained_jobs: usize,

    /// Running time after which a job is killed, if any
    pub job_timeout: Option<Duration>,

    /// Whether `POST /jobs` accepts arbitrary commands
    pub allow_raw_commands: bool,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - SPORE_BIND_ADDR (default: 0.0.0.0:8080)
    /// - SPORE_CONTAINER_ENGINE (default: docker)
    /// - SPORE_MAX_CONCURRENT_JOBS (default: 1)
    /// - SPORE_LOG_CAPACITY (default: 50)
    /// - SPORE_STREAM_LOG_TAIL (default: 5)
    /// - SPORE_MAX_RETAINED_JOBS (default: 100)
    /// - SPORE_JOB_TIMEOUT (seconds, default: no timeout)
    /// - SPORE_ALLOW_RAW_COMMANDS (default: false)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = lookup("SPORE_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let container_engine =
            lookup("SPORE_CONTAINER_ENGINE").unwrap_or(defaults.container_engine);

        let max_concurrent_jobs = parse_or(
            &lookup,
            "SPORE_MAX_CONCURRENT_JOBS",
            defaults.max_concurrent_jobs,
        )?;

        let log_capacity = parse_or(&lookup, "SPORE_LOG_CAPACITY", defaults.log_capacity)?;

        let stream_log_tail =
            parse_or(&lookup, "SPORE_STREAM_LOG_TAIL", defaults.stream_log_tail)?;

        let max_retained_jobs =
            parse_or(&lookup, "SPORE_MAX_RETAINED_JOBS", defaults.max_retained_jobs)?;

        let job_timeout = match lookup("SPORE_JOB_TIMEOUT") {
            Some(raw) => Some(Duration::from_secs(raw.trim().parse::<u64>().map_err(
                |_| anyhow::anyhow!("SPORE_JOB_TIMEOUT must be a number of seconds"),
            )?)),
            None => None,
        };

        let allow_raw_commands = match lookup("SPORE_ALLOW_RAW_COMMANDS") {
            Some(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
            None => defaults.allow_raw_commands,
        };

        Ok(Self {
            bind_addr,
            container_engine,
            max_concurrent_jobs,
            log_capacity,
            stream_log_tail,
            max_retained_jobs,
            job_timeout,
            allow_raw_commands,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.container_engine.trim().is_empty() {
            anyhow::bail!("container_engine cannot be empty");
        }

        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("max_concurrent_jobs must be greater than 0");
        }

        if self.log_capacity == 0 {
            anyhow::bail!("log_capacity must be greater than 0");
        }

        if self.max_retained_jobs == 0 {
            anyhow::bail!("max_retained_jobs must be greater than 0");
        }

        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        Ok(())
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: usize) -> anyhow::Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer", key)),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            container_engine: "docker".to_string(),
            max_concurrent_jobs: 1,
            log_capacity: 50,
            stream_log_tail: 5,
            max_retained_jobs: 100,
            job_timeout: None,
            allow_raw_commands: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.log_capacity, 50);
        assert_eq!(config.stream_log_tail, 5);
        assert!(config.job_timeout.is_none());
        assert!(!config.allow_raw_commands);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.container_engine, "docker");
        assert_eq!(config.max_retained_jobs, 100);
    }

    #[test]
    fn test_environment_overrides() {
        let config = from_pairs(&[
            ("SPORE_CONTAINER_ENGINE", "podman"),
            ("SPORE_MAX_CONCURRENT_JOBS", "4"),
            ("SPORE_JOB_TIMEOUT", "3600"),
            ("SPORE_ALLOW_RAW_COMMANDS", "true"),
        ])
        .unwrap();
        assert_eq!(config.container_engine, "podman");
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.job_timeout, Some(Duration::from_secs(3600)));
        assert!(config.allow_raw_commands);
    }

    #[test]
    fn test_malformed_numbers_are_rejected() {
        assert!(from_pairs(&[("SPORE_LOG_CAPACITY", "lots")]).is_err());
        assert!(from_pairs(&[("SPORE_JOB_TIMEOUT", "-1")]).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());
        config.max_concurrent_jobs = 1;

        config.container_engine = "  ".to_string();
        assert!(config.validate().is_err());
        config.container_engine = "docker".to_string();

        config.job_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
        config.job_timeout = None;

        config.max_retained_jobs = 0;
        assert!(config.validate().is_err());
    }
}
