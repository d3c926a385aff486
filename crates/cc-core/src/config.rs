//! Startup configuration: a TOML file merged with CLI overrides, the way
//! this server's config layer has always worked — `clap` parses the command
//! line, `serde`+`toml` parse the file, and CLI flags win when both are set.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use cc_store::DomainConfig;

#[derive(Debug, Parser)]
#[command(name = "cybercached", about = "CyberCache Core cache server engine")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listening address override (host:port); the wire-protocol listener
    /// itself is out of this crate's scope, but the dispatcher reports it.
    #[arg(long)]
    pub bind: Option<String>,

    /// Override the log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run one health check against a running instance and exit. Not
    /// implemented at this layer — reserved for the network front-end.
    #[arg(long)]
    pub healthcheck: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub bind: String,
    pub log_level: String,
    pub session: DomainConfig,
    pub fpc: DomainConfig,
    /// How often the main dispatcher samples CPU load to rebucket the
    /// optimizers' pass budgets.
    pub load_sample_interval_ms: u64,
    /// How often the optimizer idle-ticks to run maintenance passes when no
    /// new messages arrive.
    pub optimizer_idle_tick_ms: u64,
    /// How often the main dispatcher asks each domain to persist its store
    /// to disk. Zero disables the auto-save timer.
    pub auto_save_interval_secs: u64,
    pub queue_capacity: u32,
    pub queue_max_capacity: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8120".to_string(),
            log_level: "info".to_string(),
            session: DomainConfig::default(),
            fpc: DomainConfig::default(),
            load_sample_interval_ms: 1_000,
            optimizer_idle_tick_ms: 250,
            auto_save_interval_secs: 0,
            queue_capacity: 256,
            queue_max_capacity: 65_536,
        }
    }
}

impl CoreConfig {
    pub fn load(cli: &Cli) -> crate::error::CoreResult<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)
                    .map_err(|e| crate::error::CoreError::Config(format!("{path:?}: {e}")))?
            }
            None => Self::default(),
        };

        if let Some(bind) = &cli.bind {
            config.bind = bind.clone();
        }
        if let Some(level) = &cli.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }

    #[must_use]
    pub fn optimizer_idle_tick(&self) -> Duration {
        Duration::from_millis(self.optimizer_idle_tick_ms)
    }

    #[must_use]
    pub fn auto_save_interval(&self) -> Option<Duration> {
        (self.auto_save_interval_secs > 0)
            .then(|| Duration::from_secs(self.auto_save_interval_secs))
    }

    #[must_use]
    pub fn queue_config(&self) -> cc_queue::QueueConfig {
        cc_queue::QueueConfig::new(self.queue_capacity, self.queue_max_capacity)
    }
}
