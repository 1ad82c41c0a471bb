//! Server configuration.
//!
//! Options come from the command line and, optionally, from a redis.conf style
//! file given as the single positional argument. File directives are applied
//! first so command-line flags override them.

use std::{ffi::OsString, path::PathBuf, time::Duration};

use clap::Parser;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_DATABASES: usize = 16;
pub const DEFAULT_BACKLOG_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Cli(#[from] clap::Error),
    #[error("cannot read config file {0}: {1}")]
    ReadConfigFile(String, std::io::Error),
    #[error("invalid directive at line {0} of the config file")]
    InvalidDirective(usize),
    #[error("replicaof expects '<host> <port>', got '{0}'")]
    InvalidReplicaOf(String),
    #[error("databases must be at least 1")]
    InvalidDatabases,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "regis", version, about = "In-memory key-value server", long_about = None)]
#[command(args_override_self = true)]
pub struct Config {
    /// Optional configuration file with one `directive value` per line
    #[arg(value_name = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of logical databases
    #[arg(long, default_value_t = DEFAULT_DATABASES)]
    pub databases: usize,

    /// Directory the snapshot file lives in
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    #[arg(long, default_value = "dump.rdb")]
    pub dbfilename: String,

    /// Replication backlog size, accepts k/kb/m/mb/g/gb suffixes
    #[arg(long, default_value_t = DEFAULT_BACKLOG_SIZE, value_parser = parse_memory)]
    pub repl_backlog_size: usize,

    /// Seconds without any replica before the backlog is released
    #[arg(long, default_value_t = 3600)]
    pub repl_backlog_ttl: u64,

    /// Seconds of silence after which a replication link is considered dead
    #[arg(long, default_value_t = 60)]
    pub repl_timeout: u64,

    #[arg(long, default_value_t = 10)]
    pub repl_ping_replica_period: u64,

    /// Start as a replica of "<host> <port>"
    #[arg(long, alias = "slaveof")]
    pub replicaof: Option<String>,

    #[arg(long, default_value_t = 10000)]
    pub maxclients: usize,

    /// Shadow keys merged back per drain tick
    #[arg(long, default_value_t = 2)]
    pub drain_batch: usize,

    #[arg(long, default_value_t = 100)]
    pub drain_interval_ms: u64,

    #[arg(long, default_value = "info")]
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: None,
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            databases: DEFAULT_DATABASES,
            dir: PathBuf::from("."),
            dbfilename: "dump.rdb".to_string(),
            repl_backlog_size: DEFAULT_BACKLOG_SIZE,
            repl_backlog_ttl: 3600,
            repl_timeout: 60,
            repl_ping_replica_period: 10,
            replicaof: None,
            maxclients: 10000,
            drain_batch: 2,
            drain_interval_ms: 100,
            loglevel: "info".to_string(),
        }
    }
}

impl Config {
    /// Parses the command line, merging in the config file if one is named.
    pub fn load<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let config = Config::try_parse_from(&args)?;

        let Some(path) = &config.config_file else {
            config.validate()?;
            return Ok(config);
        };

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadConfigFile(path.display().to_string(), e))?;

        let mut merged: Vec<OsString> = vec![args
            .first()
            .cloned()
            .unwrap_or_else(|| OsString::from("regis"))];
        merged.extend(directives_to_args(&contents)?);
        merged.extend(args.into_iter().skip(1));

        let config = Config::try_parse_from(merged)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.databases == 0 {
            return Err(ConfigError::InvalidDatabases);
        }

        self.replica_of()?;
        Ok(())
    }

    pub fn replica_of(&self) -> Result<Option<(String, u16)>, ConfigError> {
        let Some(value) = &self.replicaof else {
            return Ok(None);
        };

        let parts: Vec<&str> = value.split_whitespace().collect();

        match parts.as_slice() {
            [host, port] => port
                .parse::<u16>()
                .map(|port| Some((host.to_string(), port)))
                .map_err(|_| ConfigError::InvalidReplicaOf(value.clone())),
            _ => Err(ConfigError::InvalidReplicaOf(value.clone())),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }

    pub fn repl_timeout(&self) -> Duration {
        Duration::from_secs(self.repl_timeout)
    }

    pub fn repl_ping_period(&self) -> Duration {
        Duration::from_secs(self.repl_ping_replica_period)
    }

    pub fn repl_backlog_ttl(&self) -> Duration {
        Duration::from_secs(self.repl_backlog_ttl)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

fn directives_to_args(contents: &str) -> Result<Vec<OsString>, ConfigError> {
    let mut args = Vec::new();

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(directive) = parts.next() else {
            continue;
        };

        let value = parts.collect::<Vec<&str>>().join(" ");

        if value.is_empty() {
            return Err(ConfigError::InvalidDirective(number + 1));
        }

        let directive = match directive.to_lowercase().as_str() {
            "slaveof" => "replicaof".to_string(),
            other => other.to_string(),
        };

        args.push(OsString::from(format!("--{}", directive)));
        args.push(OsString::from(value.trim_matches('"')));
    }

    Ok(args)
}

fn parse_memory(value: &str) -> Result<usize, String> {
    let lower = value.to_lowercase();
    let split = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);

    let number = number
        .parse::<usize>()
        .map_err(|_| format!("invalid memory amount '{}'", value))?;

    let multiplier = match unit {
        "" | "b" => 1,
        "k" => 1000,
        "kb" => 1024,
        "m" => 1000 * 1000,
        "mb" => 1024 * 1024,
        "g" => 1000 * 1000 * 1000,
        "gb" => 1024 * 1024 * 1024,
        _ => return Err(format!("invalid memory unit in '{}'", value)),
    };

    Ok(number * multiplier)
}
