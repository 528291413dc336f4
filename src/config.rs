//! Configuration related structures
use crate::{
    error::MigrationError,
    poll::{PollPolicy, Timings},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{fs::read_to_string, path::PathBuf, time::Duration};

#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
#[serde(default, rename_all = "kebab-case")]
#[command(
    after_help = "The migration is done in two phases: run `start` first, roll out all \
                  worker machines and run `complete` afterwards.",
    version
)]
/// The global configuration
pub struct Config {
    #[serde(skip)]
    #[command(subcommand)]
    /// The migration phase to be run
    subcommand: Option<SubCommand>,

    #[serde(skip)]
    #[arg(env = "CCMIGRATE_SETTINGS", long, value_name = "PATH")]
    /// TOML file whose values replace the command line settings
    settings: Option<PathBuf>,

    #[arg(
        default_value = "kubeone.yaml",
        env = "CCMIGRATE_MANIFEST",
        global = true,
        long,
        short = 'm',
        value_name = "PATH"
    )]
    /// The cluster manifest
    manifest: PathBuf,

    #[arg(
        default_value = "kubeconfig",
        env = "CCMIGRATE_KUBECONFIG",
        global = true,
        long,
        short = 'k',
        value_name = "PATH"
    )]
    /// The admin kubeconfig of the cluster
    kubeconfig: PathBuf,

    #[arg(
        default_value = "./kubeone",
        env = "CCMIGRATE_WORK_DIR",
        global = true,
        long,
        value_name = "PATH"
    )]
    /// The work directory on the control plane nodes
    work_dir: String,

    #[arg(
        default_value = "root",
        env = "CCMIGRATE_SSH_USER",
        global = true,
        long,
        value_name = "USER"
    )]
    /// The default SSH login name
    ssh_user: String,

    #[arg(env = "CCMIGRATE_SSH_KEY", global = true, long, value_name = "PATH")]
    /// The default SSH private key file
    ssh_key: Option<PathBuf>,

    #[arg(
        default_value = "info",
        env = "CCMIGRATE_LOG_LEVEL",
        global = true,
        long,
        short = 'l',
        value_name = "LEVEL",
        value_parser = ["trace", "debug", "info", "warn", "error", "off"]
    )]
    /// The logging level of the application
    log_level: String,

    #[arg(env = "CCMIGRATE_VERBOSE", global = true, long, short = 'v')]
    /// Log every poll attempt and run kubeadm verbosely
    verbose: bool,

    #[arg(
        default_value_t = 30,
        env = "CCMIGRATE_SETTLE_SECONDS",
        global = true,
        long,
        value_name = "SECONDS"
    )]
    /// Grace period for the kubelet to pick up regenerated manifests
    settle_seconds: u64,

    #[arg(
        default_value_t = 5,
        env = "CCMIGRATE_POLL_INTERVAL_SECONDS",
        global = true,
        long,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    /// Interval between two health checks
    poll_interval_seconds: u64,

    #[arg(
        default_value_t = 120,
        env = "CCMIGRATE_ROLLOUT_TIMEOUT_SECONDS",
        global = true,
        long,
        value_name = "SECONDS"
    )]
    /// Budget for static pods and the kubelet to become healthy
    rollout_timeout_seconds: u64,

    #[arg(
        default_value_t = 300,
        env = "CCMIGRATE_DRAIN_TIMEOUT_SECONDS",
        global = true,
        long,
        value_name = "SECONDS"
    )]
    /// Budget for draining a single node
    drain_timeout_seconds: u64,
}

/// Possible subcommands
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, Subcommand)]
pub enum SubCommand {
    /// Start the migration by switching the control plane nodes
    Start,

    /// Complete the migration after all worker machines have been rolled out
    Complete,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subcommand: None,
            settings: None,
            manifest: "kubeone.yaml".into(),
            kubeconfig: "kubeconfig".into(),
            work_dir: "./kubeone".into(),
            ssh_user: "root".into(),
            ssh_key: None,
            log_level: "info".into(),
            verbose: false,
            settle_seconds: 30,
            poll_interval_seconds: 5,
            rollout_timeout_seconds: 120,
            drain_timeout_seconds: 300,
        }
    }
}

impl Config {
    /// Parse the command line and apply the settings file if provided
    pub fn from_args() -> Result<Self> {
        let mut config = Self::parse();
        config.try_load_file()?;
        Ok(config)
    }

    /// Replace the current values by the settings file, if set. The
    /// subcommand is kept.
    pub fn try_load_file(&mut self) -> Result<()> {
        let file = match self.settings.clone() {
            Some(file) => file,
            None => return Ok(()),
        };
        let subcommand = self.subcommand;
        *self = toml::from_str(&read_to_string(&file).with_context(|| {
            format!(
                "Unable to read expected settings file '{}'",
                file.display(),
            )
        })?)
        .with_context(|| format!("Unable to load settings file '{}'", file.display()))?;
        if self.poll_interval_seconds == 0 {
            return Err(MigrationError::configuration(
                "poll interval must be at least one second",
            ))
            .with_context(|| format!("Invalid settings file '{}'", file.display()));
        }
        self.subcommand = subcommand;
        self.settings = Some(file);
        Ok(())
    }

    /// The selected migration phase
    pub fn subcommand(&self) -> Option<SubCommand> {
        self.subcommand
    }

    /// The cluster manifest
    pub fn manifest(&self) -> &PathBuf {
        &self.manifest
    }

    /// The admin kubeconfig
    pub fn kubeconfig(&self) -> &PathBuf {
        &self.kubeconfig
    }

    /// The remote work directory
    pub fn work_dir(&self) -> &str {
        &self.work_dir
    }

    /// The default SSH login name
    pub fn ssh_user(&self) -> &str {
        &self.ssh_user
    }

    /// The default SSH private key
    pub fn ssh_key(&self) -> Option<&PathBuf> {
        self.ssh_key.as_ref()
    }

    /// The log level, falling back to info for unknown values
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    /// Verbose mode
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// All waiting related durations
    pub fn timings(&self) -> Timings {
        Timings {
            settle: Duration::from_secs(self.settle_seconds),
            poll: PollPolicy {
                interval: Duration::from_secs(self.poll_interval_seconds),
                timeout: Duration::from_secs(self.rollout_timeout_seconds),
            },
            drain: Duration::from_secs(self.drain_timeout_seconds),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::{fs, path::Path};
    use tempfile::tempdir;

    #[test]
    fn parse_defaults() {
        let c = Config::parse_from(["ccmigrate", "start"]);
        assert_eq!(c.subcommand(), Some(SubCommand::Start));
        assert_eq!(c.manifest(), Path::new("kubeone.yaml"));
        assert_eq!(c.log_level(), LevelFilter::Info);
        assert_eq!(c.timings(), Timings::default());
        assert!(!c.verbose());
    }

    #[test]
    fn parse_global_args_after_subcommand() {
        let c = Config::parse_from([
            "ccmigrate",
            "complete",
            "--manifest=cluster.yaml",
            "--log-level=debug",
            "--verbose",
            "--rollout-timeout-seconds=10",
        ]);
        assert_eq!(c.subcommand(), Some(SubCommand::Complete));
        assert_eq!(c.manifest(), Path::new("cluster.yaml"));
        assert_eq!(c.log_level(), LevelFilter::Debug);
        assert!(c.verbose());
        assert_eq!(c.timings().poll.timeout, Duration::from_secs(10));
    }

    #[test]
    fn parse_failure_invalid_level() {
        assert!(Config::try_parse_from(["ccmigrate", "--log-level=loud", "start"]).is_err());
    }

    #[test]
    fn try_load_file_success() -> Result<()> {
        let d = tempdir()?;
        let file = d.path().join("ccmigrate.toml");
        fs::write(
            &file,
            r#"
manifest = "prod.yaml"
kubeconfig = "prod.kubeconfig"
ssh-user = "ubuntu"
settle-seconds = 60
"#,
        )?;
        let mut c = Config::parse_from(["ccmigrate", "start"]);
        c.settings = Some(file);
        c.try_load_file()?;

        assert_eq!(c.subcommand(), Some(SubCommand::Start));
        assert_eq!(c.manifest(), Path::new("prod.yaml"));
        assert_eq!(c.ssh_user(), "ubuntu");
        assert_eq!(c.timings().settle, Duration::from_secs(60));
        assert_eq!(c.work_dir(), "./kubeone");
        Ok(())
    }

    #[test]
    fn try_load_file_failure() -> Result<()> {
        let d = tempdir()?;
        let file = d.path().join("ccmigrate.toml");
        fs::write(&file, "invalid")?;
        let mut c = Config::default();
        c.settings = Some(file);
        assert!(c.try_load_file().is_err());
        Ok(())
    }

    #[test]
    fn parse_failure_zero_poll_interval() {
        assert!(
            Config::try_parse_from(["ccmigrate", "--poll-interval-seconds=0", "start"]).is_err()
        );
    }

    #[test]
    fn try_load_file_failure_zero_poll_interval() -> Result<()> {
        let d = tempdir()?;
        let file = d.path().join("ccmigrate.toml");
        fs::write(&file, "poll-interval-seconds = 0\n")?;
        let mut c = Config::default();
        c.settings = Some(file);
        let err = c.try_load_file().unwrap_err();
        assert!(matches!(
            MigrationError::find(&err),
            Some(MigrationError::Configuration(_))
        ));
        Ok(())
    }

    #[test]
    fn try_load_file_not_set() -> Result<()> {
        let mut c = Config::default();
        c.try_load_file()?;
        assert!(c.settings.is_none());
        Ok(())
    }
}
