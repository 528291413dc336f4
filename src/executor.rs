use crate::{cancel::CancelToken, cluster::HostConfig, system::System};
use anyhow::{Context, Result, bail};
use log::{debug, trace};
use std::{path::PathBuf, process::Command};

const DEFAULT_SSH_PORT: u16 = 22;

/// Runs shell commands on a single node
pub trait RemoteExecutor {
    /// Execute the command and return its captured stdout and stderr. The
    /// command is aborted once the token gets cancelled.
    fn run_raw(&self, command: &str, cancel: &CancelToken) -> Result<(String, String)>;
}

/// Opens a command executor for a node
pub trait Connector {
    /// Connect to the provided host
    fn connect(&self, host: &HostConfig) -> Result<Box<dyn RemoteExecutor>>;
}

/// Global SSH defaults, overridable per host
#[derive(Clone, Debug)]
pub struct SshConnector {
    executable: PathBuf,
    user: String,
    private_key_file: Option<PathBuf>,
}

impl SshConnector {
    /// Create a new connector using the system `ssh` client
    pub fn new(user: &str, private_key_file: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            executable: System::find_executable("ssh")?,
            user: user.into(),
            private_key_file,
        })
    }

    /// The `ssh` arguments for the host, the remote side reads the script
    /// from stdin
    fn args(&self, host: &HostConfig) -> Result<Vec<String>> {
        if host.public_address.is_empty() {
            bail!("Host #{} has no public address", host.id)
        }
        let user = host.ssh_username.as_deref().unwrap_or(&self.user);

        let mut args = vec![
            "-o".to_owned(),
            "BatchMode=yes".to_owned(),
            "-o".to_owned(),
            "StrictHostKeyChecking=accept-new".to_owned(),
            "-p".to_owned(),
            host.ssh_port.unwrap_or(DEFAULT_SSH_PORT).to_string(),
        ];
        if let Some(key) = host
            .ssh_private_key_file
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| self.private_key_file.clone())
        {
            args.push("-i".to_owned());
            args.push(key.display().to_string());
        }
        if let Some(bastion) = &host.bastion {
            args.push("-J".to_owned());
            args.push(bastion.clone());
        }
        args.push(format!("{}@{}", user, host.public_address));
        args.push("bash".to_owned());
        args.push("-s".to_owned());
        Ok(args)
    }
}

impl Connector for SshConnector {
    fn connect(&self, host: &HostConfig) -> Result<Box<dyn RemoteExecutor>> {
        Ok(Box::new(SshExecutor {
            executable: self.executable.clone(),
            address: host.public_address.clone(),
            args: self.args(host)?,
        }))
    }
}

/// Executes commands on a node via `ssh`, the script is passed via stdin
pub struct SshExecutor {
    executable: PathBuf,
    address: String,
    args: Vec<String>,
}

impl RemoteExecutor for SshExecutor {
    fn run_raw(&self, command: &str, cancel: &CancelToken) -> Result<(String, String)> {
        trace!("Running on {}: {}", self.address, command);
        let output = System::run(
            Command::new(&self.executable).args(&self.args),
            Some(command),
            cancel,
        )
        .with_context(|| format!("Unable to run command on {}", self.address))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            debug!("{} stdout: {}", self.address, stdout);
            bail!(
                "Command failed on {} ({}): {}",
                self.address,
                output.status,
                stderr.trim()
            );
        }
        Ok((stdout, stderr))
    }
}
