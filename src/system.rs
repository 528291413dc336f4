use crate::{cancel::CancelToken, error::MigrationError};
use anyhow::{Context, Result, anyhow};
use std::{
    env::{split_paths, var_os},
    fmt::Display,
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    thread::{JoinHandle, spawn},
    time::Duration,
};

const WAIT_INTERVAL: Duration = Duration::from_millis(20);

pub struct System;

impl System {
    /// Find an executable inside the current $PATH environment
    pub fn find_executable<P>(name: P) -> Result<PathBuf>
    where
        P: AsRef<Path> + Display,
    {
        var_os("PATH")
            .and_then(|paths| {
                split_paths(&paths)
                    .filter_map(|dir| {
                        let full_path = dir.join(&name);
                        if full_path.is_file() {
                            Some(full_path)
                        } else {
                            None
                        }
                    })
                    .next()
            })
            .with_context(|| format!("Unable to find {} in $PATH", name))
    }

    /// Run the command to completion, feeding `stdin` if provided. The child
    /// gets killed as soon as the token is cancelled.
    pub fn run(command: &mut Command, stdin: Option<&str>, cancel: &CancelToken) -> Result<Output> {
        cancel.check()?;
        let mut child = command
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Unable to spawn {:?}", command.get_program()))?;

        if let Some(input) = stdin {
            child
                .stdin
                .take()
                .context("No stdin for child process")?
                .write_all(input.as_bytes())?;
        }
        let stdout = Self::collect(child.stdout.take());
        let stderr = Self::collect(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.sleep(WAIT_INTERVAL).is_err() {
                child.kill().ok();
                child.wait().ok();
                return Err(MigrationError::Cancelled.into());
            }
        };

        Ok(Output {
            status,
            stdout: Self::join(stdout)?,
            stderr: Self::join(stderr)?,
        })
    }

    fn collect<R: Read + Send + 'static>(
        pipe: Option<R>,
    ) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
        pipe.map(|mut p| {
            spawn(move || {
                let mut buf = Vec::new();
                p.read_to_end(&mut buf).map(|_| buf)
            })
        })
    }

    fn join(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
        match handle {
            Some(h) => Ok(h
                .join()
                .map_err(|_| anyhow!("Output reader thread panicked"))??),
            None => Ok(Vec::new()),
        }
    }
}
