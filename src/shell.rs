//! External command execution.
//!
//! Commands are explicit program + argument lists ([`CommandSpec`]), never
//! shell strings. [`Shell`] is the seam the snapshot builder uses for the
//! `bin/magento` dump/import triggers.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{DeployError, Result};

/// How often a child with a deadline is polled
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory (None = inherit)
    pub cwd: Option<PathBuf>,
    /// Extra environment, kept out of the display form
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `php bin/magento <args..>` run from the Magento root
    pub fn magento<I, S>(magento_root: &Path, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("php")
            .arg("bin/magento")
            .args(args)
            .current_dir(magento_root)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs a command to completion, failing on non-zero exit
pub trait Shell {
    /// Returns trimmed stdout on success
    fn execute(&self, command: &CommandSpec) -> Result<String>;
}

/// [`Shell`] backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessShell {
    /// Kill and fail a command that runs longer than this
    pub timeout: Option<Duration>,
}

impl ProcessShell {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Shell for ProcessShell {
    fn execute(&self, command: &CommandSpec) -> Result<String> {
        run_command(command, self.timeout)
    }
}

/// Run a command, capturing output. A non-zero exit, a spawn failure or an
/// expired deadline is an error.
pub fn run_command(spec: &CommandSpec, timeout: Option<Duration>) -> Result<String> {
    debug!(command = %spec, "running");

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }
    command.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let mut child = command.spawn().map_err(|source| DeployError::CommandSpawn {
        command: spec.to_string(),
        source,
    })?;

    // Drain pipes on their own threads so a chatty child cannot block on a full pipe
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let start = Instant::now();
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if start.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(DeployError::CommandTimedOut {
                        command: spec.to_string(),
                        timeout: limit,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };

    let stdout = stdout.map(join_output).unwrap_or_default();
    let stderr = stderr.map(join_output).unwrap_or_default();

    if !status.success() {
        let stderr = if stderr.trim().is_empty() { &stdout } else { &stderr };
        return Err(DeployError::CommandFailed {
            command: spec.to_string(),
            code: status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(stdout.trim().to_string())
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_output(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}
