//src/process.rs

use std::env;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{PcfError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 5;

/// An external executable plus the policy it is run under.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    pub program: PathBuf,
    pub timeout: Option<Duration>,
    pub retries: u32,
}

/// Result of one finished invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last few non-empty stderr lines, for error messages.
    pub fn stderr_tail(&self) -> String {
        let tail: Vec<&str> = self
            .stderr
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = tail.len().saturating_sub(STDERR_TAIL_LINES);
        tail[start..].join(" | ")
    }
}

impl ExternalTool {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            timeout: None,
            retries: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>, retries: u32) -> Self {
        self.timeout = timeout;
        self.retries = retries;
        self
    }

    pub fn name(&self) -> String {
        self.program.display().to_string()
    }

    /// Fails with `ToolUnavailable` unless the program resolves to an
    /// executable file, either as given or through `PATH`.
    pub fn check_available(&self) -> Result<PathBuf> {
        locate_executable(&self.program).ok_or_else(|| PcfError::ToolUnavailable {
            tool: self.name(),
            reason: "not found on PATH".to_string(),
        })
    }

    /// Pins the program to the absolute path it resolves to from the current
    /// directory. Tools are launched from the work directory, where a
    /// relative path would point somewhere else.
    pub fn resolve(mut self) -> Result<Self> {
        let found = self.check_available()?;
        self.program = absolute(&found)?;
        Ok(self)
    }

    /// Runs the tool in `cwd`, retrying timed-out attempts. Does not
    /// interpret the exit status; see [`ExternalTool::run_checked`].
    pub fn run<S: AsRef<str>>(&self, args: &[S], cwd: &Path) -> Result<ProcessOutput> {
        let mut attempt = 0;
        loop {
            match self.run_once(args, cwd) {
                Err(PcfError::ToolTimeout { tool, after }) if attempt < self.retries => {
                    attempt += 1;
                    log::warn!(
                        "{} timed out after {:?}, retrying ({}/{})",
                        tool,
                        after,
                        attempt,
                        self.retries
                    );
                }
                other => return other,
            }
        }
    }

    /// Like [`ExternalTool::run`] but a non-zero exit becomes `ToolFailed`.
    pub fn run_checked<S: AsRef<str>>(&self, args: &[S], cwd: &Path) -> Result<ProcessOutput> {
        let output = self.run(args, cwd)?;
        if !output.success() {
            return Err(PcfError::ToolFailed {
                tool: self.name(),
                status: output.status.to_string(),
                stderr: output.stderr_tail(),
            });
        }
        Ok(output)
    }

    fn run_once<S: AsRef<str>>(&self, args: &[S], cwd: &Path) -> Result<ProcessOutput> {
        let started = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(args.iter().map(|a| a.as_ref()))
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => PcfError::ToolUnavailable {
                    tool: self.name(),
                    reason: e.to_string(),
                },
                _ => PcfError::Io(e),
            })?;

        // Drain both pipes on their own threads so a chatty tool can't block.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PcfError::ToolTimeout {
                        tool: self.name(),
                        after: limit,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = ProcessOutput {
            status,
            stdout: stdout.map(join_drain).unwrap_or_default(),
            stderr: stderr.map(join_drain).unwrap_or_default(),
            duration: started.elapsed(),
        };

        log::debug!(
            "{} {} finished with {} in {:?}",
            self.name(),
            args.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" "),
            output.status,
            output.duration
        );
        if !output.stdout.is_empty() {
            log::debug!("{} stdout:\n{}", self.name(), output.stdout.trim_end());
        }
        if !output.stderr.is_empty() {
            log::debug!("{} stderr:\n{}", self.name(), output.stderr.trim_end());
        }
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_drain(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Joins a relative path onto the current directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir()?.join(path))
}

/// Resolves `program` the way a shell would: paths with a separator are
/// taken as-is, bare names are searched on `PATH`.
pub fn locate_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return is_executable(program).then(|| program.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
