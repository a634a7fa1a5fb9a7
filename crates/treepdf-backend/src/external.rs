//! External converter programs
//!
//! A converter program is a filter: it reads the document on standard input
//! and writes PDF to standard output. The declared mime-type is passed in the
//! `TREEPDF_MIME_TYPE` environment variable. A configured spec is either one
//! command line (`/usr/bin/html2pdf --quiet`) or several joined by `|`, which
//! are run one after another with each output fed to the next.

use crate::converter::{Converter, ConverterKind, ConverterStatus};
use crate::error::ConvertError;
use log::{debug, warn};
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use treepdf_core::mime::OCTET_STREAM;

/// Environment variable carrying the declared mime-type
pub const MIME_TYPE_ENV: &str = "TREEPDF_MIME_TYPE";

/// Poll interval while waiting for a converter to exit
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Bytes of standard error kept for messages
const STDERR_TAIL: usize = 1024;

/// Extra wait for standard error after a failed exit
const STDERR_GRACE: Duration = Duration::from_millis(100);

/// One external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalConverter {
    spec: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalConverter {
    /// Converter from a command line `program [args...]`
    ///
    /// Returns `None` for a blank command line.
    #[must_use]
    pub fn new(command_line: &str, timeout: Duration) -> Option<Self> {
        let mut words = command_line.split_whitespace();
        let program = words.next()?.to_string();
        Some(Self {
            spec: command_line.trim().to_string(),
            program,
            args: words.map(str::to_string).collect(),
            timeout,
        })
    }

    /// Program being run
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, data: &[u8], mime_type: &str) -> Result<Vec<u8>, ConvertError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(MIME_TYPE_ENV, mime_type)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout reaches everything it starts
            command.process_group(0);
        }
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConvertError::NotInstalled {
                    program: self.program.clone(),
                })
            }
            Err(source) => return Err(self.spawn_error(source)),
        };
        debug!("Running {} for {mime_type} ({} bytes)", self.spec, data.len());
        let deadline = Instant::now() + self.timeout;

        // Pipes are serviced on detached threads: a converter that writes
        // before reading all input cannot deadlock us, and a descendant that
        // keeps a pipe open cannot hold us past the deadline
        if let Some(mut stdin) = child.stdin.take() {
            let input = data.to_vec();
            thread::spawn(move || {
                // A filter may legitimately stop reading early
                let _ = stdin.write_all(&input);
            });
        }
        let output = spawn_drain(child.stdout.take());
        let errors = spawn_drain(child.stderr.take());

        let status = self.wait(&mut child, deadline)?;
        let output = match output.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(result) => result.map_err(|source| self.spawn_error(source))?,
            Err(_) => {
                warn!("{} left a process holding its output, killing it", self.spec);
                kill_tree(&mut child);
                return Err(self.timed_out());
            }
        };
        if !status.success() {
            let wait = deadline
                .saturating_duration_since(Instant::now())
                .max(STDERR_GRACE);
            let errors = errors
                .recv_timeout(wait)
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            let tail = &errors[errors.len().saturating_sub(STDERR_TAIL)..];
            return Err(ConvertError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
                stderr: String::from_utf8_lossy(tail).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Wait for the child, killing its process group once the deadline passes
    fn wait(&self, child: &mut Child, deadline: Instant) -> Result<ExitStatus, ConvertError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!("{} timed out after {:?}, killing it", self.spec, self.timeout);
                        kill_tree(child);
                        let _ = child.wait(); // Reap zombie
                        return Err(self.timed_out());
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    kill_tree(child);
                    let _ = child.wait();
                    return Err(self.spawn_error(source));
                }
            }
        }
    }

    fn timed_out(&self) -> ConvertError {
        ConvertError::TimedOut {
            program: self.program.clone(),
            timeout_secs: self.timeout.as_secs(),
        }
    }

    fn spawn_error(&self, source: io::Error) -> ConvertError {
        ConvertError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

/// Read a pipe to its end on a detached thread
fn spawn_drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<io::Result<Vec<u8>>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let result = match pipe {
            Some(mut pipe) => pipe.read_to_end(&mut buffer).map(|_| buffer),
            None => Ok(buffer),
        };
        let _ = sender.send(result);
    });
    receiver
}

/// Kill the child and every process in its group
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) only signals; the group was created for this child
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

impl Converter for ExternalConverter {
    fn name(&self) -> &str {
        &self.spec
    }

    fn convert(&self, data: &[u8], mime_type: &str) -> Result<Vec<u8>, ConvertError> {
        self.run(data, mime_type)
    }

    fn status(&self) -> ConverterStatus {
        match which::which(&self.program) {
            Ok(_) => ConverterStatus::Available,
            Err(_) => ConverterStatus::Missing(self.program.clone()),
        }
    }
}

/// Programs run in sequence, each fed the previous output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConverter {
    spec: String,
    stages: Vec<ExternalConverter>,
}

impl PipelineConverter {
    /// Pipeline from `prog1 args | prog2 args`; `None` if a stage is blank
    #[must_use]
    pub fn new(spec: &str, timeout: Duration) -> Option<Self> {
        let stages = spec
            .split('|')
            .map(|stage| ExternalConverter::new(stage, timeout))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            spec: stages
                .iter()
                .map(|s| s.spec.as_str())
                .collect::<Vec<_>>()
                .join(" | "),
            stages,
        })
    }

    /// The programs in order
    #[must_use]
    pub fn stages(&self) -> &[ExternalConverter] {
        &self.stages
    }
}

impl Converter for PipelineConverter {
    fn name(&self) -> &str {
        &self.spec
    }

    /// The first stage sees the declared mime-type, later stages see
    /// `application/octet-stream`
    fn convert(&self, data: &[u8], mime_type: &str) -> Result<Vec<u8>, ConvertError> {
        let mut current = data.to_vec();
        for (index, stage) in self.stages.iter().enumerate() {
            let declared = if index == 0 { mime_type } else { OCTET_STREAM };
            current = stage.run(&current, declared)?;
        }
        Ok(current)
    }

    fn kind(&self) -> ConverterKind {
        ConverterKind::Pipeline
    }

    fn status(&self) -> ConverterStatus {
        self.stages
            .iter()
            .map(Converter::status)
            .find(|status| !status.is_available())
            .unwrap_or(ConverterStatus::Available)
    }
}

/// Build the converter for a configured spec
///
/// Specs containing `|` become a [`PipelineConverter`]. Blank specs and blank
/// pipeline stages yield `None`.
#[must_use]
pub fn converter_from_spec(spec: &str, timeout: Duration) -> Option<Arc<dyn Converter>> {
    if spec.contains('|') {
        PipelineConverter::new(spec, timeout).map(|c| Arc::new(c) as Arc<dyn Converter>)
    } else {
        ExternalConverter::new(spec, timeout).map(|c| Arc::new(c) as Arc<dyn Converter>)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_parse_command_line() {
        let conv = ExternalConverter::new("  /usr/bin/html2pdf --quiet -  ", TIMEOUT).unwrap();
        assert_eq!(conv.program(), "/usr/bin/html2pdf");
        assert_eq!(conv.name(), "/usr/bin/html2pdf --quiet -");
        assert!(ExternalConverter::new("   ", TIMEOUT).is_none());
        assert!(PipelineConverter::new("a | ", TIMEOUT).is_none());
    }

    #[test]
    fn test_filter_roundtrip_and_mime_env() {
        let dir = TempDir::new().unwrap();
        let prog = script(&dir, "echo-mime", "cat; printf '%s' \"$TREEPDF_MIME_TYPE\"");
        let conv = ExternalConverter::new(&prog, TIMEOUT).unwrap();
        let out = conv.convert(b"data:", "text/html").unwrap();
        assert_eq!(out, b"data:text/html");
    }

    #[test]
    fn test_missing_program() {
        let conv = ExternalConverter::new("/nonexistent/any2pdf", TIMEOUT).unwrap();
        assert!(matches!(
            conv.convert(b"x", "text/plain"),
            Err(ConvertError::NotInstalled { .. })
        ));
        assert_eq!(
            conv.status(),
            ConverterStatus::Missing("/nonexistent/any2pdf".to_string())
        );
    }

    #[test]
    fn test_failure_keeps_stderr() {
        let dir = TempDir::new().unwrap();
        let prog = script(&dir, "fail", "echo 'bad input' >&2; exit 3");
        let err = ExternalConverter::new(&prog, TIMEOUT)
            .unwrap()
            .convert(b"x", "text/plain")
            .unwrap_err();
        match err {
            ConvertError::Failed { stderr, .. } => assert_eq!(stderr, "bad input"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_timeout_kills_converter() {
        let dir = TempDir::new().unwrap();
        let prog = script(&dir, "hang", "exec sleep 30");
        let conv = ExternalConverter::new(&prog, Duration::from_millis(200)).unwrap();
        let start = Instant::now();
        assert!(matches!(
            conv.convert(b"", "text/plain"),
            Err(ConvertError::TimedOut { .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_kills_grandchildren() {
        let dir = TempDir::new().unwrap();
        // No exec: the shell waits on a sleep that inherits the pipes
        let prog = script(&dir, "hang-child", "sleep 30");
        let conv = ExternalConverter::new(&prog, Duration::from_millis(200)).unwrap();
        let start = Instant::now();
        assert!(matches!(
            conv.convert(b"", "text/plain"),
            Err(ConvertError::TimedOut { .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_background_process_holding_stdout_times_out() {
        let dir = TempDir::new().unwrap();
        let prog = script(&dir, "detach", "sleep 30 &\nprintf partial");
        let conv = ExternalConverter::new(&prog, Duration::from_millis(300)).unwrap();
        let start = Instant::now();
        assert!(matches!(
            conv.convert(b"", "text/plain"),
            Err(ConvertError::TimedOut { .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_pipeline_feeds_stages() {
        let dir = TempDir::new().unwrap();
        let upper = script(&dir, "upper", "tr a-z A-Z");
        let tag = script(&dir, "tag", "cat; printf '[%s]' \"$TREEPDF_MIME_TYPE\"");
        let spec = format!("{upper} | {tag}");
        let conv = converter_from_spec(&spec, TIMEOUT).unwrap();
        assert_eq!(conv.kind(), ConverterKind::Pipeline);
        assert_eq!(
            conv.convert(b"abc", "text/plain").unwrap(),
            b"ABC[application/octet-stream]"
        );
    }
}
