//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

/// How long a daemon with a good config must stay up to count as serving.
pub const SERVE_GRACE: Duration = Duration::from_millis(1500);

/// Upper bound for a rejected config to make the daemon exit.
pub const EXIT_DEADLINE: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// What the daemon did within the observation window.
#[derive(Debug)]
pub enum Outcome {
    Exited(ExitStatus),
    StillRunning,
}

impl Outcome {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Outcome::Exited(status) => status.code(),
            Outcome::StillRunning => None,
        }
    }
}

/// Write `yaml` to a temporary `.yml` file.
pub fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("astrond-")
        .suffix(".yml")
        .tempfile()
        .expect("create temp config");
    file.write_all(yaml.as_bytes()).expect("write temp config");
    file.flush().expect("flush temp config");
    file
}

fn command(config: &Path, extra_args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_astrond"));
    cmd.args(extra_args)
        .arg(config)
        .env("RUST_LOG", "astrond=debug")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

/// A daemon process that is killed when dropped.
pub struct Daemon {
    child: Child,
    _config: NamedTempFile,
}

impl Daemon {
    pub fn spawn(yaml: &str) -> Self {
        let config = write_config(yaml);
        let child = command(config.path(), &[]).spawn().expect("spawn astrond");
        Self { child, _config: config }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Poll until the process exits or `window` elapses.
    pub fn observe(&mut self, window: Duration) -> Outcome {
        let deadline = Instant::now() + window;
        loop {
            if let Some(status) = self.child.try_wait().expect("poll astrond") {
                return Outcome::Exited(status);
            }
            if Instant::now() >= deadline {
                return Outcome::StillRunning;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Send SIGTERM and wait for the exit status.
    #[cfg(unix)]
    pub fn terminate(&mut self) -> Outcome {
        let status = Command::new("kill")
            .arg("-TERM")
            .arg(self.pid().to_string())
            .status()
            .expect("run kill");
        assert!(status.success(), "kill -TERM failed");
        self.observe(EXIT_DEADLINE)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Run `astrond` on `yaml` and classify the outcome, as a deployment check
/// would: a good config keeps running, a bad one exits.
pub fn run_config(yaml: &str) -> Outcome {
    Daemon::spawn(yaml).observe(SERVE_GRACE)
}

/// Assert that `yaml` is rejected with exit status 1.
pub fn assert_rejected(yaml: &str) {
    let mut daemon = Daemon::spawn(yaml);
    let outcome = daemon.observe(EXIT_DEADLINE);
    assert_eq!(outcome.exit_code(), Some(1), "expected exit status 1, got {outcome:?}");
}

/// Run `astrond --check` and capture its output.
pub fn check_config(yaml: &str) -> Output {
    let config = write_config(yaml);
    let mut cmd = command(config.path(), &["--check"]);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.output().expect("run astrond --check")
}
