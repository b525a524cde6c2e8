//! Preparation runner: invokes the external build tool for a target set.

use crate::config::BuildSetupConfig;
use crate::core::resolver::ConfiguredTarget;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// How a build invocation ended.
#[derive(Debug, Clone)]
pub enum ExitStatus {
    /// The process exited normally with the given code.
    Terminated(i32),
    /// The process was killed by a signal (unix only).
    Signalled(i32),
    /// The process ended in a way that doesn't fit the other variants.
    Abnormal,
}

/// Result of preparing one target.
#[derive(Debug, Clone)]
pub struct PreparationResult {
    /// The target that was built.
    pub target: ConfiguredTarget,
    /// How the subprocess ended.
    pub status: ExitStatus,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether this result followed an observed cancellation request.
    pub was_cancelled: bool,
}

/// Launches the external build tool for one target. Implementations must
/// translate cancellation into an interrupt signal to the child and await
/// its exit rather than killing it outright, so partial build output is
/// not left corrupted.
#[async_trait]
pub trait PreparationRunner: Send + Sync {
    /// Build `target` with the given workspace root, scratch path, and
    /// toolchain name. `cancel` is polled while the child runs.
    async fn prepare(
        &self,
        toolchain: &str,
        workspace_root: &PathBuf,
        target: &ConfiguredTarget,
        build_setup: &BuildSetupConfig,
        cancel: &crate::core::scheduler::CancellationToken,
    ) -> PreparationResult;
}

/// Real runner: spawns `<toolchain> build --package-path <ws> --scratch-path
/// <scratch> --disable-index-store --target <target_id>`.
#[derive(Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    /// Construct a runner that shells out to the real toolchain binary.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PreparationRunner for SubprocessRunner {
    async fn prepare(
        &self,
        toolchain: &str,
        workspace_root: &PathBuf,
        target: &ConfiguredTarget,
        build_setup: &BuildSetupConfig,
        cancel: &crate::core::scheduler::CancellationToken,
    ) -> PreparationResult {
        let scratch = build_setup
            .scratch_path
            .clone()
            .unwrap_or_else(|| workspace_root.join(".semindex-scratch"));

        let mut command = Command::new(toolchain);
        command
            .arg("build")
            .arg("--package-path")
            .arg(workspace_root)
            .arg("--scratch-path")
            .arg(&scratch)
            .arg("--disable-index-store")
            .arg("--target")
            .arg(&target.target_id)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                log::error!("preparation: failed to spawn {}: {}", toolchain, err);
                return PreparationResult {
                    target: target.clone(),
                    status: ExitStatus::Abnormal,
                    stdout: String::new(),
                    stderr: err.to_string(),
                    was_cancelled: false,
                };
            }
        };

        let pid = child.id();
        let was_cancelled = Arc::new(AtomicBool::new(false));
        let watcher_cancelled = Arc::clone(&was_cancelled);
        let watcher_cancel = cancel.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if watcher_cancel.is_cancelled() {
                    watcher_cancelled.store(true, Ordering::SeqCst);
                    if let Some(pid) = pid {
                        send_interrupt(pid);
                    }
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        });

        // Drain stdout and stderr concurrently: a build tool that fills one
        // pipe's buffer while writing to the other would otherwise block on
        // the unread stream, so reading stdout to EOF before touching
        // stderr (or vice versa) can deadlock against the child itself.
        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_read = async {
            if let Some(out) = stdout_pipe.as_mut() {
                let _ = out.read_to_string(&mut stdout_buf).await;
            }
        };
        let stderr_read = async {
            if let Some(err) = stderr_pipe.as_mut() {
                let _ = err.read_to_string(&mut stderr_buf).await;
            }
        };
        tokio::join!(stdout_read, stderr_read);

        let exit = child.wait().await;
        watcher.abort();
        let cancelled = was_cancelled.load(Ordering::SeqCst);

        let status = match exit {
            Ok(status) => classify_exit(status),
            Err(err) => {
                log::error!("preparation: failed to await {}: {}", toolchain, err);
                ExitStatus::Abnormal
            }
        };

        match &status {
            ExitStatus::Terminated(0) => {
                log::debug!("preparation: {} finished for {:?}", toolchain, target);
            }
            ExitStatus::Terminated(code) => {
                log::debug!("preparation: {} exited {} for {:?}", toolchain, code, target);
            }
            ExitStatus::Signalled(sig) if !cancelled => {
                log::error!("preparation: {} killed by signal {} for {:?}", toolchain, sig, target);
            }
            ExitStatus::Abnormal if !cancelled => {
                log::error!("preparation: {} terminated abnormally for {:?}", toolchain, target);
            }
            _ => {}
        }

        PreparationResult {
            target: target.clone(),
            status,
            stdout: stdout_buf,
            stderr: stderr_buf,
            was_cancelled: cancelled,
        }
    }
}

#[cfg(unix)]
fn classify_exit(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => ExitStatus::Terminated(code),
        None => match status.signal() {
            Some(sig) => ExitStatus::Signalled(sig),
            None => ExitStatus::Abnormal,
        },
    }
}

#[cfg(not(unix))]
fn classify_exit(status: std::process::ExitStatus) -> ExitStatus {
    match status.code() {
        Some(code) => ExitStatus::Terminated(code),
        None => ExitStatus::Abnormal,
    }
}

#[cfg(unix)]
fn send_interrupt(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGINT);
    }
}

#[cfg(windows)]
fn send_interrupt(pid: u32) {
    unsafe {
        winapi::um::wincon::GenerateConsoleCtrlEvent(
            winapi::um::wincon::CTRL_C_EVENT,
            pid,
        );
    }
}

/// In-memory runner for tests and the demo binary: records every call and
/// returns a scripted result without spawning a real process.
#[derive(Clone, Default)]
pub struct FakePreparationRunner {
    calls: Arc<Mutex<Vec<ConfiguredTarget>>>,
    result: Arc<Mutex<Option<ExitStatus>>>,
    call_count: Arc<AtomicUsize>,
    fail_until_cancelled: Arc<AtomicBool>,
}

impl FakePreparationRunner {
    /// A runner that always reports `Terminated(0)`.
    pub fn succeeding() -> Self {
        Self {
            result: Arc::new(Mutex::new(Some(ExitStatus::Terminated(0)))),
            ..Default::default()
        }
    }

    /// A runner whose `prepare` call spins until `cancel` is observed,
    /// returning `Abnormal` with `was_cancelled = true`. Used to exercise
    /// the scheduler's subsume-and-reschedule path against a preparation
    /// task without a real subprocess.
    pub fn spins_until_cancelled() -> Self {
        Self {
            fail_until_cancelled: Arc::new(AtomicBool::new(true)),
            ..Default::default()
        }
    }

    /// Targets this runner was asked to prepare, in call order.
    pub fn calls(&self) -> Vec<ConfiguredTarget> {
        self.calls.lock().unwrap().clone()
    }

    /// Total number of `prepare` invocations.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreparationRunner for FakePreparationRunner {
    async fn prepare(
        &self,
        _toolchain: &str,
        _workspace_root: &PathBuf,
        target: &ConfiguredTarget,
        _build_setup: &BuildSetupConfig,
        cancel: &crate::core::scheduler::CancellationToken,
    ) -> PreparationResult {
        self.calls.lock().unwrap().push(target.clone());
        let call_index = self.call_count.fetch_add(1, Ordering::SeqCst);

        // Only the first call actually spins; a task rescheduled after
        // being cancelled completes normally on its next attempt, mirroring
        // how a real build would resume rather than repeat indefinitely.
        if call_index == 0 && self.fail_until_cancelled.load(Ordering::SeqCst) {
            loop {
                if cancel.is_cancelled() {
                    return PreparationResult {
                        target: target.clone(),
                        status: ExitStatus::Abnormal,
                        stdout: String::new(),
                        stderr: String::new(),
                        was_cancelled: true,
                    };
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }

        let status = self
            .result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(ExitStatus::Terminated(0));
        PreparationResult {
            target: target.clone(),
            status,
            stdout: String::new(),
            stderr: String::new(),
            was_cancelled: false,
        }
    }
}
