//! Running primer3 as a child process
//!
//! primer3 is launched with a settings file, an input file and output/error
//! paths, then polled for exit. While it runs, a poller thread periodically
//! copies the partial output aside, counts the finished records and
//! publishes a progress estimate. The copy is a best-effort read of a file
//! that primer3 is still writing; any failure just drops that sample.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::binary_paths::ToolLocation;
use crate::control::RunControl;
use crate::primer_response::count_responses;
use crate::progress::ProgressHandle;

/// Default interval between progress samples.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

const EXIT_POLL: Duration = Duration::from_millis(50);

/// Files and parameters for one primer3 invocation.
#[derive(Debug, Clone)]
pub struct Primer3Job {
    pub settings_file: PathBuf,
    pub request: PathBuf,
    pub response: PathBuf,
    pub error_log: PathBuf,
    pub progress_copy: PathBuf,
    /// Number of records in the request, for the progress fraction
    pub expected_records: usize,
    pub progress_interval: Duration,
}

impl Primer3Job {
    pub fn arguments(&self) -> Vec<String> {
        vec![
            format!("-p3_settings_file={}", self.settings_file.display()),
            format!("-output={}", self.response.display()),
            format!("-error={}", self.error_log.display()),
            self.request.display().to_string(),
        ]
    }
}

/// How the child process ended.
#[derive(Debug)]
pub enum ToolExit {
    Finished(ExitStatus),
    /// Killed because the run was cancelled
    Cancelled,
    /// Killed on a skip request; the partial output is kept
    Skipped,
}

// Kills the child if it is still running when dropped
struct ChildGuard {
    child: Child,
}

impl ChildGuard {
    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            log::debug!("[primer3] kill failed: {e}");
        }
        let _ = self.child.wait();
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            self.kill();
        }
    }
}

struct ProgressPoller {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressPoller {
    fn start(job: &Primer3Job, progress: ProgressHandle) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let response = job.response.clone();
        let copy = job.progress_copy.clone();
        let expected = job.expected_records;
        let interval = job.progress_interval;

        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => sample(&response, &copy, expected, &progress),
                _ => break,
            }
        });

        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn sample(response: &Path, copy: &Path, expected: usize, progress: &ProgressHandle) {
    let counted = fs::copy(response, copy)
        .context("copy failed")
        .and_then(|_| count_responses(copy));
    match counted {
        Ok((valid, total)) => {
            if expected > 0 {
                progress.set_fraction(total as f64 / expected as f64);
            }
            progress.set_details(format!("{valid}/{total} sequences with primers"));
        }
        Err(e) => log::debug!("[primer3] Progress sample dropped: {e:#}"),
    }
    let _ = fs::remove_file(copy);
}

fn spawn(location: &ToolLocation, job: &Primer3Job) -> Result<Child> {
    let mut attempts = 0;
    loop {
        let result = Command::new(&location.executable)
            .args(job.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match result {
            // A freshly written executable can still be open for writing
            #[cfg(unix)]
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) && attempts < 10 => {
                attempts += 1;
                thread::sleep(Duration::from_millis(20));
            }
            other => {
                return other.with_context(|| {
                    format!("Failed to start {}", location.executable.display())
                })
            }
        }
    }
}

/// Run primer3 to completion, or until `control` asks it to stop.
pub fn run(
    location: &ToolLocation,
    job: &Primer3Job,
    control: &RunControl,
    progress: &ProgressHandle,
) -> Result<ToolExit> {
    log::info!(
        "[primer3] {} {}",
        location.executable.display(),
        job.arguments().join(" ")
    );
    let mut guard = ChildGuard {
        child: spawn(location, job)?,
    };
    let _poller = ProgressPoller::start(job, progress.clone());

    loop {
        if let Some(status) = guard
            .child
            .try_wait()
            .context("Failed to wait for primer3")?
        {
            return Ok(ToolExit::Finished(status));
        }
        if control.is_cancelled() {
            guard.kill();
            return Ok(ToolExit::Cancelled);
        }
        if control.skip_requested() {
            guard.kill();
            control.clear_skip();
            log::info!("[primer3] Stopped early; continuing with partial output");
            return Ok(ToolExit::Skipped);
        }
        thread::sleep(EXIT_POLL);
    }
}
