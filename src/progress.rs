//! Per-run progress snapshot
//!
//! A run publishes its progress into a shared [`Progress`]; the caller (and
//! the primer3 poller thread) read or update it through [`ProgressHandle`].

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub steps: usize,
    pub current_step: usize,
    pub task: String,
    /// `None` while the amount of work left is unknown
    pub fraction: Option<f64>,
    pub details: String,
}

impl Progress {
    /// `Step 2/3 - Running primer3 (40%)...`
    pub fn describe(&self) -> String {
        match self.fraction {
            Some(fraction) => format!(
                "Step {}/{} - {} ({}%)...",
                self.current_step,
                self.steps,
                self.task,
                (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
            ),
            None => format!("Step {}/{} - {}...", self.current_step, self.steps, self.task),
        }
    }
}

/// Cloneable handle to a shared [`Progress`].
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<Mutex<Progress>>,
}

impl ProgressHandle {
    pub fn new(steps: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Progress {
                steps,
                ..Progress::default()
            })),
        }
    }

    // A poisoned lock only means a reader panicked; the snapshot is still usable
    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn start_step(&self, task: &str, determinate: bool) {
        let mut progress = self.lock();
        progress.current_step += 1;
        progress.task = task.to_string();
        progress.fraction = determinate.then_some(0.0);
        progress.details.clear();
        log::info!("[pipeline] {}", progress.describe());
    }

    pub fn set_fraction(&self, fraction: f64) {
        let mut progress = self.lock();
        progress.fraction = Some(fraction.clamp(0.0, 1.0));
        log::debug!("[pipeline] {}", progress.describe());
    }

    pub fn set_details(&self, details: impl Into<String>) {
        self.lock().details = details.into();
    }

    pub fn snapshot(&self) -> Progress {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let handle = ProgressHandle::new(3);
        handle.start_step("Trimming sequences and searching for microsatellites", true);
        handle.set_fraction(0.456);
        assert_eq!(
            handle.snapshot().describe(),
            "Step 1/3 - Trimming sequences and searching for microsatellites (46%)..."
        );

        handle.start_step("Running primer3", false);
        assert_eq!(handle.snapshot().describe(), "Step 2/3 - Running primer3...");
    }

    #[test]
    fn test_fraction_is_clamped() {
        let handle = ProgressHandle::new(1);
        handle.start_step("Creating final results", true);
        handle.set_fraction(1.7);
        assert_eq!(handle.snapshot().fraction, Some(1.0));
    }
}
