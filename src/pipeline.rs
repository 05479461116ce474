//! Per-file pipeline: trim and detect, primer3, final results
//!
//! Each input is classified once into an [`InputKind`], which fixes the
//! stage the run enters at:
//!
//! ```text
//! RawContig    -> trim + detect -> primer3 -> final results
//! ToolRequest  ->                  primer3 -> final results
//! ToolResponse ->                             final results
//! FinalTable   -> (nothing to do)
//! ```
//!
//! A run owns a copy of its settings, so settings changed after a run was
//! created never affect it. Cancel and skip requests arrive through the
//! run's [`RunControl`].

use anyhow::{Context, Result};
use chrono::Local;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::annotation::{AnnotationWriter, RepeatStats};
use crate::artifacts::ArtifactPaths;
use crate::binary_paths::ToolLocation;
use crate::boulder::count_terminated_records;
use crate::control::RunControl;
use crate::error::PreconditionError;
use crate::file_state::FilePreLoadState;
use crate::final_table::is_final_table;
use crate::merge::merge_to_file;
use crate::primer3_runner::{self, Primer3Job, ToolExit, DEFAULT_PROGRESS_INTERVAL};
use crate::primer3_settings::Primer3Settings;
use crate::primer_request::{PrimerRequestRecord, PrimerRequestWriter};
use crate::progress::ProgressHandle;
use crate::repeats::{detect, RepeatSettings};
use crate::sequence::{normalize, open_sequence_input, SequenceReader, TrimmedWriter};
use crate::trim::{trim, TrimSettings};

// Trim progress is published every this many sequences
const PROGRESS_SEQUENCES: usize = 50;

/// What an input file is, decided from its name and first line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    RawContig,
    ToolRequest,
    ToolResponse,
    FinalTable,
}

impl InputKind {
    pub fn classify<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("p3in") => InputKind::ToolRequest,
            Some("p3out") => InputKind::ToolResponse,
            _ if is_final_table(path) => InputKind::FinalTable,
            _ => InputKind::RawContig,
        }
    }

    pub fn entry_stage(self) -> PipelineStage {
        match self {
            InputKind::RawContig => PipelineStage::RawInput,
            InputKind::ToolRequest => PipelineStage::TrimmedAndDetected,
            InputKind::ToolResponse => PipelineStage::ExternalToolDone,
            InputKind::FinalTable => PipelineStage::FinalResultsDone,
        }
    }

    /// Number of stages a run of this kind goes through
    pub fn steps(self) -> usize {
        match self {
            InputKind::RawContig => 3,
            InputKind::ToolRequest => 2,
            InputKind::ToolResponse => 1,
            InputKind::FinalTable => 0,
        }
    }

    fn needs_primer3(self) -> bool {
        matches!(self, InputKind::RawContig | InputKind::ToolRequest)
    }
}

/// How far a file has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    RawInput,
    TrimmedAndDetected,
    ExternalToolDone,
    FinalResultsDone,
}

/// A stage that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TrimAndDetect,
    Primer3,
    FinalResults,
}

impl Stage {
    pub fn failure_message(self) -> &'static str {
        match self {
            Stage::TrimAndDetect => "Failed during trimming and detection",
            Stage::Primer3 => "Failed during Primer3",
            Stage::FinalResults => "Failed to create final results file",
        }
    }
}

/// Everything a run needs to know, copied into each run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub trim: TrimSettings,
    pub repeats: RepeatSettings,
    pub primer3: Primer3Settings,
    pub tool: ToolLocation,
    pub progress_interval: Duration,
}

impl PipelineSettings {
    /// Default settings with the given primer3 location
    pub fn new(tool: ToolLocation) -> Self {
        Self {
            trim: TrimSettings::default(),
            repeats: RepeatSettings::default(),
            primer3: Primer3Settings::default(),
            tool,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub final_stage: PipelineStage,
    pub sequences_examined: u64,
    pub repeats_found: u64,
    pub primers_succeeded: usize,
    pub primers_failed: usize,
    pub final_table: Option<PathBuf>,
    pub elapsed: chrono::Duration,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Cancelled,
    Failed {
        stage: Stage,
        message: String,
        detail: String,
    },
    NotStarted(PreconditionError),
}

impl RunOutcome {
    /// One-line status as shown to the user
    pub fn status(&self) -> String {
        match self {
            RunOutcome::Completed(summary) => {
                format!("Processed (time taken = {})", format_elapsed(summary.elapsed))
            }
            RunOutcome::Cancelled => "Process cancelled".to_string(),
            RunOutcome::Failed { message, .. } => format!("Error occurred: {message}"),
            RunOutcome::NotStarted(e) => format!("Not started: {e}"),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status())
    }
}

/// `hh:mm:ss`
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let seconds = elapsed.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

struct Detection {
    stats: RepeatStats,
    annotation: Option<PathBuf>,
    request: Option<PathBuf>,
}

/// One input file moving through the pipeline.
pub struct PipelineRun {
    input: PathBuf,
    kind: InputKind,
    paths: ArtifactPaths,
    settings: PipelineSettings,
    repeat_file: Option<PathBuf>,
    control: Arc<RunControl>,
    progress: ProgressHandle,
}

impl PipelineRun {
    /// Prepare a run. `repeat_file` is the annotation file to merge against
    /// when the input is a request or response file; if absent, the
    /// annotation file named after the input is used when it exists.
    pub fn new<P: AsRef<Path>>(
        input: P,
        settings: &PipelineSettings,
        repeat_file: Option<PathBuf>,
    ) -> Self {
        let input = input.as_ref().to_path_buf();
        let kind = InputKind::classify(&input);
        let paths = ArtifactPaths::for_input(&input);
        let repeat_file = match kind {
            InputKind::ToolRequest | InputKind::ToolResponse => repeat_file.or_else(|| {
                let default = paths.annotation();
                default.is_file().then_some(default)
            }),
            _ => None,
        };
        Self {
            progress: ProgressHandle::new(kind.steps()),
            input,
            kind,
            paths,
            settings: settings.clone(),
            repeat_file,
            control: Arc::new(RunControl::new()),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn control(&self) -> Arc<RunControl> {
        Arc::clone(&self.control)
    }

    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    /// Conditions that must hold before anything is started.
    pub fn preconditions(&self) -> Result<(), PreconditionError> {
        FilePreLoadState::require_ready(&self.input)?;
        if self.kind.needs_primer3() {
            self.settings.tool.check()?;
        }
        match (&self.kind, &self.repeat_file) {
            (InputKind::ToolResponse, None) => {
                Err(PreconditionError::RepeatFileMissing(self.paths.annotation()))
            }
            (_, Some(file)) if !file.is_file() => {
                Err(PreconditionError::RepeatFileMissing(file.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Run every remaining stage for this file.
    pub fn run(&self) -> RunOutcome {
        let started = Local::now();
        log::info!("[pipeline] {} ({:?})", self.input.display(), self.kind);

        if let Err(e) = self.preconditions() {
            log::warn!("[pipeline] {}: {e}", self.input.display());
            return RunOutcome::NotStarted(e);
        }

        let mut summary = RunSummary {
            final_stage: self.kind.entry_stage(),
            sequences_examined: 0,
            repeats_found: 0,
            primers_succeeded: 0,
            primers_failed: 0,
            final_table: None,
            elapsed: chrono::Duration::zero(),
        };

        let mut annotation = self.repeat_file.clone();
        let mut request = (self.kind == InputKind::ToolRequest).then(|| self.input.clone());
        let mut response = (self.kind == InputKind::ToolResponse).then(|| self.input.clone());

        if self.kind == InputKind::FinalTable {
            log::info!(
                "[pipeline] {} is already a final results table",
                self.input.display()
            );
            summary.final_table = Some(self.input.clone());
        }

        if self.kind == InputKind::RawContig {
            self.progress.start_step(
                "Trimming sequences and searching for microsatellites",
                true,
            );
            match self.trim_and_detect() {
                Ok(detection) => {
                    summary.sequences_examined = detection.stats.sequences_examined;
                    summary.repeats_found = detection.stats.total_repeats;
                    annotation = detection.annotation;
                    request = detection.request;
                }
                Err(e) => return self.fail(Stage::TrimAndDetect, e),
            }
            if self.control.is_cancelled() {
                return self.cancelled();
            }
            // A skip during trimming must not also skip primer3
            self.control.clear_skip();
            summary.final_stage = PipelineStage::TrimmedAndDetected;
            if request.is_none() {
                log::info!(
                    "[pipeline] No microsatellites found in {}",
                    self.input.display()
                );
            }
        }

        if let Some(request) = request.as_deref() {
            self.progress.start_step("Running primer3", true);
            match self.run_primer3(request) {
                Ok(ToolExit::Cancelled) => return self.cancelled(),
                Ok(ToolExit::Finished(status)) if !status.success() => log::warn!(
                    "[primer3] exited with {status}; see {}",
                    self.paths.primer3_error_log().display()
                ),
                Ok(_) => {}
                Err(e) => return self.fail(Stage::Primer3, e),
            }
            if self.control.is_cancelled() {
                return self.cancelled();
            }
            let output = self.paths.response();
            if !output.is_file() {
                log::error!(
                    "[primer3] No output produced at {}",
                    output.display()
                );
                return RunOutcome::Failed {
                    stage: Stage::Primer3,
                    message: "Primer3 files missing".to_string(),
                    detail: format!("{} was not created", output.display()),
                };
            }
            response = Some(output);
            summary.final_stage = PipelineStage::ExternalToolDone;
        }

        if let (Some(annotation), Some(response)) = (annotation.as_deref(), response.as_deref()) {
            self.progress.start_step("Creating final results", true);
            let merged = merge_to_file(
                annotation,
                response,
                &self.paths.final_results(),
                self.settings.primer3.num_return(),
                &self.control,
                &self.progress,
            );
            match merged {
                Ok(merge) => {
                    if merge.interrupted && self.control.is_cancelled() {
                        return self.cancelled();
                    }
                    summary.primers_succeeded = merge.succeeded;
                    summary.primers_failed = merge.failed;
                    summary.final_table = merge.output;
                    summary.final_stage = PipelineStage::FinalResultsDone;
                }
                Err(e) => return self.fail(Stage::FinalResults, e),
            }
        }

        summary.elapsed = Local::now() - started;
        let outcome = RunOutcome::Completed(summary);
        log::info!("[pipeline] {}: {}", self.input.display(), outcome.status());
        outcome
    }

    fn cancelled(&self) -> RunOutcome {
        log::info!("[pipeline] {}: cancelled", self.input.display());
        RunOutcome::Cancelled
    }

    fn fail(&self, stage: Stage, error: anyhow::Error) -> RunOutcome {
        log::error!(
            "[pipeline] {}: {}: {:#}",
            self.input.display(),
            stage.failure_message(),
            error
        );
        RunOutcome::Failed {
            stage,
            message: stage.failure_message().to_string(),
            detail: format!("{error:#}"),
        }
    }

    fn trim_and_detect(&self) -> Result<Detection> {
        let settings = &self.settings;
        settings.trim.save(self.paths.trim_settings())?;
        settings.repeats.save(self.paths.repeat_settings())?;

        let total_bytes = fs::metadata(&self.input).map(|m| m.len()).unwrap_or(0);
        let mut reader = SequenceReader::new(open_sequence_input(&self.input)?);
        let mut trimmed: Option<TrimmedWriter<BufWriter<File>>> = None;
        let mut annotation = AnnotationWriter::new(self.paths.annotation());
        let mut requests = PrimerRequestWriter::new(self.paths.request());
        let mut stats = RepeatStats::default();
        let thermodynamic_path = settings.tool.request_thermodynamic_path();
        let mut records = 0usize;

        while !self.control.should_stop() {
            let record = match reader.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("[trim] {}: {e:#}", self.input.display());
                    continue;
                }
            };
            records += 1;
            if records % PROGRESS_SEQUENCES == 0 && total_bytes > 0 {
                self.progress
                    .set_fraction(reader.bytes_read() as f64 / total_bytes as f64);
            }

            let bases = trim(&normalize(&record.data), &settings.trim.operations);
            if bases.is_empty() {
                continue;
            }

            if settings.trim.export_trimmed {
                let writer = match &mut trimmed {
                    Some(writer) => writer,
                    slot @ None => slot.insert(TrimmedWriter::create(self.paths.trimmed())?),
                };
                writer.write_record(&record.id, &bases)?;
            }

            stats.add_sequence(&bases);
            let repeats = detect(
                &bases,
                &settings.repeats.definitions,
                settings.repeats.interruptions,
            );
            stats.add_repeats(&repeats);
            annotation.write_repeats(&record.id, &repeats)?;
            for repeat in &repeats {
                requests.write(&PrimerRequestRecord::for_repeat(
                    &record.id,
                    &bases,
                    repeat,
                    thermodynamic_path,
                ))?;
            }
        }

        log::debug!(
            "[misa] {} primer3 requests written to {}",
            requests.records_written(),
            self.paths.request().display()
        );
        let annotation = annotation.finish()?;
        let request = requests.finish()?;
        if let Some(writer) = trimmed {
            writer.finish()?;
        }
        if settings.repeats.export_statistics && !self.control.is_cancelled() {
            stats.save(self.paths.statistics(), &self.input, &settings.repeats)?;
        }

        log::info!(
            "[misa] {}: {} sequences kept after trimming, {} microsatellites",
            self.input.display(),
            stats.sequences_examined,
            stats.total_repeats
        );
        Ok(Detection {
            stats,
            annotation,
            request,
        })
    }

    fn run_primer3(&self, request: &Path) -> Result<ToolExit> {
        self.settings.primer3.save(self.paths.primer3_settings())?;

        let file = File::open(request)
            .with_context(|| format!("Failed to open primer3 input {}", request.display()))?;
        let expected_records = count_terminated_records(BufReader::new(file))?;
        self.progress
            .set_details(format!("0/{expected_records} sequences with primers"));

        let job = Primer3Job {
            settings_file: self.paths.primer3_settings(),
            request: request.to_path_buf(),
            response: self.paths.response(),
            error_log: self.paths.primer3_error_log(),
            progress_copy: self.paths.progress_copy(),
            expected_records,
            progress_interval: self.settings.progress_interval,
        };
        primer3_runner::run(&self.settings.tool, &job, &self.control, &self.progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_without_primer3(dir: &Path) -> PipelineSettings {
        PipelineSettings::new(ToolLocation {
            executable: dir.join("missing_primer3"),
            thermodynamic_dir: dir.join("primer3_config"),
            include_thermodynamic_path: false,
        })
    }

    #[test]
    fn test_classify() {
        let dir = TempDir::new().unwrap();
        let table = dir.path().join("done.csv");
        fs::write(&table, format!("{}\n", crate::final_table::header(1))).unwrap();
        let other_csv = dir.path().join("other.csv");
        fs::write(&other_csv, "a,b,c\n").unwrap();

        assert_eq!(InputKind::classify("x/contigs.P3IN"), InputKind::ToolRequest);
        assert_eq!(InputKind::classify("x/contigs.p3out"), InputKind::ToolResponse);
        assert_eq!(InputKind::classify(&table), InputKind::FinalTable);
        assert_eq!(InputKind::classify(&other_csv), InputKind::RawContig);
        assert_eq!(InputKind::classify("x/contigs.fa"), InputKind::RawContig);
    }

    #[test]
    fn test_entry_stages() {
        assert_eq!(InputKind::RawContig.entry_stage(), PipelineStage::RawInput);
        assert_eq!(
            InputKind::ToolResponse.entry_stage(),
            PipelineStage::ExternalToolDone
        );
        assert!(PipelineStage::RawInput < PipelineStage::FinalResultsDone);
    }

    #[test]
    fn test_status_strings() {
        let summary = RunSummary {
            final_stage: PipelineStage::FinalResultsDone,
            sequences_examined: 1,
            repeats_found: 1,
            primers_succeeded: 1,
            primers_failed: 0,
            final_table: None,
            elapsed: chrono::Duration::seconds(3723),
        };
        assert_eq!(
            RunOutcome::Completed(summary).status(),
            "Processed (time taken = 01:02:03)"
        );
        assert_eq!(RunOutcome::Cancelled.status(), "Process cancelled");
        assert_eq!(
            RunOutcome::Failed {
                stage: Stage::TrimAndDetect,
                message: Stage::TrimAndDetect.failure_message().to_string(),
                detail: String::new(),
            }
            .status(),
            "Error occurred: Failed during trimming and detection"
        );
    }

    #[test]
    fn test_missing_primer3_prevents_start() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("contigs.fa");
        fs::write(&input, ">a\nACGT\n").unwrap();
        let run = PipelineRun::new(&input, &settings_without_primer3(dir.path()), None);
        assert_eq!(
            run.run(),
            RunOutcome::NotStarted(PreconditionError::Primer3Missing(
                dir.path().join("missing_primer3")
            ))
        );
        assert!(!run.paths().annotation().exists());
    }

    #[test]
    fn test_response_without_annotation_prevents_start() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("contigs.p3out");
        fs::write(&input, "SEQUENCE_ID=a_1\n=\n").unwrap();
        let run = PipelineRun::new(&input, &settings_without_primer3(dir.path()), None);
        assert!(matches!(
            run.run(),
            RunOutcome::NotStarted(PreconditionError::RepeatFileMissing(_))
        ));
    }

    #[test]
    fn test_final_table_input_is_already_done() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("contigs_FinalResults.csv");
        fs::write(&input, format!("{}\n", crate::final_table::header(5))).unwrap();
        let run = PipelineRun::new(&input, &settings_without_primer3(dir.path()), None);
        match run.run() {
            RunOutcome::Completed(summary) => {
                assert_eq!(summary.final_stage, PipelineStage::FinalResultsDone);
                assert_eq!(summary.final_table.as_deref(), Some(input.as_path()));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_settings_are_copied_per_run() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_without_primer3(dir.path());
        let run = PipelineRun::new(dir.path().join("a.fa"), &settings, None);
        settings.repeats.interruptions = 99;
        assert_eq!(run.settings().repeats.interruptions, 0);
    }
}
