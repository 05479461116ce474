use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ssrpipe::artifacts::ArtifactPaths;
use ssrpipe::binary_paths::ToolLocation;
use ssrpipe::control::RunControl;
use ssrpipe::final_table::FinalTable;
use ssrpipe::pipeline::{PipelineRun, PipelineSettings, RunOutcome};
use ssrpipe::primer3_settings::Primer3Settings;
use ssrpipe::repeats::RepeatSettings;
use ssrpipe::settings_io::beside_executable;
use ssrpipe::trim::TrimSettings;
use ssrpipe::verify::export_correct_primers;

const TRIM_SETTINGS_FILE: &str = "TrimSettings.txt";
const REPEAT_SETTINGS_FILE: &str = "misa.ini";
const PRIMER3_SETTINGS_FILE: &str = "Primer3_v1_1_4_default_settings.txt";

// Extensions picked up when a directory is given as input
const SEQUENCE_EXTENSIONS: &[&str] = &["fa", "fasta", "fna", "fas", "seq", "gz"];

/// ssrpipe - microsatellite detection and primer design
///
/// Trims contigs, finds simple sequence repeats, designs flanking primers
/// with primer3 and merges everything into one table per input file.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Only log warnings and errors
    #[clap(long = "quiet", global = true)]
    quiet: bool,

    /// Log debug output
    #[clap(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline on contig, .p3in, .p3out or final-table files
    Run(RunArgs),

    /// Check primer pairs in a final results table
    Verify {
        /// A `_FinalResults.csv` table
        table: PathBuf,

        /// Keep only rows with at least one correct pair
        #[clap(long = "correct-only")]
        correct_only: bool,

        /// Output file (default: <base>_CorrectPrimers.csv)
        #[clap(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Write the default settings files into a directory
    Defaults {
        #[clap(value_name = "DIR")]
        dir: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Input files or directories
    #[clap(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Repeat annotation (.misa) to merge with .p3in/.p3out inputs
    #[clap(long = "misa")]
    repeat_file: Option<PathBuf>,

    /// Trim settings file
    #[clap(long = "trim-settings")]
    trim_settings: Option<PathBuf>,

    /// Repeat search settings file
    #[clap(long = "misa-settings")]
    repeat_settings: Option<PathBuf>,

    /// Primer3 settings file
    #[clap(long = "primer3-settings")]
    primer3_settings: Option<PathBuf>,

    /// primer3_core executable
    #[clap(long = "primer3")]
    primer3: Option<PathBuf>,

    /// primer3 thermodynamic parameters directory
    #[clap(long = "primer3-config")]
    primer3_config: Option<PathBuf>,

    /// Do not pass the thermodynamic parameters path in requests
    #[clap(long = "no-thermodynamic-path")]
    no_thermodynamic_path: bool,

    /// Seconds between primer3 progress samples
    #[clap(long = "progress-interval", default_value = "30")]
    progress_interval: u64,

    /// Number of files processed in parallel
    #[clap(short = 't', long = "threads", default_value = "1")]
    threads: usize,
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_interrupt_handler() {
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe
    unsafe {
        libc::signal(libc::SIGINT, on_interrupt as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_interrupt_handler() {}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match args.command {
        Command::Run(run) => run_pipeline(run),
        Command::Verify {
            table,
            correct_only,
            output,
        } => verify(&table, correct_only, output),
        Command::Defaults { dir } => write_defaults(&dir),
    }
}

/// Explicit path, then the file beside the executable, then built-in defaults.
fn locate_settings<T, F>(explicit: Option<&Path>, file_name: &str, load: F) -> Result<T>
where
    T: Default,
    F: FnOnce(&Path) -> Result<T>,
{
    if let Some(path) = explicit {
        return load(path);
    }
    match beside_executable(file_name) {
        Some(path) => {
            log::debug!("Using settings from {}", path.display());
            load(&path)
        }
        None => Ok(T::default()),
    }
}

fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = std::fs::read_dir(input)
            .with_context(|| format!("Failed to read directory {}", input.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| {
                            SEQUENCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str())
                        })
            })
            .collect();
        found.sort();
        if found.is_empty() {
            log::warn!("No sequence files found in {}", input.display());
        }
        files.extend(found);
    }
    Ok(files)
}

fn run_pipeline(args: RunArgs) -> Result<()> {
    let inputs = expand_inputs(&args.inputs)?;
    if inputs.is_empty() {
        bail!("No input files to process");
    }

    let tool = ToolLocation::resolve(
        args.primer3.as_deref(),
        args.primer3_config.as_deref(),
        !args.no_thermodynamic_path,
    )
    .or_else(|e| {
        // Keep going: runs that need primer3 will report it as not started
        log::warn!("{e:#}");
        ToolLocation::resolve(
            Some(Path::new(ssrpipe::binary_paths::PRIMER3_BINARY)),
            args.primer3_config.as_deref(),
            !args.no_thermodynamic_path,
        )
    })?;

    let settings = PipelineSettings {
        trim: locate_settings(args.trim_settings.as_deref(), TRIM_SETTINGS_FILE, |p| {
            TrimSettings::load(p)
        })?,
        repeats: locate_settings(args.repeat_settings.as_deref(), REPEAT_SETTINGS_FILE, |p| {
            RepeatSettings::load(p)
        })?,
        primer3: locate_settings(
            args.primer3_settings.as_deref(),
            PRIMER3_SETTINGS_FILE,
            |p| Primer3Settings::load(p),
        )?,
        tool,
        progress_interval: Duration::from_secs(args.progress_interval.max(1)),
    };

    let runs: Vec<PipelineRun> = inputs
        .iter()
        .map(|input| PipelineRun::new(input, &settings, args.repeat_file.clone()))
        .collect();

    install_interrupt_handler();
    let controls: Vec<Arc<RunControl>> = runs.iter().map(PipelineRun::control).collect();
    let finished = Arc::new(AtomicBool::new(false));
    let watcher = {
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            while !finished.load(Ordering::SeqCst) {
                if INTERRUPTED.load(Ordering::SeqCst) {
                    log::warn!("Interrupted, cancelling all runs");
                    controls.iter().for_each(|c| c.cancel());
                    break;
                }
                thread::sleep(Duration::from_millis(100));
            }
        })
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.max(1))
        .build()?;
    let outcomes: Vec<RunOutcome> = pool.install(|| runs.par_iter().map(PipelineRun::run).collect());

    finished.store(true, Ordering::SeqCst);
    let _ = watcher.join();

    let mut failures = 0;
    for (run, outcome) in runs.iter().zip(&outcomes) {
        println!("{}\t{}", run.input().display(), outcome.status());
        if let RunOutcome::Completed(summary) = outcome {
            if let Some(table) = &summary.final_table {
                println!(
                    "\t{} sequences, {} microsatellites, primers for {} ({} failed): {}",
                    summary.sequences_examined,
                    summary.repeats_found,
                    summary.primers_succeeded,
                    summary.primers_failed,
                    table.display()
                );
            }
        } else {
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} of {} files were not processed", outcomes.len());
    }
    Ok(())
}

fn verify(table: &Path, correct_only: bool, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| ArtifactPaths::for_input(table).correct_primers());
    let parsed = FinalTable::read(table)?;
    let summary = export_correct_primers(&parsed, &output, correct_only)?;
    println!(
        "{} of {} rows have correct primers ({} pairs): {}",
        summary.rows_with_correct_pairs,
        summary.rows,
        summary.correct_pairs,
        summary.output.display()
    );
    Ok(())
}

fn write_defaults(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    TrimSettings::default().save(dir.join(TRIM_SETTINGS_FILE))?;
    RepeatSettings::default().save(dir.join(REPEAT_SETTINGS_FILE))?;
    Primer3Settings::default().save(dir.join(PRIMER3_SETTINGS_FILE))?;
    log::info!("Default settings written to {}", dir.display());
    Ok(())
}
