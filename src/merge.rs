//! Join repeat annotations with primer3 responses into the final table
//!
//! Both inputs are streamed. Responses are matched to annotation lines by
//! request id (`{sequence id}_{repeat number}`), scanning the annotation
//! file forward only, which relies on both files listing repeats in the
//! same order. Invalid responses (no primer pairs) produce no row and are
//! counted as failures.

use anyhow::{Context, Result};
use csv::Writer;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::annotation::AnnotationReader;
use crate::boulder::count_terminated_records;
use crate::control::RunControl;
use crate::final_table::{create_writer, header_fields, FinalRow};
use crate::primer_response::PrimerResponseParser;
use crate::progress::ProgressHandle;

// Progress is published every this many responses
const PROGRESS_INTERVAL: usize = 25;

/// Streams [`FinalRow`]s for the valid responses.
pub struct ResultMerger<A: Read, R: BufRead> {
    annotations: AnnotationReader<A>,
    responses: PrimerResponseParser<R>,
    succeeded: usize,
    failed: usize,
}

impl<A: Read, R: BufRead> ResultMerger<A, R> {
    pub fn new(annotations: AnnotationReader<A>, responses: R) -> Self {
        Self {
            annotations,
            responses: PrimerResponseParser::new(responses),
            succeeded: 0,
            failed: 0,
        }
    }

    /// Responses seen so far (valid, invalid)
    pub fn counts(&self) -> (usize, usize) {
        (self.succeeded, self.failed)
    }
}

impl<A: Read, R: BufRead> Iterator for ResultMerger<A, R> {
    type Item = Result<FinalRow>;

    fn next(&mut self) -> Option<Self::Item> {
        for response in self.responses.by_ref() {
            let response = match response {
                Ok(response) => response,
                Err(e) => return Some(Err(e)),
            };
            if !response.is_valid() {
                self.failed += 1;
                continue;
            }
            self.succeeded += 1;

            let annotation = match self.annotations.find_forward(&response.sequence_id) {
                Ok(annotation) => annotation,
                Err(e) => return Some(Err(e)),
            };
            if annotation.is_none() {
                log::warn!(
                    "[merge] No repeat annotation found for {}",
                    response.sequence_id
                );
            }
            return Some(Ok(FinalRow {
                annotation,
                pairs: response.pairs,
                template: response.template,
            }));
        }
        None
    }
}

/// Result of writing a final table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Set when at least one row was written
    pub output: Option<PathBuf>,
    /// True if the merge stopped early on cancel or skip
    pub interrupted: bool,
}

/// Write the final table for `annotation` and `response` to `output`.
///
/// The output file is only created once there is a row to write. The
/// control flags are checked between responses.
pub fn merge_to_file(
    annotation: &Path,
    response: &Path,
    output: &Path,
    num_pairs: usize,
    control: &RunControl,
    progress: &ProgressHandle,
) -> Result<MergeSummary> {
    let expected = File::open(response)
        .ok()
        .and_then(|f| count_terminated_records(BufReader::new(f)).ok())
        .unwrap_or(0);

    let annotations = AnnotationReader::open(annotation)?;
    let responses = File::open(response)
        .with_context(|| format!("Failed to open primer3 output {}", response.display()))?;
    let mut merger = ResultMerger::new(annotations, BufReader::new(responses));

    let mut writer: Option<Writer<File>> = None;
    let mut summary = MergeSummary::default();
    let mut last_reported = 0;

    loop {
        if control.should_stop() {
            summary.interrupted = true;
            break;
        }
        let Some(row) = merger.next() else {
            break;
        };
        let row = row?;

        let w = match &mut writer {
            Some(w) => w,
            slot @ None => {
                let mut w = create_writer(output)?;
                w.write_record(header_fields(num_pairs))?;
                slot.insert(w)
            }
        };
        w.write_record(row.fields(num_pairs))?;

        let (succeeded, failed) = merger.counts();
        let seen = succeeded + failed;
        if expected > 0 && seen >= last_reported + PROGRESS_INTERVAL {
            last_reported = seen;
            progress.set_fraction(seen as f64 / expected as f64);
        }
    }

    (summary.succeeded, summary.failed) = merger.counts();
    if let Some(mut w) = writer {
        w.flush()?;
        summary.output = Some(output.to_path_buf());
    }
    log::info!(
        "[merge] {} sequences with primers, {} without",
        summary.succeeded,
        summary.failed
    );
    Ok(summary)
}
