//! Request (`.p3in`) records for primer3
//!
//! One record is written per reported repeat. The template is the whole
//! trimmed sequence; the target covers the repeat plus a fixed flank.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::boulder::BoulderRecord;
use crate::repeats::CompoundRepeat;

/// Bases of flank added on the 5' side of the target.
pub const TARGET_FLANK: i64 = 3;
/// Total padding added to the repeat size to form the target.
pub const TARGET_PADDING: i64 = 6;
pub const PRODUCT_SIZE_RANGE: (u32, u32) = (100, 280);
pub const MAX_END_STABILITY: u32 = 250;

/// Everything primer3 needs to design primers around one repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimerRequestRecord {
    /// `{sequence id}_{repeat number}`
    pub sequence_id: String,
    pub template: String,
    /// Target start and end as written to `SEQUENCE_TARGET`
    pub target: (i64, i64),
    pub product_size_range: (u32, u32),
    pub max_end_stability: u32,
    pub thermodynamic_parameters_path: Option<PathBuf>,
}

impl PrimerRequestRecord {
    pub fn for_repeat(
        sequence_id: &str,
        template: &str,
        repeat: &CompoundRepeat,
        thermodynamic_parameters_path: Option<&Path>,
    ) -> Self {
        let target_start = repeat.start as i64 - TARGET_FLANK;
        Self {
            sequence_id: format!("{}_{}", sequence_id, repeat.number),
            template: template.to_string(),
            target: (target_start, target_start + repeat.size() as i64 + TARGET_PADDING),
            product_size_range: PRODUCT_SIZE_RANGE,
            max_end_stability: MAX_END_STABILITY,
            thermodynamic_parameters_path: thermodynamic_parameters_path.map(Path::to_path_buf),
        }
    }

    pub fn to_record(&self) -> BoulderRecord {
        let mut record = BoulderRecord::default();
        record.push("SEQUENCE_ID", &self.sequence_id);
        record.push("SEQUENCE_TEMPLATE", &self.template);
        record.push(
            "PRIMER_PRODUCT_SIZE_RANGE",
            format!("{}-{}", self.product_size_range.0, self.product_size_range.1),
        );
        record.push(
            "SEQUENCE_TARGET",
            format!("{},{}", self.target.0, self.target.1),
        );
        record.push("PRIMER_MAX_END_STABILITY", self.max_end_stability);
        if let Some(path) = &self.thermodynamic_parameters_path {
            record.push(
                "PRIMER_THERMODYNAMIC_PARAMETERS_PATH",
                thermodynamic_dir_value(path),
            );
        }
        record.terminated = true;
        record
    }
}

// primer3 expects the config directory with a trailing separator
fn thermodynamic_dir_value(path: &Path) -> String {
    let value = path.display().to_string();
    if value.ends_with(std::path::MAIN_SEPARATOR) {
        value
    } else {
        format!("{value}{}", std::path::MAIN_SEPARATOR)
    }
}

/// Writes the request file, creating it with the first record.
pub struct PrimerRequestWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    records: usize,
}

impl PrimerRequestWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            records: 0,
        }
    }

    pub fn write(&mut self, request: &PrimerRequestRecord) -> Result<()> {
        let path = &self.path;
        let writer = match &mut self.writer {
            Some(writer) => writer,
            slot @ None => {
                let file = File::create(path).with_context(|| {
                    format!("Failed to create primer3 input {}", path.display())
                })?;
                slot.insert(BufWriter::new(file))
            }
        };
        request.to_record().write_to(writer)?;
        self.records += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Flush and close. Returns the path if the file was created.
    pub fn finish(mut self) -> Result<Option<PathBuf>> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.flush()?;
                Ok(Some(self.path.clone()))
            }
            None => Ok(None),
        }
    }
}
