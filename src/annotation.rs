//! Repeat annotation (`.misa`) and statistics (`.misa_statistics`) files
//!
//! The annotation file is tab separated with a fixed header:
//!
//! ```text
//! ID	SSR nr.	SSR type	SSR	size	start	end
//! contig7	1	p2	(AC)6	12	5	16
//! ```

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::repeats::{CompoundRepeat, RepeatDefinition, RepeatSettings};

pub const ANNOTATION_HEADER: &str = "ID\tSSR nr.\tSSR type\tSSR\tsize\tstart\tend";

/// Number of columns in an annotation line.
pub const ANNOTATION_COLUMNS: usize = 7;

/// Writes the annotation file, creating it with the first record.
pub struct AnnotationWriter {
    path: PathBuf,
    writer: Option<Writer<File>>,
}

impl AnnotationWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }

    pub fn write_repeats(&mut self, sequence_id: &str, repeats: &[CompoundRepeat]) -> Result<()> {
        if repeats.is_empty() {
            return Ok(());
        }
        let path = &self.path;
        let writer = match &mut self.writer {
            Some(writer) => writer,
            slot @ None => {
                let mut writer = WriterBuilder::new()
                    .delimiter(b'\t')
                    .from_path(path)
                    .with_context(|| {
                        format!("Failed to create annotation file {}", path.display())
                    })?;
                writer.write_record(ANNOTATION_HEADER.split('\t'))?;
                slot.insert(writer)
            }
        };

        for repeat in repeats {
            writer.write_record([
                sequence_id.to_string(),
                repeat.number.to_string(),
                repeat.kind.to_string(),
                repeat.notation.clone(),
                repeat.size().to_string(),
                repeat.start.to_string(),
                repeat.end.to_string(),
            ])?;
        }
        Ok(())
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

/// One data line of an annotation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationLine {
    pub fields: Vec<String>,
}

impl AnnotationLine {
    /// Short records are rejected.
    pub fn from_record(record: &StringRecord) -> Option<Self> {
        if record.len() < ANNOTATION_COLUMNS {
            return None;
        }
        Some(Self {
            fields: record.iter().map(str::to_string).collect(),
        })
    }

    pub fn id(&self) -> &str {
        &self.fields[0]
    }

    pub fn number(&self) -> &str {
        &self.fields[1]
    }

    /// Identifier used in the request file for this repeat
    pub fn request_id(&self) -> String {
        format!("{}_{}", self.id(), self.number())
    }
}

/// Forward-only reader over an annotation file.
pub struct AnnotationReader<R: Read> {
    reader: csv::Reader<R>,
    record: StringRecord,
}

impl AnnotationReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open annotation file {}", path.display()))?;
        Ok(Self::new(file))
    }
}

impl<R: Read> AnnotationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: ReaderBuilder::new()
                .delimiter(b'\t')
                .has_headers(true)
                .flexible(true)
                .from_reader(reader),
            record: StringRecord::new(),
        }
    }

    /// Advance to the first line whose request id equals `request_id`.
    /// Lines skipped on the way are consumed.
    pub fn find_forward(&mut self, request_id: &str) -> Result<Option<AnnotationLine>> {
        while self
            .reader
            .read_record(&mut self.record)
            .context("Failed to read annotation file")?
        {
            let Some(annotation) = AnnotationLine::from_record(&self.record) else {
                continue;
            };
            // Whole-id match: `seq1_1` never pairs with `seq11_1`
            if annotation.request_id() == request_id {
                return Ok(Some(annotation));
            }
        }
        Ok(None)
    }
}

/// Counters gathered while detecting repeats in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepeatStats {
    pub sequences_examined: u64,
    pub total_bases: u64,
    pub total_repeats: u64,
    pub sequences_with_repeats: u64,
    pub sequences_with_multiple_repeats: u64,
    pub repeats_in_compounds: u64,
}

impl RepeatStats {
    pub fn add_sequence(&mut self, sequence: &str) {
        self.sequences_examined += 1;
        self.total_bases += sequence.len() as u64;
    }

    pub fn add_repeats(&mut self, repeats: &[CompoundRepeat]) {
        if repeats.is_empty() {
            return;
        }
        self.sequences_with_repeats += 1;
        self.total_repeats += repeats.len() as u64;
        if repeats.len() > 1 {
            self.sequences_with_multiple_repeats += 1;
        }
        self.repeats_in_compounds += repeats.iter().map(|r| r.links as u64).sum::<u64>();
    }

    pub fn write_report<W: Write>(
        &self,
        mut w: W,
        source: &Path,
        settings: &RepeatSettings,
    ) -> Result<()> {
        let source_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        writeln!(w, "Specifications\n==============\n")?;
        writeln!(w, "Sequence source file: \"{source_name}\"\n")?;
        writeln!(
            w,
            "Definement of microsatellites (unit size / minimum number of repeats):"
        )?;
        for RepeatDefinition {
            unit_size,
            min_repeats,
        } in &settings.definitions
        {
            write!(w, "({unit_size}/{min_repeats})")?;
        }
        writeln!(w, "\n")?;
        if settings.interruptions > 0 {
            writeln!(
                w,
                "Maximal number of bases interrupting 2 SSRs in a compound microsatellite: {}\n",
                settings.interruptions
            )?;
        }

        writeln!(w, "\n\nRESULTS OF MICROSATELLITE SEARCH\n================================\n")?;
        writeln!(w, "Total number of sequences examined:              {}", self.sequences_examined)?;
        writeln!(w, "Total size of examined sequences (bp):           {}", self.total_bases)?;
        writeln!(w, "Total number of identified SSRs:                 {}", self.total_repeats)?;
        writeln!(w, "Number of SSR containing sequences:              {}", self.sequences_with_repeats)?;
        writeln!(
            w,
            "Number of sequences containing more than 1 SSR:  {}",
            self.sequences_with_multiple_repeats
        )?;
        writeln!(w, "Number of SSRs present in compound formation:    {}", self.repeats_in_compounds)?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, source: &Path, settings: &RepeatSettings) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create statistics file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_report(&mut writer, source, settings)?;
        writer.flush()?;
        Ok(())
    }
}
