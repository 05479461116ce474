//! The final results table (`_FinalResults.csv`)
//!
//! Columns: a `Details` column left for the user, the seven annotation
//! columns, nine columns per requested primer pair, then the template. Rows
//! always have the full width; missing values are empty. Users edit these
//! tables, so cells may come back quoted.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::annotation::{AnnotationLine, ANNOTATION_COLUMNS};
use crate::primer_response::{PrimerPair, PAIR_COLUMNS};

/// Column names for a table with `num_pairs` primer pair groups.
pub fn header_fields(num_pairs: usize) -> Vec<String> {
    let mut fields: Vec<String> = ["Details", "ID", "SSR nr.", "SSR type", "SSR", "Size", "Start", "End"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    for n in 1..=num_pairs {
        fields.extend([
            format!("FORWARD PRIMER{n} (5'-3')"),
            "Tm(°C)".to_string(),
            "Size".to_string(),
            format!("REVERSE PRIMER{n} (5'-3')"),
            "Tm(°C)".to_string(),
            "Size".to_string(),
            format!("PRODUCT{n} size (bp)"),
            "Start (bp)".to_string(),
            "End (bp)".to_string(),
        ]);
    }
    fields.push("Template".to_string());
    fields
}

/// Header line for a table with `num_pairs` primer pair groups.
pub fn header(num_pairs: usize) -> String {
    header_fields(num_pairs).join(",")
}

/// Comma separated writer shared by the final table and its exports.
pub fn create_writer(path: &Path) -> Result<Writer<File>> {
    WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))
}

/// One row of the final table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalRow {
    /// `None` when no annotation line matched the response
    pub annotation: Option<AnnotationLine>,
    pub pairs: Vec<PrimerPair>,
    pub template: String,
}

impl FinalRow {
    /// Cells with exactly `num_pairs` pair groups.
    pub fn fields(&self, num_pairs: usize) -> Vec<&str> {
        let mut fields = vec![""];
        match &self.annotation {
            Some(annotation) => {
                fields.extend(annotation.fields[..ANNOTATION_COLUMNS].iter().map(String::as_str))
            }
            None => fields.extend([""; ANNOTATION_COLUMNS]),
        }
        for i in 0..num_pairs {
            match self.pairs.get(i) {
                Some(pair) => fields.extend(pair.columns()),
                None => fields.extend([""; PAIR_COLUMNS]),
            }
        }
        fields.push(&self.template);
        fields
    }
}

/// Column positions found in a final-table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumns {
    pub id: usize,
    pub ssr: usize,
    pub template: usize,
    /// (forward, reverse) column of each pair group, in order
    pub pairs: Vec<(usize, usize)>,
}

// The template column always follows the seven annotation columns
const MIN_TEMPLATE_COLUMN: usize = 7;

impl TableColumns {
    /// Detect columns from a header record (case-insensitive). Returns
    /// `None` if this is not a final-table header.
    pub fn detect(header: &StringRecord) -> Option<Self> {
        let names: Vec<String> = header
            .iter()
            .map(|name| name.trim().to_lowercase())
            .collect();

        let id = names.iter().position(|n| n == "id")?;
        let ssr = names.iter().position(|n| n == "ssr")?;
        let template = names
            .iter()
            .enumerate()
            .skip(MIN_TEMPLATE_COLUMN)
            .find(|(_, n)| n.starts_with("template"))
            .map(|(i, _)| i)?;

        let mut pairs = Vec::new();
        let mut forward = None;
        for (i, name) in names.iter().enumerate() {
            if name.starts_with("forward") {
                forward = Some(i);
            } else if name.starts_with("reverse") {
                if let Some(f) = forward.take() {
                    pairs.push((f, i));
                }
            }
        }
        if pairs.is_empty() {
            return None;
        }

        Some(Self {
            id,
            ssr,
            template,
            pairs,
        })
    }
}

/// The columns of one final-table row that the verifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalTableRow {
    /// Every cell of the row as read
    pub fields: Vec<String>,
    pub id: String,
    pub ssr: String,
    pub template: String,
    /// (forward, reverse) per pair group; empty strings for missing pairs
    pub pairs: Vec<(String, String)>,
}

/// A parsed final table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalTable {
    pub header: Vec<String>,
    pub columns: TableColumns,
    pub rows: Vec<FinalTableRow>,
}

impl FinalTable {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open final table {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to read final table {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let header = rdr.headers().context("Failed to read header")?.clone();
        let columns = TableColumns::detect(&header).with_context(|| {
            format!(
                "Not a final results header: '{}'",
                header.iter().collect::<Vec<_>>().join(",")
            )
        })?;

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("[verify] Skipping unreadable row: {e}");
                    continue;
                }
            };
            if record.len() <= columns.template {
                log::warn!(
                    "[verify] Skipping row {} with {} columns (expected {})",
                    record.position().map_or(0, |p| p.line()),
                    record.len(),
                    columns.template + 1
                );
                continue;
            }
            let field = |c: usize| record.get(c).unwrap_or_default().to_string();
            rows.push(FinalTableRow {
                fields: record.iter().map(str::to_string).collect(),
                id: field(columns.id),
                ssr: field(columns.ssr),
                template: field(columns.template),
                pairs: columns
                    .pairs
                    .iter()
                    .map(|&(f, r)| (field(f), field(r)))
                    .collect(),
            });
        }

        Ok(Self {
            header: header.iter().map(str::to_string).collect(),
            columns,
            rows,
        })
    }
}

/// True if the first line of `path` is a final-table header.
pub fn is_final_table<P: AsRef<Path>>(path: P) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut first = Vec::new();
    if BufReader::new(file).read_until(b'\n', &mut first).is_err() {
        return false;
    }
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(first.as_slice());
    let mut record = StringRecord::new();
    match rdr.read_record(&mut record) {
        Ok(true) => TableColumns::detect(&record).is_some(),
        _ => false,
    }
}
