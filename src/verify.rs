//! Structural check of designed primer pairs
//!
//! A pair is correct when the forward primer, the repeat and the reverse
//! complement of the reverse primer are all found in the template, in that
//! order, without any two of them overlapping.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::final_table::{create_writer, FinalTable, FinalTableRow};

/// Base used for anything that has no complement; never matches a template.
pub const UNKNOWN_BASE: char = 'X';

pub fn reverse_complement(sequence: &str) -> String {
    sequence
        .chars()
        .rev()
        .map(|c| match c.to_ascii_uppercase() {
            'A' => 'T',
            'T' => 'A',
            'C' => 'G',
            'G' => 'C',
            _ => UNKNOWN_BASE,
        })
        .collect()
}

/// Expand repeat notation into the literal bases it stands for:
/// `(AC)3gt(T)2*` becomes `ACACACGTTT`. Interstitial bases are uppercased
/// and `*` markers dropped. Returns `None` for malformed notation or when
/// the expansion would be longer than `max_len`.
pub fn expand_repeat_notation(notation: &str, max_len: usize) -> Option<String> {
    let mut expanded = String::new();
    let mut chars = notation.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '(' => {
                let mut motif = String::new();
                loop {
                    match chars.next()? {
                        ')' => break,
                        m => motif.push(m.to_ascii_uppercase()),
                    }
                }
                let mut count = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    count.push(*d);
                    chars.next();
                }
                let count: usize = count.parse().ok()?;
                let len = motif.len().checked_mul(count)?;
                if expanded.len().checked_add(len)? > max_len {
                    return None;
                }
                expanded.push_str(&motif.repeat(count));
            }
            '*' => {}
            c if c.is_ascii_alphabetic() => {
                if expanded.len() >= max_len {
                    return None;
                }
                expanded.push(c.to_ascii_uppercase())
            }
            c if c.is_whitespace() => {}
            _ => return None,
        }
    }
    Some(expanded)
}

/// What was located for one span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First match in the template, if any
    pub index: Option<usize>,
    pub len: usize,
}

impl Span {
    fn locate(template: &str, needle: &str) -> Self {
        Self {
            index: if needle.is_empty() {
                None
            } else {
                template.find(needle)
            },
            len: needle.len(),
        }
    }

    fn end(&self) -> Option<usize> {
        self.index.map(|i| i + self.len)
    }

    /// [index, index+len) ranges intersect
    pub fn overlaps(&self, other: &Span) -> bool {
        match (self.index, self.end(), other.index, other.end()) {
            (Some(a), Some(a_end), Some(b), Some(b_end)) => a < b_end && b < a_end,
            _ => false,
        }
    }
}

/// Where the forward primer, the repeat and the reverse primer's reverse
/// complement land in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimerCheck {
    pub forward: Span,
    pub repeat: Span,
    pub reverse_complement: Span,
}

impl PrimerCheck {
    pub fn new(template: &str, repeat: &str, forward: &str, reverse: &str) -> Self {
        let template = template.to_ascii_uppercase();
        Self {
            forward: Span::locate(&template, &forward.to_ascii_uppercase()),
            repeat: Span::locate(&template, &repeat.to_ascii_uppercase()),
            reverse_complement: Span::locate(&template, &reverse_complement(reverse)),
        }
    }

    pub fn all_found(&self) -> bool {
        self.forward.index.is_some()
            && self.repeat.index.is_some()
            && self.reverse_complement.index.is_some()
    }

    pub fn has_overlap(&self) -> bool {
        self.forward.overlaps(&self.repeat)
            || self.forward.overlaps(&self.reverse_complement)
            || self.repeat.overlaps(&self.reverse_complement)
    }

    pub fn in_order(&self) -> bool {
        match (
            self.forward.index,
            self.repeat.index,
            self.reverse_complement.index,
        ) {
            (Some(f), Some(r), Some(rc)) => f < r && r < rc,
            _ => false,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.all_found() && !self.has_overlap() && self.in_order()
    }
}

/// Verification outcome for one final-table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowVerification {
    /// 1-based numbers of the correct pairs
    pub correct_pairs: Vec<usize>,
}

impl RowVerification {
    pub fn for_row(row: &FinalTableRow) -> Self {
        let repeat = match expand_repeat_notation(&row.ssr, row.template.len()) {
            Some(repeat) => repeat,
            None => {
                log::warn!("[verify] Unreadable repeat '{}' for {}", row.ssr, row.id);
                return Self {
                    correct_pairs: Vec::new(),
                };
            }
        };
        let correct_pairs = row
            .pairs
            .iter()
            .enumerate()
            .filter(|(_, (forward, reverse))| {
                PrimerCheck::new(&row.template, &repeat, forward, reverse).is_correct()
            })
            .map(|(i, _)| i + 1)
            .collect();
        Self { correct_pairs }
    }

    /// `Primer 1 + Primer 3`
    pub fn label(&self) -> String {
        self.correct_pairs
            .iter()
            .map(|n| format!("Primer {n}"))
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub rows: usize,
    pub rows_with_correct_pairs: usize,
    pub correct_pairs: usize,
    pub output: PathBuf,
}

/// Verify every row of `table` and write it with a `CORRECT PRIMERS` column.
pub fn export_correct_primers(
    table: &FinalTable,
    output: &Path,
    correct_only: bool,
) -> Result<VerifySummary> {
    let mut writer = create_writer(output)?;
    writer.write_record(
        table
            .header
            .iter()
            .map(String::as_str)
            .chain(["CORRECT PRIMERS"]),
    )?;

    let mut summary = VerifySummary {
        rows: table.rows.len(),
        output: output.to_path_buf(),
        ..VerifySummary::default()
    };

    for row in &table.rows {
        let verification = RowVerification::for_row(row);
        if !verification.correct_pairs.is_empty() {
            summary.rows_with_correct_pairs += 1;
            summary.correct_pairs += verification.correct_pairs.len();
        } else if correct_only {
            continue;
        }
        let label = verification.label();
        writer.write_record(row.fields.iter().map(String::as_str).chain([label.as_str()]))?;
    }
    writer.flush()?;

    log::info!(
        "[verify] {} of {} rows have correct primers ({} pairs)",
        summary.rows_with_correct_pairs,
        summary.rows,
        summary.correct_pairs
    );
    Ok(summary)
}
