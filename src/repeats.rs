//! Microsatellite (SSR) detection
//!
//! Each [`RepeatDefinition`] describes a unit size and the minimum number of
//! tandem copies needed to report it. The scan for one definition is a
//! left-to-right, non-overlapping search for maximal runs; a run whose unit
//! is itself a tandem repeat of a shorter unit is redundant and rejected, so
//! every repeat is reported at its minimal unit size only.
//!
//! Records from all definitions are then sorted by start and merged into
//! [`CompoundRepeat`]s when they sit within the interruption gap of each
//! other.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::SettingsError;
use crate::settings_io::{parse_colon_line, write_atomically};

/// Unit size and minimum copy number for one class of repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepeatDefinition {
    pub unit_size: usize,
    pub min_repeats: usize,
}

impl RepeatDefinition {
    pub fn new(unit_size: usize, min_repeats: usize) -> Self {
        Self {
            unit_size,
            min_repeats,
        }
    }
}

/// A single perfect repeat found by [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatRecord {
    pub unit_size: usize,
    /// 1-based, inclusive
    pub start: usize,
    /// 1-based, inclusive
    pub end: usize,
    pub motif: String,
    pub repeats: usize,
}

impl RepeatRecord {
    /// `(motif)repeats`, e.g. `(AC)6`
    pub fn notation(&self) -> String {
        format!("({}){}", self.motif, self.repeats)
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Type tag of a reported repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatKind {
    /// A single perfect repeat with the given unit size (`p1`..`p6`)
    Simple(usize),
    /// Repeats separated by a short interruption (`c`)
    Compound,
    /// Repeats that touch or overlap (`c*`)
    CompoundOverlapping,
}

impl fmt::Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatKind::Simple(unit) => write!(f, "p{unit}"),
            RepeatKind::Compound => write!(f, "c"),
            RepeatKind::CompoundOverlapping => write!(f, "c*"),
        }
    }
}

/// A reported repeat: either one [`RepeatRecord`] or a merged chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundRepeat {
    /// 1-based position of this repeat within its sequence
    pub number: usize,
    pub kind: RepeatKind,
    /// Motif string, e.g. `(AC)6cc(TG)5`
    pub notation: String,
    /// 1-based, inclusive
    pub start: usize,
    /// 1-based, inclusive
    pub end: usize,
    /// Number of merge links used to build this record
    pub links: usize,
}

impl CompoundRepeat {
    pub fn size(&self) -> usize {
        self.end + 1 - self.start
    }
}

fn is_repeat_base(b: u8) -> bool {
    matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T')
}

/// True when `motif` is a tandem repeat of a shorter unit.
pub fn is_redundant(motif: &[u8]) -> bool {
    let k = motif.len();
    (1..k).rev().filter(|j| k % j == 0).any(|j| {
        motif
            .chunks(j)
            .all(|chunk| chunk.eq_ignore_ascii_case(&motif[..j]))
    })
}

/// Find all non-redundant repeats for one definition.
///
/// Matches never overlap: after a match (redundant or not) scanning resumes
/// at its end; after a miss it resumes one base further on.
pub fn scan(sequence: &str, definition: RepeatDefinition) -> Vec<RepeatRecord> {
    let seq = sequence.as_bytes();
    let unit = definition.unit_size;
    let min_repeats = definition.min_repeats.max(1);
    let mut records = Vec::new();

    if unit == 0 {
        return records;
    }

    let mut pos = 0;
    while pos + unit * min_repeats <= seq.len() {
        let motif = &seq[pos..pos + unit];
        if !motif.iter().all(|&b| is_repeat_base(b)) {
            pos += 1;
            continue;
        }

        let mut repeats = 1;
        while pos + (repeats + 1) * unit <= seq.len()
            && seq[pos + repeats * unit..pos + (repeats + 1) * unit].eq_ignore_ascii_case(motif)
        {
            repeats += 1;
        }

        if repeats < min_repeats {
            pos += 1;
            continue;
        }

        if !is_redundant(motif) {
            records.push(RepeatRecord {
                unit_size: unit,
                start: pos + 1,
                end: pos + repeats * unit,
                motif: String::from_utf8_lossy(motif).to_ascii_uppercase(),
                repeats,
            });
        }
        pos += repeats * unit;
    }

    records
}

/// Merge sorted repeats into compound records.
///
/// Two neighbours merge when `next.start - current.end <= interruptions + 1`.
/// Chains merge transitively. Interstitial bases are lower-cased between
/// the motifs; every link after the first is marked with a trailing `*`.
pub fn merge_compound(
    sequence: &str,
    records: &[RepeatRecord],
    interruptions: usize,
) -> Vec<CompoundRepeat> {
    let space = interruptions as i64 + 1;
    let gap = |a: &RepeatRecord, b: &RepeatRecord| b.start as i64 - a.end as i64;
    let mut merged = Vec::new();
    let mut i = 0;

    while i < records.len() {
        let first = &records[i];
        let mut compound = CompoundRepeat {
            number: merged.len() + 1,
            kind: RepeatKind::Simple(first.unit_size),
            notation: first.notation(),
            start: first.start,
            end: first.end,
            links: 0,
        };

        while i + 1 < records.len() && gap(&records[i], &records[i + 1]) <= space {
            let (current, next) = (&records[i], &records[i + 1]);
            let distance = gap(current, next);

            if distance < 1 {
                compound.kind = RepeatKind::CompoundOverlapping;
            } else {
                if compound.links == 0 {
                    compound.kind = RepeatKind::Compound;
                }
                let interstitial = sequence
                    .get(current.end..next.start - 1)
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                compound.notation.push_str(&interstitial);
            }
            compound.notation.push_str(&next.notation());
            if compound.links > 0 {
                compound.notation.push('*');
            }

            compound.end = compound.end.max(next.end);
            compound.links += 1;
            i += 1;
        }

        merged.push(compound);
        i += 1;
    }

    merged
}

/// Detect and merge repeats in one normalized sequence.
pub fn detect(
    sequence: &str,
    definitions: &[RepeatDefinition],
    interruptions: usize,
) -> Vec<CompoundRepeat> {
    let mut definitions = definitions.to_vec();
    definitions.sort();

    let mut records: Vec<RepeatRecord> = definitions
        .iter()
        .flat_map(|&definition| scan(sequence, definition))
        .collect();
    records.sort_by_key(|r| (r.start, r.unit_size));

    merge_compound(sequence, &records, interruptions)
}

/// Repeat definitions and interruption gap, as stored on disk:
///
/// ```text
/// definition(unit_size,min_repeats):                   1-30 2-20 3-10 4-8 5-6 6-6
/// interruptions(max_difference_between_2_SSRs):        0
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatSettings {
    pub definitions: Vec<RepeatDefinition>,
    pub interruptions: usize,
    pub export_statistics: bool,
}

const DEFINITION_KEY: &str = "definition(unit_size,min_repeats)";
const INTERRUPTIONS_KEY: &str = "interruptions(max_difference_between_2_SSRs)";
const STATISTICS_KEY: &str = "Export statistics";

impl Default for RepeatSettings {
    fn default() -> Self {
        Self {
            definitions: [(1, 30), (2, 20), (3, 10), (4, 8), (5, 6), (6, 6)]
                .iter()
                .map(|&(k, m)| RepeatDefinition::new(k, m))
                .collect(),
            interruptions: 0,
            export_statistics: true,
        }
    }
}

impl RepeatSettings {
    pub fn parse(text: &str) -> Result<Self, SettingsError> {
        let mut settings = RepeatSettings::default();

        for (i, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some((key, value)) = parse_colon_line(trimmed) else {
                return Err(SettingsError::new(i + 1, trimmed, "expected KEY: VALUE"));
            };

            if key.eq_ignore_ascii_case(DEFINITION_KEY) {
                settings.definitions = value
                    .split_whitespace()
                    .map(|pair| {
                        let (k, m) = pair.split_once('-')?;
                        Some(RepeatDefinition::new(k.parse().ok()?, m.parse().ok()?))
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| SettingsError::new(i + 1, trimmed, "invalid definition"))?;
                settings.definitions.sort();
            } else if key.eq_ignore_ascii_case(INTERRUPTIONS_KEY) {
                settings.interruptions = value
                    .parse()
                    .map_err(|_| SettingsError::new(i + 1, trimmed, "invalid interruption gap"))?;
            } else if key.eq_ignore_ascii_case(STATISTICS_KEY) {
                settings.export_statistics = value
                    .to_ascii_lowercase()
                    .parse()
                    .map_err(|_| SettingsError::new(i + 1, trimmed, "invalid boolean"))?;
            } else if key.eq_ignore_ascii_case("GFF") {
                // accepted for compatibility, no GFF output is produced
            } else {
                log::warn!("[misa] Ignoring unknown setting '{key}'");
            }
        }

        Ok(settings)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read repeat settings {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("Invalid repeat settings in {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let definitions: Vec<String> = self
            .definitions
            .iter()
            .map(|d| format!("{}-{}", d.unit_size, d.min_repeats))
            .collect();
        write_atomically(path.as_ref(), |w| {
            writeln!(w, "{:<53}{}", format!("{DEFINITION_KEY}:"), definitions.join(" "))?;
            writeln!(w, "{:<53}{}", format!("{INTERRUPTIONS_KEY}:"), self.interruptions)?;
            writeln!(w, "{STATISTICS_KEY}: {}", self.export_statistics)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scan_dinucleotide() {
        let records = scan("GGTTACACACACACACGG", RepeatDefinition::new(2, 5));
        assert_eq!(
            records,
            vec![RepeatRecord {
                unit_size: 2,
                start: 5,
                end: 16,
                motif: "AC".to_string(),
                repeats: 6,
            }]
        );
        assert_eq!(records[0].notation(), "(AC)6");
    }

    #[test]
    fn test_scan_rejects_redundant_motifs() {
        // (TT)6 is really (T)12
        assert!(scan("GCTTTTTTTTTTTTGC", RepeatDefinition::new(2, 6)).is_empty());
        // (ACAC)5 is really (AC)10
        let seq = format!("G{}G", "AC".repeat(10));
        assert!(scan(&seq, RepeatDefinition::new(4, 5)).is_empty());
        assert_eq!(scan(&seq, RepeatDefinition::new(2, 5)).len(), 1);
    }

    #[test]
    fn test_scan_does_not_cross_ambiguous_bases() {
        let seq = format!("{}N{}", "AG".repeat(3), "AG".repeat(3));
        assert!(scan(&seq, RepeatDefinition::new(2, 5)).is_empty());
    }

    #[test]
    fn test_is_redundant() {
        assert!(is_redundant(b"TT"));
        assert!(is_redundant(b"ACAC"));
        assert!(is_redundant(b"ATTATT"));
        assert!(!is_redundant(b"AAT"));
        assert!(!is_redundant(b"ACGT"));
        assert!(!is_redundant(b"A"));
    }

    #[test]
    fn test_merge_simple() {
        let seq = format!("CC{}CC", "A".repeat(10));
        let merged = detect(&seq, &[RepeatDefinition::new(1, 10)], 0);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind.to_string(), "p1");
        assert_eq!(merged[0].notation, "(A)10");
        assert_eq!((merged[0].start, merged[0].end, merged[0].size()), (3, 12, 10));
    }

    #[test]
    fn test_merge_interrupted_compound() {
        // (AC)6 then two interrupting bases then (TG)5
        let seq = format!("TT{}CC{}TT", "AC".repeat(6), "TG".repeat(5));
        let merged = detect(&seq, &[RepeatDefinition::new(2, 5)], 3);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind, RepeatKind::Compound);
        assert_eq!(merged[0].notation, "(AC)6cc(TG)5");
        assert_eq!((merged[0].start, merged[0].end), (3, 26));
        assert_eq!(merged[0].links, 1);
    }

    #[test]
    fn test_merge_respects_gap() {
        let seq = format!("TT{}CC{}TT", "AC".repeat(6), "TG".repeat(5));
        let merged = detect(&seq, &[RepeatDefinition::new(2, 5)], 1);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].number, 2);
        assert_eq!(merged[1].notation, "(TG)5");
    }

    #[test]
    fn test_merge_adjacent_is_overlapping_type() {
        // (AC)6 immediately followed by (G)10: gap of exactly one
        let seq = format!("{}{}", "AC".repeat(6), "G".repeat(10));
        let merged = detect(
            &seq,
            &[RepeatDefinition::new(1, 10), RepeatDefinition::new(2, 5)],
            0,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind, RepeatKind::Compound);
        assert_eq!(merged[0].notation, "(AC)6(G)10");

        let records = vec![
            RepeatRecord {
                unit_size: 2,
                start: 1,
                end: 12,
                motif: "AC".into(),
                repeats: 6,
            },
            RepeatRecord {
                unit_size: 3,
                start: 12,
                end: 20,
                motif: "CAG".into(),
                repeats: 3,
            },
        ];
        let merged = merge_compound("", &records, 0);
        assert_eq!(merged[0].kind, RepeatKind::CompoundOverlapping);
        assert_eq!(merged[0].notation, "(AC)6(CAG)3");
    }

    #[test]
    fn test_merge_chain_of_three() {
        let seq = format!(
            "{}T{}T{}",
            "A".repeat(10),
            "G".repeat(10),
            "C".repeat(10)
        );
        let merged = detect(&seq, &[RepeatDefinition::new(1, 10)], 1);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].notation, "(A)10t(G)10t(C)10*");
        assert_eq!((merged[0].start, merged[0].end), (1, 32));
        assert_eq!(merged[0].links, 2);
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("misa.ini");
        let settings = RepeatSettings {
            definitions: vec![RepeatDefinition::new(2, 4), RepeatDefinition::new(1, 9)],
            interruptions: 7,
            export_statistics: false,
        };
        settings.save(&path).unwrap();
        let loaded = RepeatSettings::load(&path).unwrap();
        assert_eq!(loaded.interruptions, 7);
        assert!(!loaded.export_statistics);
        assert_eq!(
            loaded.definitions,
            vec![RepeatDefinition::new(1, 9), RepeatDefinition::new(2, 4)]
        );
    }

    #[test]
    fn test_settings_parse_reference_layout() {
        let text = "definition(unit_size,min_repeats):                   1-10 2-6\n\
                    interruptions(max_difference_between_2_SSRs):        100\n\
                    GFF:                                                 false\n";
        let settings = RepeatSettings::parse(text).unwrap();
        assert_eq!(settings.definitions.len(), 2);
        assert_eq!(settings.interruptions, 100);
        assert!(settings.export_statistics);
        assert!(RepeatSettings::parse("definition(unit_size,min_repeats): 1-x").is_err());
    }
}
