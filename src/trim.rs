//! Sequence trimming
//!
//! A trim is an ordered list of [`TrimOperation`]s applied left to right to
//! a normalized sequence. As soon as one operation reduces the sequence to
//! nothing the remaining operations are skipped and the sequence is dropped.
//!
//! [`TrimSettings`] is the on-disk form of that list:
//!
//! ```text
//! Export trimmed file: false
//! AMB: 2,200
//! STRETCH: 5',A,5,200
//! STRETCH: 3',A,5,200
//! CUT: 500,50700
//! ```

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::error::SettingsError;

const AMBIGUOUS_BASE: u8 = b'N';

/// One step of a trim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimOperation {
    /// Strip runs of at least `number_of_bases` `N`s found within the
    /// outer `window_size` bases, from both ends (5' first).
    AmbiguousEdgeTrim {
        number_of_bases: usize,
        window_size: usize,
    },
    /// Truncate to `max_length`; drop the sequence if shorter than `min_length`.
    CutOff { min_length: usize, max_length: usize },
    /// Strip a homopolymer stretch of `base` near one end.
    HomopolymerStretchTrim {
        from_start: bool,
        base: u8,
        min_repeat: usize,
        window_size: usize,
    },
}

impl TrimOperation {
    /// Apply this operation to `sequence`.
    pub fn apply<'a>(&self, sequence: &'a str) -> &'a str {
        match *self {
            TrimOperation::AmbiguousEdgeTrim {
                number_of_bases,
                window_size,
            } => {
                let start_trimmed = trim_ambiguous_start(sequence, number_of_bases, window_size);
                trim_ambiguous_end(start_trimmed, number_of_bases, window_size)
            }
            TrimOperation::CutOff {
                min_length,
                max_length,
            } => cut_off(sequence, min_length, max_length),
            TrimOperation::HomopolymerStretchTrim {
                from_start,
                base,
                min_repeat,
                window_size,
            } => {
                let base = base.to_ascii_uppercase();
                if from_start {
                    trim_stretch_start(sequence, base, min_repeat, window_size)
                } else {
                    trim_stretch_end(sequence, base, min_repeat, window_size)
                }
            }
        }
    }
}

impl fmt::Display for TrimOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TrimOperation::AmbiguousEdgeTrim {
                number_of_bases,
                window_size,
            } => write!(f, "AMB: {number_of_bases},{window_size}"),
            TrimOperation::CutOff {
                min_length,
                max_length,
            } => write!(f, "CUT: {min_length},{max_length}"),
            TrimOperation::HomopolymerStretchTrim {
                from_start,
                base,
                min_repeat,
                window_size,
            } => write!(
                f,
                "STRETCH: {},{},{min_repeat},{window_size}",
                if from_start { "5'" } else { "3'" },
                base as char
            ),
        }
    }
}

impl FromStr for TrimOperation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, args) = s
            .split_once(':')
            .with_context(|| format!("Missing ':' in trim operation '{s}'"))?;
        let args: Vec<&str> = args.split(',').map(str::trim).collect();
        let number = |i: usize| -> Result<usize> {
            args.get(i)
                .with_context(|| format!("Missing argument {} in '{s}'", i + 1))?
                .parse::<usize>()
                .with_context(|| format!("Invalid number in '{s}'"))
        };

        match name.trim().to_ascii_uppercase().as_str() {
            "AMB" => Ok(TrimOperation::AmbiguousEdgeTrim {
                number_of_bases: number(0)?,
                window_size: number(1)?,
            }),
            "CUT" => Ok(TrimOperation::CutOff {
                min_length: number(0)?,
                max_length: number(1)?,
            }),
            "STRETCH" => {
                let from_start = match args.first().copied() {
                    Some("5'") => true,
                    Some("3'") => false,
                    other => anyhow::bail!("Invalid stretch direction {:?} in '{s}'", other),
                };
                let base = match args.get(1).map(|b| b.as_bytes()) {
                    Some([b]) if b.is_ascii_alphabetic() => b.to_ascii_uppercase(),
                    _ => anyhow::bail!("Invalid stretch base in '{s}'"),
                };
                Ok(TrimOperation::HomopolymerStretchTrim {
                    from_start,
                    base,
                    min_repeat: number(2)?,
                    window_size: number(3)?,
                })
            }
            other => anyhow::bail!("Unknown trim operation '{other}'"),
        }
    }
}

/// Apply `ops` in order. Returns an empty string if any operation empties
/// the sequence.
pub fn trim(sequence: &str, ops: &[TrimOperation]) -> String {
    let mut current = sequence;
    for op in ops {
        if current.is_empty() {
            break;
        }
        current = op.apply(current);
    }
    current.to_string()
}

fn cut_off(sequence: &str, min_length: usize, max_length: usize) -> &str {
    let sequence = if sequence.len() > max_length {
        &sequence[..max_length]
    } else {
        sequence
    };
    if sequence.len() < min_length {
        ""
    } else {
        sequence
    }
}

fn trim_ambiguous_start(sequence: &str, number_of_bases: usize, window_size: usize) -> &str {
    let mut current = sequence;
    while window_size > 0 && current.len() > window_size {
        let window = &current.as_bytes()[..window_size];
        if window[0] != AMBIGUOUS_BASE {
            break;
        }
        let run = window.iter().take_while(|&&b| b == AMBIGUOUS_BASE).count();
        if run < number_of_bases {
            break;
        }
        current = &current[run..];
    }
    current
}

fn trim_ambiguous_end(sequence: &str, number_of_bases: usize, window_size: usize) -> &str {
    let mut current = sequence;
    while window_size > 0 && current.len() > window_size {
        let window = &current.as_bytes()[current.len() - window_size..];
        if window[window_size - 1] != AMBIGUOUS_BASE {
            break;
        }
        let run = window
            .iter()
            .rev()
            .take_while(|&&b| b == AMBIGUOUS_BASE)
            .count();
        if run < number_of_bases {
            break;
        }
        current = &current[..current.len() - run];
    }
    current
}

// When the outermost base already matches, the whole outer run is removed
// without checking `min_repeat` and without regard to the window.
fn trim_stretch_start(sequence: &str, base: u8, min_repeat: usize, window_size: usize) -> &str {
    let mut current = sequence;
    while !current.is_empty() && window_size > 0 {
        let bytes = current.as_bytes();
        let window = &bytes[..window_size.min(bytes.len())];

        if window[0] == base {
            current = current.trim_start_matches(base as char);
            continue;
        }

        let mut cut = None;
        let mut i = 0;
        while i < window.len() {
            if window[i] == base {
                let run = window[i..].iter().take_while(|&&b| b == base).count();
                if run >= min_repeat {
                    cut = Some(i + run);
                    break;
                }
                i += run;
            } else {
                i += 1;
            }
        }

        match cut {
            Some(cut) => current = &current[cut..],
            None => break,
        }
    }
    current
}

fn trim_stretch_end(sequence: &str, base: u8, min_repeat: usize, window_size: usize) -> &str {
    let mut current = sequence;
    while !current.is_empty() && window_size > 0 {
        let bytes = current.as_bytes();
        let offset = bytes.len().saturating_sub(window_size);
        let window = &bytes[offset..];

        if window[window.len() - 1] == base {
            current = current.trim_end_matches(base as char);
            continue;
        }

        let mut cut = None;
        let mut i = window.len();
        while i > 0 {
            if window[i - 1] == base {
                let run = window[..i].iter().rev().take_while(|&&b| b == base).count();
                if run >= min_repeat {
                    cut = Some(offset + i - run);
                    break;
                }
                i -= run;
            } else {
                i -= 1;
            }
        }

        match cut {
            Some(cut) => current = &current[..cut],
            None => break,
        }
    }
    current
}

/// Trim operations plus the trimmed-file export flag, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimSettings {
    pub export_trimmed: bool,
    pub operations: Vec<TrimOperation>,
}

const EXPORT_PREFIX: &str = "Export trimmed file:";

impl Default for TrimSettings {
    fn default() -> Self {
        Self {
            export_trimmed: false,
            operations: vec![
                TrimOperation::AmbiguousEdgeTrim {
                    number_of_bases: 2,
                    window_size: 200,
                },
                TrimOperation::HomopolymerStretchTrim {
                    from_start: true,
                    base: b'A',
                    min_repeat: 5,
                    window_size: 200,
                },
                TrimOperation::HomopolymerStretchTrim {
                    from_start: false,
                    base: b'A',
                    min_repeat: 5,
                    window_size: 200,
                },
                TrimOperation::CutOff {
                    min_length: 500,
                    max_length: 50700,
                },
            ],
        }
    }
}

impl TrimSettings {
    /// Parse settings text. Blank lines are ignored; anything else that is
    /// not a known line is an error.
    pub fn parse(text: &str) -> Result<Self, SettingsError> {
        let mut settings = TrimSettings {
            export_trimmed: false,
            operations: Vec::new(),
        };

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let lower = line.to_ascii_lowercase();
            if lower.starts_with(&EXPORT_PREFIX.to_ascii_lowercase()) {
                let value = line[EXPORT_PREFIX.len()..].trim();
                settings.export_trimmed = value
                    .parse::<bool>()
                    .or_else(|_| value.to_ascii_lowercase().parse::<bool>())
                    .map_err(|_| SettingsError::new(i + 1, line, "invalid boolean"))?;
            } else {
                let op = line
                    .parse::<TrimOperation>()
                    .map_err(|e| SettingsError::new(i + 1, line, e.to_string()))?;
                settings.operations.push(op);
            }
        }

        Ok(settings)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read trim settings {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid trim settings in {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::settings_io::write_atomically(path.as_ref(), |w| {
            writeln!(w, "{EXPORT_PREFIX} {}", self.export_trimmed)?;
            for op in &self.operations {
                writeln!(w, "{op}")?;
            }
            Ok(())
        })
    }
}
