//! `KEY=VALUE` block grammar used by primer3
//!
//! A stream is a sequence of records. Each record is a run of `KEY=VALUE`
//! lines terminated by a line containing only `=`. The final record may be
//! unterminated (end of stream), which happens when reading output that is
//! still being written.
//!
//! [`BoulderLines`] turns a reader into [`BoulderLine`]s; [`BoulderRecords`]
//! groups those into [`BoulderRecord`]s. Neither shares state with its
//! consumers, so request and response readers are built on the same cursor.

use anyhow::{Context, Result};
use nom::bytes::complete::{tag, take_till1};
use nom::combinator::rest;
use nom::sequence::separated_pair;
use nom::IResult;
use std::io::{BufRead, Write};

/// One classified line of a boulder stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoulderLine {
    Field { key: String, value: String },
    /// The lone `=` that ends a record
    EndOfRecord,
    /// Anything else, such as a blank line or a settings-file banner
    Other(String),
}

fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_till1(|c| c == '='), tag("="), rest)(input)
}

impl BoulderLine {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim() == "=" {
            return BoulderLine::EndOfRecord;
        }
        match key_value(line) {
            Ok((_, (key, value))) => BoulderLine::Field {
                key: key.trim().to_string(),
                value: value.to_string(),
            },
            Err(_) => BoulderLine::Other(line.to_string()),
        }
    }
}

/// Lazy iterator of [`BoulderLine`]s.
pub struct BoulderLines<R: BufRead> {
    reader: R,
    buf: String,
}

impl<R: BufRead> BoulderLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for BoulderLines<R> {
    type Item = Result<BoulderLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => Some(Ok(BoulderLine::parse(&self.buf))),
            Err(e) => Some(Err(e).context("Failed to read KEY=VALUE stream")),
        }
    }
}

/// The fields of one record, in stream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoulderRecord {
    pub fields: Vec<(String, String)>,
    /// False if the stream ended before the closing `=`
    pub terminated: bool,
}

impl BoulderRecord {
    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.fields.push((key.into(), value.to_string()));
    }

    /// Write the record including its terminating `=` line.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        for (key, value) in &self.fields {
            writeln!(w, "{key}={value}")?;
        }
        writeln!(w, "=")
    }
}

/// Lazy iterator of [`BoulderRecord`]s.
///
/// Non-field lines are dropped. Trailing content with no fields after the
/// last `=` does not produce a record.
pub struct BoulderRecords<R: BufRead> {
    lines: BoulderLines<R>,
}

impl<R: BufRead> BoulderRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BoulderLines::new(reader),
        }
    }
}

impl<R: BufRead> Iterator for BoulderRecords<R> {
    type Item = Result<BoulderRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = BoulderRecord::default();
        for line in self.lines.by_ref() {
            match line {
                Ok(BoulderLine::Field { key, value }) => record.fields.push((key, value)),
                Ok(BoulderLine::EndOfRecord) => {
                    record.terminated = true;
                    return Some(Ok(record));
                }
                Ok(BoulderLine::Other(_)) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        if record.fields.is_empty() {
            None
        } else {
            Some(Ok(record))
        }
    }
}

/// Number of `=`-terminated records in a stream.
pub fn count_terminated_records<R: BufRead>(reader: R) -> Result<usize> {
    let mut count = 0;
    for line in BoulderLines::new(reader) {
        if line? == BoulderLine::EndOfRecord {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_line_classification() {
        assert_eq!(
            BoulderLine::parse("SEQUENCE_ID=seq1_1\n"),
            BoulderLine::Field {
                key: "SEQUENCE_ID".into(),
                value: "seq1_1".into()
            }
        );
        assert_eq!(
            BoulderLine::parse("PRIMER_TASK=\r\n"),
            BoulderLine::Field {
                key: "PRIMER_TASK".into(),
                value: String::new()
            }
        );
        assert_eq!(
            BoulderLine::parse("P3_FILE_ID=a=b"),
            BoulderLine::Field {
                key: "P3_FILE_ID".into(),
                value: "a=b".into()
            }
        );
        assert_eq!(BoulderLine::parse("=\n"), BoulderLine::EndOfRecord);
        assert_eq!(BoulderLine::parse(""), BoulderLine::Other(String::new()));
        assert!(matches!(
            BoulderLine::parse("Primer3 File - http://primer3.sourceforge.net"),
            BoulderLine::Other(_)
        ));
    }

    #[test]
    fn test_records() {
        let text = "A=1\nB=2\n=\n\nA=3\n=\nA=4\n";
        let records: Vec<_> = BoulderRecords::new(Cursor::new(text))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get("B"), Some("2"));
        assert!(records[1].terminated);
        assert!(!records[2].terminated);
        assert_eq!(records[2].get("A"), Some("4"));
    }

    #[test]
    fn test_trailing_blank_lines_make_no_record() {
        let records: Vec<_> = BoulderRecords::new(Cursor::new("A=1\n=\n\n\n"))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_write_and_count() {
        let mut record = BoulderRecord::default();
        record.push("SEQUENCE_ID", "x_1");
        record.push("PRIMER_MAX_END_STABILITY", 250);
        let mut out = Vec::new();
        record.write_to(&mut out).unwrap();
        record.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            "SEQUENCE_ID=x_1\nPRIMER_MAX_END_STABILITY=250\n=\nSEQUENCE_ID=x_1\nPRIMER_MAX_END_STABILITY=250\n=\n"
        );
        assert_eq!(count_terminated_records(Cursor::new(out)).unwrap(), 2);
    }
}
