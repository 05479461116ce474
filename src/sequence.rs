//! Streaming reader for multi-record sequence files
//!
//! Records are produced one at a time so that arbitrarily large contig
//! files never have to be held in memory. Headers start with `>`; every
//! following line up to the next header is sequence data. Bytes that are
//! not valid UTF-8 decode to U+FFFD, which normalization turns into `N`.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Width of sequence lines in the trimmed-contig output.
pub const TRIMMED_LINE_WIDTH: usize = 70;

/// One record of a sequence file, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    /// Header text without the leading `>`, spaces replaced by `_`
    pub id: String,
    /// Concatenated raw data lines
    pub data: String,
}

/// Normalize raw sequence text: uppercase, drop digits, whitespace and `>`,
/// and turn anything outside `ACGTN` into `N`.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_ascii_digit() && !c.is_whitespace() && *c != '>')
        .map(|c| match c.to_ascii_uppercase() {
            b @ ('A' | 'C' | 'G' | 'T' | 'N') => b,
            _ => 'N',
        })
        .collect()
}

fn parse_header(header: &str) -> String {
    header.trim_end().replace(' ', "_")
}

/// Open a sequence file, decompressing `.gz` input transparently.
pub fn open_sequence_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open sequence file {}", path.display()))?;

    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_compressed {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Pulls [`SequenceRecord`]s out of a line-oriented reader.
pub struct SequenceReader<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    pending_id: Option<String>,
    bytes_read: u64,
    finished: bool,
}

impl<R: BufRead> SequenceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            pending_id: None,
            bytes_read: 0,
            finished: false,
        }
    }

    /// Bytes consumed from the underlying reader so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next record. Headerless data and records without data are
    /// skipped with a warning. After a read error the record in progress is
    /// lost and the reader is exhausted.
    pub fn next_record(&mut self) -> Result<Option<SequenceRecord>> {
        loop {
            if self.finished && self.pending_id.is_none() {
                return Ok(None);
            }

            let id = self.pending_id.take();
            let data = self.read_until_header()?;

            match id {
                Some(id) if !data.is_empty() => return Ok(Some(SequenceRecord { id, data })),
                Some(id) => log::warn!("[trim] Skipping record '{id}' with no sequence data"),
                None if !data.trim().is_empty() => log::warn!(
                    "[trim] Skipping {} characters of sequence data before the first header",
                    data.len()
                ),
                None => {}
            }
        }
    }

    fn read_until_header(&mut self) -> Result<String> {
        let mut data = String::new();
        while !self.finished {
            self.line.clear();
            let n = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Err(e).context("Failed to read sequence data");
                }
            };
            if n == 0 {
                self.finished = true;
                break;
            }
            self.bytes_read += n as u64;

            let line = String::from_utf8_lossy(&self.line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(header) = line.strip_prefix('>') {
                self.pending_id = Some(parse_header(header));
                break;
            }
            data.push_str(line);
        }
        Ok(data)
    }
}

impl<R: BufRead> Iterator for SequenceReader<R> {
    type Item = Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Writes trimmed sequences as `>id` followed by fixed-width lines.
pub struct TrimmedWriter<W: Write> {
    writer: W,
}

impl TrimmedWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create trimmed output {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TrimmedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_record(&mut self, id: &str, bases: &str) -> Result<()> {
        writeln!(self.writer, ">{id}")?;
        for chunk in bases.as_bytes().chunks(TRIMMED_LINE_WIDTH) {
            self.writer.write_all(chunk)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("acgt n1 2>xR\t"), "ACGTNNN");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_reader_multi_record() {
        let input = "> contig one\nACGT\nacgt\n>contig2\r\nTTTT\r\n";
        let records: Vec<_> = SequenceReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "_contig_one");
        assert_eq!(records[0].data, "ACGTacgt");
        assert_eq!(records[1].id, "contig2");
        assert_eq!(records[1].data, "TTTT");
    }

    #[test]
    fn test_reader_skips_orphans_and_empty_records() {
        let input = "ACGT\n>empty\n>real\nGG\n>trailing\n";
        let mut reader = SequenceReader::new(Cursor::new(input));
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.id, "real");
        assert_eq!(first.data, "GG");
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.bytes_read(), input.len() as u64);
    }

    #[test]
    fn test_reader_decodes_invalid_utf8() {
        let input: &[u8] = b">good\nACGTACGT\n>bad\xE9\nAC\xE9GT\n>after\nGGGG\n";
        let records: Vec<_> = SequenceReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "bad\u{FFFD}", "after"]);
        assert_eq!(normalize(&records[1].data), "ACNGT");
    }

    #[test]
    fn test_read_error_ends_stream() {
        struct Failing;
        impl std::io::Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("corrupt"))
            }
        }
        let mut reader = SequenceReader::new(std::io::BufReader::new(Failing));
        assert!(reader.next_record().is_err());
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_trimmed_writer_wraps() {
        let bases = "A".repeat(150);
        let mut writer = TrimmedWriter::new(Vec::new());
        writer.write_record("seq1", &bases).unwrap();
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], ">seq1");
        assert_eq!(lines[1].len(), 70);
        assert_eq!(lines[2].len(), 70);
        assert_eq!(lines[3].len(), 10);
    }
}
