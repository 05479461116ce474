//! Response (`.p3out`) records from primer3
//!
//! Within a record, primer pair `i` starts at the first field whose key is
//! `PRIMER_LEFT_{i}` or `PRIMER_LEFT_{i}_*` and ends at
//! `PRIMER_PAIR_{i}_PRODUCT_SIZE`. Pairs are read in index order, starting
//! at 0. A pair left open at the end of the record is kept as is.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::boulder::{BoulderRecord, BoulderRecords};

/// Number of final-table columns per primer pair.
pub const PAIR_COLUMNS: usize = 9;

/// One designed primer pair, kept as the text primer3 produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimerPair {
    pub left_sequence: String,
    pub left_tm: String,
    pub left_size: String,
    pub right_sequence: String,
    pub right_tm: String,
    pub right_size: String,
    pub product_size: String,
    /// Start of the left primer
    pub start: String,
    /// Position of the right primer (its 3'-most base on the template)
    pub end: String,
}

impl PrimerPair {
    /// The nine final-table columns of this pair
    pub fn columns(&self) -> [&str; PAIR_COLUMNS] {
        [
            &self.left_sequence,
            &self.left_tm,
            &self.left_size,
            &self.right_sequence,
            &self.right_tm,
            &self.right_size,
            &self.product_size,
            &self.start,
            &self.end,
        ]
    }

    // Returns true when `key` closes the pair
    fn apply(&mut self, index: usize, key: &str, value: &str) -> bool {
        let left = format!("PRIMER_LEFT_{index}");
        let right = format!("PRIMER_RIGHT_{index}");

        if let Some(suffix) = key.strip_prefix(left.as_str()) {
            match suffix {
                "_SEQUENCE" => self.left_sequence = value.to_string(),
                "_TM" => self.left_tm = value.to_string(),
                "" => {
                    let (start, size) = split_position(value);
                    self.start = start;
                    self.left_size = size;
                }
                _ => {}
            }
        } else if let Some(suffix) = key.strip_prefix(right.as_str()) {
            match suffix {
                "_SEQUENCE" => self.right_sequence = value.to_string(),
                "_TM" => self.right_tm = value.to_string(),
                "" => {
                    let (end, size) = split_position(value);
                    self.end = end;
                    self.right_size = size;
                }
                _ => {}
            }
        } else if key == format!("PRIMER_PAIR_{index}_PRODUCT_SIZE") {
            self.product_size = value.to_string();
            return true;
        }
        false
    }
}

fn split_position(value: &str) -> (String, String) {
    match value.split_once(',') {
        Some((position, size)) => (position.trim().to_string(), size.trim().to_string()),
        None => (value.trim().to_string(), String::new()),
    }
}

fn opens_pair(key: &str, index: usize) -> bool {
    key.strip_prefix(&format!("PRIMER_LEFT_{index}"))
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
}

/// primer3's answer for one requested repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimerResponseRecord {
    pub sequence_id: String,
    pub template: String,
    pub pairs: Vec<PrimerPair>,
}

impl PrimerResponseRecord {
    pub fn from_record(record: &BoulderRecord) -> Self {
        let mut response = PrimerResponseRecord::default();
        let mut open: Option<PrimerPair> = None;

        for (key, value) in &record.fields {
            match key.as_str() {
                "SEQUENCE_ID" => response.sequence_id = value.clone(),
                "SEQUENCE_TEMPLATE" => response.template = value.clone(),
                _ => {
                    let index = response.pairs.len();
                    if open.is_none() && opens_pair(key, index) {
                        open = Some(PrimerPair::default());
                    }
                    if let Some(pair) = open.as_mut() {
                        if pair.apply(index, key, value) {
                            response.pairs.extend(open.take());
                        }
                    }
                }
            }
        }
        response.pairs.extend(open);
        response
    }

    /// A response is valid when at least one pair was designed
    pub fn is_valid(&self) -> bool {
        !self.pairs.is_empty()
    }
}

/// Lazy iterator of [`PrimerResponseRecord`]s.
pub struct PrimerResponseParser<R: BufRead> {
    records: BoulderRecords<R>,
}

impl PrimerResponseParser<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open primer3 output {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> PrimerResponseParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            records: BoulderRecords::new(reader),
        }
    }
}

impl<R: BufRead> Iterator for PrimerResponseParser<R> {
    type Item = Result<PrimerResponseRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records
            .next()
            .map(|record| record.map(|r| PrimerResponseRecord::from_record(&r)))
    }
}

/// Valid and total response counts in a (possibly partial) output file.
pub fn count_responses<P: AsRef<Path>>(path: P) -> Result<(usize, usize)> {
    let mut valid = 0;
    let mut total = 0;
    for response in PrimerResponseParser::open(path)? {
        total += 1;
        if response?.is_valid() {
            valid += 1;
        }
    }
    Ok((valid, total))
}
