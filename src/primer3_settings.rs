//! primer3 global settings (`KEY=VALUE`)
//!
//! Settings are an ordered map of the keys primer3 understands, seeded with
//! the defaults of primer3 1.1.4. Loading a file only overrides keys that
//! are already known. The file written for primer3 looks like:
//!
//! ```text
//! Primer3 File - http://primer3.sourceforge.net
//! P3_FILE_TYPE=settings
//!
//! P3_FILE_ID=Default settings of primer3 version 1.1.4
//! PRIMER_TASK=pick_detection_primers
//! ...
//! =
//! ```

use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::boulder::{BoulderLine, BoulderLines};
use crate::settings_io::write_atomically;

pub const FILE_BANNER: &str = "Primer3 File - http://primer3.sourceforge.net";
pub const NUM_RETURN_KEY: &str = "PRIMER_NUM_RETURN";
const DEFAULT_NUM_RETURN: usize = 5;

const DEFAULTS: &[(&str, &str)] = &[
    ("P3_FILE_ID", "Default settings of primer3 version 1.1.4"),
    ("PRIMER_TASK", "pick_detection_primers"),
    ("PRIMER_PICK_LEFT_PRIMER", "1"),
    ("PRIMER_PICK_INTERNAL_OLIGO", "0"),
    ("PRIMER_PICK_RIGHT_PRIMER", "1"),
    ("PRIMER_NUM_RETURN", "5"),
    ("PRIMER_PRODUCT_SIZE_RANGE", "100-300"),
    ("PRIMER_MIN_SIZE", "18"),
    ("PRIMER_OPT_SIZE", "20"),
    ("PRIMER_MAX_SIZE", "27"),
    ("PRIMER_MIN_GC", "20.0"),
    ("PRIMER_OPT_GC_PERCENT", "50.0"),
    ("PRIMER_MAX_GC", "80.0"),
    ("PRIMER_MIN_TM", "57.0"),
    ("PRIMER_OPT_TM", "60.0"),
    ("PRIMER_MAX_TM", "63.0"),
    ("PRIMER_PAIR_MAX_DIFF_TM", "100.0"),
    ("PRIMER_TM_FORMULA", "1"),
    ("PRIMER_SALT_MONOVALENT", "50.0"),
    ("PRIMER_SALT_DIVALENT", "1.5"),
    ("PRIMER_DNTP_CONC", "0.6"),
    ("PRIMER_SALT_CORRECTIONS", "1"),
    ("PRIMER_DNA_CONC", "50.0"),
    ("PRIMER_THERMODYNAMIC_OLIGO_ALIGNMENT", "1"),
    ("PRIMER_MAX_SELF_ANY_TH", "47.0"),
    ("PRIMER_MAX_SELF_END_TH", "47.0"),
    ("PRIMER_MAX_HAIRPIN_TH", "47.0"),
    ("PRIMER_PAIR_MAX_COMPL_ANY_TH", "47.0"),
    ("PRIMER_PAIR_MAX_COMPL_END_TH", "47.0"),
    ("PRIMER_MAX_END_STABILITY", "100.0"),
    ("PRIMER_MAX_POLY_X", "5"),
    ("PRIMER_MAX_NS_ACCEPTED", "0"),
    ("PRIMER_FIRST_BASE_INDEX", "0"),
    ("PRIMER_EXPLAIN_FLAG", "1"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primer3Settings {
    values: IndexMap<String, String>,
}

impl Default for Primer3Settings {
    fn default() -> Self {
        Self {
            values: DEFAULTS
                .iter()
                .map(|&(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Primer3Settings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a known key. Returns false (and changes nothing) for unknown keys.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        match self.values.get_mut(key) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of primer pairs primer3 is asked to return
    pub fn num_return(&self) -> usize {
        self.get(NUM_RETURN_KEY)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_NUM_RETURN)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open primer3 settings {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to read primer3 settings {}", path.display()))
    }

    /// Defaults overridden by the known keys of a `KEY=VALUE` stream.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut settings = Self::default();
        for line in BoulderLines::new(reader) {
            if let BoulderLine::Field { key, value } = line? {
                if !settings.set(&key, value) {
                    log::debug!("[primer3] Ignoring unknown setting {key}");
                }
            }
        }
        Ok(settings)
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "{FILE_BANNER}")?;
        writeln!(w, "P3_FILE_TYPE=settings")?;
        writeln!(w)?;
        for (key, value) in self.iter() {
            writeln!(w, "{key}={value}")?;
        }
        writeln!(w, "=")?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomically(path.as_ref(), |w| self.write_to(w))
    }
}
