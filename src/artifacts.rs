//! Deterministic names for every file a run reads or writes
//!
//! All names derive from the input path with its extension removed (both
//! extensions for `.gz` input), so a re-run of the same input overwrites the
//! previous artifacts.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub base: PathBuf,
}

impl ArtifactPaths {
    pub fn for_input<P: AsRef<Path>>(input: P) -> Self {
        let input = input.as_ref();
        let is_compressed = input
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        let stem = if is_compressed {
            input.with_extension("")
        } else {
            input.to_path_buf()
        };
        Self {
            base: stem.with_extension(""),
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.base.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn trimmed(&self) -> PathBuf {
        self.with_suffix(".trimmedContig")
    }

    pub fn annotation(&self) -> PathBuf {
        self.with_suffix(".misa")
    }

    pub fn statistics(&self) -> PathBuf {
        self.with_suffix(".misa_statistics")
    }

    pub fn request(&self) -> PathBuf {
        self.with_suffix(".p3in")
    }

    pub fn response(&self) -> PathBuf {
        self.with_suffix(".p3out")
    }

    pub fn progress_copy(&self) -> PathBuf {
        self.with_suffix("_p3Out_ProgressCheckCopy")
    }

    pub fn primer3_settings(&self) -> PathBuf {
        self.with_suffix("_Primer3_Settings.txt")
    }

    pub fn primer3_error_log(&self) -> PathBuf {
        self.with_suffix("_Primer3_ErrorLog.txt")
    }

    pub fn final_results(&self) -> PathBuf {
        self.with_suffix("_FinalResults.csv")
    }

    pub fn trim_settings(&self) -> PathBuf {
        self.with_suffix("_TrimSettings.txt")
    }

    pub fn repeat_settings(&self) -> PathBuf {
        self.with_suffix("_misa.ini")
    }

    pub fn correct_primers(&self) -> PathBuf {
        self.with_suffix("_CorrectPrimers.csv")
    }
}
