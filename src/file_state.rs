//! Pre-flight checks on input files

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::PreconditionError;

/// Whether an input file can be opened right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePreLoadState {
    Ready,
    Missing,
    /// Exists but cannot be opened for reading
    Locked,
}

impl FilePreLoadState {
    pub fn check<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.is_dir() {
            return FilePreLoadState::Locked;
        }
        match File::open(path) {
            Ok(_) => FilePreLoadState::Ready,
            Err(e) if e.kind() == ErrorKind::NotFound => FilePreLoadState::Missing,
            Err(_) => FilePreLoadState::Locked,
        }
    }

    /// Turn a non-ready state into the matching precondition error.
    pub fn require_ready<P: AsRef<Path>>(path: P) -> Result<(), PreconditionError> {
        let path = path.as_ref();
        match Self::check(path) {
            FilePreLoadState::Ready => Ok(()),
            FilePreLoadState::Missing => Err(PreconditionError::InputMissing(path.to_path_buf())),
            FilePreLoadState::Locked => Err(PreconditionError::InputLocked(path.to_path_buf())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_states() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("contigs.fa");
        assert_eq!(FilePreLoadState::check(&file), FilePreLoadState::Missing);
        std::fs::write(&file, ">a\nACGT\n").unwrap();
        assert_eq!(FilePreLoadState::check(&file), FilePreLoadState::Ready);
        assert_eq!(FilePreLoadState::check(dir.path()), FilePreLoadState::Locked);
        assert_eq!(
            FilePreLoadState::require_ready(dir.path().join("gone.fa")),
            Err(PreconditionError::InputMissing(dir.path().join("gone.fa")))
        );
    }
}
