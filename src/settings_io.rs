//! Shared helpers for settings files
//!
//! Settings are read by concurrent runs, so they are written to a sibling
//! temporary file and renamed into place.

use anyhow::{Context, Result};
use std::env;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write `path` through a temporary file in the same directory.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    {
        let mut writer = BufWriter::new(temp.as_file());
        write(&mut writer)?;
        writer.flush()?;
    }

    temp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Directory containing the running executable.
pub fn executable_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// `<dir of executable>/<file_name>`, if that file exists.
pub fn beside_executable(file_name: &str) -> Option<PathBuf> {
    executable_dir()
        .map(|dir| dir.join(file_name))
        .filter(|path| path.exists())
}

/// Parse a `KEY: VALUE` line. Returns `None` for lines without a colon.
pub fn parse_colon_line(line: &str) -> Option<(&str, &str)> {
    use nom::bytes::complete::{tag, take_till1};
    use nom::character::complete::space0;
    use nom::combinator::rest;
    use nom::sequence::{preceded, separated_pair};
    use nom::IResult;

    fn pair(input: &str) -> IResult<&str, (&str, &str)> {
        separated_pair(take_till1(|c| c == ':'), tag(":"), preceded(space0, rest))(input)
    }

    pair(line)
        .ok()
        .map(|(_, (key, value))| (key.trim(), value.trim()))
}
