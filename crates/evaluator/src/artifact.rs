//! On-disk storage of candidate sources.

use crate::candidate::Candidate;
use crate::sanitize::sanitize;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

static SEQUENCE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)_").expect("sequence prefix is a valid regex"));

/// Writes each candidate source as `<NNN>_<sanitized-name>.<ext>`.
///
/// The sequence advances on every persisted source, build failures included,
/// and resumes after the highest prefix already in the directory, so an
/// artifact referenced by the ledger is never overwritten.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    extension: String,
    next_sequence: u32,
}

impl ArtifactStore {
    pub fn open(dir: impl AsRef<Path>, extension: &str) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut next_sequence = 0;
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(seq) = SEQUENCE_PREFIX
                .captures(name)
                .and_then(|caps| caps[1].parse::<u32>().ok())
            {
                next_sequence = next_sequence.max(seq.checked_add(1).ok_or_else(exhausted)?);
            }
        }

        Ok(Self {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
            next_sequence,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// File name for `candidate_name` at `sequence`.
    pub fn file_name(sequence: u32, candidate_name: &str, extension: &str) -> String {
        format!("{:03}_{}.{}", sequence, sanitize(candidate_name), extension)
    }

    /// Write the candidate source and advance the sequence.
    pub fn persist(&mut self, candidate: &Candidate) -> io::Result<PathBuf> {
        let following = self.next_sequence.checked_add(1).ok_or_else(exhausted)?;
        let path = self.dir.join(Self::file_name(
            self.next_sequence,
            &candidate.name,
            &self.extension,
        ));
        fs::write(&path, &candidate.source)?;
        debug!(path = %path.display(), sequence = self.next_sequence, "candidate source persisted");
        self.next_sequence = following;
        Ok(path)
    }
}

fn exhausted() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "artifact sequence exhausted")
}
