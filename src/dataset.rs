use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use log::warn;
use rand::Rng;
use unicode_normalization::UnicodeNormalization;

use crate::error::ConfigError;

/// Suffix of the ground-truth transcript next to each line image.
pub const TRANSCRIPT_SUFFIX: &str = ".gt.txt";

/// Expands every argument containing a glob metacharacter; other arguments are
/// taken literally. Matches of one pattern are sorted.
pub fn glob_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut result = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        if !pattern.contains(['*', '?', '[']) {
            result.push(PathBuf::from(pattern));
            continue;
        }

        let mut matches = Vec::new();
        for entry in glob::glob(pattern)? {
            match entry {
                Ok(path) => matches.push(path),
                Err(err) => warn!("skipping unreadable match of {pattern}: {err}"),
            }
        }
        matches.sort();
        result.extend(matches);
    }

    Ok(result)
}

/// Reads one input path per line, ignoring blank lines.
pub fn read_file_list(path: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Strips every extension from the file name: `dir/010001.bin.png` -> `dir/010001`.
pub fn base_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    // leading dots belong to the stem of hidden files
    let body = name.trim_start_matches('.');
    let dots = name.len() - body.len();
    let stem_len = dots + body.find('.').unwrap_or(body.len());

    path.with_file_name(&name[..stem_len])
}

pub fn transcript_path(image: &Path) -> PathBuf {
    let mut base = base_path(image).into_os_string();
    base.push(TRANSCRIPT_SUFFIX);
    PathBuf::from(base)
}

/// Reads a transcript, dropping one trailing newline and applying NFKC.
pub fn read_transcript(path: &Path) -> io::Result<String> {
    let text = fs::read_to_string(path)?;
    let text = text
        .strip_suffix('\n')
        .map(|t| t.strip_suffix('\r').unwrap_or(t))
        .unwrap_or(&text);

    Ok(text.nfkc().collect())
}

/// The line images a session samples from.
#[derive(Clone, Debug, Default)]
pub struct LineDataset {
    inputs: Vec<PathBuf>,
}

impl LineDataset {
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self { inputs }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.inputs.get(index).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.inputs.iter().map(PathBuf::as_path)
    }

    /// Uniform draw; `None` when empty.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<&Path> {
        if self.inputs.is_empty() {
            return None;
        }
        self.get(rng.random_range(0..self.inputs.len()))
    }
}
