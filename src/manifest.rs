//! File lists and label metadata.
//!
//! Training corpora are described by a plain-text file list (one relative
//! audio path per line) and, for labeled corpora, a delimited metadata table
//! carrying the class identifiers.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("File list entry {line} shorter than trim prefix of {trim}")]
    EntryTooShort { line: usize, trim: usize },
    #[error("No class code in file name: {0}")]
    MissingClassCode(String),
    #[error("Unknown class code: {0}")]
    UnknownClassCode(i64),
    #[error("Metadata table has no rows")]
    EmptyMetadata,
}

/// Read a file list: one relative audio path per line, whitespace stripped,
/// empty lines skipped. The first `trim` characters of each entry are
/// dropped (lists are written relative to a launcher directory).
pub fn read_file_list<P: AsRef<Path>>(path: P, trim: usize) -> Result<Vec<String>, ManifestError> {
    let content = fs::read_to_string(path)?;
    let mut files = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let entry = line.trim();
        if entry.is_empty() {
            continue;
        }
        let trimmed = entry
            .get(trim..)
            .ok_or(ManifestError::EntryTooShort { line: i + 1, trim })?;
        files.push(trimmed.to_string());
    }
    Ok(files)
}

/// One row of the metadata table. Only the class column matters here;
/// remaining columns are ignored by serde.
#[derive(Debug, Deserialize)]
struct MetadataRow {
    #[serde(rename = "classID")]
    class_id: i64,
}

/// Stable mapping from sorted unique class codes to `0..K-1`.
///
/// Built once at dataset construction; lookups never mutate it.
#[derive(Debug, Clone)]
pub struct ClassIndex {
    classes: Vec<i64>,
    index: HashMap<i64, usize>,
}

impl ClassIndex {
    /// Build the index from a metadata CSV with a `classID` column.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut codes = BTreeSet::new();
        for row in reader.deserialize::<MetadataRow>() {
            codes.insert(row?.class_id);
        }
        if codes.is_empty() {
            return Err(ManifestError::EmptyMetadata);
        }
        Ok(Self::from_codes(codes))
    }

    fn from_codes(codes: BTreeSet<i64>) -> Self {
        let classes: Vec<i64> = codes.into_iter().collect();
        let index = classes.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        Self { classes, index }
    }

    /// Number of distinct classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The class codes, sorted ascending.
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Map a class code to its dense label.
    pub fn lookup(&self, code: i64) -> Result<usize, ManifestError> {
        self.index
            .get(&code)
            .copied()
            .ok_or(ManifestError::UnknownClassCode(code))
    }
}

/// Extract the filename-embedded class code: the second dash-separated
/// token of the file stem (`.../100032-3-0-0.wav` -> `3`).
pub fn class_code_from_path(entry: &str) -> Result<i64, ManifestError> {
    let stem = Path::new(entry)
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ManifestError::MissingClassCode(entry.to_string()))?;
    stem.split('-')
        .nth(1)
        .and_then(|tok| tok.parse().ok())
        .ok_or_else(|| ManifestError::MissingClassCode(entry.to_string()))
}
