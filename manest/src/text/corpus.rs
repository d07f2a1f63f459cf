//! Training corpus: every `*.txt` directly under a data directory,
//! flattened into one line of text.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::{ManestError, Result};

/// `.txt` files directly inside `dir`, sorted by name.
pub fn corpus_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ManestError::EmptyCorpus(format!("data directory '{}' not found", dir.display())));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_txt = path.extension().map_or(false, |ext| ext == "txt");
        if is_txt && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Join documents with a space, replace line breaks with spaces, trim.
pub fn flatten<S: AsRef<str>>(documents: &[S]) -> String {
    let mut text = String::new();
    for doc in documents {
        text.push_str(doc.as_ref());
        text.push(' ');
    }
    text.replace(['\n', '\r'], " ").trim().to_string()
}

/// Read and flatten the corpus under `dir`.
///
/// No files, or only whitespace, is [`ManestError::EmptyCorpus`].
pub fn load_corpus(dir: impl AsRef<Path>) -> Result<String> {
    let dir = dir.as_ref();
    let files = corpus_files(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "no .txt files found");
        return Err(ManestError::EmptyCorpus(format!("no .txt files in '{}'", dir.display())));
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in &files {
        info!(file = %file.display(), "reading");
        documents.push(std::fs::read_to_string(file)?);
    }

    let text = flatten(&documents);
    if text.is_empty() {
        return Err(ManestError::EmptyCorpus(format!("'{}' contains only whitespace", dir.display())));
    }
    info!(files = files.len(), characters = text.chars().count(), "corpus loaded");
    Ok(text)
}
