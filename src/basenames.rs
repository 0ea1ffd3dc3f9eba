//! Utterance lists.
//!
//! One basename per line; blank lines and `#` comments are ignored. The
//! units stage writes the accepted subset, and every later stage reads
//! that list so an excluded utterance is excluded everywhere.

use crate::error::{Result, VoicebankError};
use std::fs;
use std::path::Path;

pub const ACCEPTED_LIST: &str = "accepted.lst";

pub fn parse(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn load(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VoicebankError::state(format!("utterance list {} does not exist", path.display()))
        } else {
            VoicebankError::Io(e)
        }
    })?;
    Ok(parse(&text))
}

pub fn save(path: &Path, names: &[String]) -> Result<()> {
    let mut text = names.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    fs::write(path, text)?;
    Ok(())
}

/// Basenames of every file in `dir` with extension `ext`, sorted.
pub fn scan(dir: &Path, ext: &str) -> Result<Vec<String>> {
    let ext = ext.trim_start_matches('.');
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(ext)
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}
