//! Loading of starting positions.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpeningsError {
    #[error("Failed to read openings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reads the FENs for one match from an openings file.
///
/// The file holds one FEN per line. The first `skip` lines are skipped and
/// positions are taken up to line `total` (exclusive), so a match plays
/// `total - skip` games when the file is long enough. Blank lines are
/// dropped after the window is applied.
pub fn load_openings(path: &Path, skip: usize, total: usize) -> Result<Vec<String>, OpeningsError> {
    let content = std::fs::read_to_string(path).map_err(|source| OpeningsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(select_openings(&content, skip, total))
}

fn select_openings(content: &str, skip: usize, total: usize) -> Vec<String> {
    content
        .lines()
        .take(total)
        .skip(skip)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Positions for a match without an openings file: the standard start, `total - skip` times.
pub fn standard_openings(skip: usize, total: usize) -> Vec<String> {
    vec![uci::STARTING_FEN.to_string(); total.saturating_sub(skip)]
}
