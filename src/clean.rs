use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{PcfError, Result};
use crate::types::CleanedTrees;

/// Marker that identifies a sampled-tree record line.
pub const STATE_MARKER: &str = "STATE";

/// Length of the posterior tree file extension (`.trees`).
pub const TREE_EXTENSION_LEN: usize = 6;

/// Reads a posterior tree file (plain or `.gz`), strips the bracketed
/// parameter annotations from every sampled-tree line and counts the trees.
pub fn clean_tree_file<P: AsRef<Path>>(path: P) -> Result<CleanedTrees> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PcfError::InputNotFound(path.to_path_buf()),
        _ => PcfError::file_io(path, e),
    })?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };

    let base_name = base_name(path)?;
    let mut lines = Vec::new();
    let mut tree_count = 0;

    for line in reader.lines() {
        let line = line.map_err(|e| PcfError::file_io(path, e))?;
        let line = line.trim();
        if line.contains(STATE_MARKER) {
            lines.push(strip_brackets(line));
            tree_count += 1;
        } else {
            lines.push(line.to_string());
        }
    }

    log::debug!(
        "Cleaned {}: {} lines, {} sampled trees",
        path.display(),
        lines.len(),
        tree_count
    );

    Ok(CleanedTrees {
        lines,
        base_name,
        tree_count,
    })
}

/// Removes every `[...]` span, pairing each `[` with the nearest `]` after it.
/// An unterminated `[` is kept verbatim along with the rest of the line.
pub fn strip_brackets(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        match rest[open..].find(']') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// File name minus the `.trees` extension (and a trailing `.gz`, if any).
pub fn base_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PcfError::InvalidInputName(path.display().to_string()))?;
    let name = name.strip_suffix(".gz").unwrap_or(name);

    let cut = name.len().checked_sub(TREE_EXTENSION_LEN).unwrap_or(0);
    if cut == 0 || !name.is_char_boundary(cut) {
        return Err(PcfError::InvalidInputName(name.to_string()));
    }
    Ok(name[..cut].to_string())
}
