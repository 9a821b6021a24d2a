use std::fs;
use std::path::Path;

use crate::error::{PcfError, Result};

/// Every internal-node support value: `):` followed by one digit, `.`, and
/// one or more digits.
pub fn support_values(tree: &str) -> Vec<f64> {
    let bytes = tree.as_bytes();
    let mut values = Vec::new();
    let mut i = 0;

    while i + 4 < bytes.len() {
        let matched = bytes[i] == b')'
            && bytes[i + 1] == b':'
            && bytes[i + 2].is_ascii_digit()
            && bytes[i + 3] == b'.'
            && bytes[i + 4].is_ascii_digit();
        if !matched {
            i += 1;
            continue;
        }
        let start = i + 2;
        let mut end = i + 5;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if let Ok(v) = tree[start..end].parse::<f64>() {
            values.push(v);
        }
        i = end;
    }
    values
}

/// Mean of every support value except the last (root-adjacent) one.
pub fn average_support(tree: &str) -> Result<f64> {
    let values = support_values(tree);
    if values.len() < 2 {
        return Err(PcfError::DegenerateSupport(values.len()));
    }
    let kept = &values[..values.len() - 1];
    Ok(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// [`average_support`] over the contents of a rebuilt tree file.
pub fn average_support_file<P: AsRef<Path>>(path: P) -> Result<f64> {
    let path = path.as_ref();
    let tree = fs::read_to_string(path).map_err(|e| PcfError::file_io(path, e))?;
    average_support(tree.trim())
}
