//src/concordance_tree.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{PcfError, Result};
use crate::types::TaxonMap;

/// Line in the BUCKy `.concordance` output preceding the tree we want.
pub const CONCORDANCE_TREE_HEADER: &str = "Primary Concordance Tree with Sample Concordance Factors:";

/// Characters of tool-specific footer dropped from the end of the tree.
pub const TRAILING_TRIM: usize = 21;

/// Returns the line right after [`CONCORDANCE_TREE_HEADER`].
pub fn read_raw_tree<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| PcfError::file_io(path, e))?;
    let mut lines = BufReader::new(f).lines();

    while let Some(line) = lines.next() {
        let line = line.map_err(|e| PcfError::file_io(path, e))?;
        if line.trim() == CONCORDANCE_TREE_HEADER {
            return match lines.next() {
                Some(tree) => Ok(tree.map_err(|e| PcfError::file_io(path, e))?.trim().to_string()),
                None => Err(PcfError::MissingConcordanceTree(path.to_path_buf())),
            };
        }
    }
    Err(PcfError::MissingConcordanceTree(path.to_path_buf()))
}

/// Replaces every taxon index (a digit run directly followed by `:`) with
/// its label. Any other digit run is copied through unchanged.
pub fn substitute_labels(raw: &str, taxa: &TaxonMap) -> Result<String> {
    let mut out = String::with_capacity(raw.len() * 2);
    let mut digits = String::new();

    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if c == ':' && !digits.is_empty() {
            let label = digits
                .parse::<u32>()
                .ok()
                .and_then(|index| taxa.get(&index))
                .ok_or_else(|| PcfError::UnknownTaxonIndex(digits.clone()))?;
            out.push_str(label);
        } else {
            out.push_str(&digits);
        }
        out.push(c);
        digits.clear();
    }
    out.push_str(&digits);
    Ok(out)
}

/// Drops the first character and the last [`TRAILING_TRIM`] characters and
/// closes the tree with `);`.
pub fn trim_tree(tree: &str) -> Result<String> {
    let chars: Vec<char> = tree.chars().collect();
    if chars.len() <= TRAILING_TRIM + 1 {
        return Err(PcfError::TreeTooShort(chars.len()));
    }
    let mut out: String = chars[1..chars.len() - TRAILING_TRIM].iter().collect();
    out.push_str(");");
    Ok(out)
}

/// Reads the raw concordance output, substitutes taxon labels and writes
/// the trimmed tree to `out_path`. Returns the tree text.
pub fn rebuild_concordance_tree<P: AsRef<Path>, Q: AsRef<Path>>(
    concordance_path: P,
    taxa: &TaxonMap,
    out_path: Q,
) -> Result<String> {
    let raw = read_raw_tree(&concordance_path)?;
    let labelled = substitute_labels(&raw, taxa)?;
    let tree = trim_tree(&labelled)?;

    let out_path = out_path.as_ref();
    std::fs::write(out_path, &tree).map_err(|e| PcfError::file_io(out_path, e))?;
    log::debug!("Rebuilt concordance tree {}: {}", out_path.display(), tree);
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BUCKY_OUTPUT: &str = "translate
 1 popA,
 2 popB,
 3 popC,
 4 OG1,
 5 OG2;

Population Tree:
(((1,2),3),4,5);

Primary Concordance Tree Topology:
(((1,2),3),4,5);

Population Tree, With Branch Lengths In Estimated Coalescent Units:
(((1:10.000,2:10.000):0.512,3:10.000):1.204,4:10.000,5:10.000);

Primary Concordance Tree with Sample Concordance Factors:
(((1:1.000,2:1.000):0.900,3:1.000):0.850,4:1.000,5:1.000);

Splits in the Primary Concordance Tree: sample-wide and genome-wide mean CF (95% credibility), SD of mean sample-wide CF
";

    fn taxa() -> TaxonMap {
        ["popA", "popB", "popC", "OG1", "OG2"]
            .iter()
            .enumerate()
            .map(|(i, label)| (i as u32 + 1, label.to_string()))
            .collect()
    }

    #[test]
    fn test_reads_tree_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PCF.concordance");
        fs::write(&path, BUCKY_OUTPUT).unwrap();
        assert_eq!(
            read_raw_tree(&path).unwrap(),
            "(((1:1.000,2:1.000):0.900,3:1.000):0.850,4:1.000,5:1.000);"
        );
    }

    #[test]
    fn test_substitutes_every_index_once() {
        let raw = "(((1:1.000,2:1.000):0.900,3:1.000):0.850,4:1.000,5:1.000);";
        let labelled = substitute_labels(raw, &taxa()).unwrap();
        assert_eq!(
            labelled,
            "(((popA:1.000,popB:1.000):0.900,popC:1.000):0.850,OG1:1.000,OG2:1.000);"
        );
        for label in ["popA", "popB", "popC", "OG1", "OG2"] {
            assert_eq!(labelled.matches(label).count(), 1, "{label}");
        }
        // Only branch values are left numeric.
        assert!(!labelled.chars().zip(labelled.chars().skip(1)).any(|(a, b)| a.is_ascii_digit() && b == ':'));
    }

    #[test]
    fn test_multi_digit_indices() {
        let mut map = taxa();
        map.insert(12, "popL".to_string());
        assert_eq!(
            substitute_labels("(12:1.000,3:0.5)", &map).unwrap(),
            "(popL:1.000,popC:0.5)"
        );
    }

    #[test]
    fn test_unknown_index_is_an_error() {
        let err = substitute_labels("(9:1.000,1:1.000);", &taxa()).unwrap_err();
        assert!(matches!(err, PcfError::UnknownTaxonIndex(ref i) if i == "9"));
    }

    #[test]
    fn test_trim_drops_outgroup_footer() {
        let tree = "(((popA:1.000,popB:1.000):0.900,popC:1.000):0.850,OG1:1.000,OG2:1.000);";
        assert_eq!(
            trim_tree(tree).unwrap(),
            "((popA:1.000,popB:1.000):0.900,popC:1.000):0.850,);"
        );
        assert!(matches!(trim_tree("(a);"), Err(PcfError::TreeTooShort(4))));
    }

    #[test]
    fn test_rebuild_writes_tree_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("PCF.concordance");
        let output = dir.path().join("PCF_Tree.tre");
        fs::write(&input, BUCKY_OUTPUT).unwrap();

        let tree = rebuild_concordance_tree(&input, &taxa(), &output).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), tree);
        assert!(tree.starts_with("((popA:"));
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("PCF.concordance");
        fs::write(&input, "nothing useful\n").unwrap();
        let err = rebuild_concordance_tree(&input, &taxa(), dir.path().join("t.tre")).unwrap_err();
        assert!(matches!(err, PcfError::MissingConcordanceTree(_)));
    }
}
