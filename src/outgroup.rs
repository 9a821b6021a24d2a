//src/outgroup.rs

use std::fs;
use std::path::Path;

use crate::clean::STATE_MARKER;
use crate::error::{PcfError, Result};
use crate::types::{AugmentedFile, TaxonMap};

/// Suffix of the augmented file handed to the summarizer.
pub const MBSUM_READY_SUFFIX: &str = "_mbsumReady.txt";

pub const OG1_LABEL: &str = "OG1";
pub const OG2_LABEL: &str = "OG2";

/// Running state while walking the cleaned lines.
#[derive(Default)]
struct Augmenter {
    out: String,
    taxa: TaxonMap,
    max_index: Option<u32>,
}

impl Augmenter {
    fn outgroups(&self) -> Option<(u32, u32)> {
        self.max_index.map(|max| (max + 1, max + 2))
    }

    fn push_line(&mut self, line: &str, file: &str) -> Result<()> {
        if line.contains(STATE_MARKER) {
            let (og1, og2) = self
                .outgroups()
                .ok_or_else(|| PcfError::MissingTaxa(file.to_string()))?;
            self.out.push_str(&graft_outgroups(line, og1, og2));
            self.out.push('\n');
            return Ok(());
        }

        if line.starts_with(|c: char| c.is_ascii_digit()) {
            let entry = line.trim_matches(',');
            let (index, label) = parse_translation_entry(entry).ok_or_else(|| {
                PcfError::MalformedTranslation {
                    file: file.to_string(),
                    line: line.to_string(),
                }
            })?;
            // Both outgroup indices must still fit after this one.
            if index.checked_add(2).is_none() {
                return Err(PcfError::MalformedTranslation {
                    file: file.to_string(),
                    line: line.to_string(),
                });
            }
            self.max_index = Some(self.max_index.map_or(index, |m| m.max(index)));
            self.taxa.insert(index, label.to_string());
            self.out.push_str(entry);
            self.out.push_str(",\n");
        } else if let Some((og1, og2)) = self.outgroups().filter(|_| line == ";") {
            self.out
                .push_str(&format!("{og1} {OG1_LABEL},\n{og2} {OG2_LABEL}\n;\n"));
        } else {
            self.out.push_str(line);
            self.out.push('\n');
        }
        Ok(())
    }
}

/// Splits `"<index> <label>"` (trailing commas already removed).
fn parse_translation_entry(entry: &str) -> Option<(u32, &str)> {
    let mut parts = entry.split_whitespace();
    let index = parts.next()?.parse().ok()?;
    let label = parts.next()?.trim_end_matches(',');
    Some((index, label))
}

/// Wraps the span from the first `(` to the last `)` as
/// `((<span>,<og1>),<og2>)`. Lines without a parenthesised clade are kept.
pub fn graft_outgroups(line: &str, og1: u32, og2: u32) -> String {
    let (Some(open), Some(close)) = (line.find('('), line.rfind(')')) else {
        return line.to_string();
    };
    if close < open {
        return line.to_string();
    }
    format!(
        "{}(({},{og1}),{og2}){}",
        &line[..open],
        &line[open..=close],
        &line[close + 1..]
    )
}

/// Adds the two synthetic outgroups to a cleaned tree file and writes
/// `<dir>/<base_name>_mbsumReady.txt`.
pub fn add_outgroups<P: AsRef<Path>>(
    lines: &[String],
    base_name: &str,
    dir: P,
) -> Result<AugmentedFile> {
    let mut augmenter = Augmenter::default();
    for line in lines {
        augmenter.push_line(line, base_name)?;
    }

    let (og1, og2) = augmenter
        .outgroups()
        .ok_or_else(|| PcfError::MissingTaxa(base_name.to_string()))?;
    let mut taxa = augmenter.taxa;
    taxa.insert(og1, OG1_LABEL.to_string());
    taxa.insert(og2, OG2_LABEL.to_string());

    let path = dir.as_ref().join(format!("{base_name}{MBSUM_READY_SUFFIX}"));
    fs::write(&path, augmenter.out).map_err(|e| PcfError::file_io(&path, e))?;

    log::info!(
        "Wrote {} ({} taxa, outgroups {}/{})",
        path.display(),
        taxa.len() - 2,
        og1,
        og2
    );

    Ok(AugmentedFile {
        path,
        taxa,
        og1,
        og2,
    })
}

/// Recovers the taxon mapping from the translation block of an already
/// augmented file (used for summaries staged by an earlier session).
pub fn read_taxon_map<P: AsRef<Path>>(path: P) -> Result<TaxonMap> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| PcfError::file_io(path, e))?;

    let taxa: TaxonMap = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.contains(STATE_MARKER))
        .filter(|line| line.starts_with(|c: char| c.is_ascii_digit()))
        .filter_map(|line| parse_translation_entry(line.trim_matches(',')))
        .map(|(index, label)| (index, label.to_string()))
        .collect();

    if taxa.is_empty() {
        return Err(PcfError::MissingTaxa(path.display().to_string()));
    }
    Ok(taxa)
}
