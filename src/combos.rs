//src/combos.rs

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use itertools::Itertools;

use crate::error::{PcfError, Result};
use crate::mbsum::MBSUM_RESULTS_SUFFIX;
use crate::outgroup::read_taxon_map;
use crate::types::{Subset, TaxonMap};

/// Every staged summary name is `<taxon><SUMMARY_SUFFIX>`.
pub const SUMMARY_SUFFIX: &str = "_mbsumReady_mbsum_Results.txt";

/// All subsets of size 2..=N in increasing size, each size in
/// lexicographic combination order over `items`. Returns the subsets and N.
pub fn combinations(items: &[String]) -> (Vec<Subset>, usize) {
    let n = items.len();
    let mut out: Vec<Subset> = Vec::new();
    let mut seen: HashSet<Subset> = HashSet::new();

    for k in 2..=n {
        for subset in items.iter().cloned().combinations(k) {
            if seen.insert(subset.clone()) {
                out.push(subset);
            } else {
                log::warn!("Skipping duplicate subset {:?}", subset);
            }
        }
    }
    (out, n)
}

/// Taxon name reported for a staged summary file name.
pub fn taxon_label(summary_name: &str) -> &str {
    summary_name
        .strip_suffix(SUMMARY_SUFFIX)
        .or_else(|| summary_name.strip_suffix(MBSUM_RESULTS_SUFFIX))
        .unwrap_or(summary_name)
}

/// The staged summary set, in sorted order, each with the taxon mapping of
/// the input it came from.
#[derive(Debug, Default)]
pub struct Manifest {
    entries: BTreeMap<String, Option<TaxonMap>>,
}

impl Manifest {
    /// Scans `out_dir` for summary files. Mappings start out empty; attach
    /// them with [`Manifest::insert`] or [`Manifest::recover_missing`].
    pub fn scan(out_dir: &Path) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let listing = match fs::read_dir(out_dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(PcfError::file_io(out_dir, e)),
        };
        for entry in listing {
            let entry = entry.map_err(|e| PcfError::file_io(out_dir, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                entries.insert(name.to_string(), None);
            }
        }
        Ok(Self { entries })
    }

    /// Attaches a known taxon mapping to a summary name.
    pub fn insert(&mut self, summary_name: &str, taxa: TaxonMap) {
        self.entries.insert(summary_name.to_string(), Some(taxa));
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fills in mappings for summaries staged by an earlier session by
    /// reading the translation block of the matching `mbsum_in` file.
    pub fn recover_missing(&mut self, in_dir: &Path) {
        for (name, taxa) in self.entries.iter_mut().filter(|(_, t)| t.is_none()) {
            let Some(stem) = name.strip_suffix(MBSUM_RESULTS_SUFFIX) else {
                continue;
            };
            let staged = in_dir.join(format!("{stem}.txt"));
            match read_taxon_map(&staged) {
                Ok(map) => *taxa = Some(map),
                Err(e) => log::warn!("No taxon mapping for {}: {}", name, e),
            }
        }
    }

    /// Merged mapping for every member of `subset`. An index labelled
    /// differently by two members is a conflict.
    pub fn taxa_for(&self, subset: &[String]) -> Result<TaxonMap> {
        let mut merged = TaxonMap::new();
        for name in subset {
            let taxa = self
                .entries
                .get(name)
                .and_then(Option::as_ref)
                .ok_or_else(|| PcfError::MissingTaxonMap(name.clone()))?;
            for (&index, label) in taxa {
                match merged.get(&index) {
                    Some(existing) if existing != label => {
                        return Err(PcfError::TaxonMapConflict {
                            index,
                            first: existing.clone(),
                            second: label.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        merged.insert(index, label.clone());
                    }
                }
            }
        }
        Ok(merged)
    }
}
