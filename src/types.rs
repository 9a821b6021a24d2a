//src/types.rs

use std::fmt;
use std::path::PathBuf;

use ahash::AHashMap;

use crate::error::PcfError;

/// Taxon index (as written in the translation block) -> taxon label.
pub type TaxonMap = AHashMap<u32, String>;

/// Output of the tree cleaner for one posterior tree file.
#[derive(Debug, Clone)]
pub struct CleanedTrees {
    pub lines: Vec<String>,
    /// Input file name with its extension removed, e.g. `sp1` for `sp1.trees`.
    pub base_name: String,
    /// Number of sampled-tree records.
    pub tree_count: usize,
}

/// Output of the outgroup augmenter for one posterior tree file.
#[derive(Debug, Clone)]
pub struct AugmentedFile {
    /// Path of the written `<base>_mbsumReady.txt`.
    pub path: PathBuf,
    /// Real taxa plus the two synthetic outgroups.
    pub taxa: TaxonMap,
    pub og1: u32,
    pub og2: u32,
}

/// One input after cleaning and augmentation, before summarizing.
#[derive(Debug, Clone)]
pub struct AugmentedInput {
    pub source: PathBuf,
    pub base_name: String,
    pub tree_count: usize,
    pub augmented: AugmentedFile,
}

/// One input that made it through cleaning, augmentation and summarizing.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub source: PathBuf,
    pub base_name: String,
    pub tree_count: usize,
    pub burnin: usize,
    /// File name of the staged summary inside `mbsum/mbsum_out`.
    pub summary_name: String,
    pub taxa: TaxonMap,
}

/// An ordered selection of staged summary file names.
pub type Subset = Vec<String>;

/// One line of the combinations report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub model: u32,
    pub k: usize,
    pub average: f64,
    pub taxa: Vec<String>,
}

impl fmt::Display for ReportRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{:.4}\t{}",
            self.model,
            self.k,
            self.average,
            self.taxa.join(", ")
        )
    }
}

/// What happened to one subset's concordance run.
#[derive(Debug)]
pub enum RunStatus {
    Reported(ReportRow),
    /// The tool succeeded but left no primary concordance file.
    NoConcordance,
    Failed(PcfError),
}

#[derive(Debug)]
pub struct RunOutcome {
    pub run: u32,
    pub subset: Subset,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn row(&self) -> Option<&ReportRow> {
        match &self.status {
            RunStatus::Reported(row) => Some(row),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, RunStatus::Failed(_))
    }
}
