//src/error.rs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong between reading a posterior tree file and
/// appending a row to the combinations report.
#[derive(Error, Debug)]
pub enum PcfError {
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot derive a base name from input file name '{0}'")]
    InvalidInputName(String),

    /// The translation block never yielded a numeric taxon index, so the
    /// outgroup indices would be undefined.
    #[error("no taxon indices found in translation block of {0}")]
    MissingTaxa(String),

    #[error("malformed translation entry '{line}' in {file}")]
    MalformedTranslation { file: String, line: String },

    #[error("external tool '{tool}' is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("external tool '{tool}' exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("external tool '{tool}' timed out after {after:?}")]
    ToolTimeout { tool: String, after: Duration },

    #[error("expected output {0} was not produced")]
    MissingOutput(PathBuf),

    #[error("no primary concordance tree found in {0}")]
    MissingConcordanceTree(PathBuf),

    #[error("taxon index {0} has no label in the taxon mapping")]
    UnknownTaxonIndex(String),

    #[error("concordance tree is too short to trim ({0} characters)")]
    TreeTooShort(usize),

    /// Averaging needs at least one value besides the excluded root-adjacent one.
    #[error("need at least 2 branch-support values to average, found {0}")]
    DegenerateSupport(usize),

    #[error("taxon index {index} maps to both '{first}' and '{second}' within one subset")]
    TaxonMapConflict {
        index: u32,
        first: String,
        second: String,
    },

    #[error("no taxon mapping available for summary file {0}")]
    MissingTaxonMap(String),

    #[error("configuration error: {0}")]
    InvalidConfig(String),
}

impl PcfError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PcfError::FileIo {
            path: path.into(),
            source,
        }
    }

    /// True for failures that make every later external call pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PcfError::ToolUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, PcfError>;
