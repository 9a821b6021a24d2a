//src/report.rs

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PcfError, Result};
use crate::types::ReportRow;

pub const REPORT_HEADER: &str = "Model\tK\tAverage\tTaxa";

/// Append-only writer for the cumulative combinations table.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row, preceded by the header when the file is absent or
    /// empty. The text goes out in a single write.
    pub fn append(&self, row: &ReportRow) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PcfError::file_io(&self.path, e))?;
        let is_empty = file
            .metadata()
            .map_err(|e| PcfError::file_io(&self.path, e))?
            .len()
            == 0;

        let mut text = String::new();
        if is_empty {
            text.push_str(REPORT_HEADER);
            text.push('\n');
        }
        text.push_str(&row.to_string());
        text.push('\n');

        file.write_all(text.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| PcfError::file_io(&self.path, e))?;
        log::info!("Model {}: K={} average={:.4}", row.model, row.k, row.average);
        Ok(())
    }
}
