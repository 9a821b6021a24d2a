//src/bucky.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::combos::{taxon_label, Manifest};
use crate::concordance_tree::rebuild_concordance_tree;
use crate::config::{PipelineConfig, BUCKY_RESULTS_DIR, MBSUM_OUT_DIR};
use crate::error::{PcfError, Result};
use crate::mbsum::move_file;
use crate::process::ExternalTool;
use crate::report::ReportWriter;
use crate::support::average_support_file;
use crate::types::{ReportRow, RunOutcome, RunStatus, Subset};

/// Arguments for one BUCKy run over `subset`.
pub fn bucky_args(config: &PipelineConfig, subset: &[String]) -> Vec<String> {
    let mut args = vec![
        "--use-independence-prior".to_string(),
        "-n".to_string(),
        config.mcmc_iterations.to_string(),
        "-o".to_string(),
        config.output_prefix.clone(),
    ];
    args.extend(
        subset
            .iter()
            .map(|name| Path::new(MBSUM_OUT_DIR).join(name).display().to_string()),
    );
    args
}

/// First run number not yet taken by a `bucky_<N>` directory. A fresh work
/// directory starts at 1; a later session continues after the last run.
pub fn next_run_number(results_dir: &Path) -> Result<u32> {
    let listing = match fs::read_dir(results_dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
        Err(e) => return Err(PcfError::file_io(results_dir, e)),
    };
    let mut last = 0u32;
    for entry in listing {
        let entry = entry.map_err(|e| PcfError::file_io(results_dir, e))?;
        let run = entry
            .file_name()
            .to_str()
            .and_then(|name| name.strip_prefix("bucky_"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(run) = run {
            last = last.max(run);
        }
    }
    last.checked_add(1).ok_or_else(|| {
        PcfError::InvalidConfig(format!("no run numbers left in {}", results_dir.display()))
    })
}

/// Runs BUCKy once per subset and files every output under
/// `bucky_results/bucky_<run>/`.
pub struct ConcordanceDriver<'a> {
    tool: &'a ExternalTool,
    config: &'a PipelineConfig,
    manifest: &'a Manifest,
    report: ReportWriter,
}

impl<'a> ConcordanceDriver<'a> {
    pub fn new(tool: &'a ExternalTool, config: &'a PipelineConfig, manifest: &'a Manifest) -> Self {
        Self {
            tool,
            config,
            manifest,
            report: ReportWriter::new(config.report_path()),
        }
    }

    /// Runs every subset in order with consecutive run numbers, starting at
    /// [`next_run_number`] so earlier sessions' results are never overwritten.
    ///
    /// A failing subset is logged and recorded; only an unusable tool stops
    /// the enumeration.
    pub fn run_all<F>(&self, subsets: &[Subset], mut on_run: F) -> Result<Vec<RunOutcome>>
    where
        F: FnMut(&RunOutcome),
    {
        let first = next_run_number(&self.config.resolve(BUCKY_RESULTS_DIR))?;
        if first > 1 {
            log::info!("Continuing after {} earlier run(s)", first - 1);
        }
        let mut outcomes = Vec::with_capacity(subsets.len());
        for (run, subset) in (first..).zip(subsets) {
            let outcome = self.run_subset(run, subset)?;
            on_run(&outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// One BUCKy invocation. Returns `Err` only for fatal failures.
    pub fn run_subset(&self, run: u32, subset: &[String]) -> Result<RunOutcome> {
        log::info!("Run {}: BUCKy on {} summaries", run, subset.len());
        let tool_result = self
            .tool
            .run_checked(&bucky_args(self.config, subset), &self.config.work_dir);

        let tool_error = match tool_result {
            Ok(_) => None,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => Some(e),
        };

        let run_dir = self.config.run_dir(run);
        fs::create_dir_all(&run_dir).map_err(|e| PcfError::file_io(&run_dir, e))?;

        let status = match tool_error {
            Some(e) => RunStatus::Failed(e),
            None => self.collect_primary(run, subset, &run_dir),
        };
        self.collect_auxiliary(&run_dir)?;

        match &status {
            RunStatus::Failed(e) => log::error!("Run {} ({}) failed: {}", run, describe(subset), e),
            RunStatus::NoConcordance => log::warn!(
                "Run {} ({}) produced no {}",
                run,
                describe(subset),
                self.config.concordance_file_name()
            ),
            RunStatus::Reported(_) => {}
        }

        Ok(RunOutcome {
            run,
            subset: subset.to_vec(),
            status,
        })
    }

    /// Rebuilds and scores the primary concordance tree, appends the report
    /// row and moves both files into `run_dir`.
    fn collect_primary(&self, run: u32, subset: &[String], run_dir: &Path) -> RunStatus {
        let concordance = self.config.resolve(self.config.concordance_file_name());
        if !concordance.is_file() {
            return RunStatus::NoConcordance;
        }
        let tree_path = self.config.resolve(self.config.tree_file_name());

        let scored = self
            .manifest
            .taxa_for(subset)
            .and_then(|taxa| rebuild_concordance_tree(&concordance, &taxa, &tree_path))
            .and_then(|_| average_support_file(&tree_path));

        let filed = self.file_into(&concordance, run_dir);
        let result = scored.and_then(|average| {
            filed?;
            let row = ReportRow {
                model: run,
                k: subset.len(),
                average,
                taxa: subset.iter().map(|name| taxon_label(name).to_string()).collect(),
            };
            self.report.append(&row)?;
            Ok(row)
        });

        if tree_path.is_file() {
            if let Err(e) = self.file_into(&tree_path, run_dir) {
                log::warn!("Could not move {}: {}", tree_path.display(), e);
            }
        }

        match result {
            Ok(row) => RunStatus::Reported(row),
            Err(e) => RunStatus::Failed(e),
        }
    }

    /// Moves every remaining `<prefix>*` file from the work directory into `run_dir`.
    fn collect_auxiliary(&self, run_dir: &Path) -> Result<()> {
        for path in self.prefixed_outputs()? {
            self.file_into(&path, run_dir)?;
        }
        Ok(())
    }

    fn prefixed_outputs(&self) -> Result<Vec<PathBuf>> {
        let work_dir = &self.config.work_dir;
        let mut found = Vec::new();
        for entry in fs::read_dir(work_dir).map_err(|e| PcfError::file_io(work_dir, e))? {
            let entry = entry.map_err(|e| PcfError::file_io(work_dir, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let matches = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&self.config.output_prefix))
                .unwrap_or(false);
            if is_file && matches {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    fn file_into(&self, path: &Path, run_dir: &Path) -> Result<()> {
        let name = path
            .file_name()
            .ok_or_else(|| PcfError::InvalidInputName(path.display().to_string()))?;
        move_file(path, &run_dir.join(name))
    }
}

fn describe(subset: &[String]) -> String {
    subset
        .iter()
        .map(|name| taxon_label(name))
        .collect::<Vec<_>>()
        .join(", ")
}
