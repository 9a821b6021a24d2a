//src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PcfError, Result};

/// Staging folder for summarizer inputs, relative to the work directory.
pub const MBSUM_IN_DIR: &str = "mbsum/mbsum_in";
/// Staging folder for summarizer outputs, relative to the work directory.
pub const MBSUM_OUT_DIR: &str = "mbsum/mbsum_out";
/// Parent of every `bucky_<N>` run directory.
pub const BUCKY_RESULTS_DIR: &str = "bucky_results";

/// Runtime knobs for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory every relative path is resolved against; tools run here.
    pub work_dir: PathBuf,
    /// Topology summarizer executable.
    pub mbsum_program: PathBuf,
    /// Concordance analysis executable.
    pub bucky_program: PathBuf,
    /// Fraction of sampled trees discarded as burn-in.
    pub burnin_fraction: f64,
    /// MCMC iterations passed to the concordance tool.
    pub mcmc_iterations: u64,
    /// Output prefix passed to the concordance tool.
    pub output_prefix: String,
    /// Kill an external tool after this long; `None` waits forever.
    pub tool_timeout: Option<Duration>,
    /// How many times a timed-out invocation is retried.
    pub tool_retries: u32,
    /// Cumulative report file name.
    pub report_file: String,
    /// Look the executables up before doing any work.
    pub check_tools: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            mbsum_program: PathBuf::from("mbsum"),
            bucky_program: PathBuf::from("bucky"),
            burnin_fraction: 0.1,
            mcmc_iterations: 100_000,
            output_prefix: "PCF".to_string(),
            tool_timeout: None,
            tool_retries: 0,
            report_file: "All_Combinations.txt".to_string(),
            check_tools: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.burnin_fraction) {
            return Err(PcfError::InvalidConfig(format!(
                "burn-in fraction must lie in [0, 1), got {}",
                self.burnin_fraction
            )));
        }
        if self.mcmc_iterations == 0 {
            return Err(PcfError::InvalidConfig(
                "MCMC iteration count must be positive".to_string(),
            ));
        }
        if self.output_prefix.is_empty() {
            return Err(PcfError::InvalidConfig(
                "output prefix must not be empty".to_string(),
            ));
        }
        if self.report_file.is_empty() {
            return Err(PcfError::InvalidConfig(
                "report file name must not be empty".to_string(),
            ));
        }
        if !self.work_dir.is_dir() {
            return Err(PcfError::InvalidConfig(format!(
                "work directory {} does not exist",
                self.work_dir.display()
            )));
        }
        Ok(())
    }

    pub fn resolve<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        self.work_dir.join(relative)
    }

    pub fn mbsum_in_dir(&self) -> PathBuf {
        self.resolve(MBSUM_IN_DIR)
    }

    pub fn mbsum_out_dir(&self) -> PathBuf {
        self.resolve(MBSUM_OUT_DIR)
    }

    pub fn report_path(&self) -> PathBuf {
        self.resolve(&self.report_file)
    }

    /// `bucky_results/bucky_<run>` under the work directory.
    pub fn run_dir(&self, run: u32) -> PathBuf {
        self.resolve(BUCKY_RESULTS_DIR).join(format!("bucky_{run}"))
    }

    /// Name of the primary concordance output, e.g. `PCF.concordance`.
    pub fn concordance_file_name(&self) -> String {
        format!("{}.concordance", self.output_prefix)
    }

    /// Name of the rebuilt concordance tree, e.g. `PCF_Tree.tre`.
    pub fn tree_file_name(&self) -> String {
        format!("{}_Tree.tre", self.output_prefix)
    }
}
