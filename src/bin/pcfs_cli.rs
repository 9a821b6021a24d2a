use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use pcfs_rs::config::PipelineConfig;
use pcfs_rs::types::RunStatus;
use pcfs_rs::{Pipeline, PipelineSummary};

/// Phylogeographic concordance factors: clean posterior tree files, add
/// outgroups, summarize with mbsum and run BUCKy on every combination.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Posterior tree files (*.trees or *.trees.gz), one per species
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Directory the pipeline works and writes in
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// mbsum executable
    #[arg(long, default_value = "mbsum")]
    mbsum: PathBuf,

    /// BUCKy executable
    #[arg(long, default_value = "bucky")]
    bucky: PathBuf,

    /// Fraction of sampled trees discarded as burn-in (default: 0.1)
    #[arg(long, default_value_t = 0.1)]
    burnin: f64,

    /// BUCKy MCMC iterations (default: 100000)
    #[arg(long, default_value_t = 100_000)]
    iterations: u64,

    /// Kill an external tool after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Retries for a timed-out tool invocation
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Cumulative report file
    #[arg(long, default_value = "All_Combinations.txt")]
    report: String,
}

impl Args {
    fn into_config(self) -> (PipelineConfig, Vec<PathBuf>) {
        let config = PipelineConfig {
            work_dir: self.work_dir,
            mbsum_program: self.mbsum,
            bucky_program: self.bucky,
            burnin_fraction: self.burnin,
            mcmc_iterations: self.iterations,
            tool_timeout: self.timeout_secs.map(Duration::from_secs),
            tool_retries: self.retries,
            report_file: self.report,
            ..PipelineConfig::default()
        };
        (config, self.inputs)
    }
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .expect("Invalid spinner template"),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(msg.to_string());
    spinner
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config, inputs) = Args::parse().into_config();
    info!("Starting pcfs-rs v{} on {} input file(s)", env!("CARGO_PKG_VERSION"), inputs.len());

    let pipeline = match Pipeline::new(config) {
        Ok(p) => p,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // 1. Clean + add outgroups
    let sp = spinner("blue", "Cleaning tree files and adding outgroups...");
    let (augmented, mut failed_inputs) = pipeline.prepare_inputs(&inputs);
    sp.finish_with_message(format!("Prepared {} of {} file(s).", augmented.len(), inputs.len()));

    // 2. mbsum
    let sp = spinner("green", "Summarizing tree topologies with mbsum...");
    let prepared = match pipeline.summarize_inputs(augmented) {
        Ok((prepared, failed)) => {
            failed_inputs.extend(failed);
            prepared
        }
        Err(e) => {
            sp.abandon_with_message("mbsum unavailable.");
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    sp.finish_with_message(format!("Summarized {} file(s).", prepared.len()));

    // 3. BUCKy over every combination
    let manifest = match pipeline.build_manifest(&prepared) {
        Ok(m) => m,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let n = manifest.len();
    // 2^N - N - 1 combinations of size 2..N
    let total = 2u64.saturating_pow(n as u32).saturating_sub(n as u64 + 1);
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.yellow} [{bar:40.cyan/blue}] {pos}/{len} models {msg}")
            .expect("Invalid progress template")
            .progress_chars("=> "),
    );
    let runs = pipeline.run_concordance(&manifest, |outcome| {
        bar.inc(1);
        if let RunStatus::Failed(_) = outcome.status {
            bar.set_message(format!("(model {} failed)", outcome.run));
        }
    });
    let runs = match runs {
        Ok(runs) => runs,
        Err(e) => {
            bar.abandon_with_message("BUCKy unavailable.");
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    bar.finish_with_message("done");

    let summary = PipelineSummary::new(prepared, failed_inputs, &manifest, runs);
    print!("{}", summary.get_summary_text());
    info!(
        "Report written to {}",
        pipeline.config.report_path().display()
    );

    if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
