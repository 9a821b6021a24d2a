// src/lib.rs
pub mod types;
pub mod error;
pub mod config;
pub mod process;
pub mod clean;
pub mod outgroup;
pub mod mbsum;
pub mod combos;
pub mod bucky;
pub mod concordance_tree;
pub mod support;
pub mod report;

use std::collections::HashSet;
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::bucky::ConcordanceDriver;
use crate::clean::clean_tree_file;
use crate::combos::{combinations, taxon_label, Manifest};
use crate::config::PipelineConfig;
use crate::error::{PcfError, Result};
use crate::mbsum::summarize;
use crate::outgroup::add_outgroups;
use crate::process::ExternalTool;
use crate::types::{AugmentedInput, PreparedInput, ReportRow, RunOutcome, RunStatus};

/// Everything one pipeline run produced. Text summaries are generated on demand.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    /// Inputs that were cleaned, augmented, summarized and staged.
    pub prepared: Vec<PreparedInput>,

    /// Inputs dropped along the way, with the reason.
    pub failed_inputs: Vec<(PathBuf, PcfError)>,

    /// Number of staged summaries the subsets were drawn from.
    pub total_summaries: usize,

    /// One outcome per subset, in run-number order.
    pub runs: Vec<RunOutcome>,
}

impl PipelineSummary {
    pub fn new(
        prepared: Vec<PreparedInput>,
        failed_inputs: Vec<(PathBuf, PcfError)>,
        manifest: &Manifest,
        runs: Vec<RunOutcome>,
    ) -> Self {
        Self {
            prepared,
            failed_inputs,
            total_summaries: manifest.len(),
            runs,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &ReportRow> {
        self.runs.iter().filter_map(RunOutcome::row)
    }

    pub fn failed_runs(&self) -> impl Iterator<Item = &RunOutcome> {
        self.runs.iter().filter(|r| r.is_failure())
    }

    /// True when no input and no run failed.
    pub fn is_clean(&self) -> bool {
        self.failed_inputs.is_empty() && self.failed_runs().next().is_none()
    }

    /// Human-readable summary of the run.
    pub fn get_summary_text(&self) -> String {
        let mut output = String::new();
        writeln!(
            output,
            "Inputs staged: {} ({} failed), summaries available: {}",
            self.prepared.len(),
            self.failed_inputs.len(),
            self.total_summaries
        )
        .unwrap();
        for (path, err) in &self.failed_inputs {
            writeln!(output, "  input {}: {}", path.display(), err).unwrap();
        }
        writeln!(
            output,
            "Concordance runs: {} ({} reported, {} failed)",
            self.runs.len(),
            self.rows().count(),
            self.failed_runs().count()
        )
        .unwrap();
        for run in &self.runs {
            let taxa: Vec<&str> = run.subset.iter().map(|s| taxon_label(s)).collect();
            match &run.status {
                RunStatus::Failed(e) => {
                    writeln!(output, "  model {} [{}]: {}", run.run, taxa.join(", "), e).unwrap()
                }
                RunStatus::NoConcordance => writeln!(
                    output,
                    "  model {} [{}]: no concordance output",
                    run.run,
                    taxa.join(", ")
                )
                .unwrap(),
                RunStatus::Reported(_) => {}
            }
        }
        output
    }
}

/// The two external tools plus the configuration they run under.
pub struct Pipeline {
    pub config: PipelineConfig,
    mbsum: ExternalTool,
    bucky: ExternalTool,
}

impl Pipeline {
    /// Validates the configuration and, if enabled, checks that both tools
    /// can be found before any file is touched.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut mbsum = ExternalTool::new(&config.mbsum_program)
            .with_timeout(config.tool_timeout, config.tool_retries);
        let mut bucky = ExternalTool::new(&config.bucky_program)
            .with_timeout(config.tool_timeout, config.tool_retries);
        if config.check_tools {
            mbsum = mbsum.resolve()?;
            log::debug!("mbsum: {}", mbsum.program.display());
            bucky = bucky.resolve()?;
            log::debug!("bucky: {}", bucky.program.display());
        } else {
            // Tools run inside the work dir; pin paths like `./tools/mbsum` first.
            for tool in [&mut mbsum, &mut bucky] {
                if tool.program.components().count() > 1 {
                    tool.program = process::absolute(&tool.program)?;
                }
            }
        }
        Ok(Self {
            config,
            mbsum,
            bucky,
        })
    }

    /// Cleans and augments every input in parallel. Results keep input order.
    pub fn prepare_inputs(
        &self,
        inputs: &[PathBuf],
    ) -> (Vec<AugmentedInput>, Vec<(PathBuf, PcfError)>) {
        // Two inputs with the same base name would write the same files.
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(inputs.len());
        let mut failed = Vec::new();
        for path in inputs {
            match clean::base_name(path) {
                Ok(base) if !seen.insert(base.clone()) => failed.push((
                    path.clone(),
                    PcfError::InvalidInputName(format!("duplicate base name '{base}'")),
                )),
                Ok(_) => unique.push(path.clone()),
                Err(e) => failed.push((path.clone(), e)),
            }
        }

        let results: Vec<(PathBuf, Result<AugmentedInput>)> = unique
            .into_par_iter()
            .map(|path| {
                let result = self.prepare_one(&path);
                (path, result)
            })
            .collect();

        let mut prepared = Vec::with_capacity(results.len());
        for (path, result) in results {
            match result {
                Ok(input) => prepared.push(input),
                Err(e) => {
                    log::error!("Skipping {}: {}", path.display(), e);
                    failed.push((path, e));
                }
            }
        }
        (prepared, failed)
    }

    fn prepare_one(&self, path: &Path) -> Result<AugmentedInput> {
        let cleaned = clean_tree_file(path)?;
        let augmented = add_outgroups(&cleaned.lines, &cleaned.base_name, &self.config.work_dir)?;
        Ok(AugmentedInput {
            source: path.to_path_buf(),
            base_name: cleaned.base_name,
            tree_count: cleaned.tree_count,
            augmented,
        })
    }

    /// Runs mbsum on each augmented input, one at a time, and stages the files.
    /// A missing mbsum aborts; any other failure only drops that input.
    pub fn summarize_inputs(
        &self,
        inputs: Vec<AugmentedInput>,
    ) -> Result<(Vec<PreparedInput>, Vec<(PathBuf, PcfError)>)> {
        let mut prepared = Vec::with_capacity(inputs.len());
        let mut failed = Vec::new();
        for input in inputs {
            match summarize(&self.mbsum, &self.config, &input.augmented.path, input.tree_count) {
                Ok(staged) => prepared.push(PreparedInput {
                    source: input.source,
                    base_name: input.base_name,
                    tree_count: input.tree_count,
                    burnin: staged.burnin,
                    summary_name: staged.summary_name,
                    taxa: input.augmented.taxa,
                }),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("mbsum failed for {}: {}", input.source.display(), e);
                    failed.push((input.source, e));
                }
            }
        }
        Ok((prepared, failed))
    }

    /// Sorted manifest of every staged summary, with taxon mappings from
    /// this session or recovered from staged inputs.
    pub fn build_manifest(&self, prepared: &[PreparedInput]) -> Result<Manifest> {
        let mut manifest = Manifest::scan(&self.config.mbsum_out_dir())?;
        for input in prepared {
            manifest.insert(&input.summary_name, input.taxa.clone());
        }
        manifest.recover_missing(&self.config.mbsum_in_dir());
        Ok(manifest)
    }

    /// Enumerates every subset of the manifest and runs BUCKy on each.
    pub fn run_concordance<F>(&self, manifest: &Manifest, on_run: F) -> Result<Vec<RunOutcome>>
    where
        F: FnMut(&RunOutcome),
    {
        let (subsets, n) = combinations(&manifest.names());
        if subsets.is_empty() {
            log::warn!("{} staged summaries; need at least 2 for concordance runs", n);
            return Ok(Vec::new());
        }
        log::info!("{} summaries -> {} combinations", n, subsets.len());
        ConcordanceDriver::new(&self.bucky, &self.config, manifest).run_all(&subsets, on_run)
    }
}

/// Unified entry point: preprocess every input, then run every combination.
pub fn run_pipeline(config: PipelineConfig, inputs: &[PathBuf]) -> Result<PipelineSummary> {
    let pipeline = Pipeline::new(config)?;

    let (augmented, mut failed_inputs) = pipeline.prepare_inputs(inputs);
    let (prepared, failed) = pipeline.summarize_inputs(augmented)?;
    failed_inputs.extend(failed);

    let manifest = pipeline.build_manifest(&prepared)?;
    let runs = pipeline.run_concordance(&manifest, |_| {})?;

    Ok(PipelineSummary::new(prepared, failed_inputs, &manifest, runs))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn nexus(taxa: &[&str]) -> String {
        let mut text = String::from("#NEXUS\n\nBegin trees;\n\tTranslate\n");
        for (i, t) in taxa.iter().enumerate() {
            let sep = if i + 1 == taxa.len() { "" } else { "," };
            text.push_str(&format!("\t\t{} {}{}\n", i + 1, t, sep));
        }
        text.push_str(";\n");
        for state in 0..20 {
            text.push_str(&format!(
                "tree STATE_{} [&lnP=-{}.5] = [&R] ((1[&rate=1.0]:0.5,2:0.5):0.3,3:0.8);\n",
                state * 1000,
                100 + state
            ));
        }
        text.push_str("End;\n");
        text
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::io::Write;
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(format!("#!/bin/sh\n{body}\n").as_bytes()).unwrap();
        file.sync_all().unwrap();
        drop(file);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Work dir with fake mbsum/bucky and a config pointing at them.
    fn setup() -> (tempfile::TempDir, tempfile::TempDir, PipelineConfig) {
        setup_with_tools(tempfile::tempdir().unwrap())
    }

    fn setup_with_tools(
        tools: tempfile::TempDir,
    ) -> (tempfile::TempDir, tempfile::TempDir, PipelineConfig) {
        let work = tempfile::tempdir().unwrap();
        // mbsum -n <burnin> -o <out> <in>
        let mbsum = script(tools.path(), "mbsum", "echo \"$2\" > \"$4\"");
        let bucky = script(
            tools.path(),
            "bucky",
            "printf 'Primary Concordance Tree Topology:\\n(((1,2),3),4,5);\\n\\n\
Primary Concordance Tree with Sample Concordance Factors:\\n\
(((1:1.000,2:1.000):0.900,3:1.000):0.850,4:1.000,5:1.000);\\n' > PCF.concordance\n\
echo \"$@\" > PCF.input\n\
echo done > PCF.out",
        );
        let config = PipelineConfig {
            work_dir: work.path().to_path_buf(),
            mbsum_program: mbsum,
            bucky_program: bucky,
            ..PipelineConfig::default()
        };
        (work, tools, config)
    }

    #[test]
    fn test_three_inputs_give_four_models() {
        let (work, _tools, config) = setup();
        let inputs: Vec<PathBuf> = ["sp1", "sp2", "sp3"]
            .iter()
            .map(|name| {
                let path = work.path().join(format!("{name}.trees"));
                fs::write(&path, nexus(&["A", "B", "C"])).unwrap();
                path
            })
            .collect();

        let summary = run_pipeline(config, &inputs).unwrap();
        assert!(summary.is_clean(), "{}", summary.get_summary_text());
        assert_eq!(summary.prepared.len(), 3);
        assert_eq!(summary.prepared[0].burnin, 2);
        assert_eq!(summary.total_summaries, 3);

        let runs: Vec<u32> = summary.runs.iter().map(|r| r.run).collect();
        assert_eq!(runs, vec![1, 2, 3, 4]);

        let report = fs::read_to_string(work.path().join("All_Combinations.txt")).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Model\tK\tAverage\tTaxa",
                "1\t2\t0.9000\tsp1, sp2",
                "2\t2\t0.9000\tsp1, sp3",
                "3\t2\t0.9000\tsp2, sp3",
                "4\t3\t0.9000\tsp1, sp2, sp3",
            ]
        );

        for run in 1..=4 {
            let dir = work.path().join(format!("bucky_results/bucky_{run}"));
            for name in ["PCF.concordance", "PCF_Tree.tre", "PCF.out", "PCF.input"] {
                assert!(dir.join(name).is_file(), "bucky_{run}/{name}");
            }
        }
        let args = fs::read_to_string(work.path().join("bucky_results/bucky_4/PCF.input")).unwrap();
        assert!(args.starts_with("--use-independence-prior -n 100000 -o PCF mbsum/mbsum_out/sp1_"));

        let staged_in = work.path().join("mbsum/mbsum_in/sp2_mbsumReady.txt");
        let staged_out = work.path().join("mbsum/mbsum_out/sp2_mbsumReady_mbsum_Results.txt");
        assert!(staged_in.is_file() && staged_out.is_file());
        assert!(fs::read_to_string(staged_in).unwrap().contains("4 OG1,\n5 OG2\n;"));
    }

    #[test]
    fn test_malformed_input_is_skipped() {
        let (work, _tools, config) = setup();
        let good: Vec<PathBuf> = ["sp1", "sp2"]
            .iter()
            .map(|name| {
                let path = work.path().join(format!("{name}.trees"));
                fs::write(&path, nexus(&["A", "B", "C"])).unwrap();
                path
            })
            .collect();
        let bad = work.path().join("broken.trees");
        fs::write(&bad, "#NEXUS\nTranslate\n;\ntree STATE_0 = (1,2);\nEnd;\n").unwrap();
        let missing = work.path().join("missing.trees");

        let mut inputs = good.clone();
        inputs.push(bad.clone());
        inputs.push(missing.clone());

        let summary = run_pipeline(config, &inputs).unwrap();
        assert_eq!(summary.prepared.len(), 2);
        assert_eq!(summary.failed_inputs.len(), 2);
        assert!(summary
            .failed_inputs
            .iter()
            .any(|(p, e)| p == &bad && matches!(e, PcfError::MissingTaxa(_))));
        assert!(summary
            .failed_inputs
            .iter()
            .any(|(p, e)| p == &missing && matches!(e, PcfError::InputNotFound(_))));
        assert!(!work.path().join("broken_mbsumReady.txt").exists());

        assert_eq!(summary.runs.len(), 1);
        assert_eq!(summary.rows().count(), 1);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_previous_session_summaries_are_reused() {
        let (work, _tools, config) = setup();
        let inputs: Vec<PathBuf> = ["sp1", "sp2"]
            .iter()
            .map(|name| {
                let path = work.path().join(format!("{name}.trees"));
                fs::write(&path, nexus(&["A", "B", "C"])).unwrap();
                path
            })
            .collect();
        let summary = run_pipeline(config.clone(), &inputs).unwrap();
        let runs: Vec<u32> = summary.runs.iter().map(|r| r.run).collect();
        assert_eq!(runs, vec![1]);
        let first_args =
            fs::read_to_string(work.path().join("bucky_results/bucky_1/PCF.input")).unwrap();

        let third = work.path().join("sp3.trees");
        fs::write(&third, nexus(&["A", "B", "C"])).unwrap();
        let summary = run_pipeline(config, &[third]).unwrap();
        assert!(summary.is_clean(), "{}", summary.get_summary_text());
        assert_eq!(summary.total_summaries, 3);

        // Numbering picks up after the earlier session's runs.
        let runs: Vec<u32> = summary.runs.iter().map(|r| r.run).collect();
        assert_eq!(runs, vec![2, 3, 4, 5]);
        let labels: Vec<String> = summary.rows().map(|r| r.taxa.join("+")).collect();
        assert_eq!(labels, vec!["sp1+sp2", "sp1+sp3", "sp2+sp3", "sp1+sp2+sp3"]);

        let report = fs::read_to_string(work.path().join("All_Combinations.txt")).unwrap();
        let models: Vec<&str> = report
            .lines()
            .skip(1)
            .filter_map(|l| l.split('\t').next())
            .collect();
        assert_eq!(models, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(report.matches("Model\t").count(), 1);

        let kept = fs::read_to_string(work.path().join("bucky_results/bucky_1/PCF.input")).unwrap();
        assert_eq!(kept, first_args);
    }

    #[test]
    fn test_relative_tool_paths_with_separate_work_dir() {
        let here = std::env::current_dir().unwrap();
        let (work, tools, mut config) = setup_with_tools(tempfile::tempdir_in(&here).unwrap());
        let relative = |p: &Path| Path::new(".").join(p.strip_prefix(&here).unwrap());
        config.mbsum_program = relative(&tools.path().join("mbsum"));
        config.bucky_program = relative(&tools.path().join("bucky"));

        let inputs: Vec<PathBuf> = ["sp1", "sp2"]
            .iter()
            .map(|name| {
                let path = work.path().join(format!("{name}.trees"));
                fs::write(&path, nexus(&["A", "B", "C"])).unwrap();
                path
            })
            .collect();

        let summary = run_pipeline(config, &inputs).unwrap();
        assert!(summary.is_clean(), "{}", summary.get_summary_text());
        assert_eq!(summary.rows().count(), 1);
    }

    #[test]
    fn test_missing_tool_fails_at_startup() {
        let (work, _tools, mut config) = setup();
        config.bucky_program = work.path().join("not-bucky");
        let input = work.path().join("sp1.trees");
        fs::write(&input, nexus(&["A", "B", "C"])).unwrap();

        let err = run_pipeline(config, &[input]).err().expect("should fail");
        assert!(err.is_fatal());
        assert!(!work.path().join("sp1_mbsumReady.txt").exists());
    }
}
