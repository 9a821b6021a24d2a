//src/mbsum.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{PcfError, Result};
use crate::process::ExternalTool;

/// Appended to the augmented file's stem to name the summary.
pub const MBSUM_RESULTS_SUFFIX: &str = "_mbsum_Results.txt";

/// Length of the augmented file's extension (`.txt`).
const AUGMENTED_EXTENSION_LEN: usize = 4;

/// Number of leading trees discarded as burn-in.
pub fn burnin_count(tree_count: usize, fraction: f64) -> usize {
    (tree_count as f64 * fraction).floor() as usize
}

/// `sp1_mbsumReady.txt` -> `sp1_mbsumReady_mbsum_Results.txt`.
pub fn summary_name(augmented_name: &str) -> Result<String> {
    let cut = augmented_name
        .len()
        .checked_sub(AUGMENTED_EXTENSION_LEN)
        .filter(|&cut| cut > 0 && augmented_name.is_char_boundary(cut))
        .ok_or_else(|| PcfError::InvalidInputName(augmented_name.to_string()))?;
    Ok(format!("{}{MBSUM_RESULTS_SUFFIX}", &augmented_name[..cut]))
}

/// Where a summarized input ended up after staging.
#[derive(Debug, Clone)]
pub struct StagedSummary {
    pub burnin: usize,
    pub staged_input: PathBuf,
    pub summary_path: PathBuf,
    pub summary_name: String,
}

/// Runs mbsum on one augmented file, then moves the augmented file into
/// `mbsum/mbsum_in/` and the summary into `mbsum/mbsum_out/`.
///
/// Staging only happens after a successful run with the expected output.
pub fn summarize(
    tool: &ExternalTool,
    config: &PipelineConfig,
    augmented: &Path,
    tree_count: usize,
) -> Result<StagedSummary> {
    let input_name = file_name(augmented)?;
    let output_name = summary_name(&input_name)?;
    let burnin = burnin_count(tree_count, config.burnin_fraction);

    let args = [
        "-n".to_string(),
        burnin.to_string(),
        "-o".to_string(),
        output_name.clone(),
        input_name.clone(),
    ];
    log::info!(
        "Summarizing {} ({} trees, burn-in {})",
        input_name,
        tree_count,
        burnin
    );
    tool.run_checked(&args, &config.work_dir)?;

    let produced = config.resolve(&output_name);
    if !produced.is_file() {
        return Err(PcfError::MissingOutput(produced));
    }

    let staged_input = stage(augmented, &config.mbsum_in_dir(), &input_name)?;
    let summary_path = stage(&produced, &config.mbsum_out_dir(), &output_name)?;

    Ok(StagedSummary {
        burnin,
        staged_input,
        summary_path,
        summary_name: output_name,
    })
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| PcfError::InvalidInputName(path.display().to_string()))
}

/// Moves `from` to `<dir>/<name>`, creating `dir` if needed.
pub fn stage(from: &Path, dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| PcfError::file_io(dir, e))?;
    let to = dir.join(name);
    move_file(from, &to)?;
    Ok(to)
}

/// `rename`, falling back to copy + remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| PcfError::file_io(from, e))?;
    fs::remove_file(from).map_err(|e| PcfError::file_io(from, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burnin_is_floor_of_fraction() {
        assert_eq!(burnin_count(1001, 0.1), 100);
        assert_eq!(burnin_count(9, 0.1), 0);
        assert_eq!(burnin_count(250, 0.25), 62);
        assert_eq!(burnin_count(0, 0.1), 0);
    }

    #[test]
    fn test_summary_name_replaces_extension() {
        assert_eq!(
            summary_name("sp1_mbsumReady.txt").unwrap(),
            "sp1_mbsumReady_mbsum_Results.txt"
        );
        assert!(summary_name(".txt").is_err());
    }

    #[test]
    fn test_stage_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "x").unwrap();
        let staged = stage(&src, &dir.path().join("mbsum/mbsum_in"), "a.txt").unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(staged).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn test_summarize_runs_tool_and_stages_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake_mbsum");
        // args: -n <burnin> -o <out> <in>
        fs::write(&fake, "#!/bin/sh\necho \"burnin=$2\" > \"$4\"\n").unwrap();
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();

        let config = PipelineConfig {
            work_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let augmented = dir.path().join("sp1_mbsumReady.txt");
        fs::write(&augmented, "#NEXUS\n").unwrap();

        let staged = summarize(&ExternalTool::new(&fake), &config, &augmented, 55).unwrap();
        assert_eq!(staged.burnin, 5);
        assert_eq!(staged.summary_name, "sp1_mbsumReady_mbsum_Results.txt");
        assert!(dir.path().join("mbsum/mbsum_in/sp1_mbsumReady.txt").is_file());
        assert_eq!(
            fs::read_to_string(&staged.summary_path).unwrap().trim(),
            "burnin=5"
        );
        assert!(!augmented.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_run_leaves_input_in_place() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("broken_mbsum");
        fs::write(&fake, "#!/bin/sh\necho boom >&2\nexit 1\n").unwrap();
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();

        let config = PipelineConfig {
            work_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let augmented = dir.path().join("sp1_mbsumReady.txt");
        fs::write(&augmented, "#NEXUS\n").unwrap();

        let err = summarize(&ExternalTool::new(&fake), &config, &augmented, 10).unwrap_err();
        assert!(matches!(err, PcfError::ToolFailed { .. }));
        assert!(augmented.exists());
        assert!(!dir.path().join("mbsum").exists());
    }
}
