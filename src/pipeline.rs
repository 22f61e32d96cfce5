//! Stage orchestration, checkpointing and resume.

use crate::config::PipelineConfig;
use crate::csv_reader::{read_mapping_table, read_merged_table, read_reconciled_table, read_run_summary};
use crate::depth::filter_depth;
use crate::mae::{clean_mae, MaePolicy};
use crate::merge::merge_tables;
use crate::multiallelic::filter_multiallelic;
use crate::orient::orient_to_anchor;
use crate::output;
use crate::reconcile::{reconcile_table, CaseCounts};
use crate::types::{Mapping, MergedTable, ReconciledTable, StageReport};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};

pub const FINAL_TABLE: &str = "snps_ready.csv";
pub const HOMOZYGOUS_LOG: &str = "homozygous_sites.csv";
pub const UNRESOLVED_LOG: &str = "unresolved_calls.csv";
pub const GROUP_FREQUENCIES: &str = "group_frequencies.csv";
pub const RUN_SUMMARY: &str = "run_summary.csv";
/// Reports of the checkpointed stages, kept beside the checkpoints for resume.
pub const STAGE_REPORTS: &str = "stage_reports.csv";

/// Stages whose output is checkpointed, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Checkpoint {
    Biallelic,
    Reconciled,
    DepthFiltered,
    Uniform,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 4] = [
        Checkpoint::Biallelic,
        Checkpoint::Reconciled,
        Checkpoint::DepthFiltered,
        Checkpoint::Uniform,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Checkpoint::Biallelic => "biallelic_sites.csv",
            Checkpoint::Reconciled => "reconciled_sites.csv",
            Checkpoint::DepthFiltered => "depth_filtered_sites.csv",
            Checkpoint::Uniform => "uniform_sites.csv",
        }
    }

    pub fn path(self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    /// Stages whose output this checkpoint already contains.
    pub fn stages(self) -> &'static [&'static str] {
        const STAGES: [&str; 5] = ["merge", "multiallelic", "reconcile", "depth", "orient"];
        match self {
            Checkpoint::Biallelic => &STAGES[..2],
            Checkpoint::Reconciled => &STAGES[..3],
            Checkpoint::DepthFiltered => &STAGES[..4],
            Checkpoint::Uniform => &STAGES[..],
        }
    }
}

/// The most advanced checkpoint present in `dir`, if any.
pub fn latest_checkpoint(dir: &Path) -> Option<Checkpoint> {
    Checkpoint::ALL
        .iter()
        .rev()
        .copied()
        .find(|c| c.path(dir).is_file())
}

/// Write through a sibling temp file and rename it into place, so a crash
/// never leaves a truncated file under the final name.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let file_name = path
        .file_name()
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    write(&tmp)?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

fn make_progress_bar(quiet: bool, len: u64) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("  [{elapsed_precise}/{eta_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn make_spinner(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("  {spinner} [{elapsed_precise}] {pos} {msg}")?);
    Ok(pb)
}

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    /// Checkpoint the run resumed from
    pub resumed_from: Option<Checkpoint>,
    /// One entry per stage, including those restored from a checkpoint
    pub reports: Vec<StageReport>,
    /// Reconciliation case counts, when reconciliation ran
    pub case_counts: Option<CaseCounts>,
    /// Homozygous calls logged, when reconciliation ran
    pub homozygous: usize,
    /// Mean `AF_all`, when experimental groups were given
    pub mean_af_all: Option<f64>,
    pub final_sites: usize,
}

fn record(reports: &mut Vec<StageReport>, report: StageReport) {
    info!(
        "Stage {}: {} sites in, {} kept, {} dropped",
        report.stage,
        report.consumed,
        report.retained,
        report.dropped()
    );
    reports.push(report);
}

/// Read both mapping tables, join them and drop multiallelic sites.
fn merge_stage(config: &PipelineConfig, reports: &mut Vec<StageReport>) -> Result<MergedTable> {
    let spinner = make_spinner(config.quiet)?;
    spinner.set_message("mapping tables read");
    let first = read_mapping_table(
        &config.first_table,
        &config.roster,
        Mapping::First,
        config.delimiter,
    )?;
    spinner.inc(1);
    let second = read_mapping_table(
        &config.second_table,
        &config.roster,
        Mapping::Second,
        config.delimiter,
    )?;
    spinner.finish_and_clear();

    let first_rows = first.rows.len();
    let merged = merge_tables(first, second)?;
    record(reports, StageReport::new("merge", first_rows, merged.sites.len()));

    let consumed = merged.sites.len();
    let (biallelic, _) = filter_multiallelic(merged, &config.roster);
    record(reports, StageReport::new("multiallelic", consumed, biallelic.sites.len()));
    Ok(biallelic)
}

fn reconcile_stage(
    config: &PipelineConfig,
    merged: MergedTable,
    reports: &mut Vec<StageReport>,
    summary: &mut PipelineSummary,
) -> Result<ReconciledTable> {
    let consumed = merged.sites.len();
    let pb = make_progress_bar(config.quiet, consumed as u64)?;
    let result = reconcile_table(merged, &config.roster, Some(&pb));
    pb.finish_and_clear();

    write_atomic(&config.output_dir.join(HOMOZYGOUS_LOG), |p| {
        output::write_homozygous_log(&result.homozygous, p)
    })?;
    write_atomic(&config.output_dir.join(UNRESOLVED_LOG), |p| {
        output::write_unresolved_calls(&result.unresolved, &config.roster, p)
    })?;
    if result.counts.unresolved > 0 {
        warn!(
            "{} sample calls could not be reconciled; see {}",
            result.counts.unresolved, UNRESOLVED_LOG
        );
    }

    record(reports, StageReport::new("reconcile", consumed, result.table.sites.len()));
    summary.homozygous = result.homozygous.len();
    summary.case_counts = Some(result.counts);
    Ok(result.table)
}

/// Write a checkpoint together with the reports of the stages it covers.
fn save_checkpoint<F>(dir: &Path, checkpoint: Checkpoint, reports: &[StageReport], write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    write_atomic(&dir.join(STAGE_REPORTS), |p| output::write_run_summary(reports, p))?;
    write_atomic(&checkpoint.path(dir), write)
}

/// Reports of the stages a checkpoint covers, from the run that wrote it.
fn restore_reports(dir: &Path, checkpoint: Checkpoint) -> Result<Vec<StageReport>> {
    let path = dir.join(STAGE_REPORTS);
    if !path.is_file() {
        warn!(
            "No {} beside the checkpoints; counts for earlier stages are unavailable",
            STAGE_REPORTS
        );
        return Ok(Vec::new());
    }
    let covered = checkpoint.stages();
    let reports: Vec<StageReport> = read_run_summary(&path)?
        .into_iter()
        .filter(|r| covered.contains(&r.stage.as_str()))
        .collect();
    if reports.len() < covered.len() {
        warn!(
            "{} holds {} of the {} stages before {}",
            STAGE_REPORTS,
            reports.len(),
            covered.len(),
            checkpoint.file_name()
        );
    }
    Ok(reports)
}

/// Run every stage not already covered by a checkpoint.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineSummary> {
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;
    std::fs::create_dir_all(&config.checkpoint_dir)
        .with_context(|| format!("Failed to create {}", config.checkpoint_dir.display()))?;

    let roster = &config.roster;
    let dir = &config.checkpoint_dir;
    let mut summary = PipelineSummary::default();
    let mut reports = Vec::new();

    let start = if config.resume {
        latest_checkpoint(dir)
    } else {
        None
    };
    match start {
        Some(checkpoint) => info!("Resuming from {}", checkpoint.path(dir).display()),
        None if config.resume => warn!("No checkpoint found in {}; running from the start", dir.display()),
        None => {}
    }
    summary.resumed_from = start;
    if let Some(checkpoint) = start {
        reports = restore_reports(dir, checkpoint)?;
    }
    let done = |stage: Checkpoint| start.map_or(false, |s| s >= stage);

    let mut table = if done(Checkpoint::Reconciled) {
        let latest = start.unwrap_or(Checkpoint::Reconciled);
        read_reconciled_table(&latest.path(dir), roster)?
    } else {
        let biallelic = if done(Checkpoint::Biallelic) {
            read_merged_table(&Checkpoint::Biallelic.path(dir), roster)?
        } else {
            let table = merge_stage(config, &mut reports)?;
            save_checkpoint(dir, Checkpoint::Biallelic, &reports, |p| {
                output::write_merged_table(&table, roster, p)
            })?;
            table
        };
        let table = reconcile_stage(config, biallelic, &mut reports, &mut summary)?;
        save_checkpoint(dir, Checkpoint::Reconciled, &reports, |p| {
            output::write_reconciled_table(&table, roster, p, false)
        })?;
        table
    };

    if !done(Checkpoint::DepthFiltered) {
        let consumed = table.sites.len();
        table = filter_depth(table, &config.depth_policy, config.min_depth, roster);
        record(&mut reports, StageReport::new("depth", consumed, table.sites.len()));
        save_checkpoint(dir, Checkpoint::DepthFiltered, &reports, |p| {
            output::write_reconciled_table(&table, roster, p, false)
        })?;
    }

    if !done(Checkpoint::Uniform) {
        let consumed = table.sites.len();
        orient_to_anchor(&mut table, roster.anchor(), roster.anchor_name());
        record(&mut reports, StageReport::new("orient", consumed, table.sites.len()));
        save_checkpoint(dir, Checkpoint::Uniform, &reports, |p| {
            output::write_reconciled_table(&table, roster, p, false)
        })?;
    }

    if config.mae_policy == MaePolicy::PerSample {
        warn!("No tissue pairs configured; MAE cleaner judges each sample on its own");
    }
    let consumed = table.sites.len();
    let table = clean_mae(table, &config.mae_policy);
    record(&mut reports, StageReport::new("mae", consumed, table.sites.len()));
    if table.sites.is_empty() {
        warn!("No sites survived the pipeline");
    }

    write_atomic(&config.output_dir.join(FINAL_TABLE), |p| {
        output::write_reconciled_table(&table, roster, p, true)
    })?;

    if let Some(groups) = &config.groups {
        let mut mean = 0.0;
        write_atomic(&config.output_dir.join(GROUP_FREQUENCIES), |p| {
            mean = output::write_group_frequencies(&table, groups, roster, p)?;
            Ok(())
        })?;
        info!("Mean AF_all across {} sites: {:.4} (0.5 expected without mapping bias)", table.sites.len(), mean);
        summary.mean_af_all = Some(mean);
    }

    write_atomic(&config.output_dir.join(RUN_SUMMARY), |p| {
        output::write_run_summary(&reports, p)
    })?;

    summary.final_sites = table.sites.len();
    summary.reports = reports;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExperimentalGroup, Roster, TissuePair};
    use crate::depth::{DepthPolicy, DEFAULT_MIN_DEPTH};
    use crate::reconcile::CallCase;
    use tempfile::{tempdir, TempDir};

    const FIRST: &str = "\
CHROM,POS,Gene,S1_R_P1.GT,S1_A_P1.GT,S1_R_P1.AD,S1_A_P1.AD,S2_R_P1.GT,S2_A_P1.GT,S2_R_P1.AD,S2_A_P1.AD
chr1,100,g1,A,G,10,8,A,G,6,6
chr1,200,g2,C,T,5,5,C,A,5,5
chr1,300,g3,A,A,20,0,A,A,15,0
chr1,400,g4,A,G,2,1,A,G,2,2
chr1,500,g5,T,C,9,9,T,C,9,9
";

    const SECOND: &str = "\
CHROM,POS,Gene,S1_R_P2.GT,S1_A_P2.GT,S1_R_P2.AD,S1_A_P2.AD,S2_R_P2.GT,S2_A_P2.GT,S2_R_P2.AD,S2_A_P2.AD
chr1,100,g1,G,A,9,11,A,G,6,8
chr1,200,g2,C,T,5,5,C,T,5,5
chr1,300,g3,A,A,20,0,A,A,15,0
chr1,400,g4,A,G,2,1,A,G,2,2
chr2,50,g9,A,G,9,9,A,G,9,9
";

    fn setup() -> (TempDir, PipelineConfig) {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        std::fs::write(&first, FIRST).unwrap();
        std::fs::write(&second, SECOND).unwrap();

        let roster = Roster::new(vec!["S1".into(), "S2".into()], ["P1".into(), "P2".into()], None).unwrap();
        let output_dir = dir.path().join("out");
        let config = PipelineConfig {
            first_table: first,
            second_table: second,
            depth_policy: DepthPolicy::all_samples(&roster),
            roster,
            delimiter: b',',
            min_depth: DEFAULT_MIN_DEPTH,
            mae_policy: MaePolicy::PerSample,
            groups: None,
            checkpoint_dir: output_dir.join("temp"),
            output_dir,
            resume: false,
            quiet: true,
        };
        (dir, config)
    }

    fn read(path: PathBuf) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    fn stages(summary: &PipelineSummary) -> Vec<(&str, usize, usize)> {
        summary
            .reports
            .iter()
            .map(|r| (r.stage.as_str(), r.consumed, r.retained))
            .collect()
    }

    const ALL_STAGES: [(&str, usize, usize); 6] = [
        ("merge", 5, 4),
        ("multiallelic", 4, 3),
        ("reconcile", 3, 3),
        ("depth", 3, 2),
        ("orient", 2, 2),
        ("mae", 2, 1),
    ];

    const RUN_SUMMARY_TEXT: &str = "stage,consumed,retained\nmerge,5,4\nmultiallelic,4,3\n\
reconcile,3,3\ndepth,3,2\norient,2,2\nmae,2,1\n";

    #[test]
    fn test_full_run() {
        let (_dir, config) = setup();
        let summary = run_pipeline(&config).unwrap();

        assert_eq!(stages(&summary), ALL_STAGES.to_vec());
        assert_eq!(read(config.output_dir.join(RUN_SUMMARY)), RUN_SUMMARY_TEXT);
        assert_eq!(summary.final_sites, 1);
        assert_eq!(summary.homozygous, 2);
        let counts = summary.case_counts.unwrap();
        assert_eq!(counts.get(CallCase::Swapped), 1);
        assert_eq!(counts.get(CallCase::BothHomozygous), 2);
        assert_eq!(counts.unresolved, 0);

        let text = read(config.output_dir.join(FINAL_TABLE));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "CHROM,POS,SNP_ID,Gene_P1,Gene_P2,S1_R_.GT,S1_A_.GT,S1_R_.AD,S1_A_.AD,\
S2_R_.GT,S2_A_.GT,S2_R_.AD,S2_A_.AD,AF_S1,AF_S2"
        );
        assert_eq!(lines[1], "chr1,100,0,g1,g1,A,G,10.5,8.5,A,G,6,7,0.552632,0.461538");
        assert_eq!(lines.len(), 2);

        let homozygous = read(config.output_dir.join(HOMOZYGOUS_LOG));
        assert_eq!(homozygous, "CHROM,POS,SNP_ID,sample\nchr1,300,1,S1\nchr1,300,1,S2\n");

        for checkpoint in Checkpoint::ALL {
            assert!(checkpoint.path(&config.checkpoint_dir).is_file());
        }
        assert_eq!(latest_checkpoint(&config.checkpoint_dir), Some(Checkpoint::Uniform));
        assert!(!config.checkpoint_dir.join("uniform_sites.csv.tmp").exists());
    }

    #[test]
    fn test_resume_from_latest_checkpoint() {
        let (_dir, mut config) = setup();
        run_pipeline(&config).unwrap();
        let expected = read(config.output_dir.join(FINAL_TABLE));
        std::fs::remove_file(config.output_dir.join(FINAL_TABLE)).unwrap();

        config.resume = true;
        let summary = run_pipeline(&config).unwrap();
        assert_eq!(summary.resumed_from, Some(Checkpoint::Uniform));
        // Earlier stages' counts come from the run that wrote the checkpoints
        assert_eq!(stages(&summary), ALL_STAGES.to_vec());
        assert!(summary.case_counts.is_none());
        assert_eq!(read(config.output_dir.join(FINAL_TABLE)), expected);
        assert_eq!(read(config.output_dir.join(RUN_SUMMARY)), RUN_SUMMARY_TEXT);
    }

    #[test]
    fn test_resume_from_biallelic_checkpoint() {
        let (_dir, mut config) = setup();
        run_pipeline(&config).unwrap();
        let expected = read(config.output_dir.join(FINAL_TABLE));
        for checkpoint in [Checkpoint::Reconciled, Checkpoint::DepthFiltered, Checkpoint::Uniform] {
            std::fs::remove_file(checkpoint.path(&config.checkpoint_dir)).unwrap();
        }

        config.resume = true;
        let summary = run_pipeline(&config).unwrap();
        assert_eq!(summary.resumed_from, Some(Checkpoint::Biallelic));
        // Only merge and multiallelic are restored; the rest were recounted
        assert_eq!(stages(&summary), ALL_STAGES.to_vec());
        assert!(summary.case_counts.is_some());
        assert_eq!(read(config.output_dir.join(FINAL_TABLE)), expected);
        assert_eq!(read(config.output_dir.join(RUN_SUMMARY)), RUN_SUMMARY_TEXT);
    }

    #[test]
    fn test_resume_without_stage_reports_keeps_going() {
        let (_dir, mut config) = setup();
        run_pipeline(&config).unwrap();
        std::fs::remove_file(config.checkpoint_dir.join(STAGE_REPORTS)).unwrap();

        config.resume = true;
        let summary = run_pipeline(&config).unwrap();
        assert_eq!(stages(&summary), vec![("mae", 2, 1)]);
    }

    #[test]
    fn test_checkpoint_stages() {
        assert_eq!(Checkpoint::Biallelic.stages(), &["merge", "multiallelic"]);
        assert_eq!(Checkpoint::Uniform.stages().len(), 5);
    }

    #[test]
    fn test_without_resume_checkpoints_are_ignored() {
        let (_dir, config) = setup();
        run_pipeline(&config).unwrap();
        let summary = run_pipeline(&config).unwrap();
        assert_eq!(summary.resumed_from, None);
        assert_eq!(summary.reports.len(), 6);
    }

    #[test]
    fn test_pairs_and_groups() {
        let (_dir, mut config) = setup();
        let pairs = vec![TissuePair { first: 0, second: 1 }];
        config.depth_policy = DepthPolicy::PerPair { pairs: pairs.clone() };
        config.mae_policy = MaePolicy::PerPair { pairs };
        config.groups = Some(vec![ExperimentalGroup { name: "G".into(), members: vec![0, 1] }]);

        let summary = run_pipeline(&config).unwrap();
        // chr1:300 is fixed in both tissues and still removed
        assert_eq!(summary.final_sites, 1);
        let mean = summary.mean_af_all.unwrap();
        assert!((mean - 16.5 / 32.0).abs() < 1e-12);

        let text = read(config.output_dir.join(GROUP_FREQUENCIES));
        assert_eq!(text, "CHROM,POS,SNP_ID,AF_all,AF_G\nchr1,100,0,0.515625,0.515625\n");
    }

    #[test]
    fn test_missing_sample_column_is_fatal() {
        let (_dir, mut config) = setup();
        config.roster = Roster::new(
            vec!["S1".into(), "S3".into()],
            ["P1".into(), "P2".into()],
            None,
        )
        .unwrap();
        let err = run_pipeline(&config).unwrap_err();
        assert!(err.to_string().contains("S3_R_P1.GT"));
    }
}
