//! Run configuration: sample roster, mapping codes, tissue pairs and
//! experimental groups.
//!
//! None of these are hardcoded. They come from the command line or from
//! small CSV side files next to the variant tables.

use crate::depth::DepthPolicy;
use crate::errors::{self, AseError};
use crate::mae::MaePolicy;
use crate::types::Mapping;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Reference or alternative slot of a per-sample column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleSlot {
    Ref,
    Alt,
}

impl AlleleSlot {
    fn tag(self) -> &'static str {
        match self {
            AlleleSlot::Ref => "R",
            AlleleSlot::Alt => "A",
        }
    }
}

/// Genotype label or allele depth column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Genotype,
    Depth,
}

impl Field {
    fn suffix(self) -> &'static str {
        match self {
            Field::Genotype => "GT",
            Field::Depth => "AD",
        }
    }
}

/// Column name in a per-mapping table, e.g. `1GF_R_GF3.GT`.
pub fn raw_column(sample: &str, slot: AlleleSlot, code: &str, field: Field) -> String {
    format!("{}_{}_{}.{}", sample, slot.tag(), code, field.suffix())
}

/// Column name in a reconciled table, e.g. `1GF_R_.GT`.
pub fn reconciled_column(sample: &str, slot: AlleleSlot, field: Field) -> String {
    format!("{}_{}_.{}", sample, slot.tag(), field.suffix())
}

/// Allele frequency column name for a sample or group, e.g. `AF_1GF`.
pub fn frequency_column(name: &str) -> String {
    format!("AF_{}", name)
}

/// The ordered sample roster and the two pseudogenome mapping codes.
#[derive(Debug, Clone)]
pub struct Roster {
    samples: Vec<String>,
    codes: [String; 2],
    anchor: usize,
}

impl Roster {
    /// Build a roster. The anchor defaults to the first sample.
    pub fn new(samples: Vec<String>, codes: [String; 2], anchor: Option<&str>) -> errors::Result<Self> {
        if samples.is_empty() {
            return Err(AseError::InvalidParameter {
                parameter: "samples".to_string(),
                reason: "the sample roster is empty".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for sample in &samples {
            if sample.is_empty() {
                return Err(AseError::InvalidParameter {
                    parameter: "samples".to_string(),
                    reason: "sample names must not be empty".to_string(),
                });
            }
            if !seen.insert(sample.as_str()) {
                return Err(AseError::InvalidParameter {
                    parameter: "samples".to_string(),
                    reason: format!("sample '{}' is listed twice", sample),
                });
            }
        }
        if codes[0].is_empty() || codes[1].is_empty() || codes[0] == codes[1] {
            return Err(AseError::InvalidParameter {
                parameter: "mapping-codes".to_string(),
                reason: format!(
                    "need two distinct, non-empty codes (got '{}' and '{}')",
                    codes[0], codes[1]
                ),
            });
        }

        let mut roster = Self {
            samples,
            codes,
            anchor: 0,
        };
        if let Some(name) = anchor {
            roster.anchor = roster.require(name, "--anchor")?;
        }
        Ok(roster)
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn code(&self, mapping: Mapping) -> &str {
        &self.codes[mapping.index()]
    }

    pub fn anchor(&self) -> usize {
        self.anchor
    }

    pub fn anchor_name(&self) -> &str {
        &self.samples[self.anchor]
    }

    pub fn index_of(&self, sample: &str) -> Option<usize> {
        self.samples.iter().position(|s| s == sample)
    }

    /// Resolve a sample name, failing with the setting that referenced it.
    pub fn require(&self, sample: &str, context: &str) -> errors::Result<usize> {
        self.index_of(sample).ok_or_else(|| AseError::UnknownSample {
            context: context.to_string(),
            sample: sample.to_string(),
        })
    }
}

/// Two tissues sampled from the same individual (roster indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TissuePair {
    pub first: usize,
    pub second: usize,
}

/// A named experimental group and its member samples (roster indices).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentalGroup {
    pub name: String,
    pub members: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct SampleNameRecord {
    #[serde(rename = "Sample_name")]
    sample_name: String,
}

#[derive(Debug, Deserialize)]
struct MappingCodeRecord {
    #[serde(rename = "PSGs")]
    code: String,
}

/// Read sample names from a CSV file with a `Sample_name` column.
pub fn load_sample_names(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open sample roster: {}", path.display()))?;
    let mut samples = Vec::new();
    for (i, record) in rdr.deserialize::<SampleNameRecord>().enumerate() {
        let record = record.with_context(|| format!("Failed to parse sample roster row {}", i + 1))?;
        let name = record.sample_name.trim();
        if !name.is_empty() {
            samples.push(name.to_string());
        }
    }
    Ok(samples)
}

/// Read the two mapping codes from a CSV file with a `PSGs` column.
pub fn load_mapping_codes(path: &Path) -> Result<[String; 2]> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open mapping codes: {}", path.display()))?;
    let mut codes = Vec::new();
    for (i, record) in rdr.deserialize::<MappingCodeRecord>().enumerate() {
        let record = record.with_context(|| format!("Failed to parse mapping codes row {}", i + 1))?;
        let code = record.code.trim();
        if !code.is_empty() {
            codes.push(code.to_string());
        }
    }
    parse_mapping_codes(codes)
}

/// Turn a list of codes into the (first, second) pair, requiring exactly two.
pub fn parse_mapping_codes(codes: Vec<String>) -> Result<[String; 2]> {
    let n = codes.len();
    let pair: [String; 2] = codes.try_into().map_err(|_| AseError::InvalidParameter {
        parameter: "mapping-codes".to_string(),
        reason: format!("expected exactly 2 pseudogenome codes, found {}", n),
    })?;
    Ok(pair)
}

/// Split a comma-separated command-line list, dropping empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Read tissue pairs: a header row, then two sample names per row.
pub fn load_tissue_pairs(path: &Path, roster: &Roster) -> Result<Vec<TissuePair>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open tissue pairs: {}", path.display()))?;

    let mut pairs = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse tissue pairs row {}", i + 1))?;
        let first = record.get(0).map(str::trim).unwrap_or("");
        let second = record.get(1).map(str::trim).unwrap_or("");
        if first.is_empty() && second.is_empty() {
            continue;
        }
        if first.is_empty() || second.is_empty() {
            anyhow::bail!(
                "Tissue pairs row {} in {} must name two samples",
                i + 1,
                path.display()
            );
        }
        pairs.push(TissuePair {
            first: roster.require(first, "tissue pairs")?,
            second: roster.require(second, "tissue pairs")?,
        });
    }
    if pairs.is_empty() {
        anyhow::bail!("Tissue pairs file {} contains no pairs", path.display());
    }
    Ok(pairs)
}

/// Read experimental groups: a header row, then a group name followed by
/// its sample names. Rows may be ragged.
pub fn load_groups(path: &Path, roster: &Roster) -> Result<Vec<ExperimentalGroup>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open experimental groups: {}", path.display()))?;

    let mut groups = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to parse experimental groups row {}", i + 1))?;
        let mut fields = record.iter().map(str::trim);
        let name = match fields.next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        let members = fields
            .filter(|s| !s.is_empty())
            .map(|s| roster.require(s, "experimental groups"))
            .collect::<errors::Result<Vec<_>>>()?;
        groups.push(ExperimentalGroup { name, members });
    }
    Ok(groups)
}

/// Everything a pipeline run needs, validated.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub first_table: PathBuf,
    pub second_table: PathBuf,
    pub roster: Roster,
    pub delimiter: u8,
    pub min_depth: f64,
    pub depth_policy: DepthPolicy,
    pub mae_policy: MaePolicy,
    pub groups: Option<Vec<ExperimentalGroup>>,
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub resume: bool,
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn roster() -> Roster {
        Roster::new(
            vec!["1GF".into(), "1KF".into(), "2GF".into(), "2KF".into()],
            ["GF3".into(), "KF6".into()],
            None,
        )
        .unwrap()
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_column_names() {
        assert_eq!(raw_column("1GF", AlleleSlot::Ref, "GF3", Field::Genotype), "1GF_R_GF3.GT");
        assert_eq!(raw_column("1GF", AlleleSlot::Alt, "KF6", Field::Depth), "1GF_A_KF6.AD");
        assert_eq!(reconciled_column("2KS", AlleleSlot::Alt, Field::Depth), "2KS_A_.AD");
        assert_eq!(frequency_column("GF"), "AF_GF");
    }

    #[test]
    fn test_roster_defaults_anchor_to_first_sample() {
        let r = roster();
        assert_eq!(r.anchor(), 0);
        assert_eq!(r.anchor_name(), "1GF");
        assert_eq!(r.code(Mapping::First), "GF3");
        assert_eq!(r.code(Mapping::Second), "KF6");
    }

    #[test]
    fn test_roster_explicit_anchor() {
        let r = Roster::new(
            vec!["1GF".into(), "6KF".into()],
            ["GF3".into(), "KF6".into()],
            Some("6KF"),
        )
        .unwrap();
        assert_eq!(r.anchor(), 1);
    }

    #[test]
    fn test_roster_rejects_unknown_anchor() {
        let err = Roster::new(vec!["1GF".into()], ["GF3".into(), "KF6".into()], Some("9ZZ"))
            .unwrap_err();
        assert!(matches!(err, AseError::UnknownSample { .. }));
    }

    #[test]
    fn test_roster_rejects_duplicates_and_bad_codes() {
        assert!(Roster::new(vec!["1GF".into(), "1GF".into()], ["A".into(), "B".into()], None).is_err());
        assert!(Roster::new(vec!["1GF".into()], ["A".into(), "A".into()], None).is_err());
        assert!(Roster::new(vec![], ["A".into(), "B".into()], None).is_err());
    }

    #[test]
    fn test_load_sample_names_and_codes() {
        let samples = write_temp("Sample_name\n1GF\n2GF\n\n3GF\n");
        assert_eq!(load_sample_names(samples.path()).unwrap(), vec!["1GF", "2GF", "3GF"]);

        let codes = write_temp("PSGs\nGF3\nKF6\n");
        assert_eq!(load_mapping_codes(codes.path()).unwrap(), ["GF3".to_string(), "KF6".to_string()]);

        let too_many = write_temp("PSGs\nGF3\nKF6\nXX1\n");
        assert!(load_mapping_codes(too_many.path()).is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("1GF, 2GF,,3GF "), vec!["1GF", "2GF", "3GF"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_load_tissue_pairs() {
        let file = write_temp("Gills,Kidneys\n1GF,1KF\n2GF,2KF\n");
        let pairs = load_tissue_pairs(file.path(), &roster()).unwrap();
        assert_eq!(pairs, vec![TissuePair { first: 0, second: 1 }, TissuePair { first: 2, second: 3 }]);
    }

    #[test]
    fn test_load_tissue_pairs_unknown_sample() {
        let file = write_temp("Gills,Kidneys\n1GF,7KF\n");
        let err = load_tissue_pairs(file.path(), &roster()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AseError>(),
            Some(AseError::UnknownSample { .. })
        ));
    }

    #[test]
    fn test_load_groups_ragged_rows() {
        let file = write_temp("Group,S1,S2\nGF,1GF,2GF\nKF,1KF\n");
        let groups = load_groups(file.path(), &roster()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], ExperimentalGroup { name: "GF".into(), members: vec![0, 2] });
        assert_eq!(groups[1], ExperimentalGroup { name: "KF".into(), members: vec![1] });
    }
}
