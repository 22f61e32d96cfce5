//! Readers for the per-mapping input tables and the stage checkpoints.
//!
//! Column positions are resolved once from the header; rows are then
//! parsed positionally.

use crate::config::{raw_column, reconciled_column, AlleleSlot, Field, Roster};
use crate::errors::AseError;
use crate::types::{
    AlleleCall, Mapping, MappingRow, MappingTable, MergedSite, MergedTable, ReconciledAllele,
    ReconciledSite, ReconciledTable, SampleCall, SiteKey, StageReport,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

pub const CHROM: &str = "CHROM";
pub const POS: &str = "POS";
pub const SNP_ID: &str = "SNP_ID";

/// Genotype cell written for a call that could not be reconciled.
pub const ERROR_GENOTYPE: &str = "error";
/// Depth cell written for a call that could not be reconciled.
pub const MISSING_DEPTH: &str = "NA";

/// Header lookup that remembers which columns were claimed, so the rest
/// can be carried along as annotations.
struct HeaderIndex {
    table: String,
    names: Vec<String>,
    positions: HashMap<String, usize>,
    claimed: Vec<bool>,
}

impl HeaderIndex {
    fn new(table: &str, headers: &csv::StringRecord) -> Self {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(i);
        }
        Self {
            table: table.to_string(),
            claimed: vec![false; names.len()],
            names,
            positions,
        }
    }

    fn claim(&mut self, column: &str) -> Result<usize, AseError> {
        let idx = *self.positions.get(column).ok_or_else(|| AseError::MissingColumn {
            table: self.table.clone(),
            column: column.to_string(),
        })?;
        self.claimed[idx] = true;
        Ok(idx)
    }

    /// Claim a column only if it is present.
    fn claim_optional(&mut self, column: &str) -> Option<usize> {
        let idx = *self.positions.get(column)?;
        self.claimed[idx] = true;
        Some(idx)
    }

    /// Unclaimed, non-empty columns in header order. Pandas-style unnamed
    /// index columns from earlier exports have an empty header and are skipped.
    fn annotations(&self) -> (Vec<usize>, Vec<String>) {
        self.names
            .iter()
            .enumerate()
            .filter(|(i, name)| !self.claimed[*i] && !name.is_empty())
            .map(|(i, name)| (i, name.clone()))
            .unzip()
    }
}

/// Column positions of one sample's four fields.
#[derive(Debug, Clone, Copy)]
struct SampleColumns {
    ref_gt: usize,
    alt_gt: usize,
    ref_depth: usize,
    alt_depth: usize,
}

impl SampleColumns {
    fn raw(header: &mut HeaderIndex, sample: &str, code: &str) -> Result<Self, AseError> {
        Ok(Self {
            ref_gt: header.claim(&raw_column(sample, AlleleSlot::Ref, code, Field::Genotype))?,
            alt_gt: header.claim(&raw_column(sample, AlleleSlot::Alt, code, Field::Genotype))?,
            ref_depth: header.claim(&raw_column(sample, AlleleSlot::Ref, code, Field::Depth))?,
            alt_depth: header.claim(&raw_column(sample, AlleleSlot::Alt, code, Field::Depth))?,
        })
    }

    fn reconciled(header: &mut HeaderIndex, sample: &str) -> Result<Self, AseError> {
        Ok(Self {
            ref_gt: header.claim(&reconciled_column(sample, AlleleSlot::Ref, Field::Genotype))?,
            alt_gt: header.claim(&reconciled_column(sample, AlleleSlot::Alt, Field::Genotype))?,
            ref_depth: header.claim(&reconciled_column(sample, AlleleSlot::Ref, Field::Depth))?,
            alt_depth: header.claim(&reconciled_column(sample, AlleleSlot::Alt, Field::Depth))?,
        })
    }
}

/// Row-level cell access with error context.
struct RowCursor<'a> {
    table: &'a str,
    names: &'a [String],
    record: &'a csv::StringRecord,
    row: usize,
}

impl<'a> RowCursor<'a> {
    fn text(&self, idx: usize) -> &'a str {
        self.record.get(idx).map(str::trim).unwrap_or("")
    }

    fn parse<T: FromStr>(&self, idx: usize) -> Result<T, AseError> {
        let value = self.text(idx);
        value.parse::<T>().map_err(|_| AseError::InvalidValue {
            table: self.table.to_string(),
            row: self.row,
            column: self.names.get(idx).cloned().unwrap_or_default(),
            value: value.to_string(),
        })
    }

    fn site(&self, chrom: usize, pos: usize) -> Result<SiteKey, AseError> {
        Ok(SiteKey {
            chrom: self.text(chrom).to_string(),
            pos: self.parse(pos)?,
        })
    }

    fn annotations(&self, columns: &[usize]) -> Vec<String> {
        columns.iter().map(|&i| self.text(i).to_string()).collect()
    }

    fn raw_call(&self, cols: &SampleColumns) -> Result<AlleleCall, AseError> {
        Ok(AlleleCall {
            ref_gt: self.text(cols.ref_gt).to_string(),
            alt_gt: self.text(cols.alt_gt).to_string(),
            ref_depth: self.parse(cols.ref_depth)?,
            alt_depth: self.parse(cols.alt_depth)?,
        })
    }

    fn reconciled_call(&self, cols: &SampleColumns) -> Result<SampleCall, AseError> {
        let ref_gt = self.text(cols.ref_gt);
        let alt_gt = self.text(cols.alt_gt);
        match (ref_gt == ERROR_GENOTYPE, alt_gt == ERROR_GENOTYPE) {
            (true, true) => Ok(SampleCall::Unresolved),
            (false, false) => Ok(SampleCall::Resolved(ReconciledAllele {
                ref_gt: ref_gt.to_string(),
                ref_depth: self.parse(cols.ref_depth)?,
                alt_gt: alt_gt.to_string(),
                alt_depth: self.parse(cols.alt_depth)?,
            })),
            // The error marker is all-or-nothing
            (true, false) | (false, true) => Err(AseError::InvalidValue {
                table: self.table.to_string(),
                row: self.row,
                column: self.names.get(cols.alt_gt).cloned().unwrap_or_default(),
                value: format!("{}/{}", ref_gt, alt_gt),
            }),
        }
    }
}

fn open_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(false)
        .from_path(path)
        .with_context(|| format!("Failed to open table: {}", path.display()))
}

/// Read one pseudogenome's variant table.
///
/// Every roster sample must have its `<S>_R_<CODE>.GT`, `<S>_A_<CODE>.GT`,
/// `<S>_R_<CODE>.AD` and `<S>_A_<CODE>.AD` columns. Columns other than
/// CHROM, POS and sample fields are kept verbatim as annotations.
pub fn read_mapping_table(
    path: &Path,
    roster: &Roster,
    mapping: Mapping,
    delimiter: u8,
) -> Result<MappingTable> {
    let table = path.display().to_string();
    let code = roster.code(mapping);
    let mut rdr = open_reader(path, delimiter)?;
    let mut header = HeaderIndex::new(&table, rdr.headers()?);

    let chrom_idx = header.claim(CHROM)?;
    let pos_idx = header.claim(POS)?;
    let sample_cols = roster
        .samples()
        .iter()
        .map(|s| SampleColumns::raw(&mut header, s, code))
        .collect::<Result<Vec<_>, _>>()?;
    let (annotation_idx, annotation_headers) = header.annotations();

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse {} row {}", table, i + 1))?;
        let cursor = RowCursor {
            table: &table,
            names: &header.names,
            record: &record,
            row: i + 1,
        };
        let calls = sample_cols
            .iter()
            .map(|cols| cursor.raw_call(cols))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(MappingRow {
            site: cursor.site(chrom_idx, pos_idx)?,
            annotations: cursor.annotations(&annotation_idx),
            calls,
        });
    }

    Ok(MappingTable {
        code: code.to_string(),
        annotation_headers,
        rows,
    })
}

/// Read a merged-layout checkpoint (both mappings' raw sample columns).
pub fn read_merged_table(path: &Path, roster: &Roster) -> Result<MergedTable> {
    let table = path.display().to_string();
    let mut rdr = open_reader(path, b',')?;
    let mut header = HeaderIndex::new(&table, rdr.headers()?);

    let chrom_idx = header.claim(CHROM)?;
    let pos_idx = header.claim(POS)?;
    let mut sample_cols = [Vec::new(), Vec::new()];
    for mapping in [Mapping::First, Mapping::Second] {
        let code = roster.code(mapping);
        sample_cols[mapping.index()] = roster
            .samples()
            .iter()
            .map(|s| SampleColumns::raw(&mut header, s, code))
            .collect::<Result<Vec<_>, _>>()?;
    }
    let (annotation_idx, annotation_headers) = header.annotations();

    let mut sites = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse {} row {}", table, i + 1))?;
        let cursor = RowCursor {
            table: &table,
            names: &header.names,
            record: &record,
            row: i + 1,
        };
        let mut calls = [Vec::new(), Vec::new()];
        for (slot, cols) in calls.iter_mut().zip(sample_cols.iter()) {
            *slot = cols
                .iter()
                .map(|c| cursor.raw_call(c))
                .collect::<Result<Vec<_>, _>>()?;
        }
        let [first, second] = calls;
        sites.push(MergedSite {
            site: cursor.site(chrom_idx, pos_idx)?,
            annotations: cursor.annotations(&annotation_idx),
            first,
            second,
        });
    }

    Ok(MergedTable {
        annotation_headers,
        sites,
    })
}

/// Read a reconciled-layout checkpoint. Allele frequency columns, if any,
/// are derived values and are dropped rather than kept as annotations.
pub fn read_reconciled_table(path: &Path, roster: &Roster) -> Result<ReconciledTable> {
    let table = path.display().to_string();
    let mut rdr = open_reader(path, b',')?;
    let mut header = HeaderIndex::new(&table, rdr.headers()?);

    let chrom_idx = header.claim(CHROM)?;
    let pos_idx = header.claim(POS)?;
    let id_idx = header.claim(SNP_ID)?;
    let sample_cols = roster
        .samples()
        .iter()
        .map(|s| SampleColumns::reconciled(&mut header, s))
        .collect::<Result<Vec<_>, _>>()?;
    for sample in roster.samples() {
        header.claim_optional(&crate::config::frequency_column(sample));
    }
    let (annotation_idx, annotation_headers) = header.annotations();

    let mut sites = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse {} row {}", table, i + 1))?;
        let cursor = RowCursor {
            table: &table,
            names: &header.names,
            record: &record,
            row: i + 1,
        };
        let samples = sample_cols
            .iter()
            .map(|cols| cursor.reconciled_call(cols))
            .collect::<Result<Vec<_>, _>>()?;
        sites.push(ReconciledSite {
            site: cursor.site(chrom_idx, pos_idx)?,
            snp_id: cursor.parse(id_idx)?,
            annotations: cursor.annotations(&annotation_idx),
            samples,
        });
    }

    Ok(ReconciledTable {
        annotation_headers,
        sites,
    })
}

#[derive(Debug, Deserialize)]
struct StageReportRecord {
    stage: String,
    consumed: usize,
    retained: usize,
}

/// Read stage reports written by [`crate::output::write_run_summary`].
pub fn read_run_summary(path: &Path) -> Result<Vec<StageReport>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open stage reports: {}", path.display()))?;
    let mut reports = Vec::new();
    for (i, record) in rdr.deserialize::<StageReportRecord>().enumerate() {
        let record = record
            .with_context(|| format!("Failed to parse {} row {}", path.display(), i + 1))?;
        reports.push(StageReport::new(&record.stage, record.consumed, record.retained));
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn roster() -> Roster {
        Roster::new(vec!["1GF".into(), "2GF".into()], ["GF3".into(), "KF6".into()], None).unwrap()
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const FIRST: &str = "CHROM,POS,Gene.refGene,1GF_R_GF3.GT,1GF_A_GF3.GT,1GF_R_GF3.AD,1GF_A_GF3.AD,\
2GF_R_GF3.GT,2GF_A_GF3.GT,2GF_R_GF3.AD,2GF_A_GF3.AD,AF\n\
chr1,100,geneA,A,G,10,8,A,A,5,0,0.5\n\
chr2,250,geneB,C,T,3,4,T,C,6,2,0.25\n";

    #[test]
    fn test_read_mapping_table() {
        let file = write_temp(FIRST);
        let table = read_mapping_table(file.path(), &roster(), Mapping::First, b',').unwrap();
        assert_eq!(table.code, "GF3");
        assert_eq!(table.annotation_headers, vec!["Gene.refGene", "AF"]);
        assert_eq!(table.rows.len(), 2);

        let row = &table.rows[0];
        assert_eq!(row.site, SiteKey::new("chr1", 100));
        assert_eq!(row.annotations, vec!["geneA", "0.5"]);
        assert_eq!(row.calls[0], AlleleCall::new("A", "G", 10, 8));
        assert_eq!(row.calls[1], AlleleCall::new("A", "A", 5, 0));
        assert_eq!(table.rows[1].calls[1], AlleleCall::new("T", "C", 6, 2));
    }

    #[test]
    fn test_read_mapping_table_tab_delimited() {
        let file = write_temp(&FIRST.replace(',', "\t"));
        let table = read_mapping_table(file.path(), &roster(), Mapping::First, b'\t').unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].site, SiteKey::new("chr2", 250));
    }

    #[test]
    fn test_missing_sample_column_is_structural_error() {
        let file = write_temp(FIRST);
        // Reading with the second mapping's code finds none of its columns
        let err = read_mapping_table(file.path(), &roster(), Mapping::Second, b',').unwrap_err();
        match err.downcast_ref::<AseError>() {
            Some(AseError::MissingColumn { column, .. }) => assert_eq!(column, "1GF_R_KF6.GT"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_depth_reports_row_and_column() {
        let bad = FIRST.replace("chr1,100,geneA,A,G,10,8", "chr1,100,geneA,A,G,ten,8");
        let file = write_temp(&bad);
        let err = read_mapping_table(file.path(), &roster(), Mapping::First, b',').unwrap_err();
        match err.downcast_ref::<AseError>() {
            Some(AseError::InvalidValue { row, column, value, .. }) => {
                assert_eq!(*row, 1);
                assert_eq!(column, "1GF_R_GF3.AD");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_read_reconciled_table_with_error_marker() {
        let file = write_temp(
            "CHROM,POS,SNP_ID,Gene.refGene_GF3,1GF_R_.GT,1GF_A_.GT,1GF_R_.AD,1GF_A_.AD,\
2GF_R_.GT,2GF_A_.GT,2GF_R_.AD,2GF_A_.AD,AF_1GF\n\
chr1,100,4,geneA,A,G,11,8.5,error,error,NA,NA,0.56\n",
        );
        let table = read_reconciled_table(file.path(), &roster()).unwrap();
        assert_eq!(table.annotation_headers, vec!["Gene.refGene_GF3"]);
        let site = &table.sites[0];
        assert_eq!(site.snp_id, 4);
        assert_eq!(
            site.samples[0],
            SampleCall::Resolved(ReconciledAllele {
                ref_gt: "A".into(),
                ref_depth: 11.0,
                alt_gt: "G".into(),
                alt_depth: 8.5,
            })
        );
        assert_eq!(site.samples[1], SampleCall::Unresolved);
    }

    #[test]
    fn test_half_error_marker_is_rejected() {
        let file = write_temp(
            "CHROM,POS,SNP_ID,1GF_R_.GT,1GF_A_.GT,1GF_R_.AD,1GF_A_.AD,\
2GF_R_.GT,2GF_A_.GT,2GF_R_.AD,2GF_A_.AD\n\
chr1,100,0,A,G,11,8.5,error,G,NA,3\n",
        );
        assert!(read_reconciled_table(file.path(), &roster()).is_err());
    }

    #[test]
    fn test_read_run_summary() {
        let file = write_temp("stage,consumed,retained\nmerge,10,8\nmultiallelic,8,7\n");
        let reports = read_run_summary(file.path()).unwrap();
        assert_eq!(
            reports,
            vec![StageReport::new("merge", 10, 8), StageReport::new("multiallelic", 8, 7)]
        );
    }
}
