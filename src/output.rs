use crate::config::{frequency_column, raw_column, reconciled_column, AlleleSlot, ExperimentalGroup, Field, Roster};
use crate::csv_reader::{CHROM, ERROR_GENOTYPE, MISSING_DEPTH, POS, SNP_ID};
use crate::statistics;
use crate::types::{
    AlleleCall, HomozygousEntry, Mapping, MergedTable, ReconciledTable, SampleCall, StageReport,
    UnresolvedCall,
};
use anyhow::{Context, Result};
use csv::Writer;
use std::path::Path;

fn create_writer(path: &Path) -> Result<Writer<std::fs::File>> {
    Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))
}

/// Depths are written in shortest round-trip form so checkpoints reload exactly.
fn format_depth(depth: f64) -> String {
    format!("{}", depth)
}

fn push_raw_call(fields: &mut Vec<String>, call: &AlleleCall) {
    fields.push(call.ref_gt.clone());
    fields.push(call.alt_gt.clone());
    fields.push(call.ref_depth.to_string());
    fields.push(call.alt_depth.to_string());
}

fn push_sample_call(fields: &mut Vec<String>, call: &SampleCall) {
    match call {
        SampleCall::Resolved(allele) => {
            fields.push(allele.ref_gt.clone());
            fields.push(allele.alt_gt.clone());
            fields.push(format_depth(allele.ref_depth));
            fields.push(format_depth(allele.alt_depth));
        }
        SampleCall::Unresolved => {
            fields.push(ERROR_GENOTYPE.to_string());
            fields.push(ERROR_GENOTYPE.to_string());
            fields.push(MISSING_DEPTH.to_string());
            fields.push(MISSING_DEPTH.to_string());
        }
    }
}

/// Write a merged table in the raw per-mapping column layout.
pub fn write_merged_table(table: &MergedTable, roster: &Roster, path: &Path) -> Result<()> {
    let mut wtr = create_writer(path)?;

    let mut header = vec![CHROM.to_string(), POS.to_string()];
    header.extend(table.annotation_headers.iter().cloned());
    for mapping in [Mapping::First, Mapping::Second] {
        let code = roster.code(mapping);
        for sample in roster.samples() {
            header.push(raw_column(sample, AlleleSlot::Ref, code, Field::Genotype));
            header.push(raw_column(sample, AlleleSlot::Alt, code, Field::Genotype));
            header.push(raw_column(sample, AlleleSlot::Ref, code, Field::Depth));
            header.push(raw_column(sample, AlleleSlot::Alt, code, Field::Depth));
        }
    }
    wtr.write_record(&header)?;

    for site in &table.sites {
        let mut fields = vec![site.site.chrom.clone(), site.site.pos.to_string()];
        fields.extend(site.annotations.iter().cloned());
        for call in site.first.iter().chain(site.second.iter()) {
            push_raw_call(&mut fields, call);
        }
        wtr.write_record(&fields)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write a reconciled table: CHROM, POS, SNP_ID, annotations, four columns
/// per sample and, when requested, one `AF_<sample>` column per sample.
pub fn write_reconciled_table(
    table: &ReconciledTable,
    roster: &Roster,
    path: &Path,
    with_frequencies: bool,
) -> Result<()> {
    let mut wtr = create_writer(path)?;

    let mut header = vec![CHROM.to_string(), POS.to_string(), SNP_ID.to_string()];
    header.extend(table.annotation_headers.iter().cloned());
    for sample in roster.samples() {
        header.push(reconciled_column(sample, AlleleSlot::Ref, Field::Genotype));
        header.push(reconciled_column(sample, AlleleSlot::Alt, Field::Genotype));
        header.push(reconciled_column(sample, AlleleSlot::Ref, Field::Depth));
        header.push(reconciled_column(sample, AlleleSlot::Alt, Field::Depth));
    }
    if with_frequencies {
        header.extend(roster.samples().iter().map(|s| frequency_column(s)));
    }
    wtr.write_record(&header)?;

    for site in &table.sites {
        let mut fields = vec![
            site.site.chrom.clone(),
            site.site.pos.to_string(),
            site.snp_id.to_string(),
        ];
        fields.extend(site.annotations.iter().cloned());
        for call in &site.samples {
            push_sample_call(&mut fields, call);
        }
        if with_frequencies {
            for call in &site.samples {
                fields.push(match call.allele_frequency() {
                    Some(af) => format!("{:.6}", af),
                    None => MISSING_DEPTH.to_string(),
                });
            }
        }
        wtr.write_record(&fields)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_homozygous_log(entries: &[HomozygousEntry], path: &Path) -> Result<()> {
    let mut wtr = create_writer(path)?;
    wtr.write_record([CHROM, POS, SNP_ID, "sample"])?;
    for entry in entries {
        wtr.write_record(&[
            &entry.site.chrom,
            &entry.site.pos.to_string(),
            &entry.snp_id.to_string(),
            &entry.sample,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_unresolved_calls(calls: &[UnresolvedCall], roster: &Roster, path: &Path) -> Result<()> {
    let mut wtr = create_writer(path)?;
    let first = roster.code(Mapping::First);
    let second = roster.code(Mapping::Second);
    wtr.write_record(&[
        CHROM.to_string(),
        POS.to_string(),
        SNP_ID.to_string(),
        "sample".to_string(),
        format!("ref_{}", first),
        format!("alt_{}", first),
        format!("ref_{}", second),
        format!("alt_{}", second),
    ])?;
    for call in calls {
        wtr.write_record(&[
            &call.site.chrom,
            &call.site.pos.to_string(),
            &call.snp_id.to_string(),
            &call.sample,
            &call.first_ref,
            &call.first_alt,
            &call.second_ref,
            &call.second_alt,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write pooled allele frequencies per experimental group, plus `AF_all`
/// over the whole roster. Returns the mean `AF_all` across sites.
pub fn write_group_frequencies(
    table: &ReconciledTable,
    groups: &[ExperimentalGroup],
    roster: &Roster,
    path: &Path,
) -> Result<f64> {
    let mut wtr = create_writer(path)?;
    let everyone: Vec<usize> = (0..roster.len()).collect();

    let mut header = vec![
        CHROM.to_string(),
        POS.to_string(),
        SNP_ID.to_string(),
        frequency_column("all"),
    ];
    header.extend(groups.iter().map(|g| frequency_column(&g.name)));
    wtr.write_record(&header)?;

    let mut overall = Vec::with_capacity(table.sites.len());
    for site in &table.sites {
        let af_all = statistics::pooled_allele_frequency(site, &everyone);
        overall.push(af_all);

        let mut fields = vec![
            site.site.chrom.clone(),
            site.site.pos.to_string(),
            site.snp_id.to_string(),
            format!("{:.6}", af_all),
        ];
        fields.extend(
            statistics::group_allele_frequencies(site, groups)
                .into_iter()
                .map(|af| format!("{:.6}", af)),
        );
        wtr.write_record(&fields)?;
    }

    wtr.flush()?;
    Ok(statistics::mean(&overall))
}

pub fn write_run_summary(reports: &[StageReport], path: &Path) -> Result<()> {
    let mut wtr = create_writer(path)?;
    wtr.write_record(["stage", "consumed", "retained"])?;
    for report in reports {
        wtr.write_record(&[
            &report.stage,
            &report.consumed.to_string(),
            &report.retained.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
