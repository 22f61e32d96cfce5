use crate::config::Roster;
use crate::types::{AlleleCall, MergedTable};
use log::{info, warn};
use rayon::prelude::*;

/// Check whether one sample's two allele pairs imply more than two alleles.
///
/// True when the first mapping's reference allele appears in neither slot of
/// the second mapping, or the same holds for its alternative allele.
pub fn is_multiallelic(first: &AlleleCall, second: &AlleleCall) -> bool {
    let ref_unseen = first.ref_gt != second.ref_gt && first.ref_gt != second.alt_gt;
    let alt_unseen = first.alt_gt != second.ref_gt && first.alt_gt != second.alt_gt;
    ref_unseen || alt_unseen
}

/// Per-sample diagnostics from the multiallelic filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiallelicSummary {
    /// Sites flagged by each roster sample (a site may be counted by several)
    pub flagged_per_sample: Vec<usize>,
    /// Distinct sites removed
    pub dropped: usize,
}

/// Remove every site that is multiallelic for at least one sample.
pub fn filter_multiallelic(table: MergedTable, roster: &Roster) -> (MergedTable, MultiallelicSummary) {
    let flags: Vec<Vec<bool>> = table
        .sites
        .par_iter()
        .map(|site| {
            site.first
                .iter()
                .zip(site.second.iter())
                .map(|(a, b)| is_multiallelic(a, b))
                .collect()
        })
        .collect();

    let mut flagged_per_sample = vec![0usize; roster.len()];
    for site_flags in &flags {
        for (count, &flag) in flagged_per_sample.iter_mut().zip(site_flags) {
            if flag {
                *count += 1;
            }
        }
    }

    let consumed = table.sites.len();
    let sites: Vec<_> = table
        .sites
        .into_iter()
        .zip(flags)
        .filter(|(_, site_flags)| !site_flags.iter().any(|&f| f))
        .map(|(site, _)| site)
        .collect();
    let dropped = consumed - sites.len();

    for (sample, &count) in roster.samples().iter().zip(&flagged_per_sample) {
        info!("Multiallelic sites flagged by sample {}: {}", sample, count);
    }
    if consumed > 0 && dropped == consumed {
        warn!("Multiallelic filter removed every site; check the mapping codes and sample roster");
    }

    (
        MergedTable {
            annotation_headers: table.annotation_headers,
            sites,
        },
        MultiallelicSummary {
            flagged_per_sample,
            dropped,
        },
    )
}
