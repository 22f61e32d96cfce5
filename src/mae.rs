//! Monoallelic-expression cleanup.
//!
//! A site whose allele frequency is fixed at 0 or 1 may be truly
//! homozygous or monoallelically expressed; without genotypes the two are
//! indistinguishable, so such sites are removed.

use crate::config::TissuePair;
use crate::types::{ReconciledSite, ReconciledTable, SampleCall};
use log::info;

/// How fixed allele frequencies are judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaePolicy {
    /// Drop a site if any sample is fixed.
    PerSample,
    /// Drop a site if both tissues of any pair are fixed on the same allele.
    PerPair { pairs: Vec<TissuePair> },
}

impl MaePolicy {
    pub fn describe(&self) -> String {
        match self {
            MaePolicy::PerSample => "per-sample (any sample with AF 0 or 1)".to_string(),
            MaePolicy::PerPair { pairs } => {
                format!("per tissue pair (both tissues at AF 0, or both at AF 1; {} pairs)", pairs.len())
            }
        }
    }
}

/// AF is exactly 0 or 1. Unresolved calls have no AF and are never fixed.
pub fn is_fixed(call: &SampleCall) -> bool {
    call.allele_frequency()
        .map_or(false, |af| af == 0.0 || af == 1.0)
}

/// The AF of a fixed sample, `None` if it is not fixed.
fn fixed_frequency(site: &ReconciledSite, idx: usize) -> Option<f64> {
    let call = site.samples.get(idx)?;
    if is_fixed(call) {
        call.allele_frequency()
    } else {
        None
    }
}

/// Whether the policy flags this site as monoallelic.
pub fn is_monoallelic(site: &ReconciledSite, policy: &MaePolicy) -> bool {
    match policy {
        MaePolicy::PerSample => site.samples.iter().any(is_fixed),
        // Opposite fixation within one individual is two expressed alleles, not MAE
        MaePolicy::PerPair { pairs } => pairs.iter().any(|pair| {
            match (fixed_frequency(site, pair.first), fixed_frequency(site, pair.second)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }),
    }
}

/// Remove monoallelic sites.
pub fn clean_mae(table: ReconciledTable, policy: &MaePolicy) -> ReconciledTable {
    info!("MAE cleaner policy: {}", policy.describe());
    let sites = table
        .sites
        .into_iter()
        .filter(|site| !is_monoallelic(site, policy))
        .collect();
    ReconciledTable {
        annotation_headers: table.annotation_headers,
        sites,
    }
}
