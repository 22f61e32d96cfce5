use crate::config::ExperimentalGroup;
use crate::types::ReconciledSite;

/// Calculate the reference allele frequency
/// AF = REF / (REF + ALT)
///
/// Returns 0 when there are no reads at all, so a site with no coverage
/// looks fixed rather than undefined.
pub fn allele_frequency(ref_depth: f64, alt_depth: f64) -> f64 {
    let total = ref_depth + alt_depth;
    if total == 0.0 {
        0.0
    } else {
        ref_depth / total
    }
}

/// Pooled reference allele frequency over a set of samples at one site.
///
/// Depths are summed before dividing (QC grouping of replicates). Samples
/// without a reconciled call contribute nothing.
pub fn pooled_allele_frequency(site: &ReconciledSite, members: &[usize]) -> f64 {
    let (ref_sum, alt_sum) = members
        .iter()
        .filter_map(|&i| site.samples.get(i).and_then(|call| call.resolved()))
        .fold((0.0, 0.0), |(r, a), allele| {
            (r + allele.ref_depth, a + allele.alt_depth)
        });
    allele_frequency(ref_sum, alt_sum)
}

/// Per-group allele frequencies at one site, in group order.
pub fn group_allele_frequencies(site: &ReconciledSite, groups: &[ExperimentalGroup]) -> Vec<f64> {
    groups
        .iter()
        .map(|g| pooled_allele_frequency(site, &g.members))
        .collect()
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
