use crate::types::{ReconciledSite, ReconciledTable};
use log::{info, warn};

/// Counts from re-orienting samples to the anchor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrientationSummary {
    /// Sample calls whose REF/ALT slots were exchanged
    pub swapped: usize,
    /// Sites left untouched because the anchor itself was unresolved
    pub anchor_unresolved: usize,
}

/// Orient every sample at one site so its reference allele is the anchor's.
///
/// Returns the number of swapped samples, or `None` when the anchor has no
/// reconciled call here. The anchor itself is never modified.
pub fn orient_site(site: &mut ReconciledSite, anchor: usize) -> Option<usize> {
    let anchor_ref = site.samples.get(anchor)?.resolved()?.ref_gt.clone();

    let mut swapped = 0;
    for (i, call) in site.samples.iter_mut().enumerate() {
        if i == anchor {
            continue;
        }
        if let Some(allele) = call.resolved_mut() {
            if allele.ref_gt != anchor_ref {
                allele.swap_alleles();
                swapped += 1;
            }
        }
    }
    Some(swapped)
}

/// Assign reference and alternative alleles uniformly across samples,
/// following the anchor sample's orientation at each site.
pub fn orient_to_anchor(table: &mut ReconciledTable, anchor: usize, anchor_name: &str) -> OrientationSummary {
    let mut summary = OrientationSummary::default();
    for site in table.sites.iter_mut() {
        match orient_site(site, anchor) {
            Some(n) => summary.swapped += n,
            None => summary.anchor_unresolved += 1,
        }
    }

    info!(
        "Oriented samples to anchor {}: {} calls swapped",
        anchor_name, summary.swapped
    );
    if summary.anchor_unresolved > 0 {
        warn!(
            "Anchor {} is unresolved at {} sites; those sites were left as reconciled",
            anchor_name, summary.anchor_unresolved
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ReconciledAllele, SampleCall, SiteKey};

    fn resolved(ref_gt: &str, ref_depth: f64, alt_gt: &str, alt_depth: f64) -> SampleCall {
        SampleCall::Resolved(ReconciledAllele {
            ref_gt: ref_gt.into(),
            ref_depth,
            alt_gt: alt_gt.into(),
            alt_depth,
        })
    }

    fn site(samples: Vec<SampleCall>) -> ReconciledSite {
        ReconciledSite {
            site: SiteKey::new("chr1", 42),
            snp_id: 0,
            annotations: vec![],
            samples,
        }
    }

    #[test]
    fn test_swaps_disagreeing_samples() {
        let mut s = site(vec![
            resolved("A", 10.0, "G", 5.0),
            resolved("G", 3.0, "A", 7.5),
            resolved("A", 4.0, "G", 4.0),
        ]);
        assert_eq!(orient_site(&mut s, 0), Some(1));
        assert_eq!(s.samples[1], resolved("A", 7.5, "G", 3.0));
        assert_eq!(s.samples[2], resolved("A", 4.0, "G", 4.0));
    }

    #[test]
    fn test_anchor_other_than_first() {
        let mut s = site(vec![resolved("A", 1.0, "G", 2.0), resolved("G", 6.0, "A", 9.0)]);
        assert_eq!(orient_site(&mut s, 1), Some(1));
        assert_eq!(s.samples[0], resolved("G", 2.0, "A", 1.0));
        assert_eq!(s.samples[1], resolved("G", 6.0, "A", 9.0));
    }

    #[test]
    fn test_homozygous_call_for_other_allele_still_swaps() {
        // Both slots hold G; the reads move to the ALT slot
        let mut s = site(vec![resolved("A", 10.0, "G", 5.0), resolved("G", 8.0, "G", 0.0)]);
        assert_eq!(orient_site(&mut s, 0), Some(1));
        assert_eq!(s.samples[1], resolved("G", 0.0, "G", 8.0));
    }

    #[test]
    fn test_idempotent_on_aligned_table() {
        let mut table = ReconciledTable {
            annotation_headers: vec![],
            sites: vec![
                site(vec![resolved("A", 10.0, "G", 5.0), resolved("G", 3.0, "A", 7.5)]),
                site(vec![resolved("C", 1.0, "T", 1.0), resolved("T", 2.0, "C", 9.0)]),
            ],
        };
        orient_to_anchor(&mut table, 0, "1GF");
        let aligned = table.clone();

        let summary = orient_to_anchor(&mut table, 0, "1GF");
        assert_eq!(summary.swapped, 0);
        for (before, after) in aligned.sites.iter().zip(table.sites.iter()) {
            assert_eq!(before.samples, after.samples);
        }
    }

    #[test]
    fn test_unresolved_anchor_leaves_site_unchanged() {
        let mut s = site(vec![SampleCall::Unresolved, resolved("G", 3.0, "A", 7.5)]);
        let before = s.samples.clone();
        assert_eq!(orient_site(&mut s, 0), None);
        assert_eq!(s.samples, before);
    }

    #[test]
    fn test_unresolved_sample_is_skipped() {
        let mut s = site(vec![resolved("A", 1.0, "G", 1.0), SampleCall::Unresolved]);
        assert_eq!(orient_site(&mut s, 0), Some(0));
        assert_eq!(s.samples[1], SampleCall::Unresolved);
    }

    #[test]
    fn test_summary_counts() {
        let mut table = ReconciledTable {
            annotation_headers: vec![],
            sites: vec![
                site(vec![resolved("A", 1.0, "G", 1.0), resolved("G", 1.0, "A", 1.0)]),
                site(vec![SampleCall::Unresolved, resolved("G", 1.0, "A", 1.0)]),
            ],
        };
        let summary = orient_to_anchor(&mut table, 0, "1GF");
        assert_eq!(summary, OrientationSummary { swapped: 1, anchor_unresolved: 1 });
    }
}
