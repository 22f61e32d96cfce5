//! Genotype reconciliation and depth averaging across the two mappings.
//!
//! Each sample is handled on its own: the two pseudogenomes' (reference,
//! alternative) calls are matched against a fixed, ordered list of cases
//! and the read depths of the matched alleles are averaged over the two
//! mappings. Calls that fit no case become [`SampleCall::Unresolved`].

use crate::config::Roster;
use crate::types::{
    AlleleCall, HomozygousEntry, MergedSite, MergedTable, ReconciledAllele, ReconciledSite,
    ReconciledTable, SampleCall, UnresolvedCall,
};
use indicatif::ProgressBar;
use log::{info, warn};
use rayon::prelude::*;

/// How one sample's two allele pairs correspond.
///
/// The cases overlap, so they are tested in declaration order and the first
/// match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCase {
    /// Same homozygous call in both mappings
    BothHomozygous,
    /// Reference and alternative in the same slots
    Matched,
    /// Reference and alternative exchanged between mappings
    Swapped,
    /// First mapping homozygous; second carries the new allele in its alt slot
    FirstHomozygousAltInAlt,
    /// First mapping homozygous; second carries the new allele in its ref slot
    FirstHomozygousAltInRef,
    /// Second mapping homozygous for the first mapping's reference allele
    SecondHomozygousAltInAlt,
    /// Second mapping homozygous, tested against its alt slot. Shadowed by
    /// `SecondHomozygousAltInAlt`: with r2 == a2 both compare r1 to the same allele.
    SecondHomozygousAltInRef,
}

impl CallCase {
    pub const ALL: [CallCase; 7] = [
        CallCase::BothHomozygous,
        CallCase::Matched,
        CallCase::Swapped,
        CallCase::FirstHomozygousAltInAlt,
        CallCase::FirstHomozygousAltInRef,
        CallCase::SecondHomozygousAltInAlt,
        CallCase::SecondHomozygousAltInRef,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            CallCase::BothHomozygous => "both homozygous",
            CallCase::Matched => "matched orientation",
            CallCase::Swapped => "swapped orientation",
            CallCase::FirstHomozygousAltInAlt => "first homozygous, alt in alt slot",
            CallCase::FirstHomozygousAltInRef => "first homozygous, alt in ref slot",
            CallCase::SecondHomozygousAltInAlt => "second homozygous, alt in alt slot",
            CallCase::SecondHomozygousAltInRef => "second homozygous, alt in ref slot",
        }
    }
}

/// Match a sample's calls against the cases in priority order.
pub fn classify(first: &AlleleCall, second: &AlleleCall) -> Option<CallCase> {
    let (r1, a1) = (&first.ref_gt, &first.alt_gt);
    let (r2, a2) = (&second.ref_gt, &second.alt_gt);

    if r1 == a1 && r2 == a2 && r1 == r2 && a1 == a2 {
        Some(CallCase::BothHomozygous)
    } else if r1 == r2 && a1 == a2 {
        Some(CallCase::Matched)
    } else if r1 == a2 && a1 == r2 {
        Some(CallCase::Swapped)
    } else if r1 == a1 && r2 != a2 && r1 == r2 {
        Some(CallCase::FirstHomozygousAltInAlt)
    } else if r1 == a1 && r2 != a2 && r1 == a2 {
        Some(CallCase::FirstHomozygousAltInRef)
    } else if r1 != a1 && r2 == a2 && r1 == r2 {
        Some(CallCase::SecondHomozygousAltInAlt)
    } else if r1 != a1 && r2 == a2 && r1 == a2 {
        Some(CallCase::SecondHomozygousAltInRef)
    } else {
        None
    }
}

/// Average the depths for an already classified sample.
///
/// Every allele seen through both mappings is counted twice, so the sum
/// of its depths is halved. An allele only seen through one mapping keeps
/// its raw depth.
pub fn average_depths(case: CallCase, first: &AlleleCall, second: &AlleleCall) -> ReconciledAllele {
    let r1 = first.ref_depth as f64;
    let a1 = first.alt_depth as f64;
    let r2 = second.ref_depth as f64;
    let a2 = second.alt_depth as f64;

    let (ref_depth, alt_gt, alt_depth) = match case {
        CallCase::BothHomozygous => ((r1 + r2 + a1 + a2) / 2.0, &second.ref_gt, 0.0),
        CallCase::Matched => ((r1 + r2) / 2.0, &first.alt_gt, (a1 + a2) / 2.0),
        CallCase::Swapped => ((r1 + a2) / 2.0, &first.alt_gt, (a1 + r2) / 2.0),
        CallCase::FirstHomozygousAltInAlt => ((r1 + a1 + r2) / 2.0, &second.alt_gt, a2),
        CallCase::FirstHomozygousAltInRef => ((r1 + a1 + a2) / 2.0, &second.ref_gt, r2),
        CallCase::SecondHomozygousAltInAlt => (r1, &first.alt_gt, (a1 + r2 + a2) / 2.0),
        CallCase::SecondHomozygousAltInRef => (r1, &second.ref_gt, (a1 + r2 + a2) / 2.0),
    };

    ReconciledAllele {
        ref_gt: first.ref_gt.clone(),
        ref_depth,
        alt_gt: alt_gt.clone(),
        alt_depth,
    }
}

/// Classify and average one sample.
pub fn reconcile_call(first: &AlleleCall, second: &AlleleCall) -> Option<(CallCase, ReconciledAllele)> {
    classify(first, second).map(|case| (case, average_depths(case, first, second)))
}

/// Number of calls that landed in each case, plus the unresolved ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseCounts {
    counts: [usize; 7],
    pub unresolved: usize,
}

impl CaseCounts {
    pub fn get(&self, case: CallCase) -> usize {
        self.counts[case.index()]
    }

    fn add(&mut self, other: &CaseCounts) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            *mine += theirs;
        }
        self.unresolved += other.unresolved;
    }
}

/// Output of the reconciliation stage.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub table: ReconciledTable,
    pub homozygous: Vec<HomozygousEntry>,
    pub unresolved: Vec<UnresolvedCall>,
    pub counts: CaseCounts,
}

struct SiteOutcome {
    site: ReconciledSite,
    homozygous: Vec<HomozygousEntry>,
    unresolved: Vec<UnresolvedCall>,
    counts: CaseCounts,
}

fn reconcile_site(merged: MergedSite, snp_id: u64, roster: &Roster) -> SiteOutcome {
    let mut homozygous = Vec::new();
    let mut unresolved = Vec::new();
    let mut counts = CaseCounts::default();

    let samples = roster
        .samples()
        .iter()
        .zip(merged.first.iter().zip(merged.second.iter()))
        .map(|(sample, (first, second))| match reconcile_call(first, second) {
            Some((case, allele)) => {
                counts.counts[case.index()] += 1;
                if case == CallCase::BothHomozygous {
                    homozygous.push(HomozygousEntry {
                        site: merged.site.clone(),
                        snp_id,
                        sample: sample.clone(),
                    });
                }
                SampleCall::Resolved(allele)
            }
            None => {
                counts.unresolved += 1;
                unresolved.push(UnresolvedCall {
                    site: merged.site.clone(),
                    snp_id,
                    sample: sample.clone(),
                    first_ref: first.ref_gt.clone(),
                    first_alt: first.alt_gt.clone(),
                    second_ref: second.ref_gt.clone(),
                    second_alt: second.alt_gt.clone(),
                });
                SampleCall::Unresolved
            }
        })
        .collect();

    SiteOutcome {
        site: ReconciledSite {
            site: merged.site,
            snp_id,
            annotations: merged.annotations,
            samples,
        },
        homozygous,
        unresolved,
        counts,
    }
}

/// Reconcile every sample at every site.
///
/// Each site gets its `SNP_ID` here (its row index in the reconciled
/// table). Unresolved calls never abort the batch; they are returned for
/// review alongside the table.
pub fn reconcile_table(table: MergedTable, roster: &Roster, progress: Option<&ProgressBar>) -> Reconciliation {
    let outcomes: Vec<SiteOutcome> = table
        .sites
        .into_par_iter()
        .enumerate()
        .map(|(i, site)| {
            if let Some(pb) = progress {
                pb.inc(1);
            }
            reconcile_site(site, i as u64, roster)
        })
        .collect();

    let mut result = Reconciliation {
        table: ReconciledTable {
            annotation_headers: table.annotation_headers,
            sites: Vec::with_capacity(outcomes.len()),
        },
        ..Default::default()
    };
    for outcome in outcomes {
        result.table.sites.push(outcome.site);
        result.homozygous.extend(outcome.homozygous);
        result.unresolved.extend(outcome.unresolved);
        result.counts.add(&outcome.counts);
    }

    for case in CallCase::ALL {
        info!("  {}: {}", case.label(), result.counts.get(case));
    }
    info!("  unresolved: {}", result.counts.unresolved);
    for call in &result.unresolved {
        warn!(
            "Unresolved call at {} (SNP_ID {}) sample {}: first {}/{} second {}/{}",
            call.site,
            call.snp_id,
            call.sample,
            call.first_ref,
            call.first_alt,
            call.second_ref,
            call.second_alt
        );
    }

    result
}
