use crate::config::{Roster, TissuePair};
use crate::types::{ReconciledSite, ReconciledTable, SampleCall};
use log::{debug, info};

/// Default minimum reconciled depth (REF + ALT) per sample.
pub const DEFAULT_MIN_DEPTH: f64 = 10.0;

/// Which samples must clear the depth threshold for a site to be kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepthPolicy {
    /// Every listed sample (roster indices) must reach the threshold.
    AllSamples { required: Vec<usize> },
    /// For every tissue pair, at least one of the two must reach it.
    PerPair { pairs: Vec<TissuePair> },
}

impl DepthPolicy {
    /// Require the whole roster.
    pub fn all_samples(roster: &Roster) -> Self {
        DepthPolicy::AllSamples {
            required: (0..roster.len()).collect(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DepthPolicy::AllSamples { required } => {
                format!("all samples ({} required)", required.len())
            }
            DepthPolicy::PerPair { pairs } => format!("any sample per tissue pair ({} pairs)", pairs.len()),
        }
    }
}

/// Unresolved calls carry no depth and never clear the threshold.
fn clears(call: &SampleCall, min_depth: f64) -> bool {
    call.total_depth().map_or(false, |total| total >= min_depth)
}

fn sample_clears(site: &ReconciledSite, idx: usize, min_depth: f64) -> bool {
    site.samples.get(idx).map_or(false, |call| clears(call, min_depth))
}

/// Check one site against the policy.
pub fn passes_depth(site: &ReconciledSite, policy: &DepthPolicy, min_depth: f64) -> bool {
    match policy {
        DepthPolicy::AllSamples { required } => {
            required.iter().all(|&i| sample_clears(site, i, min_depth))
        }
        DepthPolicy::PerPair { pairs } => pairs.iter().all(|pair| {
            sample_clears(site, pair.first, min_depth) || sample_clears(site, pair.second, min_depth)
        }),
    }
}

/// Drop sites with too few reconciled reads.
pub fn filter_depth(
    table: ReconciledTable,
    policy: &DepthPolicy,
    min_depth: f64,
    roster: &Roster,
) -> ReconciledTable {
    info!("Depth filter: min depth {} using {}", min_depth, policy.describe());

    for (i, sample) in roster.samples().iter().enumerate() {
        let below = table
            .sites
            .iter()
            .filter(|site| !sample_clears(site, i, min_depth))
            .count();
        debug!("  sample {}: {} sites below depth {}", sample, below, min_depth);
    }

    let sites = table
        .sites
        .into_iter()
        .filter(|site| passes_depth(site, policy, min_depth))
        .collect();

    ReconciledTable {
        annotation_headers: table.annotation_headers,
        sites,
    }
}
