use crate::statistics;
use std::fmt;

/// Genomic coordinate of a called site (1-based position, as reported by the caller)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    pub chrom: String,
    pub pos: u64,
}

impl SiteKey {
    pub fn new(chrom: impl Into<String>, pos: u64) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
        }
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chrom, self.pos)
    }
}

/// Which of the two pseudogenome mappings a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    First,
    Second,
}

impl Mapping {
    pub fn index(self) -> usize {
        match self {
            Mapping::First => 0,
            Mapping::Second => 1,
        }
    }
}

/// Raw calls for one sample against one pseudogenome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlleleCall {
    pub ref_gt: String,
    pub alt_gt: String,
    pub ref_depth: u32,
    pub alt_depth: u32,
}

impl AlleleCall {
    pub fn new(ref_gt: &str, alt_gt: &str, ref_depth: u32, alt_depth: u32) -> Self {
        Self {
            ref_gt: ref_gt.to_string(),
            alt_gt: alt_gt.to_string(),
            ref_depth,
            alt_depth,
        }
    }

    pub fn is_homozygous(&self) -> bool {
        self.ref_gt == self.alt_gt
    }
}

/// One row of a per-mapping variant table. `calls` is indexed by roster position.
#[derive(Debug, Clone)]
pub struct MappingRow {
    pub site: SiteKey,
    pub annotations: Vec<String>,
    pub calls: Vec<AlleleCall>,
}

/// A variant table called against a single pseudogenome
#[derive(Debug, Clone)]
pub struct MappingTable {
    pub code: String,
    pub annotation_headers: Vec<String>,
    pub rows: Vec<MappingRow>,
}

/// A site callable against both pseudogenomes.
#[derive(Debug, Clone)]
pub struct MergedSite {
    pub site: SiteKey,
    pub annotations: Vec<String>,
    pub first: Vec<AlleleCall>,
    pub second: Vec<AlleleCall>,
}

#[derive(Debug, Clone, Default)]
pub struct MergedTable {
    pub annotation_headers: Vec<String>,
    pub sites: Vec<MergedSite>,
}

/// Averaged allele counts for one sample at one site.
///
/// Depths are real numbers: averaging two or three read counts over two
/// mappings produces halves, which are carried through unrounded.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledAllele {
    pub ref_gt: String,
    pub ref_depth: f64,
    pub alt_gt: String,
    pub alt_depth: f64,
}

impl ReconciledAllele {
    pub fn total_depth(&self) -> f64 {
        self.ref_depth + self.alt_depth
    }

    pub fn allele_frequency(&self) -> f64 {
        statistics::allele_frequency(self.ref_depth, self.alt_depth)
    }

    /// Exchange the reference and alternative slots (genotype and depth together).
    pub fn swap_alleles(&mut self) {
        std::mem::swap(&mut self.ref_gt, &mut self.alt_gt);
        std::mem::swap(&mut self.ref_depth, &mut self.alt_depth);
    }
}

/// Outcome of reconciling one sample at one site.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleCall {
    Resolved(ReconciledAllele),
    /// The two mappings' calls fit none of the biallelic cases. Carries no
    /// numbers so nothing downstream can average it by accident.
    Unresolved,
}

impl SampleCall {
    pub fn resolved(&self) -> Option<&ReconciledAllele> {
        match self {
            SampleCall::Resolved(allele) => Some(allele),
            SampleCall::Unresolved => None,
        }
    }

    pub fn resolved_mut(&mut self) -> Option<&mut ReconciledAllele> {
        match self {
            SampleCall::Resolved(allele) => Some(allele),
            SampleCall::Unresolved => None,
        }
    }

    pub fn total_depth(&self) -> Option<f64> {
        self.resolved().map(ReconciledAllele::total_depth)
    }

    pub fn allele_frequency(&self) -> Option<f64> {
        self.resolved().map(ReconciledAllele::allele_frequency)
    }
}

/// A site after reconciliation; `samples` is indexed by roster position.
#[derive(Debug, Clone)]
pub struct ReconciledSite {
    pub site: SiteKey,
    pub snp_id: u64,
    pub annotations: Vec<String>,
    pub samples: Vec<SampleCall>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciledTable {
    pub annotation_headers: Vec<String>,
    pub sites: Vec<ReconciledSite>,
}

/// A sample called homozygous for the same allele in both mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomozygousEntry {
    pub site: SiteKey,
    pub snp_id: u64,
    pub sample: String,
}

/// A (site, sample) pair that fit none of the reconciliation cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedCall {
    pub site: SiteKey,
    pub snp_id: u64,
    pub sample: String,
    pub first_ref: String,
    pub first_alt: String,
    pub second_ref: String,
    pub second_alt: String,
}

/// Sites consumed and retained by one pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: String,
    pub consumed: usize,
    pub retained: usize,
}

impl StageReport {
    pub fn new(stage: &str, consumed: usize, retained: usize) -> Self {
        Self {
            stage: stage.to_string(),
            consumed,
            retained,
        }
    }

    pub fn dropped(&self) -> usize {
        self.consumed.saturating_sub(self.retained)
    }
}
