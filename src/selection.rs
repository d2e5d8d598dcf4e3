//! Significance filtering, ranking, and truncation of enrichment results.

use std::cmp::Ordering;

use crate::enrichment::EnrichmentResult;

/// Default significance level applied to corrected p-values.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Terms supported by a single study gene are treated as noise.
const MIN_SUPPORTING_GENES: usize = 2;

/// Every report is capped at this many terms, independent of input size.
const MAX_REPORTED_TERMS: usize = 10;

/// Filters, ranks, and truncates one cluster's raw enrichment results.
///
/// Keeps terms with `p_corrected < alpha` and more than one supporting study
/// gene, sorts ascending by `p_corrected` with ascending `term_id` breaking
/// ties, and truncates to the top ten.
pub fn select(results: Vec<EnrichmentResult>, alpha: f64) -> Vec<EnrichmentResult> {
    let mut kept: Vec<EnrichmentResult> = results
        .into_iter()
        .filter(|r| r.p_corrected < alpha && r.genes_in_study >= MIN_SUPPORTING_GENES)
        .collect();
    kept.sort_by(|a, b| {
        a.p_corrected
            .partial_cmp(&b.p_corrected)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.term_id.cmp(&b.term_id))
    });
    kept.truncate(MAX_REPORTED_TERMS);
    kept
}
