//! Multiple testing correction for the candidate-term family of one
//! enrichment call.

use std::cmp::Ordering;

use crate::EnrichError;

fn validate(p_values: &[f64]) -> Result<(), EnrichError> {
    if p_values.is_empty() {
        return Err(EnrichError::EmptyPValues);
    }
    for (index, &value) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&value) {
            return Err(EnrichError::InvalidPValue { index, value });
        }
    }
    Ok(())
}

/// Apply Benjamini-Hochberg correction for controlling the false discovery
/// rate.
///
/// The BH procedure controls the expected proportion of false positives
/// among all rejected null hypotheses. Adjusted values are returned in the
/// input order and are monotonically non-decreasing in the sort order of the
/// raw p-values.
///
/// # Errors
///
/// [`EnrichError::EmptyPValues`] on an empty slice,
/// [`EnrichError::InvalidPValue`] when any value falls outside `[0, 1]`.
pub fn benjamini_hochberg(p_values: &[f64]) -> Result<Vec<f64>, EnrichError> {
    validate(p_values)?;
    let n = p_values.len();

    let mut indexed: Vec<(usize, f64)> = p_values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    // Walk from the largest p-value down, carrying the running minimum so the
    // adjusted values stay monotone.
    let mut adjusted = vec![0.0; n];
    let mut current_min = 1.0f64;
    for rank in (1..=n).rev() {
        let (orig_idx, p) = indexed[rank - 1];
        let adjustment = (p * n as f64 / rank as f64).min(1.0);
        current_min = adjustment.min(current_min);
        adjusted[orig_idx] = current_min;
    }

    Ok(adjusted)
}

/// Apply Bonferroni correction, the conservative family-wise alternative.
///
/// Each p-value is multiplied by the number of tests and capped at 1.
///
/// # Errors
///
/// Same conditions as [`benjamini_hochberg`].
pub fn bonferroni(p_values: &[f64]) -> Result<Vec<f64>, EnrichError> {
    validate(p_values)?;
    let n = p_values.len() as f64;
    Ok(p_values.iter().map(|&p| (p * n).min(1.0)).collect())
}
