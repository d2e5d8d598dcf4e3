//! The statistical enrichment engine.
//!
//! One call evaluates one cluster: symbols are mapped to identifiers (misses
//! dropped and counted), every candidate term of every namespace gets a
//! one-sided hypergeometric over-representation p-value against the
//! background universe, and Benjamini-Hochberg correction is applied across
//! the call's combined candidate set. The engine returns every tested term;
//! significance filtering and ranking live in [`crate::selection`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use statrs::distribution::{DiscreteCDF, Hypergeometric};
use tracing::{debug, info, warn};

use crate::annotation::{AnnotationSource, BackgroundUniverse, CandidateTerm, Namespace};
use crate::mapper::{GeneId, SymbolMapper};
use crate::EnrichError;

pub mod correction;

pub use correction::{benjamini_hochberg, bonferroni};

/// One tested term of one cluster's enrichment call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub term_id: String,
    pub name: String,
    pub namespace: Namespace,
    /// Raw hypergeometric p-value.
    pub p_raw: f64,
    /// Benjamini-Hochberg adjusted p-value.
    pub p_corrected: f64,
    /// Study-set genes annotated with the term.
    pub genes_in_study: usize,
    /// Size of the mapped study set the term was tested against.
    pub study_size: usize,
    /// Background-universe genes annotated with the term.
    pub background_count: usize,
    /// Symbols of the annotated study genes, in study order.
    pub contributing_genes: Vec<String>,
}

/// Maps `symbols` through the reference mapper, dropping misses, duplicates,
/// and identifiers outside the universe. Returns the study set in first
/// occurrence order.
fn map_study_set(
    cluster_id: &str,
    symbols: &[String],
    mapper: &SymbolMapper,
    universe: &BackgroundUniverse,
) -> Vec<GeneId> {
    let mut seen: HashSet<GeneId> = HashSet::new();
    let mut study = Vec::new();
    let mut misses = 0usize;
    let mut outside = 0usize;

    for symbol in symbols {
        match mapper.to_identifier(symbol) {
            Ok(id) => {
                if !seen.insert(id.clone()) {
                    continue;
                }
                if universe.contains(id) {
                    study.push(id.clone());
                } else {
                    outside += 1;
                    warn!(cluster = cluster_id, %id, "mapped identifier not in background universe");
                }
            }
            Err(miss) => {
                misses += 1;
                debug!(cluster = cluster_id, symbol = %miss.symbol, "unmapped symbol dropped");
            }
        }
    }

    info!(
        cluster = cluster_id,
        input_genes = symbols.len(),
        mapped_genes = study.len(),
        unmapped = misses,
        outside_universe = outside,
        "mapped study set"
    );
    study
}

/// Probability of observing at least `genes_in_study` annotated genes in a
/// study of `study_size` draws from a universe of `universe_size` genes of
/// which `background_count` carry the term.
fn hypergeometric_pvalue(
    universe_size: u64,
    background_count: u64,
    study_size: u64,
    genes_in_study: u64,
) -> f64 {
    if genes_in_study == 0 {
        return 1.0;
    }
    let Ok(hyper) = Hypergeometric::new(universe_size, background_count, study_size) else {
        // Unreachable for candidates built against the same universe, but a
        // malformed remote answer should degrade to "not enriched", not panic.
        return 1.0;
    };
    // sf(k) is "more than k"; subtract one to include the observed count.
    hyper.sf(genes_in_study - 1)
}

/// Runs the full enrichment evaluation for one cluster's gene symbols.
///
/// Returns one [`EnrichmentResult`] per candidate term across all three
/// namespaces, unfiltered and in the annotation source's candidate order. An
/// empty mapped study set is a valid degenerate input and yields an empty
/// result without touching the statistics.
///
/// # Errors
///
/// Propagates [`EnrichError::DependencyUnavailable`] from the annotation
/// source and correction-input errors from [`benjamini_hochberg`].
pub fn run_study(
    cluster_id: &str,
    symbols: &[String],
    mapper: &SymbolMapper,
    universe: &BackgroundUniverse,
    source: &dyn AnnotationSource,
) -> Result<Vec<EnrichmentResult>, EnrichError> {
    let study = map_study_set(cluster_id, symbols, mapper, universe);
    if study.is_empty() {
        debug!(cluster = cluster_id, "empty mapped study set, skipping enrichment");
        return Ok(Vec::new());
    }

    // One combined candidate family per call: namespaces are queried
    // independently, folded into a single set, corrected together.
    let candidates = Namespace::ALL.iter().try_fold(
        Vec::new(),
        |mut acc, &namespace| -> Result<Vec<CandidateTerm>, EnrichError> {
            acc.extend(source.candidate_terms(namespace, &study, universe)?);
            Ok(acc)
        },
    )?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let p_raw: Vec<f64> = candidates
        .iter()
        .map(|candidate| {
            hypergeometric_pvalue(
                universe.len() as u64,
                candidate.background_count as u64,
                study.len() as u64,
                candidate.genes_in_study.len() as u64,
            )
        })
        .collect();
    let p_corrected = benjamini_hochberg(&p_raw)?;

    let results = candidates
        .into_iter()
        .zip(p_raw)
        .zip(p_corrected)
        .map(|((candidate, p_raw), p_corrected)| {
            let contributing_genes = candidate
                .genes_in_study
                .iter()
                .filter_map(|id| mapper.to_symbol(id))
                .map(str::to_string)
                .collect();
            EnrichmentResult {
                term_id: candidate.term.id,
                name: candidate.term.name,
                namespace: candidate.term.namespace,
                p_raw,
                p_corrected,
                genes_in_study: candidate.genes_in_study.len(),
                study_size: study.len(),
                background_count: candidate.background_count,
                contributing_genes,
            }
        })
        .collect();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationTerm, LocalAnnotationIndex};
    use approx::assert_relative_eq;

    fn id(s: &str) -> GeneId {
        GeneId::from(s)
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Ten-gene universe; "GO:0001" annotates five of them.
    fn fixture() -> (SymbolMapper, BackgroundUniverse, LocalAnnotationIndex) {
        let mapper = SymbolMapper::from_records(
            (1..=10).map(|i| (format!("g{i}"), GeneId::new(i.to_string()))),
        );
        let universe = BackgroundUniverse::from_ids((1..=10).map(|i| GeneId::new(i.to_string())));
        let mut index = LocalAnnotationIndex::new();
        index.insert(
            AnnotationTerm::new("GO:0001", "synapse assembly", Namespace::BiologicalProcess),
            (1..=5).map(|i| GeneId::new(i.to_string())),
        );
        (mapper, universe, index)
    }

    #[test]
    fn hypergeometric_matches_hand_computation() {
        let (mapper, universe, index) = fixture();
        // Three study genes, all annotated: P(X >= 3) with N=10, K=5, n=3
        // is C(5,3)/C(10,3) = 10/120.
        let results =
            run_study("A", &symbols(&["g1", "g2", "g3"]), &mapper, &universe, &index).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_relative_eq!(r.p_raw, 10.0 / 120.0, epsilon = 1e-12);
        assert_relative_eq!(r.p_corrected, r.p_raw, epsilon = 1e-12);
        assert_eq!(r.genes_in_study, 3);
        assert_eq!(r.study_size, 3);
        assert_eq!(r.background_count, 5);
        assert_eq!(r.contributing_genes, symbols(&["g1", "g2", "g3"]));
    }

    #[test]
    fn unmapped_symbols_are_dropped_not_fatal() {
        let (mapper, universe, index) = fixture();
        let results = run_study(
            "A",
            &symbols(&["g1", "Notagene", "g2", "g3"]),
            &mapper,
            &universe,
            &index,
        )
        .unwrap();
        assert_eq!(results[0].study_size, 3);
    }

    #[test]
    fn duplicate_symbols_count_once() {
        let (mapper, universe, index) = fixture();
        let results = run_study(
            "A",
            &symbols(&["g1", "g1", "g2", "g3", "g2"]),
            &mapper,
            &universe,
            &index,
        )
        .unwrap();
        assert_eq!(results[0].study_size, 3);
        assert_eq!(results[0].contributing_genes, symbols(&["g1", "g2", "g3"]));
    }

    #[test]
    fn zero_mapped_genes_yield_empty_results() {
        let (mapper, universe, index) = fixture();
        let results = run_study(
            "A",
            &symbols(&["Foo", "Bar"]),
            &mapper,
            &universe,
            &index,
        )
        .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn repeated_runs_are_idempotent() {
        let (mapper, universe, index) = fixture();
        let study = symbols(&["g1", "g2", "g4", "g9"]);
        let first = run_study("A", &study, &mapper, &universe, &index).unwrap();
        let second = run_study("A", &study, &mapper, &universe, &index).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn correction_spans_namespaces_of_one_call() {
        let (mapper, universe, mut index) = fixture();
        index.insert(
            AnnotationTerm::new("GO:0002", "ribosome", Namespace::CellularComponent),
            (1..=2).map(|i| GeneId::new(i.to_string())),
        );
        let results =
            run_study("A", &symbols(&["g1", "g2"]), &mapper, &universe, &index).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].term_id, "GO:0001");
        assert_eq!(results[1].term_id, "GO:0002");
        // BP: P(X >= 2), N=10, K=5, n=2 = 10/45. CC: K=2, so 1/45. Both
        // corrected as one two-member BH family.
        assert_relative_eq!(results[0].p_raw, 10.0 / 45.0, epsilon = 1e-12);
        assert_relative_eq!(results[1].p_raw, 1.0 / 45.0, epsilon = 1e-12);
        assert_relative_eq!(results[0].p_corrected, 10.0 / 45.0, epsilon = 1e-12);
        assert_relative_eq!(results[1].p_corrected, 2.0 / 45.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_distribution_parameters_degrade_to_p_one() {
        // background_count larger than the universe cannot come from the
        // local index, but a remote source could answer with it.
        assert_relative_eq!(hypergeometric_pvalue(10, 20, 3, 2), 1.0, epsilon = 1e-12);
    }
}
