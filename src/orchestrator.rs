//! Concurrent fan-out of the enrichment engine over all clusters.
//!
//! Each cluster is an independent unit of work sharing only the read-only
//! collaborators. Results are collected as they complete and assembled into a
//! mapping keyed by cluster id, so the caller sees the same logical structure
//! regardless of completion order. One cluster failing, timing out, or
//! retrying never blocks or aborts its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::annotation::{AnnotationSource, BackgroundUniverse};
use crate::enrichment::{EnrichmentResult, run_study};
use crate::filter::ClusterGeneSet;
use crate::mapper::SymbolMapper;
use crate::selection::{DEFAULT_ALPHA, select};
use crate::{ClusterId, EnrichError};

/// One cluster's filtered, ranked, truncated result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedReport {
    pub cluster_id: ClusterId,
    pub terms: Vec<EnrichmentResult>,
}

/// Tuning for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker pool size; `0` lets the pool size itself to the machine.
    pub concurrency: usize,
    /// Run deadline. Clusters whose result has not arrived when it passes
    /// are recorded as timed out; late results are discarded, never surfaced
    /// as partial output.
    pub timeout: Option<Duration>,
    /// Attempts per cluster for transient dependency failures. Bounded by
    /// design; values below 1 behave as 1.
    pub max_attempts: usize,
    /// Significance level handed to the selection stage.
    pub alpha: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            concurrency: 0,
            timeout: None,
            max_attempts: 2,
            alpha: DEFAULT_ALPHA,
        }
    }
}

/// Per-cluster outcome: a complete ranked report or a recorded failure.
pub type ClusterOutcome = Result<RankedReport, EnrichError>;

fn enrich_cluster(
    cluster: &ClusterGeneSet,
    mapper: &SymbolMapper,
    universe: &BackgroundUniverse,
    source: &dyn AnnotationSource,
    max_attempts: usize,
    alpha: f64,
) -> ClusterOutcome {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    let results = loop {
        match run_study(&cluster.cluster_id, &cluster.genes, mapper, universe, source) {
            Err(EnrichError::DependencyUnavailable { reason }) if attempt < max_attempts => {
                warn!(
                    cluster = %cluster.cluster_id,
                    attempt,
                    reason,
                    "annotation source unavailable, retrying"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
            Ok(results) => break results,
        }
    };
    Ok(RankedReport {
        cluster_id: cluster.cluster_id.clone(),
        terms: select(results, alpha),
    })
}

/// Runs the enrichment engine over every cluster on a bounded worker pool.
///
/// The returned mapping holds exactly one entry per input cluster: the ranked
/// report on success, or the typed failure that ended its processing. A
/// cluster's failure is isolated and never aborts the run.
///
/// # Errors
///
/// Only worker-pool construction fails the whole call; everything downstream
/// is a per-cluster outcome.
pub fn run_all(
    clusters: Vec<ClusterGeneSet>,
    mapper: Arc<SymbolMapper>,
    universe: Arc<BackgroundUniverse>,
    source: Arc<dyn AnnotationSource>,
    options: &RunOptions,
) -> Result<BTreeMap<ClusterId, ClusterOutcome>, EnrichError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(options.concurrency)
        .build()
        .map_err(|e| EnrichError::WorkerPool {
            reason: e.to_string(),
        })?;

    let cluster_ids: Vec<ClusterId> = clusters.iter().map(|c| c.cluster_id.clone()).collect();
    let expected = clusters.len();
    let deadline = options.timeout.map(|t| Instant::now() + t);

    let (tx, rx) = mpsc::channel::<(ClusterId, ClusterOutcome)>();
    for cluster in clusters {
        let tx = tx.clone();
        let mapper = Arc::clone(&mapper);
        let universe = Arc::clone(&universe);
        let source = Arc::clone(&source);
        let max_attempts = options.max_attempts;
        let alpha = options.alpha;
        pool.spawn(move || {
            let outcome = enrich_cluster(
                &cluster,
                &mapper,
                &universe,
                source.as_ref(),
                max_attempts,
                alpha,
            );
            // A send after the collector gave up on the deadline lands on a
            // disconnected channel and is discarded, so a late straggler can
            // never masquerade as a completed cluster.
            let _ = tx.send((cluster.cluster_id, outcome));
        });
    }
    drop(tx);

    let mut outcomes: BTreeMap<ClusterId, ClusterOutcome> = BTreeMap::new();
    for _ in 0..expected {
        let received = match deadline {
            None => rx.recv().ok(),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                match rx.recv_timeout(deadline - now) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
        };
        let Some((cluster_id, outcome)) = received else {
            break;
        };
        outcomes.insert(cluster_id, outcome);
    }
    drop(rx);

    for cluster_id in cluster_ids {
        if !outcomes.contains_key(&cluster_id) {
            warn!(cluster = %cluster_id, "cluster missed the run deadline");
            outcomes.insert(
                cluster_id.clone(),
                Err(EnrichError::Timeout { cluster: cluster_id }),
            );
        }
    }

    let failed = outcomes.values().filter(|o| o.is_err()).count();
    info!(
        clusters = outcomes.len(),
        succeeded = outcomes.len() - failed,
        failed,
        "enrichment run complete"
    );
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationTerm, CandidateTerm, LocalAnnotationIndex, Namespace};
    use crate::mapper::GeneId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gene_id(i: usize) -> GeneId {
        GeneId::new(i.to_string())
    }

    fn collaborators() -> (Arc<SymbolMapper>, Arc<BackgroundUniverse>, LocalAnnotationIndex) {
        let mapper = SymbolMapper::from_records((1..=20).map(|i| (format!("g{i}"), gene_id(i))));
        let universe = BackgroundUniverse::from_ids((1..=20).map(gene_id));
        let mut index = LocalAnnotationIndex::new();
        index.insert(
            AnnotationTerm::new("GO:0001", "synapse assembly", Namespace::BiologicalProcess),
            (1..=4).map(gene_id),
        );
        index.insert(
            AnnotationTerm::new("GO:0002", "axon guidance", Namespace::BiologicalProcess),
            (5..=8).map(gene_id),
        );
        (Arc::new(mapper), Arc::new(universe), index)
    }

    fn cluster(id: &str, genes: &[&str]) -> ClusterGeneSet {
        ClusterGeneSet {
            cluster_id: id.to_string(),
            genes: genes.iter().map(|g| g.to_string()).collect(),
        }
    }

    /// Fails every study containing the poison identifier.
    struct PoisonedSource {
        inner: LocalAnnotationIndex,
        poison: GeneId,
    }

    impl AnnotationSource for PoisonedSource {
        fn candidate_terms(
            &self,
            namespace: Namespace,
            study: &[GeneId],
            universe: &BackgroundUniverse,
        ) -> Result<Vec<CandidateTerm>, EnrichError> {
            if study.contains(&self.poison) {
                return Err(EnrichError::DependencyUnavailable {
                    reason: "503 service unavailable".to_string(),
                });
            }
            self.inner.candidate_terms(namespace, study, universe)
        }
    }

    /// Fails the first `failures` queries, then recovers.
    struct FlakySource {
        inner: LocalAnnotationIndex,
        failures: usize,
        calls: AtomicUsize,
    }

    impl AnnotationSource for FlakySource {
        fn candidate_terms(
            &self,
            namespace: Namespace,
            study: &[GeneId],
            universe: &BackgroundUniverse,
        ) -> Result<Vec<CandidateTerm>, EnrichError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(EnrichError::DependencyUnavailable {
                    reason: "connection reset".to_string(),
                });
            }
            self.inner.candidate_terms(namespace, study, universe)
        }
    }

    /// Stalls every query long enough to blow any reasonable test deadline.
    struct StalledSource;

    impl AnnotationSource for StalledSource {
        fn candidate_terms(
            &self,
            _namespace: Namespace,
            _study: &[GeneId],
            _universe: &BackgroundUniverse,
        ) -> Result<Vec<CandidateTerm>, EnrichError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Vec::new())
        }
    }

    #[test]
    fn assembles_one_outcome_per_cluster() {
        let (mapper, universe, index) = collaborators();
        let outcomes = run_all(
            vec![
                cluster("A", &["g1", "g2", "g3"]),
                cluster("B", &["g5", "g6"]),
                cluster("C", &["Notagene"]),
            ],
            mapper,
            universe,
            Arc::new(index),
            &RunOptions::default(),
        )
        .unwrap();

        assert_eq!(outcomes.len(), 3);
        let a = outcomes["A"].as_ref().unwrap();
        assert_eq!(a.terms.len(), 1);
        assert_eq!(a.terms[0].term_id, "GO:0001");
        let b = outcomes["B"].as_ref().unwrap();
        assert_eq!(b.terms[0].term_id, "GO:0002");
        // Zero mapped genes is a valid degenerate outcome, not a failure.
        assert!(outcomes["C"].as_ref().unwrap().terms.is_empty());
    }

    #[test]
    fn one_failing_cluster_does_not_abort_siblings() {
        let (mapper, universe, index) = collaborators();
        let source = Arc::new(PoisonedSource {
            inner: index,
            poison: gene_id(5),
        });
        let outcomes = run_all(
            vec![cluster("A", &["g1", "g2"]), cluster("B", &["g5", "g6"])],
            mapper,
            universe,
            source,
            &RunOptions {
                max_attempts: 1,
                ..RunOptions::default()
            },
        )
        .unwrap();

        assert!(outcomes["A"].is_ok());
        assert!(matches!(
            outcomes["B"],
            Err(EnrichError::DependencyUnavailable { .. })
        ));
    }

    #[test]
    fn transient_failures_are_retried_within_the_budget() {
        let (mapper, universe, index) = collaborators();
        let source = Arc::new(FlakySource {
            inner: index,
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let outcomes = run_all(
            vec![cluster("A", &["g1", "g2"])],
            mapper,
            universe,
            source,
            &RunOptions {
                concurrency: 1,
                max_attempts: 2,
                ..RunOptions::default()
            },
        )
        .unwrap();
        assert!(outcomes["A"].is_ok());
    }

    #[test]
    fn retry_budget_is_bounded() {
        let (mapper, universe, index) = collaborators();
        let source = Arc::new(FlakySource {
            inner: index,
            failures: 10,
            calls: AtomicUsize::new(0),
        });
        let outcomes = run_all(
            vec![cluster("A", &["g1", "g2"])],
            mapper,
            universe,
            Arc::clone(&source) as Arc<dyn AnnotationSource>,
            &RunOptions {
                concurrency: 1,
                max_attempts: 3,
                ..RunOptions::default()
            },
        )
        .unwrap();
        assert!(matches!(
            outcomes["A"],
            Err(EnrichError::DependencyUnavailable { .. })
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn deadline_overrun_is_recorded_as_timeout() {
        let (mapper, universe, _) = collaborators();
        let outcomes = run_all(
            vec![cluster("A", &["g1", "g2"])],
            mapper,
            universe,
            Arc::new(StalledSource),
            &RunOptions {
                timeout: Some(Duration::from_millis(20)),
                max_attempts: 1,
                ..RunOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            outcomes["A"],
            Err(EnrichError::Timeout {
                cluster: "A".to_string()
            })
        );
    }
}
