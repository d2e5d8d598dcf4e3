//! Annotation terms, namespaces, and the annotation source capability.
//!
//! The core treats the annotation collaborator as opaque: anything that can
//! answer "which candidate terms annotate this study set, and how prevalent
//! is each in the background" works, be it an in-memory association index or
//! a remote query service. Ontology-graph traversal and count propagation are
//! deliberately outside this crate.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{EnrichError, GeneId};

/// The three independent functional-annotation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Namespace {
    BiologicalProcess,
    CellularComponent,
    MolecularFunction,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [
        Namespace::BiologicalProcess,
        Namespace::CellularComponent,
        Namespace::MolecularFunction,
    ];

    pub fn abbreviation(&self) -> &'static str {
        match self {
            Namespace::BiologicalProcess => "BP",
            Namespace::CellularComponent => "CC",
            Namespace::MolecularFunction => "MF",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// A functional annotation term, read-only to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationTerm {
    pub id: String,
    pub name: String,
    pub namespace: Namespace,
}

impl AnnotationTerm {
    pub fn new(id: impl Into<String>, name: impl Into<String>, namespace: Namespace) -> Self {
        AnnotationTerm {
            id: id.into(),
            name: name.into(),
            namespace,
        }
    }
}

/// The full reference gene set over-representation is measured against.
#[derive(Debug, Clone, Default)]
pub struct BackgroundUniverse {
    ids: HashSet<GeneId>,
}

impl BackgroundUniverse {
    pub fn from_ids<I: IntoIterator<Item = GeneId>>(ids: I) -> Self {
        BackgroundUniverse {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &GeneId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Per-term statistics for one candidate term of one enrichment call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTerm {
    pub term: AnnotationTerm,
    /// Study-set identifiers annotated with the term, in study order.
    pub genes_in_study: Vec<GeneId>,
    /// Number of background-universe genes annotated with the term.
    pub background_count: usize,
}

/// Capability exposed by the annotation collaborator.
///
/// Implementations must be shareable across the orchestrator's worker pool;
/// no call mutates the index.
pub trait AnnotationSource: Send + Sync {
    /// Returns the candidate terms of `namespace` annotating at least one
    /// study gene, with their study overlap and background prevalence.
    ///
    /// # Errors
    ///
    /// [`EnrichError::DependencyUnavailable`] when the backing service cannot
    /// be reached or answers with a non-success status.
    fn candidate_terms(
        &self,
        namespace: Namespace,
        study: &[GeneId],
        universe: &BackgroundUniverse,
    ) -> Result<Vec<CandidateTerm>, EnrichError>;
}

/// In-memory term-to-gene association index, the local deployment of the
/// annotation collaborator.
///
/// Terms are keyed per namespace in a `BTreeMap` so candidate enumeration is
/// deterministic across runs.
#[derive(Debug, Clone, Default)]
pub struct LocalAnnotationIndex {
    associations: HashMap<Namespace, BTreeMap<String, TermAssociation>>,
}

#[derive(Debug, Clone)]
struct TermAssociation {
    term: AnnotationTerm,
    genes: HashSet<GeneId>,
}

impl LocalAnnotationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a term with its annotated genes. Repeated inserts for the
    /// same term id merge the gene sets.
    pub fn insert<I: IntoIterator<Item = GeneId>>(&mut self, term: AnnotationTerm, genes: I) {
        let entry = self
            .associations
            .entry(term.namespace)
            .or_default()
            .entry(term.id.clone())
            .or_insert_with(|| TermAssociation {
                term,
                genes: HashSet::new(),
            });
        entry.genes.extend(genes);
    }

    /// Total number of terms across all namespaces.
    pub fn n_terms(&self) -> usize {
        self.associations.values().map(BTreeMap::len).sum()
    }
}

impl AnnotationSource for LocalAnnotationIndex {
    fn candidate_terms(
        &self,
        namespace: Namespace,
        study: &[GeneId],
        universe: &BackgroundUniverse,
    ) -> Result<Vec<CandidateTerm>, EnrichError> {
        let Some(terms) = self.associations.get(&namespace) else {
            return Ok(Vec::new());
        };
        let mut candidates = Vec::new();
        for assoc in terms.values() {
            let genes_in_study: Vec<GeneId> = study
                .iter()
                .filter(|id| assoc.genes.contains(id))
                .cloned()
                .collect();
            if genes_in_study.is_empty() {
                continue;
            }
            let background_count = assoc.genes.iter().filter(|id| universe.contains(id)).count();
            candidates.push(CandidateTerm {
                term: assoc.term.clone(),
                genes_in_study,
                background_count,
            });
        }
        Ok(candidates)
    }
}
