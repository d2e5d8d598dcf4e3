//! # cluster-goea
//!
//! A specialized Rust library for cluster-level gene ontology over-representation
//! analysis of differential-expression gene lists.
//!
//! Given a table of genes grouped into clusters with an effect-size column, the
//! crate filters each cluster by a threshold, maps gene symbols to stable
//! identifiers, tests each cluster's gene set for over-representation of
//! annotation terms against a background universe, corrects for multiple
//! testing, and returns a ranked result table per cluster. Sourcing the input
//! table and rendering the output (spreadsheets, charts, reports) are caller
//! concerns; the exported contract is the `{cluster_id: RankedReport}` mapping.
//!
//! ## Core Features
//!
//! - **Gene Filtering**: per-cluster thresholding of a numeric effect-size column
//! - **Identifier Mapping**: bidirectional symbol/identifier lookup from a reference table
//! - **Over-Representation Analysis**: hypergeometric testing per annotation namespace
//! - **Multiple Testing Correction**: Benjamini-Hochberg FDR across each call's candidate set
//! - **Concurrent Orchestration**: bounded worker pool with per-cluster failure isolation
//!
//! ## Quick Start
//!
//! Build a [`SymbolMapper`] and [`BackgroundUniverse`] from your species
//! reference table, load term associations into a [`LocalAnnotationIndex`],
//! filter the input table with [`filter_genes`], and hand the cluster gene
//! sets to [`run_all`].
//!
//! ## Module Organization
//!
//! - **[`filter`]**: tabular input and per-cluster gene filtering
//! - **[`mapper`]**: symbol/identifier reference mapping
//! - **[`annotation`]**: annotation terms, namespaces, and the annotation source capability
//! - **[`enrichment`]**: the statistical engine and multiple testing correction
//! - **[`selection`]**: significance filtering, ranking, and truncation
//! - **[`orchestrator`]**: concurrent fan-out over clusters

use thiserror::Error;

pub mod annotation;
pub mod enrichment;
pub mod filter;
pub mod mapper;
pub mod orchestrator;
pub mod selection;

pub use annotation::{AnnotationSource, AnnotationTerm, BackgroundUniverse, CandidateTerm, LocalAnnotationIndex, Namespace};
pub use enrichment::{EnrichmentResult, run_study};
pub use filter::{Cell, ClusterGeneSet, ExpressionTable, filter_genes};
pub use mapper::{GeneId, MappingMiss, SymbolMapper};
pub use orchestrator::{ClusterOutcome, RankedReport, RunOptions, run_all};
pub use selection::{DEFAULT_ALPHA, select};

/// Caller-defined cluster label, stringified from the cluster column.
pub type ClusterId = String;

/// Failure conditions surfaced at the crate boundary.
///
/// Expected, per-gene misses are not represented here; they are
/// [`MappingMiss`] values recovered inside the engine. A cluster whose mapped
/// gene set is empty is likewise not an error: it yields an empty result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnrichError {
    /// A required column is absent, or the threshold column held no numeric
    /// values at all.
    #[error("column `{column}` is missing or holds no numeric values")]
    MalformedInput { column: String },

    /// The annotation collaborator could not be reached or returned a
    /// non-success status.
    #[error("annotation source unavailable: {reason}")]
    DependencyUnavailable { reason: String },

    /// Multiple testing correction was invoked with no p-values.
    #[error("empty p-value set passed to correction")]
    EmptyPValues,

    /// A p-value outside `[0, 1]` reached the correction step.
    #[error("invalid p-value at index {index}: {value}")]
    InvalidPValue { index: usize, value: f64 },

    /// The cluster's enrichment call did not complete before the run deadline.
    #[error("enrichment for cluster `{cluster}` timed out")]
    Timeout { cluster: ClusterId },

    /// The orchestrator could not construct its worker pool.
    #[error("failed to build worker pool: {reason}")]
    WorkerPool { reason: String },
}
