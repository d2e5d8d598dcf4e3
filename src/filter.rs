//! Tabular input and per-cluster gene filtering.
//!
//! The filter is a pure function of a small in-memory table: it keeps rows
//! whose threshold-column value is strictly greater than the cutoff and
//! groups the surviving gene symbols by cluster label. How the table got into
//! memory (spreadsheet, CSV, database) is a caller concern.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::{ClusterId, EnrichError};

/// A single table cell. Numeric strings in a [`Cell::Text`] cell still parse
/// as numbers, since spreadsheet exports routinely stringify numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => s.trim().parse().ok(),
            Cell::Empty => None,
        }
    }

    /// Renders the cell as a cluster label. Whole-number labels print without
    /// a fractional part (`3.0` labels cluster `"3"`).
    fn as_label(&self) -> Option<String> {
        match self {
            Cell::Text(s) if !s.is_empty() => Some(s.clone()),
            Cell::Number(v) => Some(format!("{v}")),
            _ => None,
        }
    }
}

/// Column-named table of gene records, the filter's only input.
#[derive(Debug, Clone, Default)]
pub struct ExpressionTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl ExpressionTable {
    pub fn new<S: Into<String>>(columns: Vec<S>) -> Self {
        ExpressionTable {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    fn column_index(&self, name: &str) -> Result<usize, EnrichError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| EnrichError::MalformedInput {
                column: name.to_string(),
            })
    }

    fn cell(&self, row: &[Cell], idx: usize) -> Cell {
        row.get(idx).cloned().unwrap_or(Cell::Empty)
    }
}

/// One cluster's filtered gene list, in row order, duplicates preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterGeneSet {
    pub cluster_id: ClusterId,
    pub genes: Vec<String>,
}

/// Groups genes by cluster, keeping only rows whose threshold-column value is
/// strictly greater than `threshold_value`.
///
/// Rows with a missing or non-numeric threshold cell are dropped, not
/// errored. Clusters appear in order of first occurrence among the surviving
/// rows; genes keep their row order and are not deduplicated here (the
/// enrichment engine deduplicates while mapping, so study sizes are never
/// double-counted).
///
/// # Errors
///
/// [`EnrichError::MalformedInput`] when any of the three named columns is
/// absent, or when the table is non-empty but not a single row carried a
/// numeric threshold value.
pub fn filter_genes(
    table: &ExpressionTable,
    cluster_column: &str,
    gene_column: &str,
    threshold_column: &str,
    threshold_value: f64,
) -> Result<Vec<ClusterGeneSet>, EnrichError> {
    let cluster_idx = table.column_index(cluster_column)?;
    let gene_idx = table.column_index(gene_column)?;
    let threshold_idx = table.column_index(threshold_column)?;

    let mut sets: Vec<ClusterGeneSet> = Vec::new();
    let mut by_cluster: HashMap<ClusterId, usize> = HashMap::new();
    let mut numeric_rows = 0usize;

    for row in &table.rows {
        let Some(value) = table.cell(row, threshold_idx).as_number() else {
            continue;
        };
        numeric_rows += 1;
        // Strict comparison: a value exactly at the cutoff is excluded.
        if value <= threshold_value {
            continue;
        }
        let Some(cluster) = table.cell(row, cluster_idx).as_label() else {
            continue;
        };
        let Cell::Text(gene) = table.cell(row, gene_idx) else {
            continue;
        };
        if gene.is_empty() {
            continue;
        }

        let slot = *by_cluster.entry(cluster.clone()).or_insert_with(|| {
            sets.push(ClusterGeneSet {
                cluster_id: cluster,
                genes: Vec::new(),
            });
            sets.len() - 1
        });
        sets[slot].genes.push(gene);
    }

    if table.n_rows() > 0 && numeric_rows == 0 {
        return Err(EnrichError::MalformedInput {
            column: threshold_column.to_string(),
        });
    }

    debug!(
        clusters = sets.len(),
        rows = table.n_rows(),
        numeric_rows,
        "filtered expression table"
    );
    Ok(sets)
}
