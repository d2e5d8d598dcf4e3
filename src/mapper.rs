//! Bidirectional mapping between gene symbols and stable identifiers.
//!
//! The mapper is built once from a species-specific reference table and never
//! mutated afterwards. Symbols are the join key from user input; identifiers
//! are the space the annotation source speaks. A lookup miss is an ordinary
//! [`MappingMiss`] value, not a panic: callers drop the gene and count the
//! miss for diagnostics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier for a gene in the reference set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneId(String);

impl GeneId {
    pub fn new(id: impl Into<String>) -> Self {
        GeneId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GeneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for GeneId {
    fn from(id: &str) -> Self {
        GeneId(id.to_string())
    }
}

/// A gene symbol with no known identifier in the reference set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no identifier known for symbol `{symbol}`")]
pub struct MappingMiss {
    pub symbol: String,
}

/// Immutable symbol/identifier lookup built from a reference table.
///
/// The reverse direction is derived mechanically from the forward table at
/// construction time. Duplicate symbols and duplicate identifiers both follow
/// a last-write-wins policy; the reference set is expected to be a bijection,
/// so collisions indicate a questionable reference table rather than a
/// supported use case.
#[derive(Debug, Clone, Default)]
pub struct SymbolMapper {
    forward: HashMap<String, GeneId>,
    reverse: HashMap<GeneId, String>,
}

impl SymbolMapper {
    /// Builds a mapper from `(symbol, identifier)` reference records.
    pub fn from_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = (S, GeneId)>,
        S: Into<String>,
    {
        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();
        for (symbol, id) in records {
            let symbol = symbol.into();
            reverse.insert(id.clone(), symbol.clone());
            forward.insert(symbol, id);
        }
        SymbolMapper { forward, reverse }
    }

    /// Looks up the identifier for a symbol.
    pub fn to_identifier(&self, symbol: &str) -> Result<&GeneId, MappingMiss> {
        self.forward.get(symbol).ok_or_else(|| MappingMiss {
            symbol: symbol.to_string(),
        })
    }

    /// Looks up the symbol for an identifier (the inverse direction).
    pub fn to_symbol(&self, id: &GeneId) -> Option<&str> {
        self.reverse.get(id).map(String::as_str)
    }

    /// Number of symbols in the reference set.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Iterates over all identifiers in the reference set.
    ///
    /// Convenient for deriving a background universe from the same reference
    /// table the mapper was loaded from.
    pub fn identifiers(&self) -> impl Iterator<Item = &GeneId> {
        self.reverse.keys()
    }
}
