//! Gene identifier to symbol resolution

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Symbol lookup outcome for one gene identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneSymbol {
    Resolved(String),
    Unresolved,
}

impl GeneSymbol {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeneSymbol::Resolved(s) => Some(s),
            GeneSymbol::Unresolved => None,
        }
    }
}

/// Maps gene identifiers to gene symbols.
///
/// Identifiers missing from the returned map are treated as unresolved.
pub trait SymbolResolver {
    fn resolve(&self, gene_ids: &[String]) -> Result<HashMap<String, GeneSymbol>>;
}

/// In-memory identifier to symbol table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: HashMap<String, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gene_id: &str, symbol: &str) {
        self.symbols.insert(gene_id.to_string(), symbol.to_string());
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, gene_ids: &[String]) -> Result<HashMap<String, GeneSymbol>> {
        Ok(gene_ids
            .iter()
            .map(|id| {
                let symbol = match self.symbols.get(id) {
                    Some(s) => GeneSymbol::Resolved(s.clone()),
                    None => GeneSymbol::Unresolved,
                };
                (id.clone(), symbol)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_table_resolves_known_ids() {
        let table: SymbolTable = [("ENSG00000141510", "TP53")].into_iter().collect();
        let ids = vec!["ENSG00000141510".to_string(), "ENSG_UNKNOWN".to_string()];
        let resolved = table.resolve(&ids).unwrap();

        assert_eq!(resolved["ENSG00000141510"], GeneSymbol::Resolved("TP53".to_string()));
        assert_eq!(resolved["ENSG_UNKNOWN"], GeneSymbol::Unresolved);
        assert_eq!(resolved["ENSG00000141510"].as_str(), Some("TP53"));
    }
}
