//! Gene annotation collaborators
//!
//! Neither collaborator takes part in the statistics: symbols only decorate a
//! finished results table, and gene-info lookups are issued by the caller.

mod entrez;
mod symbols;

pub use entrez::{GeneInfo, GeneInfoFetcher, HttpTransport, JsonTransport, ENTREZ_BASE_URL};
pub use symbols::{GeneSymbol, SymbolResolver, SymbolTable};
