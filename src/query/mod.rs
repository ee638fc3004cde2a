//! Query helpers over entity collections
//!
//! Name search, generalization hierarchy walks and inheritance paths. All
//! of them work on plain entity slices so aggregators and lookup providers
//! can share them.

mod find;
mod path;
mod traverse;
mod types;

pub use find::NameQuery;
pub use path::PathQuery;
pub use traverse::{GeneralizationIndex, HierarchyQuery};
pub use types::{Direction, HierarchyResult, PathResult};
