//! Semantic model aggregators
//!
//! Aggregators combine entity models into one incrementally maintained view:
//! - [`VocabularyAggregator`] wraps one entity model
//! - [`LegacyLookupAggregator`] wraps one entity model and an external lookup provider
//! - [`ApplicationProfileAggregator`] layers a profile model over another aggregator
//! - [`MergeAggregator`] composes sibling aggregators

mod leaf;
mod legacy;
mod merge;
mod profile;
mod traits;
mod tuple_index;
mod vocabulary;

pub use legacy::LegacyLookupAggregator;
pub use merge::MergeAggregator;
pub use profile::{ApplicationProfileAggregator, ProfileOptions, PROFILING_LINK_PREFIX};
pub use traits::{
    AggregatedChanges, AggregatorError, AggregatorId, AggregatorListener, AggregatorResult,
    ExternalEntityWrapped, FrameDetail, LocalEntityWrapped, ProfileAction, ProvenanceFrame,
    ProvenanceTag, SemanticModelAggregator,
};
pub use tuple_index::TupleIndex;
pub use vocabulary::VocabularyAggregator;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a listener panicked while it was held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
