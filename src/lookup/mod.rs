//! External hierarchy/search providers for legacy cached models
//!
//! A provider answers queries about entities it knows by IRI. Entities it
//! returns use their IRI as id, so the same external class always arrives
//! under the same identity.

mod provider;

pub use provider::{
    LookupProvider, LookupProviderFactory, ProviderError, StaticLookupConfiguration,
    StaticLookupProvider, StaticLookupProviderFactory,
};
