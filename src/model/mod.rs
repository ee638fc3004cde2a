//! Entity models: the leaf sources aggregators are built on

mod memory;
mod observe;
mod traits;

pub use memory::InMemoryEntityModel;
pub use observe::{ChangeSet, Listener, Observers, Subscription};
pub use traits::{EntityModel, ModelError, ModelListener, Operation, OperationResult};
