pub mod locks;
pub mod mapping;
pub mod orchestrator;
pub mod reconcile;
pub mod report;

pub use locks::{AccountLocks, LockMode};
pub use mapping::map_record;
pub use orchestrator::{ImportRequest, ImportSettings, Importer};
pub use reconcile::Reconciler;
pub use report::{ErrorDescriptor, ImportReport};
