//! Convenience prelude for distributed lock types.

pub use crate::backend::LockBackend;
pub use crate::error::{LockError, LockResult};
pub use crate::handle::{HandleState, LockHandle};
pub use crate::lock::DistributedLock;
pub use crate::options::LockOptions;
pub use crate::provider::{LockProvider, LockProviderExt};
