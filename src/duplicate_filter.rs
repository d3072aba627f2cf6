use log::warn;

use crate::error::StoreError;
use crate::store::PhotoStore;

/// What to do when the existence query itself fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Propagate the error; the candidate is counted as an error and not inserted.
    #[default]
    FailClosed,
    /// Legacy behaviour: treat a failed query as "not found" and let the insert
    /// go ahead. Transient store errors can then produce duplicate rows.
    FailOpen,
}

#[derive(Clone, Copy)]
pub struct DuplicateFilter<'a> {
    store: &'a dyn PhotoStore,
    policy: DuplicatePolicy,
}

impl<'a> DuplicateFilter<'a> {
    pub fn new(store: &'a dyn PhotoStore, policy: DuplicatePolicy) -> Self {
        Self { store, policy }
    }

    /// True when the store already holds a photo with this `(filename, byte_size)`.
    pub async fn is_duplicate(&self, filename: &str, byte_size: i64) -> Result<bool, StoreError> {
        match self.store.exists(filename, byte_size).await {
            Ok(found) => Ok(found),
            Err(e) if self.policy == DuplicatePolicy::FailOpen => {
                warn!(
                    "Duplicate check for {} failed, treating as new: {}",
                    filename, e
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
