//! Differential persistence: write a record only when its value changed

use fabricpoll_core::{normalize_key, KvStore, StoreError};
use tracing::{trace, warn};

/// What [`persist`] did with a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The value differed from (or had no) stored value and was written
    Written,
    /// The stored value is byte-for-byte identical; nothing was written
    Unchanged,
    /// No store is configured
    Skipped,
}

/// Store `value` under the normalized form of `key`, unless the store
/// already holds exactly that value
///
/// A failed read of the previous value does not block the write; it is
/// logged separately from the "absent" case.
pub fn persist(
    store: Option<&dyn KvStore>,
    key: &str,
    value: &[u8],
) -> Result<PersistOutcome, StoreError> {
    let Some(store) = store else {
        return Ok(PersistOutcome::Skipped);
    };

    let key = normalize_key(key);
    match store.get(&key) {
        Ok(Some(existing)) if existing == value => {
            trace!(key = %key, "Record unchanged");
            return Ok(PersistOutcome::Unchanged);
        }
        Ok(_) => {}
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read previous record, writing anyway");
        }
    }

    store.save(&key, value)?;
    trace!(key = %key, bytes = value.len(), "Record written");
    Ok(PersistOutcome::Written)
}
