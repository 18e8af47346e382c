use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
/// Reducer panics are already isolated and logged by the pipeline driver, so
/// a poisoned lock carries no information we want to propagate.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
