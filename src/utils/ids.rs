//! Job identifier generation
//!
//! Identifiers are ULIDs: lexicographically sortable by creation time, and
//! monotonic within a process so two jobs created in the same millisecond
//! still sort in creation order.

use std::sync::{LazyLock, Mutex};
use ulid::{Generator, Ulid};

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generate a new time-sortable identifier
pub fn new_job_id() -> String {
    let generated = match GENERATOR.lock() {
        Ok(mut generator) => generator.generate().ok(),
        Err(poisoned) => poisoned.into_inner().generate().ok(),
    };
    // Monotonic overflow: fall back to a random ULID, unique but unordered
    generated.unwrap_or_else(Ulid::new).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let ids: Vec<String> = (0..1000).map(|_| new_job_id()).collect();

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let mut deduped = sorted.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_id_is_valid_ulid() {
        let id = new_job_id();
        assert_eq!(id.len(), 26);
        assert!(Ulid::from_string(&id).is_ok());
    }
}
