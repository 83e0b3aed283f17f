//! Local identifier allocation.

use larva_store::{EntityKind, Store};

/// A monotonic counter for device-local identifiers.
///
/// Seeded once from the highest identifier already stored, then advanced in
/// memory only. Identifiers are never reused, even when the tick that
/// consumed one was skipped.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    last: i64,
}

impl IdAllocator {
    /// Start after `last` (0 for an empty store).
    pub fn new(last: i64) -> Self {
        Self { last }
    }

    /// Seed from the highest stored identifier of `kind`.
    pub fn seeded(store: &Store, kind: EntityKind) -> larva_store::Result<Self> {
        Ok(Self::new(store.max_id(kind)?.unwrap_or(0)))
    }

    /// Allocate the next identifier.
    pub fn next_id(&mut self) -> i64 {
        self.last += 1;
        self.last
    }

    /// The most recently allocated identifier.
    pub fn last(&self) -> i64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larva_store::{NewReading, StoredCrate};
    use time::OffsetDateTime;

    #[test]
    fn test_allocates_strictly_increasing() {
        let mut ids = IdAllocator::new(0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
        assert_eq!(ids.last(), 3);
    }

    #[test]
    fn test_seeded_from_store() {
        let store = Store::open_in_memory().unwrap();
        let mut ids = IdAllocator::seeded(&store, EntityKind::Reading).unwrap();
        assert_eq!(ids.next_id(), 1);

        store
            .upsert_crate(&StoredCrate {
                id: 1,
                label: "A".to_string(),
                location: None,
                notes: None,
                created_at: OffsetDateTime::now_utc(),
                ended_at: None,
            })
            .unwrap();
        store
            .insert_sensor_reading(&NewReading {
                reading_id: 41,
                crate_id: 1,
                recorded_at: OffsetDateTime::now_utc(),
                temperature_c: None,
                humidity_pct: None,
            })
            .unwrap();

        let mut ids = IdAllocator::seeded(&store, EntityKind::Reading).unwrap();
        assert_eq!(ids.next_id(), 42);
        let mut events = IdAllocator::seeded(&store, EntityKind::Event).unwrap();
        assert_eq!(events.next_id(), 1);
    }
}
