use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Key;
use crate::error::LoadError;
use crate::store::RegistryStore;

/// Named monotonic counters in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Strain,
    StrainMarker,
    Accession,
    MgiAccession,
    Annotation,
    Note,
    Synonym,
}

impl Counter {
    pub fn sequence_name(&self) -> &'static str {
        match self {
            Counter::Strain => "prb_strain_seq",
            Counter::StrainMarker => "prb_strain_marker_seq",
            Counter::Accession => "acc_accession_seq",
            Counter::MgiAccession => "acc_accessionmax",
            Counter::Annotation => "voc_annot_seq",
            Counter::Note => "mgi_note_seq",
            Counter::Synonym => "mgi_synonym_seq",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sequence_name())
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    first: Key,
    next: Key,
}

/// Hands out keys from counters reserved once at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct KeyAllocator {
    slots: BTreeMap<Counter, Slot>,
}

impl KeyAllocator {
    pub fn reserve<S: RegistryStore>(store: &mut S, counters: &[Counter]) -> Result<Self, LoadError> {
        let mut slots = BTreeMap::new();
        for &counter in counters {
            let first = store.reserve(counter)?;
            debug!(%counter, first, "reserved counter");
            slots.insert(counter, Slot { first, next: first });
        }
        Ok(Self { slots })
    }

    /// Returns the current value for `counter` and advances it.
    pub fn next(&mut self, counter: Counter) -> Result<Key, LoadError> {
        let slot = self
            .slots
            .get_mut(&counter)
            .ok_or_else(|| LoadError::CounterReservation(counter.to_string()))?;
        let key = slot.next;
        slot.next += 1;
        Ok(key)
    }

    /// Highest key handed out for `counter`, if any.
    pub fn last_used(&self, counter: Counter) -> Option<Key> {
        self.slots
            .get(&counter)
            .filter(|slot| slot.next > slot.first)
            .map(|slot| slot.next - 1)
    }

    pub fn counters(&self) -> impl Iterator<Item = Counter> + '_ {
        self.slots.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(first: Key) -> KeyAllocator {
        let mut slots = BTreeMap::new();
        slots.insert(Counter::Note, Slot { first, next: first });
        KeyAllocator { slots }
    }

    #[test]
    fn keys_are_contiguous_and_increasing() {
        let mut keys = allocator(100);
        assert_eq!(keys.last_used(Counter::Note), None);
        assert_eq!(keys.next(Counter::Note).unwrap(), 100);
        assert_eq!(keys.next(Counter::Note).unwrap(), 101);
        assert_eq!(keys.last_used(Counter::Note), Some(101));
    }

    #[test]
    fn unreserved_counter_is_an_error() {
        let mut keys = allocator(1);
        assert!(keys.next(Counter::Synonym).is_err());
    }
}
