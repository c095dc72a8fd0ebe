use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::domain::{Key, LineNo};
use crate::keys::KeyAllocator;
use crate::resolver::ReferenceResolver;

pub const ROW_DATE_FORMAT: &str = "%m/%d/%Y";

/// Everything one run mutates, threaded explicitly through validation and
/// emission.
#[derive(Debug)]
pub struct RunState {
    pub resolver: ReferenceResolver,
    /// Present only when the run emits rows.
    pub keys: Option<KeyAllocator>,
    pub date: String,
    pub fatal: usize,
    pub warnings: usize,
    names_seen: HashMap<String, LineNo>,
    strain_names: HashMap<String, (Key, LineNo)>,
    assigned_names: HashMap<Key, String>,
    links_seen: HashSet<(Key, Key)>,
}

impl RunState {
    pub fn new(resolver: ReferenceResolver, keys: Option<KeyAllocator>, date: NaiveDate) -> Self {
        Self {
            resolver,
            keys,
            date: date.format(ROW_DATE_FORMAT).to_string(),
            fatal: 0,
            warnings: 0,
            names_seen: HashMap::new(),
            strain_names: HashMap::new(),
            assigned_names: HashMap::new(),
            links_seen: HashSet::new(),
        }
    }

    /// Records `name` as proposed on `line`; returns the earlier line if the
    /// name was already proposed in this file.
    pub fn claim_name(&mut self, name: &str, line: LineNo) -> Option<LineNo> {
        match self.names_seen.get(name) {
            Some(first) => Some(*first),
            None => {
                self.names_seen.insert(name.to_string(), line);
                None
            }
        }
    }

    /// Records `name` as proposed for an existing strain on `line`; returns
    /// the earlier line if a different strain proposed it in this file.
    pub fn claim_name_for(&mut self, name: &str, strain_key: Key, line: LineNo) -> Option<LineNo> {
        match self.strain_names.get(name) {
            Some((owner, first)) if *owner != strain_key => Some(*first),
            Some(_) => None,
            None => {
                self.strain_names.insert(name.to_string(), (strain_key, line));
                None
            }
        }
    }

    /// The name an earlier line of this file gave `strain_key`.
    pub fn assigned_name(&self, strain_key: Key) -> Option<&str> {
        self.assigned_names.get(&strain_key).map(String::as_str)
    }

    /// Records the name an accepted line gives `strain_key`, releasing the
    /// claim on the name it replaces.
    pub fn assign_name(&mut self, strain_key: Key, name: &str) {
        if let Some(previous) = self.assigned_names.insert(strain_key, name.to_string()) {
            if previous != name
                && matches!(self.strain_names.get(&previous), Some((owner, _)) if *owner == strain_key)
            {
                self.strain_names.remove(&previous);
            }
        }
    }

    pub fn has_link(&self, strain_key: Key, allele_key: Key) -> bool {
        self.links_seen.contains(&(strain_key, allele_key))
    }

    /// Records a strain/allele link made by this file.
    pub fn claim_link(&mut self, strain_key: Key, allele_key: Key) {
        self.links_seen.insert((strain_key, allele_key));
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RunState {
        RunState::new(
            ReferenceResolver::default(),
            None,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        )
    }

    #[test]
    fn name_claims_are_per_strain() {
        let mut state = state();
        assert_eq!(state.claim_name_for("B6", 10, 1), None);
        assert_eq!(state.claim_name_for("B6", 10, 2), None);
        assert_eq!(state.claim_name_for("B6", 11, 3), Some(1));
    }

    #[test]
    fn renaming_again_releases_the_earlier_name() {
        let mut state = state();
        state.claim_name_for("NameA", 10, 1);
        state.assign_name(10, "NameA");
        state.claim_name_for("NameB", 10, 2);
        state.assign_name(10, "NameB");

        assert_eq!(state.assigned_name(10), Some("NameB"));
        assert_eq!(state.claim_name_for("NameA", 11, 3), None);
        assert_eq!(state.claim_name_for("NameB", 11, 4), Some(2));
    }
}
