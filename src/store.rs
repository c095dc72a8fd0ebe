use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bcp::BulkLoader;
use crate::config::Constants;
use crate::domain::{Flag, Key};
use crate::emit::UpdateStatement;
use crate::error::LoadError;
use crate::keys::Counter;
use crate::rows::{FIELD_DELIMITER, Table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlleleInfo {
    pub allele_key: Key,
    #[serde(default)]
    pub marker_key: Option<Key>,
    pub status_key: Key,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingStrain {
    pub key: Key,
    pub name: String,
}

/// Point lookups, counters and deferred updates against the registry.
///
/// A run holds its store exclusively, so every operation takes `&mut self`.
pub trait RegistryStore {
    /// All `(term, term key)` pairs of a controlled vocabulary.
    fn vocabulary(&mut self, vocab_key: Key) -> Result<Vec<(String, Key)>, LoadError>;
    fn find_allele(&mut self, acc_id: &str) -> Result<Option<AlleleInfo>, LoadError>;
    /// Strain carrying `name`, ignoring the strain `excluding` when given.
    fn find_strain_by_name(
        &mut self,
        name: &str,
        excluding: Option<Key>,
    ) -> Result<Option<Key>, LoadError>;
    /// Strain whose MGI accession id is `acc_id`.
    fn find_strain_by_accession(&mut self, acc_id: &str)
    -> Result<Option<ExistingStrain>, LoadError>;
    fn strain_marker_exists(&mut self, strain_key: Key, allele_key: Key)
    -> Result<bool, LoadError>;
    fn find_user(&mut self, login: &str) -> Result<Option<Key>, LoadError>;
    /// Next value of `counter`; no two reservations return the same value.
    fn reserve(&mut self, counter: Counter) -> Result<Key, LoadError>;
    /// Moves `counter` so that the next reservation lands above `last_used`.
    fn resync(&mut self, counter: Counter, last_used: Key) -> Result<(), LoadError>;
    fn execute_updates(&mut self, statements: &[UpdateStatement]) -> Result<(), LoadError>;
    /// Makes everything done so far durable.
    fn commit(&mut self) -> Result<(), LoadError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrainEntry {
    pub key: Key,
    pub name: String,
    #[serde(default = "no_flag")]
    pub standard: Flag,
    #[serde(default = "no_flag")]
    pub private: Flag,
    #[serde(default)]
    pub modified_by: Option<Key>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessionEntry {
    pub acc_id: String,
    pub logical_db_key: Key,
    pub object_key: Key,
    pub mgi_type_key: Key,
    #[serde(default = "no_flag")]
    pub private: Flag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrainMarkerEntry {
    pub strain_key: Key,
    pub allele_key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub strain_key: Key,
    pub synonym: String,
}

fn no_flag() -> Flag {
    Flag::NO
}

/// On-disk image of the reference data a run needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last value handed out per counter.
    #[serde(default)]
    pub counters: BTreeMap<Counter, Key>,
    #[serde(default)]
    pub vocabularies: BTreeMap<Key, BTreeMap<String, Key>>,
    #[serde(default)]
    pub users: BTreeMap<String, Key>,
    #[serde(default)]
    pub alleles: BTreeMap<String, AlleleInfo>,
    #[serde(default)]
    pub strains: Vec<StrainEntry>,
    #[serde(default)]
    pub accessions: Vec<AccessionEntry>,
    #[serde(default)]
    pub strain_markers: Vec<StrainMarkerEntry>,
    #[serde(default)]
    pub synonyms: Vec<SynonymEntry>,
    #[serde(default)]
    pub loaded_rows: BTreeMap<String, usize>,
}

/// Registry backed by a JSON snapshot. Changes stay in memory until `save`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshot: Snapshot,
    constants: Constants,
    path: Option<Utf8PathBuf>,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot, constants: Constants) -> Self {
        Self {
            snapshot,
            constants,
            path: None,
        }
    }

    pub fn open(path: &Utf8Path, constants: Constants) -> Result<Self, LoadError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| LoadError::SnapshotRead(path.as_std_path().to_path_buf()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|err| LoadError::SnapshotParse(err.to_string()))?;
        info!(%path, strains = snapshot.strains.len(), "opened registry snapshot");
        Ok(Self {
            snapshot,
            constants,
            path: Some(path.to_owned()),
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Writes the snapshot back to the file it was opened from.
    pub fn save(&self) -> Result<(), LoadError> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Utf8Path) -> Result<(), LoadError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(&self.snapshot)
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("strainload-snapshot")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn strain_mut(&mut self, key: Key) -> Result<&mut StrainEntry, LoadError> {
        self.snapshot
            .strains
            .iter_mut()
            .find(|strain| strain.key == key)
            .ok_or_else(|| LoadError::Store(format!("no strain with key {key}")))
    }

    fn apply_row(&mut self, table: Table, fields: &[&str]) -> Result<(), LoadError> {
        let key = |idx: usize| -> Result<Key, LoadError> {
            fields
                .get(idx)
                .and_then(|value| value.parse().ok())
                .ok_or_else(|| LoadError::BulkLoad {
                    table: table.to_string(),
                    message: format!("bad key in column {}", idx + 1),
                })
        };
        let flag = |idx: usize| -> Flag {
            fields
                .get(idx)
                .and_then(|value| value.parse().ok())
                .unwrap_or(Flag::NO)
        };
        let text = |idx: usize| -> String { fields.get(idx).unwrap_or(&"").to_string() };

        match table {
            Table::Strain => self.snapshot.strains.push(StrainEntry {
                key: key(0)?,
                name: text(3),
                standard: flag(4),
                private: flag(5),
                modified_by: Some(key(8)?),
            }),
            Table::Accession => self.snapshot.accessions.push(AccessionEntry {
                acc_id: text(1),
                logical_db_key: key(4)?,
                object_key: key(5)?,
                mgi_type_key: key(6)?,
                private: flag(7),
            }),
            Table::StrainMarker => self.snapshot.strain_markers.push(StrainMarkerEntry {
                strain_key: key(1)?,
                allele_key: key(3)?,
            }),
            Table::Synonym => self.snapshot.synonyms.push(SynonymEntry {
                strain_key: key(1)?,
                synonym: text(5),
            }),
            Table::Annotation | Table::Note => {}
        }
        Ok(())
    }
}

impl RegistryStore for SnapshotStore {
    fn vocabulary(&mut self, vocab_key: Key) -> Result<Vec<(String, Key)>, LoadError> {
        Ok(self
            .snapshot
            .vocabularies
            .get(&vocab_key)
            .map(|terms| {
                terms
                    .iter()
                    .map(|(term, key)| (term.clone(), *key))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn find_allele(&mut self, acc_id: &str) -> Result<Option<AlleleInfo>, LoadError> {
        Ok(self.snapshot.alleles.get(acc_id).cloned())
    }

    fn find_strain_by_name(
        &mut self,
        name: &str,
        excluding: Option<Key>,
    ) -> Result<Option<Key>, LoadError> {
        Ok(self
            .snapshot
            .strains
            .iter()
            .filter(|strain| strain.key != 0 && Some(strain.key) != excluding)
            .find(|strain| strain.name == name)
            .map(|strain| strain.key))
    }

    fn find_strain_by_accession(
        &mut self,
        acc_id: &str,
    ) -> Result<Option<ExistingStrain>, LoadError> {
        let strain_type = self.constants.strain_mgi_type_key;
        let mgi_db = self.constants.mgi_logical_db_key;
        let Some(object_key) = self
            .snapshot
            .accessions
            .iter()
            .find(|acc| {
                acc.acc_id == acc_id && acc.mgi_type_key == strain_type && acc.logical_db_key == mgi_db
            })
            .map(|acc| acc.object_key)
        else {
            return Ok(None);
        };
        Ok(self
            .snapshot
            .strains
            .iter()
            .find(|strain| strain.key == object_key)
            .map(|strain| ExistingStrain {
                key: strain.key,
                name: strain.name.clone(),
            }))
    }

    fn strain_marker_exists(&mut self, strain_key: Key, allele_key: Key) -> Result<bool, LoadError> {
        Ok(self
            .snapshot
            .strain_markers
            .iter()
            .any(|link| link.strain_key == strain_key && link.allele_key == allele_key))
    }

    fn find_user(&mut self, login: &str) -> Result<Option<Key>, LoadError> {
        Ok(self.snapshot.users.get(login).copied())
    }

    fn reserve(&mut self, counter: Counter) -> Result<Key, LoadError> {
        let value = self.snapshot.counters.entry(counter).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    fn resync(&mut self, counter: Counter, last_used: Key) -> Result<(), LoadError> {
        let value = self.snapshot.counters.entry(counter).or_insert(0);
        *value = (*value).max(last_used);
        Ok(())
    }

    fn execute_updates(&mut self, statements: &[UpdateStatement]) -> Result<(), LoadError> {
        let strain_type = self.constants.strain_mgi_type_key;
        let mgi_db = self.constants.mgi_logical_db_key;
        for statement in statements {
            match statement {
                UpdateStatement::Strain {
                    strain_key,
                    name,
                    standard,
                    private,
                    modified_by,
                } => {
                    let strain = self.strain_mut(*strain_key)?;
                    strain.name = name.clone();
                    if let Some(standard) = standard {
                        strain.standard = *standard;
                    }
                    if let Some(private) = private {
                        strain.private = *private;
                    }
                    strain.modified_by = Some(*modified_by);
                }
                UpdateStatement::AccessionPrivacy {
                    strain_key,
                    private,
                    ..
                } => {
                    for acc in self.snapshot.accessions.iter_mut().filter(|acc| {
                        acc.object_key == *strain_key
                            && acc.mgi_type_key == strain_type
                            && acc.logical_db_key != mgi_db
                    }) {
                        acc.private = *private;
                    }
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), LoadError> {
        self.save()
    }
}

impl BulkLoader for SnapshotStore {
    fn load(&mut self, table: Table, file: &Utf8Path) -> Result<usize, LoadError> {
        let content = fs::read_to_string(file.as_std_path()).map_err(|err| LoadError::BulkLoad {
            table: table.to_string(),
            message: err.to_string(),
        })?;
        let mut rows = 0;
        for line in content.lines().filter(|line| !line.is_empty()) {
            let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
            self.apply_row(table, &fields)?;
            rows += 1;
        }
        *self
            .snapshot
            .loaded_rows
            .entry(table.name().to_string())
            .or_insert(0) += rows;
        debug!(%table, rows, "applied bcp file to snapshot");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_never_repeat() {
        let mut store = SnapshotStore::new(Snapshot::default(), Constants::default());
        let first = store.reserve(Counter::Strain).unwrap();
        let second = store.reserve(Counter::Strain).unwrap();
        assert!(second > first);
        store.resync(Counter::Strain, first + 10).unwrap();
        assert_eq!(store.reserve(Counter::Strain).unwrap(), first + 11);
    }

    #[test]
    fn name_lookup_can_exclude_target() {
        let mut snapshot = Snapshot::default();
        snapshot.strains.push(StrainEntry {
            key: 5,
            name: "B6".to_string(),
            standard: Flag::YES,
            private: Flag::NO,
            modified_by: None,
        });
        let mut store = SnapshotStore::new(snapshot, Constants::default());
        assert_eq!(store.find_strain_by_name("B6", None).unwrap(), Some(5));
        assert_eq!(store.find_strain_by_name("B6", Some(5)).unwrap(), None);
    }
}
