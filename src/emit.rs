use serde::Serialize;

use crate::config::Constants;
use crate::domain::{AccessionId, Flag, Key};
use crate::error::LoadError;
use crate::keys::{Counter, KeyAllocator};
use crate::rows::{
    AccessionRow, AnnotationRow, BcpRow, NoteRow, StrainMarkerRow, StrainRow, SynonymRow, Table,
    encode,
};
use crate::validate::{ResolvedAllele, ResolvedCreate, ResolvedUpdate};

/// Every row produced from one record. All of them reference `strain_key`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSet {
    pub strain_key: Key,
    pub strains: Vec<StrainRow>,
    pub strain_markers: Vec<StrainMarkerRow>,
    pub accessions: Vec<AccessionRow>,
    pub annotations: Vec<AnnotationRow>,
    pub notes: Vec<NoteRow>,
    pub synonyms: Vec<SynonymRow>,
}

impl OutputSet {
    fn for_strain(strain_key: Key) -> Self {
        Self {
            strain_key,
            ..Self::default()
        }
    }

    /// `(table, encoded line)` pairs, grouped by table.
    pub fn encoded(&self) -> Vec<(Table, String)> {
        let mut out = Vec::with_capacity(self.len());
        push_rows(&mut out, &self.strains);
        push_rows(&mut out, &self.strain_markers);
        push_rows(&mut out, &self.accessions);
        push_rows(&mut out, &self.annotations);
        push_rows(&mut out, &self.notes);
        push_rows(&mut out, &self.synonyms);
        out
    }

    pub fn len(&self) -> usize {
        self.strains.len()
            + self.strain_markers.len()
            + self.accessions.len()
            + self.annotations.len()
            + self.notes.len()
            + self.synonyms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strain key referenced by each row in the set.
    pub fn referenced_strain_keys(&self) -> Vec<Key> {
        let mut keys = Vec::with_capacity(self.len());
        keys.extend(self.strains.iter().map(|row| row.strain_key));
        keys.extend(self.strain_markers.iter().map(|row| row.strain_key));
        keys.extend(self.accessions.iter().map(|row| row.object_key));
        keys.extend(self.annotations.iter().map(|row| row.object_key));
        keys.extend(self.notes.iter().map(|row| row.object_key));
        keys.extend(self.synonyms.iter().map(|row| row.object_key));
        keys
    }
}

fn push_rows<R: BcpRow>(out: &mut Vec<(Table, String)>, rows: &[R]) {
    out.extend(rows.iter().map(|row| (R::TABLE, encode(row))));
}

/// A change to an existing row, executed in one batch at commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateStatement {
    Strain {
        strain_key: Key,
        name: String,
        standard: Option<Flag>,
        private: Option<Flag>,
        modified_by: Key,
    },
    AccessionPrivacy {
        strain_key: Key,
        private: Flag,
        modified_by: Key,
        mgi_type_key: Key,
        mgi_logical_db_key: Key,
    },
}

impl UpdateStatement {
    pub fn to_sql(&self) -> String {
        match self {
            UpdateStatement::Strain {
                strain_key,
                name,
                standard,
                private,
                modified_by,
            } => {
                let mut sets = vec![format!("strain = '{}'", name.replace('\'', "''"))];
                if let Some(standard) = standard {
                    sets.push(format!("standard = {standard}"));
                }
                if let Some(private) = private {
                    sets.push(format!("private = {private}"));
                }
                sets.push(format!("_modifiedby_key = {modified_by}"));
                sets.push("modification_date = now()".to_string());
                format!(
                    "update PRB_Strain set {} where _Strain_key = {strain_key};",
                    sets.join(", ")
                )
            }
            UpdateStatement::AccessionPrivacy {
                strain_key,
                private,
                modified_by,
                mgi_type_key,
                mgi_logical_db_key,
            } => format!(
                "update ACC_Accession set private = {private}, _modifiedby_key = {modified_by}, \
                 modification_date = now() where _LogicalDB_key != {mgi_logical_db_key} \
                 and _MGIType_key = {mgi_type_key} and _Object_key = {strain_key};"
            ),
        }
    }
}

/// Turns resolved records into rows, drawing keys as it goes.
pub struct Emitter<'c> {
    constants: &'c Constants,
    date: String,
}

impl<'c> Emitter<'c> {
    pub fn new(constants: &'c Constants, date: &str) -> Self {
        Self {
            constants,
            date: date.to_string(),
        }
    }

    pub fn emit_create(
        &self,
        record: &ResolvedCreate,
        keys: &mut KeyAllocator,
    ) -> Result<OutputSet, LoadError> {
        let c = self.constants;
        let strain_key = keys.next(Counter::Strain)?;
        let user = record.created_by;
        let mut set = OutputSet::for_strain(strain_key);

        set.strains.push(StrainRow {
            strain_key,
            species_key: record.species_key,
            strain_type_key: record.strain_type_key,
            name: record.name.clone(),
            standard: record.standard,
            private: record.private,
            genetic_background: Flag::NO,
            created_by: user,
            modified_by: user,
            date: self.date.clone(),
        });

        for allele in &record.alleles {
            set.strain_markers
                .push(self.strain_marker(strain_key, allele, user, keys)?);
        }

        let mgi_number = keys.next(Counter::MgiAccession)?;
        let primary = AccessionId::from_parts(&c.mgi_prefix, mgi_number.unsigned_abs());
        set.accessions.push(AccessionRow {
            accession_key: keys.next(Counter::Accession)?,
            acc_id: primary.as_str().to_string(),
            prefix_part: primary.prefix().to_string(),
            numeric_part: primary.numeric(),
            logical_db_key: c.mgi_logical_db_key,
            object_key: strain_key,
            mgi_type_key: c.strain_mgi_type_key,
            private: Flag::NO,
            preferred: Flag::YES,
            created_by: user,
            modified_by: user,
            date: self.date.clone(),
        });
        set.accessions.push(AccessionRow {
            accession_key: keys.next(Counter::Accession)?,
            acc_id: record.external_id.as_str().to_string(),
            prefix_part: record.external_id.prefix().to_string(),
            numeric_part: record.external_id.numeric(),
            logical_db_key: record.external_logical_db,
            object_key: strain_key,
            mgi_type_key: record.external_mgi_type,
            private: record.private,
            preferred: Flag::YES,
            created_by: user,
            modified_by: user,
            date: self.date.clone(),
        });

        for &term_key in &record.attribute_keys {
            set.annotations.push(AnnotationRow {
                annot_key: keys.next(Counter::Annotation)?,
                annot_type_key: c.strain_annot_type_key,
                object_key: strain_key,
                term_key,
                qualifier_key: c.no_qualifier_key,
                date: self.date.clone(),
            });
        }

        let notes = [
            (c.origin_note_type_key, &record.origin_note),
            (c.mutant_origin_note_type_key, &record.mutant_note),
            (c.impc_colony_note_type_key, &record.colony_note),
        ];
        for (note_type_key, text) in notes {
            if text.trim().is_empty() {
                continue;
            }
            set.notes.push(NoteRow {
                note_key: keys.next(Counter::Note)?,
                object_key: strain_key,
                mgi_type_key: c.note_mgi_type_key,
                note_type_key,
                note: text.clone(),
                created_by: user,
                modified_by: user,
                date: self.date.clone(),
            });
        }

        Ok(set)
    }

    /// Rows and deferred statements for an update or curator record.
    pub fn emit_update(
        &self,
        record: &ResolvedUpdate,
        keys: &mut KeyAllocator,
    ) -> Result<(OutputSet, Vec<UpdateStatement>), LoadError> {
        let c = self.constants;
        let strain_key = record.strain_key;
        let user = record.modified_by;
        let mut set = OutputSet::for_strain(strain_key);

        for allele in &record.alleles {
            set.strain_markers
                .push(self.strain_marker(strain_key, allele, user, keys)?);
        }

        let mut statements = vec![UpdateStatement::Strain {
            strain_key,
            name: record.name.clone(),
            standard: record.standard,
            private: record.private,
            modified_by: user,
        }];
        if record.sync_accession_privacy {
            if let Some(private) = record.private {
                statements.push(UpdateStatement::AccessionPrivacy {
                    strain_key,
                    private,
                    modified_by: user,
                    mgi_type_key: c.strain_mgi_type_key,
                    mgi_logical_db_key: c.mgi_logical_db_key,
                });
            }
        }

        if record.name != record.old_name {
            set.synonyms.push(SynonymRow {
                synonym_key: keys.next(Counter::Synonym)?,
                object_key: strain_key,
                mgi_type_key: c.strain_mgi_type_key,
                synonym_type_key: c.synonym_type_key,
                refs_key: None,
                synonym: record.old_name.clone(),
                created_by: user,
                modified_by: user,
                date: self.date.clone(),
            });
        }

        Ok((set, statements))
    }

    fn strain_marker(
        &self,
        strain_key: Key,
        allele: &ResolvedAllele,
        user: Key,
        keys: &mut KeyAllocator,
    ) -> Result<StrainMarkerRow, LoadError> {
        Ok(StrainMarkerRow {
            strain_marker_key: keys.next(Counter::StrainMarker)?,
            strain_key,
            marker_key: allele.marker_key,
            allele_key: allele.allele_key,
            qualifier_key: self.constants.nomenclature_qualifier_key,
            created_by: user,
            modified_by: user,
            date: self.date.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::store::{Snapshot, SnapshotStore};

    fn keys() -> KeyAllocator {
        let mut snapshot = Snapshot::default();
        snapshot.counters = BTreeMap::from([
            (Counter::Strain, 9),
            (Counter::StrainMarker, 19),
            (Counter::Accession, 29),
            (Counter::MgiAccession, 39),
            (Counter::Annotation, 49),
            (Counter::Note, 59),
            (Counter::Synonym, 69),
        ]);
        let mut store = SnapshotStore::new(snapshot, Constants::default());
        KeyAllocator::reserve(
            &mut store,
            &[
                Counter::Strain,
                Counter::StrainMarker,
                Counter::Accession,
                Counter::MgiAccession,
                Counter::Annotation,
                Counter::Note,
                Counter::Synonym,
            ],
        )
        .unwrap()
    }

    fn allele(allele_key: Key) -> ResolvedAllele {
        ResolvedAllele {
            acc_id: format!("MGI:{allele_key}"),
            allele_key,
            marker_key: None,
        }
    }

    fn create() -> ResolvedCreate {
        ResolvedCreate {
            line: 1,
            external_id: "JAX:012345".parse().unwrap(),
            name: "B6.Cg-Tg".to_string(),
            alleles: vec![allele(1)],
            strain_type_key: 3,
            species_key: 4,
            standard: Flag::NO,
            private: Flag::YES,
            origin_note: String::new(),
            external_logical_db: 22,
            external_mgi_type: 10,
            attribute_keys: vec![77, 78],
            created_by: 1001,
            mutant_note: "ES line".to_string(),
            colony_note: "  ".to_string(),
        }
    }

    fn update(name: &str, sync: bool) -> ResolvedUpdate {
        ResolvedUpdate {
            line: 1,
            strain_key: 500,
            old_name: "Old".to_string(),
            name: name.to_string(),
            alleles: vec![allele(1), allele(2)],
            standard: Some(Flag::YES),
            private: Some(Flag::NO),
            modified_by: 1001,
            sync_accession_privacy: sync,
        }
    }

    #[test]
    fn create_rows_share_the_new_strain_key() {
        let constants = Constants::default();
        let emitter = Emitter::new(&constants, "03/01/2026");
        let mut keys = keys();

        let set = emitter.emit_create(&create(), &mut keys).unwrap();

        assert_eq!(set.strain_key, 10);
        assert!(set.referenced_strain_keys().iter().all(|&key| key == 10));
        assert_eq!(set.strain_markers.len(), 1);
        assert_eq!(set.annotations.len(), 2);
        assert_eq!(set.accessions[0].acc_id, "MGI:40");
        assert_eq!(set.accessions[0].private, Flag::NO);
        assert_eq!(set.accessions[1].acc_id, "JAX:012345");
        assert_eq!(set.accessions[1].numeric_part, Some(12345));
        assert_eq!(set.accessions[1].private, Flag::YES);
        // Only the mutant cell line note has text.
        assert_eq!(set.notes.len(), 1);
        assert_eq!(set.notes[0].note_type_key, constants.mutant_origin_note_type_key);
        assert_eq!(set.notes[0].note_key, 60);
        assert_eq!(set.len(), 7);
    }

    #[test]
    fn rename_keeps_old_name_as_synonym() {
        let constants = Constants::default();
        let emitter = Emitter::new(&constants, "03/01/2026");
        let mut keys = keys();

        let (set, statements) = emitter.emit_update(&update("New", true), &mut keys).unwrap();

        assert_eq!(set.strain_markers.len(), 2);
        assert_eq!(set.synonyms.len(), 1);
        assert_eq!(set.synonyms[0].synonym, "Old");
        assert_eq!(set.synonyms[0].synonym_key, 70);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].to_sql(),
            "update PRB_Strain set strain = 'New', standard = 1, private = 0, \
             _modifiedby_key = 1001, modification_date = now() where _Strain_key = 500;"
        );
        assert!(matches!(
            statements[1],
            UpdateStatement::AccessionPrivacy { private: Flag::NO, .. }
        ));
    }

    #[test]
    fn unchanged_name_and_no_sync_emit_only_the_strain_update() {
        let constants = Constants::default();
        let emitter = Emitter::new(&constants, "03/01/2026");
        let mut keys = keys();

        let (set, statements) = emitter.emit_update(&update("Old", false), &mut keys).unwrap();

        assert!(set.synonyms.is_empty());
        assert_eq!(statements.len(), 1);
        assert_eq!(keys.last_used(Counter::Synonym), None);
    }

    #[test]
    fn quotes_in_names_are_escaped() {
        let statement = UpdateStatement::Strain {
            strain_key: 1,
            name: "O'Hara".to_string(),
            standard: None,
            private: None,
            modified_by: 2,
        };
        assert_eq!(
            statement.to_sql(),
            "update PRB_Strain set strain = 'O''Hara', _modifiedby_key = 2, \
             modification_date = now() where _Strain_key = 1;"
        );
    }
}
