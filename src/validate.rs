use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::config::Constants;
use crate::domain::{AccessionId, Flag, Key, LineNo, Pipeline};
use crate::error::LoadError;
use crate::record::{CreateRecord, UpdateRecord};
use crate::resolver::ReferenceKind;
use crate::state::RunState;
use crate::store::RegistryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Line,
    ExternalId,
    StrainId,
    Name,
    Allele,
    StrainType,
    Species,
    Standard,
    Private,
    LogicalDb,
    MgiType,
    Attribute,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub line: LineNo,
    pub field: Field,
    pub severity: Severity,
    pub message: String,
    pub value: String,
}

impl ValidationFailure {
    pub fn fatal(line: LineNo, field: Field, message: impl Into<String>, value: &str) -> Self {
        Self {
            line,
            field,
            severity: Severity::Fatal,
            message: message.into(),
            value: value.to_string(),
        }
    }

    pub fn warning(line: LineNo, field: Field, message: impl Into<String>, value: &str) -> Self {
        Self {
            line,
            field,
            severity: Severity::Warning,
            message: message.into(),
            value: value.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.severity == Severity::Warning {
            f.write_str("Warning: ")?;
        }
        write!(f, "{} (row {}): {}", self.message, self.line, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAllele {
    pub acc_id: String,
    pub allele_key: Key,
    pub marker_key: Option<Key>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCreate {
    pub line: LineNo,
    pub external_id: AccessionId,
    pub name: String,
    pub alleles: Vec<ResolvedAllele>,
    pub strain_type_key: Key,
    pub species_key: Key,
    pub standard: Flag,
    pub private: Flag,
    pub origin_note: String,
    pub external_logical_db: Key,
    pub external_mgi_type: Key,
    pub attribute_keys: Vec<Key>,
    pub created_by: Key,
    pub mutant_note: String,
    pub colony_note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUpdate {
    pub line: LineNo,
    pub strain_key: Key,
    pub old_name: String,
    pub name: String,
    pub alleles: Vec<ResolvedAllele>,
    pub standard: Option<Flag>,
    pub private: Option<Flag>,
    pub modified_by: Key,
    pub sync_accession_privacy: bool,
}

/// A record that may be emitted, plus the non-blocking problems found on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checked<T> {
    pub record: T,
    pub failures: Vec<ValidationFailure>,
}

/// Which checks an update-shaped pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRules {
    pub unique_name: bool,
    pub strict_flags: bool,
    pub sync_accession_privacy: bool,
}

impl UpdateRules {
    pub fn for_pipeline(pipeline: Pipeline) -> Self {
        match pipeline {
            Pipeline::Curator => Self {
                unique_name: false,
                strict_flags: false,
                sync_accession_privacy: false,
            },
            Pipeline::Create | Pipeline::Update => Self {
                unique_name: true,
                strict_flags: true,
                sync_accession_privacy: true,
            },
        }
    }
}

pub struct Validator<'c> {
    constants: &'c Constants,
    rules: UpdateRules,
}

impl<'c> Validator<'c> {
    pub fn new(pipeline: Pipeline, constants: &'c Constants) -> Self {
        Self {
            constants,
            rules: UpdateRules::for_pipeline(pipeline),
        }
    }

    /// Checks a create line. Every problem is collected; the record is only
    /// returned when none of them is fatal.
    pub fn create<S: RegistryStore>(
        &self,
        record: &CreateRecord,
        store: &mut S,
        state: &mut RunState,
    ) -> Result<Result<Checked<ResolvedCreate>, Vec<ValidationFailure>>, LoadError> {
        let line = record.line;
        let mut failures = Vec::new();

        let external_id = match record.external_id.parse::<AccessionId>() {
            Ok(id) => Some(id),
            Err(_) => {
                failures.push(ValidationFailure::fatal(
                    line,
                    Field::ExternalId,
                    "Invalid Strain ID",
                    &record.external_id,
                ));
                None
            }
        };

        let name = record.name.trim();
        if name.is_empty() {
            failures.push(ValidationFailure::fatal(line, Field::Name, "Missing Strain Name", ""));
        } else if store.find_strain_by_name(name, None)?.is_some() {
            failures.push(ValidationFailure::fatal(
                line,
                Field::Name,
                "Strain Already Exists",
                name,
            ));
        } else if let Some(first) = state.claim_name(name, line) {
            failures.push(ValidationFailure::fatal(
                line,
                Field::Name,
                format!("Duplicate Strain Name in file, first seen row {first}"),
                name,
            ));
        }

        let strain_type_key = self.vocabulary_term(
            store,
            state,
            ReferenceKind::StrainType,
            Field::StrainType,
            &record.strain_type,
            line,
            &mut failures,
        )?;
        let species_key = self.vocabulary_term(
            store,
            state,
            ReferenceKind::Species,
            Field::Species,
            &record.species,
            line,
            &mut failures,
        )?;
        let created_by = self.user(store, state, &record.created_by, line, &mut failures)?;

        let standard = parse_flag(&record.standard, line, Field::Standard, &mut failures);
        let private = parse_flag(&record.private, line, Field::Private, &mut failures);
        let external_logical_db = parse_key(
            &record.external_logical_db,
            line,
            Field::LogicalDb,
            "Invalid External Logical DB",
            &mut failures,
        );
        let external_mgi_type = parse_key(
            &record.external_mgi_type,
            line,
            Field::MgiType,
            "Invalid External MGI Type",
            &mut failures,
        );

        let mut alleles: Vec<ResolvedAllele> = Vec::new();
        for acc_id in &record.allele_ids {
            if alleles.iter().any(|allele| &allele.acc_id == acc_id) {
                continue;
            }
            let Some(info) = state.resolver.allele(store, acc_id)? else {
                failures.push(ValidationFailure::fatal(
                    line,
                    Field::Allele,
                    "Invalid Allele",
                    acc_id,
                ));
                continue;
            };
            if let Some(failure) = self.status_violation(private, &info.status, acc_id, line) {
                failures.push(failure);
                continue;
            }
            alleles.push(ResolvedAllele {
                acc_id: acc_id.clone(),
                allele_key: info.allele_key,
                marker_key: info.marker_key,
            });
        }

        let mut attribute_keys = Vec::new();
        for term in &record.attributes {
            match state
                .resolver
                .resolve(store, ReferenceKind::StrainAttribute, term)?
            {
                Some(key) if !attribute_keys.contains(&key) => attribute_keys.push(key),
                Some(_) => {}
                None => failures.push(ValidationFailure::fatal(
                    line,
                    Field::Attribute,
                    "Invalid Strain Association Term",
                    term,
                )),
            }
        }

        if failures.iter().any(ValidationFailure::is_fatal) {
            debug!(line, failures = failures.len(), "create record rejected");
            return Ok(Err(failures));
        }

        // All fatal checks above pushed a failure whenever a value was missing.
        let (
            Some(external_id),
            Some(strain_type_key),
            Some(species_key),
            Some(created_by),
            Some(standard),
            Some(private),
            Some(external_logical_db),
            Some(external_mgi_type),
        ) = (
            external_id,
            strain_type_key,
            species_key,
            created_by,
            standard,
            private,
            external_logical_db,
            external_mgi_type,
        )
        else {
            return Ok(Err(failures));
        };

        Ok(Ok(Checked {
            record: ResolvedCreate {
                line,
                external_id,
                name: name.to_string(),
                alleles,
                strain_type_key,
                species_key,
                standard,
                private,
                origin_note: record.origin_note.clone(),
                external_logical_db,
                external_mgi_type,
                attribute_keys,
                created_by,
                mutant_note: record.mutant_note.clone(),
                colony_note: record.colony_note.clone(),
            },
            failures,
        }))
    }

    /// Checks an update or curator line. Problems with the strain, the user,
    /// the name or the flags reject the line; problems with a single allele
    /// only drop that allele. Every allele id is resolved either way.
    pub fn update<S: RegistryStore>(
        &self,
        record: &UpdateRecord,
        store: &mut S,
        state: &mut RunState,
    ) -> Result<Result<Checked<ResolvedUpdate>, Vec<ValidationFailure>>, LoadError> {
        let line = record.line;
        let mut failures = Vec::new();

        let strain = state.resolver.strain(store, record.strain_id.trim())?;
        if strain.is_none() {
            failures.push(ValidationFailure::fatal(
                line,
                Field::StrainId,
                "Invalid Strain",
                &record.strain_id,
            ));
        }

        let name = record.name.trim();
        if name.is_empty() {
            failures.push(ValidationFailure::fatal(line, Field::Name, "Missing Strain Name", ""));
        } else if self.rules.unique_name {
            let excluding = strain.as_ref().map(|strain| strain.key);
            if store.find_strain_by_name(name, excluding)?.is_some() {
                failures.push(ValidationFailure::fatal(
                    line,
                    Field::Name,
                    "Strain Name Already Exists",
                    name,
                ));
            } else if let Some(first) =
                excluding.and_then(|strain_key| state.claim_name_for(name, strain_key, line))
            {
                failures.push(ValidationFailure::fatal(
                    line,
                    Field::Name,
                    format!("Duplicate Strain Name in file, first seen row {first}"),
                    name,
                ));
            }
        }

        let modified_by = self.user(store, state, &record.modified_by, line, &mut failures)?;

        let (standard, private) = if self.rules.strict_flags {
            (
                parse_flag(&record.standard, line, Field::Standard, &mut failures),
                parse_flag(&record.private, line, Field::Private, &mut failures),
            )
        } else {
            (
                lenient_flag(&record.standard, line, Field::Standard, &mut failures),
                lenient_flag(&record.private, line, Field::Private, &mut failures),
            )
        };

        let target = match (strain, modified_by) {
            (Some(strain), Some(modified_by))
                if !failures.iter().any(ValidationFailure::is_fatal) =>
            {
                Some((strain, modified_by))
            }
            _ => None,
        };

        let mut alleles = Vec::new();
        for acc_id in &record.allele_ids {
            let Some(info) = state.resolver.allele(store, acc_id)? else {
                failures.push(ValidationFailure::fatal(
                    line,
                    Field::Allele,
                    "Invalid Allele",
                    acc_id,
                ));
                continue;
            };
            // Links are only checked for a line that will be emitted.
            let Some((strain, _)) = &target else {
                continue;
            };
            let linked_before = state.has_link(strain.key, info.allele_key)
                || store.strain_marker_exists(strain.key, info.allele_key)?;
            if linked_before {
                failures.push(ValidationFailure::warning(
                    line,
                    Field::Allele,
                    "This relationship already exists",
                    &format!("Strain:{}, Allele:{}", record.strain_id.trim(), acc_id),
                ));
                continue;
            }
            if let Some(failure) = self.status_violation(private, &info.status, acc_id, line) {
                failures.push(failure);
                continue;
            }
            state.claim_link(strain.key, info.allele_key);
            alleles.push(ResolvedAllele {
                acc_id: acc_id.clone(),
                allele_key: info.allele_key,
                marker_key: info.marker_key,
            });
        }

        let Some((strain, modified_by)) = target else {
            debug!(line, failures = failures.len(), "update record rejected");
            return Ok(Err(failures));
        };

        // A strain renamed earlier in this file keeps that name as its synonym.
        let old_name = state
            .assigned_name(strain.key)
            .map(str::to_string)
            .unwrap_or(strain.name);
        state.assign_name(strain.key, name);

        Ok(Ok(Checked {
            record: ResolvedUpdate {
                line,
                strain_key: strain.key,
                old_name,
                name: name.to_string(),
                alleles,
                standard,
                private,
                modified_by,
                sync_accession_privacy: self.rules.sync_accession_privacy,
            },
            failures,
        }))
    }

    // Non-private strains may only carry approved or autoloaded alleles.
    fn status_violation(
        &self,
        private: Option<Flag>,
        status: &str,
        acc_id: &str,
        line: LineNo,
    ) -> Option<ValidationFailure> {
        let private = private?;
        if private.is_set() || self.constants.is_approved_status(status) {
            return None;
        }
        Some(ValidationFailure::fatal(
            line,
            Field::Allele,
            "Invalid Allele ID/Private/Status",
            &format!("{acc_id},{private},{status}"),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn vocabulary_term<S: RegistryStore>(
        &self,
        store: &mut S,
        state: &RunState,
        kind: ReferenceKind,
        field: Field,
        term: &str,
        line: LineNo,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<Option<Key>, LoadError> {
        let key = state.resolver.resolve(store, kind, term)?;
        if key.is_none() {
            failures.push(ValidationFailure::fatal(
                line,
                field,
                format!("Invalid {kind}"),
                term,
            ));
        }
        Ok(key)
    }

    fn user<S: RegistryStore>(
        &self,
        store: &mut S,
        state: &RunState,
        login: &str,
        line: LineNo,
        failures: &mut Vec<ValidationFailure>,
    ) -> Result<Option<Key>, LoadError> {
        let key = state.resolver.user(store, login)?;
        if key.is_none() {
            failures.push(ValidationFailure::fatal(line, Field::User, "Invalid User", login));
        }
        Ok(key)
    }
}

fn parse_flag(
    value: &str,
    line: LineNo,
    field: Field,
    failures: &mut Vec<ValidationFailure>,
) -> Option<Flag> {
    match value.parse::<Flag>() {
        Ok(flag) => Some(flag),
        Err(_) => {
            let label = match field {
                Field::Standard => "Invalid Is-Standard",
                _ => "Invalid Is-Private",
            };
            failures.push(ValidationFailure::fatal(line, field, label, value));
            None
        }
    }
}

// Curator files may leave a flag blank or garbled; the column is then left
// as it is.
fn lenient_flag(
    value: &str,
    line: LineNo,
    field: Field,
    failures: &mut Vec<ValidationFailure>,
) -> Option<Flag> {
    let flag = value.parse::<Flag>().ok();
    if flag.is_none() {
        failures.push(ValidationFailure::warning(
            line,
            field,
            "Flag left unchanged",
            value,
        ));
    }
    flag
}

fn parse_key(
    value: &str,
    line: LineNo,
    field: Field,
    message: &str,
    failures: &mut Vec<ValidationFailure>,
) -> Option<Key> {
    match value.trim().parse::<Key>() {
        Ok(key) => Some(key),
        Err(_) => {
            failures.push(ValidationFailure::fatal(line, field, message, value));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    use super::*;
    use crate::resolver::ReferenceResolver;
    use crate::store::{AccessionEntry, AlleleInfo, Snapshot, SnapshotStore, StrainEntry};

    fn store() -> SnapshotStore {
        let mut snapshot = Snapshot::default();
        snapshot.users.insert("jdoe".to_string(), 1001);
        snapshot.alleles.insert(
            "MGI:1".to_string(),
            AlleleInfo {
                allele_key: 1,
                marker_key: None,
                status_key: 1,
                status: "Approved".to_string(),
            },
        );
        snapshot.alleles.insert(
            "MGI:2".to_string(),
            AlleleInfo {
                allele_key: 2,
                marker_key: Some(20),
                status_key: 2,
                status: "In Progress".to_string(),
            },
        );
        snapshot.strains.push(StrainEntry {
            key: 10,
            name: "A/J".to_string(),
            standard: Flag::YES,
            private: Flag::NO,
            modified_by: None,
        });
        snapshot.accessions.push(AccessionEntry {
            acc_id: "MGI:10".to_string(),
            logical_db_key: 1,
            object_key: 10,
            mgi_type_key: 10,
            private: Flag::NO,
        });
        SnapshotStore::new(snapshot, Constants::default())
    }

    fn state(store: &mut SnapshotStore) -> RunState {
        let resolver = ReferenceResolver::load(store, &Constants::default()).unwrap();
        RunState::new(resolver, None, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
    }

    fn update(allele_ids: &[&str], private: &str) -> UpdateRecord {
        UpdateRecord {
            line: 4,
            strain_id: "MGI:10".to_string(),
            allele_ids: allele_ids.iter().map(|id| id.to_string()).collect(),
            name: "A/J".to_string(),
            standard: "1".to_string(),
            private: private.to_string(),
            modified_by: "jdoe".to_string(),
        }
    }

    #[test]
    fn create_collects_every_failure() {
        let constants = Constants::default();
        let validator = Validator::new(Pipeline::Create, &constants);
        let mut store = store();
        let mut state = state(&mut store);
        let record = CreateRecord {
            line: 2,
            external_id: "".to_string(),
            name: "A/J".to_string(),
            allele_ids: vec!["MGI:404".to_string()],
            strain_type: "inbred".to_string(),
            species: "mouse".to_string(),
            standard: "yes".to_string(),
            origin_note: String::new(),
            external_logical_db: "22".to_string(),
            external_mgi_type: "10".to_string(),
            attributes: Vec::new(),
            created_by: "jdoe".to_string(),
            mutant_note: String::new(),
            private: "0".to_string(),
            colony_note: String::new(),
        };

        let failures = validator
            .create(&record, &mut store, &mut state)
            .unwrap()
            .unwrap_err();
        let fields: Vec<Field> = failures.iter().map(|failure| failure.field).collect();
        assert_eq!(
            fields,
            vec![
                Field::ExternalId,
                Field::Name,
                Field::StrainType,
                Field::Species,
                Field::Standard,
                Field::Allele,
            ]
        );
        assert!(failures.iter().all(ValidationFailure::is_fatal));
    }

    #[test]
    fn status_failure_drops_only_that_allele() {
        let constants = Constants::default();
        let validator = Validator::new(Pipeline::Update, &constants);
        let mut store = store();
        let mut state = state(&mut store);

        let checked = validator
            .update(&update(&["MGI:1", "MGI:2"], "0"), &mut store, &mut state)
            .unwrap()
            .unwrap();

        assert_eq!(checked.record.alleles.len(), 1);
        assert_eq!(checked.record.alleles[0].acc_id, "MGI:1");
        assert_matches!(
            checked.failures.as_slice(),
            [failure] if failure.is_fatal() && failure.value == "MGI:2,0,In Progress"
        );
    }

    #[test]
    fn private_strain_may_carry_any_status() {
        let constants = Constants::default();
        let validator = Validator::new(Pipeline::Update, &constants);
        let mut store = store();
        let mut state = state(&mut store);

        let checked = validator
            .update(&update(&["MGI:2"], "1"), &mut store, &mut state)
            .unwrap()
            .unwrap();
        assert_eq!(checked.record.alleles.len(), 1);
        assert!(checked.failures.is_empty());
        assert!(checked.record.sync_accession_privacy);
    }

    #[test]
    fn update_rejects_bad_flag_but_curator_tolerates_it() {
        let constants = Constants::default();
        let mut store = store();

        let mut state = state(&mut store);
        let strict = Validator::new(Pipeline::Update, &constants);
        let failures = strict
            .update(&update(&[], "maybe"), &mut store, &mut state)
            .unwrap()
            .unwrap_err();
        assert_eq!(failures[0].message, "Invalid Is-Private");

        let mut state = self::state(&mut store);
        let lenient = Validator::new(Pipeline::Curator, &constants);
        let checked = lenient
            .update(&update(&[], "maybe"), &mut store, &mut state)
            .unwrap()
            .unwrap();
        assert_eq!(checked.record.private, None);
        assert_eq!(checked.record.standard, Some(Flag::YES));
        assert_eq!(checked.failures[0].severity, Severity::Warning);
        assert!(!checked.record.sync_accession_privacy);
    }

    #[test]
    fn warning_lines_are_prefixed() {
        let failure = ValidationFailure::warning(3, Field::Allele, "Already linked", "MGI:1");
        assert_eq!(failure.to_string(), "Warning: Already linked (row 3): MGI:1");
    }
}
