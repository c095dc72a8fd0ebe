use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::config::Constants;
use crate::domain::Key;
use crate::error::LoadError;
use crate::store::{AlleleInfo, ExistingStrain, RegistryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Species,
    StrainType,
    StrainAttribute,
    Allele,
    StrainByName,
    StrainByAccession,
    User,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReferenceKind::Species => "Species",
            ReferenceKind::StrainType => "Strain Type",
            ReferenceKind::StrainAttribute => "Strain Association Term",
            ReferenceKind::Allele => "Allele",
            ReferenceKind::StrainByName => "Strain",
            ReferenceKind::StrainByAccession => "Strain",
            ReferenceKind::User => "User",
        };
        f.write_str(label)
    }
}

/// An immutable term -> key map for one controlled vocabulary.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    terms: HashMap<String, Key>,
}

impl Vocabulary {
    pub fn load<S: RegistryStore>(store: &mut S, vocab_key: Key) -> Result<Self, LoadError> {
        let terms = store.vocabulary(vocab_key)?;
        debug!(vocab_key, terms = terms.len(), "loaded vocabulary");
        Ok(Self::from_terms(terms))
    }

    pub fn from_terms(terms: impl IntoIterator<Item = (String, Key)>) -> Self {
        Self {
            terms: terms.into_iter().collect(),
        }
    }

    pub fn get(&self, term: &str) -> Option<Key> {
        self.terms.get(term).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Resolves natural keys to registry keys. Vocabularies are loaded once up
/// front; entity lookups go to the store every time.
#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    species: Vocabulary,
    strain_types: Vocabulary,
    attributes: Vocabulary,
}

impl ReferenceResolver {
    pub fn load<S: RegistryStore>(store: &mut S, constants: &Constants) -> Result<Self, LoadError> {
        Ok(Self {
            species: Vocabulary::load(store, constants.species_vocab_key)?,
            strain_types: Vocabulary::load(store, constants.strain_type_vocab_key)?,
            attributes: Vocabulary::load(store, constants.strain_attribute_vocab_key)?,
        })
    }

    pub fn from_vocabularies(
        species: Vocabulary,
        strain_types: Vocabulary,
        attributes: Vocabulary,
    ) -> Self {
        Self {
            species,
            strain_types,
            attributes,
        }
    }

    pub fn vocabulary(&self, kind: ReferenceKind) -> Option<&Vocabulary> {
        match kind {
            ReferenceKind::Species => Some(&self.species),
            ReferenceKind::StrainType => Some(&self.strain_types),
            ReferenceKind::StrainAttribute => Some(&self.attributes),
            _ => None,
        }
    }

    /// Resolves `natural_key` of `kind` to its surrogate key, `None` when absent.
    pub fn resolve<S: RegistryStore>(
        &self,
        store: &mut S,
        kind: ReferenceKind,
        natural_key: &str,
    ) -> Result<Option<Key>, LoadError> {
        if let Some(vocabulary) = self.vocabulary(kind) {
            return Ok(vocabulary.get(natural_key));
        }
        match kind {
            ReferenceKind::Allele => Ok(self.allele(store, natural_key)?.map(|a| a.allele_key)),
            ReferenceKind::StrainByName => store.find_strain_by_name(natural_key, None),
            ReferenceKind::StrainByAccession => {
                Ok(self.strain(store, natural_key)?.map(|strain| strain.key))
            }
            ReferenceKind::User => self.user(store, natural_key),
            ReferenceKind::Species | ReferenceKind::StrainType | ReferenceKind::StrainAttribute => {
                Ok(None)
            }
        }
    }

    pub fn allele<S: RegistryStore>(
        &self,
        store: &mut S,
        acc_id: &str,
    ) -> Result<Option<AlleleInfo>, LoadError> {
        store.find_allele(acc_id)
    }

    pub fn strain<S: RegistryStore>(
        &self,
        store: &mut S,
        acc_id: &str,
    ) -> Result<Option<ExistingStrain>, LoadError> {
        store.find_strain_by_accession(acc_id)
    }

    pub fn user<S: RegistryStore>(&self, store: &mut S, login: &str) -> Result<Option<Key>, LoadError> {
        if login.trim().is_empty() {
            return Ok(None);
        }
        store.find_user(login.trim())
    }
}
