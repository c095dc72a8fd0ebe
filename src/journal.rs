use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

use camino::Utf8Path;

use crate::bcp::BulkLoader;
use crate::domain::Key;
use crate::emit::UpdateStatement;
use crate::error::LoadError;
use crate::keys::Counter;
use crate::rows::Table;
use crate::store::{AlleleInfo, ExistingStrain, RegistryStore};

/// Line-oriented text sink used for the diagnostics and error streams.
pub struct Journal {
    sink: Box<dyn Write>,
}

impl Journal {
    pub fn open(path: &Utf8Path, append: bool) -> Result<Self, LoadError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        }
        let file: File = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path.as_std_path())
            .map_err(|err| LoadError::Filesystem(format!("could not open {path}: {err}")))?;
        Ok(Self {
            sink: Box::new(io::BufWriter::new(file)),
        })
    }

    pub fn from_writer(writer: impl Write + 'static) -> Self {
        Self {
            sink: Box::new(writer),
        }
    }

    pub fn discard() -> Self {
        Self::from_writer(io::sink())
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> Result<(), LoadError> {
        self.sink
            .write_all(text.as_ref().as_bytes())
            .and_then(|_| self.sink.write_all(b"\n"))
            .map_err(|err| LoadError::Filesystem(err.to_string()))
    }

    pub fn flush(&mut self) -> Result<(), LoadError> {
        self.sink
            .flush()
            .map_err(|err| LoadError::Filesystem(err.to_string()))
    }
}

/// Echoes every registry operation to the diagnostics journal before
/// delegating it.
pub struct JournaledStore<'a, S> {
    inner: &'a mut S,
    journal: &'a mut Journal,
}

impl<'a, S> JournaledStore<'a, S> {
    pub fn new(inner: &'a mut S, journal: &'a mut Journal) -> Self {
        Self { inner, journal }
    }

    pub fn journal(&mut self) -> &mut Journal {
        self.journal
    }
}

impl<S: RegistryStore> RegistryStore for JournaledStore<'_, S> {
    fn vocabulary(&mut self, vocab_key: Key) -> Result<Vec<(String, Key)>, LoadError> {
        self.journal
            .line(format!("select _Term_key, term from VOC_Term where _Vocab_key = {vocab_key}"))?;
        self.inner.vocabulary(vocab_key)
    }

    fn find_allele(&mut self, acc_id: &str) -> Result<Option<AlleleInfo>, LoadError> {
        self.journal.line(format!("lookup allele accid = '{acc_id}'"))?;
        self.inner.find_allele(acc_id)
    }

    fn find_strain_by_name(
        &mut self,
        name: &str,
        excluding: Option<Key>,
    ) -> Result<Option<Key>, LoadError> {
        match excluding {
            Some(key) => self
                .journal
                .line(format!("lookup strain = '{name}' and _Strain_key != {key}"))?,
            None => self.journal.line(format!("lookup strain = '{name}'"))?,
        }
        self.inner.find_strain_by_name(name, excluding)
    }

    fn find_strain_by_accession(
        &mut self,
        acc_id: &str,
    ) -> Result<Option<ExistingStrain>, LoadError> {
        self.journal.line(format!("lookup strain accid = '{acc_id}'"))?;
        self.inner.find_strain_by_accession(acc_id)
    }

    fn strain_marker_exists(&mut self, strain_key: Key, allele_key: Key) -> Result<bool, LoadError> {
        self.journal.line(format!(
            "lookup PRB_Strain_Marker _Strain_key = {strain_key} and _Allele_key = {allele_key}"
        ))?;
        self.inner.strain_marker_exists(strain_key, allele_key)
    }

    fn find_user(&mut self, login: &str) -> Result<Option<Key>, LoadError> {
        self.journal.line(format!("lookup user login = '{login}'"))?;
        self.inner.find_user(login)
    }

    fn reserve(&mut self, counter: Counter) -> Result<Key, LoadError> {
        self.journal.line(format!("select nextval('{counter}')"))?;
        self.inner.reserve(counter)
    }

    fn resync(&mut self, counter: Counter, last_used: Key) -> Result<(), LoadError> {
        self.journal
            .line(format!("select setval('{counter}', {last_used})"))?;
        self.inner.resync(counter, last_used)
    }

    fn execute_updates(&mut self, statements: &[UpdateStatement]) -> Result<(), LoadError> {
        self.journal.line("running updateSQL...")?;
        for statement in statements {
            self.journal.line(statement.to_sql())?;
        }
        self.inner.execute_updates(statements)
    }

    fn commit(&mut self) -> Result<(), LoadError> {
        self.journal.line("commit")?;
        self.inner.commit()
    }
}

impl<S: BulkLoader> BulkLoader for JournaledStore<'_, S> {
    fn load(&mut self, table: Table, file: &Utf8Path) -> Result<usize, LoadError> {
        self.journal.line(format!("bcp {table} from {file}"))?;
        self.inner.load(table, file)
    }
}
