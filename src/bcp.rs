use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::domain::Key;
use crate::emit::{OutputSet, UpdateStatement};
use crate::error::LoadError;
use crate::keys::Counter;
use crate::rows::Table;
use crate::store::{AlleleInfo, ExistingStrain, RegistryStore};

/// Opaque bulk insertion of a delimited file into a table.
pub trait BulkLoader {
    /// Returns the number of rows the loader accepted.
    fn load(&mut self, table: Table, file: &Utf8Path) -> Result<usize, LoadError>;
}

/// Runs the external `bcpin.csh` script once per table.
#[derive(Debug, Clone)]
pub struct CommandBulkLoader {
    program: Utf8PathBuf,
    server: String,
    database: String,
    schema: String,
}

impl CommandBulkLoader {
    pub fn new(program: Utf8PathBuf, server: &str, database: &str) -> Self {
        Self {
            program,
            server: server.to_string(),
            database: database.to_string(),
            schema: "mgd".to_string(),
        }
    }

    pub fn args(&self, table: Table, file: &Utf8Path) -> Vec<String> {
        let dir = file
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        vec![
            self.server.clone(),
            self.database.clone(),
            table.name().to_string(),
            dir.to_string(),
            file.file_name().unwrap_or_default().to_string(),
            "|".to_string(),
            "\\n".to_string(),
            self.schema.clone(),
        ]
    }

    pub fn command_line(&self, table: Table, file: &Utf8Path) -> String {
        let mut line = self.program.to_string();
        for arg in self.args(table, file) {
            line.push(' ');
            if arg == "|" || arg == "\\n" {
                line.push_str(&format!("\"{arg}\""));
            } else {
                line.push_str(&arg);
            }
        }
        line
    }
}

impl BulkLoader for CommandBulkLoader {
    fn load(&mut self, table: Table, file: &Utf8Path) -> Result<usize, LoadError> {
        if !self.program.as_std_path().exists() {
            return Err(LoadError::MissingTool(self.program.to_string()));
        }
        let rows = count_rows(file)?;
        info!(command = %self.command_line(table, file), "running bulk loader");
        let output = Command::new(self.program.as_std_path())
            .args(self.args(table, file))
            .output()
            .map_err(|err| LoadError::BulkLoad {
                table: table.to_string(),
                message: err.to_string(),
            })?;
        if output.status.success() {
            return Ok(rows);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", self.program)
        } else {
            stderr
        };
        Err(LoadError::BulkLoad {
            table: table.to_string(),
            message,
        })
    }
}

/// A registry whose tables are filled by an external bulk loader instead of
/// by the store itself.
pub struct ExternalLoad<S, L> {
    store: S,
    loader: L,
}

impl<S, L> ExternalLoad<S, L> {
    pub fn new(store: S, loader: L) -> Self {
        Self { store, loader }
    }
}

impl<S: RegistryStore, L> RegistryStore for ExternalLoad<S, L> {
    fn vocabulary(&mut self, vocab_key: Key) -> Result<Vec<(String, Key)>, LoadError> {
        self.store.vocabulary(vocab_key)
    }

    fn find_allele(&mut self, acc_id: &str) -> Result<Option<AlleleInfo>, LoadError> {
        self.store.find_allele(acc_id)
    }

    fn find_strain_by_name(
        &mut self,
        name: &str,
        excluding: Option<Key>,
    ) -> Result<Option<Key>, LoadError> {
        self.store.find_strain_by_name(name, excluding)
    }

    fn find_strain_by_accession(
        &mut self,
        acc_id: &str,
    ) -> Result<Option<ExistingStrain>, LoadError> {
        self.store.find_strain_by_accession(acc_id)
    }

    fn strain_marker_exists(&mut self, strain_key: Key, allele_key: Key) -> Result<bool, LoadError> {
        self.store.strain_marker_exists(strain_key, allele_key)
    }

    fn find_user(&mut self, login: &str) -> Result<Option<Key>, LoadError> {
        self.store.find_user(login)
    }

    fn reserve(&mut self, counter: Counter) -> Result<Key, LoadError> {
        self.store.reserve(counter)
    }

    fn resync(&mut self, counter: Counter, last_used: Key) -> Result<(), LoadError> {
        self.store.resync(counter, last_used)
    }

    fn execute_updates(&mut self, statements: &[UpdateStatement]) -> Result<(), LoadError> {
        self.store.execute_updates(statements)
    }

    fn commit(&mut self) -> Result<(), LoadError> {
        self.store.commit()
    }
}

impl<S, L: BulkLoader> BulkLoader for ExternalLoad<S, L> {
    fn load(&mut self, table: Table, file: &Utf8Path) -> Result<usize, LoadError> {
        self.loader.load(table, file)
    }
}

fn count_rows(file: &Utf8Path) -> Result<usize, LoadError> {
    let content = fs::read_to_string(file.as_std_path())
        .map_err(|err| LoadError::Filesystem(format!("read {file}: {err}")))?;
    Ok(content.lines().filter(|line| !line.is_empty()).count())
}

struct Stream {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

/// Append-only bcp files, one per table, under an output directory.
pub struct RowStreams {
    streams: BTreeMap<Table, Stream>,
}

impl RowStreams {
    pub fn create(output_dir: &Utf8Path, tables: &[Table]) -> Result<Self, LoadError> {
        fs::create_dir_all(output_dir.as_std_path())
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        let mut streams = BTreeMap::new();
        for &table in tables {
            let path = output_dir.join(table.file_name());
            let file = File::create(path.as_std_path())
                .map_err(|err| LoadError::Filesystem(format!("could not open {path}: {err}")))?;
            streams.insert(
                table,
                Stream {
                    path,
                    writer: BufWriter::new(file),
                    rows: 0,
                },
            );
        }
        Ok(Self { streams })
    }

    /// Writes every row of one record's output set.
    pub fn append(&mut self, set: &OutputSet) -> Result<(), LoadError> {
        for (table, line) in set.encoded() {
            let stream = self
                .streams
                .get_mut(&table)
                .ok_or_else(|| LoadError::Filesystem(format!("no output stream for {table}")))?;
            stream
                .writer
                .write_all(line.as_bytes())
                .and_then(|_| stream.writer.write_all(b"\n"))
                .map_err(|err| LoadError::Filesystem(format!("write {}: {err}", stream.path)))?;
            stream.rows += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LoadError> {
        for stream in self.streams.values_mut() {
            stream
                .writer
                .flush()
                .map_err(|err| LoadError::Filesystem(format!("flush {}: {err}", stream.path)))?;
        }
        Ok(())
    }

    pub fn rows(&self, table: Table) -> usize {
        self.streams.get(&table).map(|stream| stream.rows).unwrap_or(0)
    }

    pub fn row_counts(&self) -> BTreeMap<Table, usize> {
        self.streams
            .iter()
            .map(|(table, stream)| (*table, stream.rows))
            .collect()
    }

    /// Flushes and hands each non-empty file to `loader`, in table order.
    pub fn load_into<L: BulkLoader + ?Sized>(
        &mut self,
        loader: &mut L,
        mut on_load: impl FnMut(Table, &Utf8Path),
    ) -> Result<BTreeMap<Table, usize>, LoadError> {
        self.flush()?;
        let mut loaded = BTreeMap::new();
        for (table, stream) in &self.streams {
            if stream.rows == 0 {
                continue;
            }
            on_load(*table, &stream.path);
            let rows = loader.load(*table, &stream.path)?;
            info!(%table, rows, "bulk loaded");
            loaded.insert(*table, rows);
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_matches_bcpin_convention() {
        let loader = CommandBulkLoader::new(
            Utf8PathBuf::from("/opt/pgdbutils/bin/bcpin.csh"),
            "db-server",
            "mgd",
        );
        let line = loader.command_line(Table::Strain, Utf8Path::new("/data/out/PRB_Strain.bcp"));
        assert_eq!(
            line,
            "/opt/pgdbutils/bin/bcpin.csh db-server mgd PRB_Strain /data/out PRB_Strain.bcp \"|\" \"\\n\" mgd"
        );
    }

    struct Counting(Vec<Table>);

    impl BulkLoader for Counting {
        fn load(&mut self, table: Table, _file: &Utf8Path) -> Result<usize, LoadError> {
            self.0.push(table);
            Ok(1)
        }
    }

    #[test]
    fn streams_skip_empty_tables_when_loading() {
        let dir = tempfile::tempdir().unwrap();
        let out = Utf8Path::from_path(dir.path()).unwrap();
        let mut streams = RowStreams::create(out, &[Table::Strain, Table::Note]).unwrap();
        let set = OutputSet {
            strain_key: 7,
            strains: vec![crate::rows::StrainRow {
                strain_key: 7,
                species_key: 1,
                strain_type_key: 2,
                name: "B6".to_string(),
                standard: crate::domain::Flag::YES,
                private: crate::domain::Flag::NO,
                genetic_background: crate::domain::Flag::NO,
                created_by: 1000,
                modified_by: 1000,
                date: "01/02/2026".to_string(),
            }],
            ..OutputSet::default()
        };
        streams.append(&set).unwrap();

        let mut loader = Counting(Vec::new());
        let mut announced = Vec::new();
        let loaded = streams
            .load_into(&mut loader, |table, _| announced.push(table))
            .unwrap();

        assert_eq!(loader.0, vec![Table::Strain]);
        assert_eq!(announced, vec![Table::Strain]);
        assert_eq!(loaded.get(&Table::Strain), Some(&1));
        let written = fs::read_to_string(out.join("PRB_Strain.bcp")).unwrap();
        assert_eq!(written, "7|1|2|B6|1|0|0|1000|1000|01/02/2026|01/02/2026\n");
        assert_eq!(streams.rows(Table::Note), 0);
    }

    #[test]
    fn missing_script_is_reported() {
        let mut loader =
            CommandBulkLoader::new(Utf8PathBuf::from("/nonexistent/bcpin.csh"), "s", "d");
        let err = loader
            .load(Table::Note, Utf8Path::new("MGI_Note.bcp"))
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingTool(_)));
    }
}
