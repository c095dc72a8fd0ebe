use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{Key, LoadMode};
use crate::error::LoadError;

pub const DEFAULT_CONFIG_FILE: &str = "strainload.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub bcp_command: Option<String>,
    #[serde(default)]
    pub snapshot: Option<String>,
    #[serde(default)]
    pub constants: Option<Constants>,
}

/// Registry keys the loaders stamp onto generated rows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Constants {
    pub species_vocab_key: Key,
    pub strain_type_vocab_key: Key,
    pub strain_attribute_vocab_key: Key,
    pub strain_mgi_type_key: Key,
    pub allele_mgi_type_key: Key,
    pub mgi_logical_db_key: Key,
    pub mgi_prefix: String,
    pub nomenclature_qualifier_key: Key,
    pub strain_annot_type_key: Key,
    pub no_qualifier_key: Key,
    pub note_mgi_type_key: Key,
    pub origin_note_type_key: Key,
    pub mutant_origin_note_type_key: Key,
    pub impc_colony_note_type_key: Key,
    pub synonym_type_key: Key,
    pub approved_allele_statuses: Vec<String>,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            species_vocab_key: 26,
            strain_type_vocab_key: 55,
            strain_attribute_vocab_key: 27,
            strain_mgi_type_key: 10,
            allele_mgi_type_key: 11,
            mgi_logical_db_key: 1,
            mgi_prefix: "MGI:".to_string(),
            nomenclature_qualifier_key: 615427,
            strain_annot_type_key: 1009,
            no_qualifier_key: 1614158,
            note_mgi_type_key: 10,
            origin_note_type_key: 1011,
            mutant_origin_note_type_key: 1038,
            impc_colony_note_type_key: 1012,
            synonym_type_key: 1001,
            approved_allele_statuses: vec!["Approved".to_string(), "Autoloaded".to_string()],
        }
    }
}

impl Constants {
    pub fn is_approved_status(&self, status: &str) -> bool {
        self.approved_allele_statuses
            .iter()
            .any(|approved| approved == status)
    }
}

/// Values normally handed to the loader through its shell environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub input_file: Option<String>,
    pub log_diag: Option<String>,
    pub log_error: Option<String>,
    pub output_dir: Option<String>,
    pub pg_dbutils: Option<String>,
    pub server: Option<String>,
    pub database: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
        Self {
            input_file: var("INPUT_FILE_DEFAULT"),
            log_diag: var("LOG_DIAG"),
            log_error: var("LOG_ERROR"),
            output_dir: var("OUTPUTDIR"),
            pg_dbutils: var("PG_DBUTILS"),
            server: var("MGD_DBSERVER"),
            database: var("MGD_DBNAME"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_dir: Option<String>,
    pub snapshot: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub server: String,
    pub database: String,
    pub output_dir: Utf8PathBuf,
    pub bcp_command: Option<Utf8PathBuf>,
    pub snapshot: Option<Utf8PathBuf>,
    pub log_diag: Option<Utf8PathBuf>,
    pub log_error: Option<Utf8PathBuf>,
    pub input_default: Option<Utf8PathBuf>,
    pub constants: Constants,
}

impl ResolvedConfig {
    /// Diagnostics and error stream locations for a run over `input`.
    pub fn log_paths(&self, input: &Utf8Path, mode: LoadMode) -> (Utf8PathBuf, Utf8PathBuf) {
        if mode.is_sanity_check() {
            return (
                Utf8PathBuf::from(format!("{input}.diagnostics")),
                Utf8PathBuf::from(format!("{input}.error")),
            );
        }
        let diag = self
            .log_diag
            .clone()
            .unwrap_or_else(|| self.output_dir.join("strainload.diag.log"));
        let error = self
            .log_error
            .clone()
            .unwrap_or_else(|| self.output_dir.join("strainload.error.log"));
        (diag, error)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        env: EnvOverrides,
        cli: CliOverrides,
    ) -> Result<ResolvedConfig, LoadError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        // Without an explicit path the config file is optional.
        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| LoadError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| LoadError::ConfigParse(err.to_string()))?
        };

        Ok(Self::resolve_config(config, env, cli))
    }

    pub fn resolve_config(config: Config, env: EnvOverrides, cli: CliOverrides) -> ResolvedConfig {
        let output_dir = cli
            .output_dir
            .or(env.output_dir)
            .or(config.output_dir)
            .unwrap_or_else(|| ".".to_string());
        let bcp_command = env
            .pg_dbutils
            .map(|dir| Utf8PathBuf::from(dir).join("bin").join("bcpin.csh"))
            .or(config.bcp_command.map(Utf8PathBuf::from));

        ResolvedConfig {
            server: env
                .server
                .or(config.server)
                .unwrap_or_else(|| "localhost".to_string()),
            database: env
                .database
                .or(config.database)
                .unwrap_or_else(|| "mgd".to_string()),
            output_dir: Utf8PathBuf::from(output_dir),
            bcp_command,
            snapshot: cli.snapshot.or(config.snapshot).map(Utf8PathBuf::from),
            log_diag: env.log_diag.map(Utf8PathBuf::from),
            log_error: env.log_error.map(Utf8PathBuf::from),
            input_default: env.input_file.map(Utf8PathBuf::from),
            constants: config.constants.unwrap_or_default(),
        }
    }
}
