use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Surrogate key of a registry row.
pub type Key = i64;

/// 1-based line number within the input file.
pub type LineNo = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Create,
    Update,
    Curator,
}

impl Pipeline {
    pub fn field_count(&self) -> usize {
        match self {
            Pipeline::Create => 14,
            Pipeline::Update | Pipeline::Curator => 6,
        }
    }

    pub fn header_sentinel(&self) -> &'static str {
        match self {
            Pipeline::Create => "Strain ID",
            Pipeline::Update | Pipeline::Curator => "MGI:Strain ID",
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Pipeline::Update | Pipeline::Curator)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Create => write!(f, "create"),
            Pipeline::Update => write!(f, "update"),
            Pipeline::Curator => write!(f, "curator"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    Preview,
    Load,
}

impl LoadMode {
    pub fn is_sanity_check(&self) -> bool {
        matches!(self, LoadMode::Preview)
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Preview => write!(f, "preview"),
            LoadMode::Load => write!(f, "load"),
        }
    }
}

impl FromStr for LoadMode {
    type Err = LoadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "preview" => Ok(LoadMode::Preview),
            "load" => Ok(LoadMode::Load),
            other => Err(LoadError::InvalidMode(other.to_string())),
        }
    }
}

/// A `0`/`1` column such as standard or private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flag(bool);

impl Flag {
    pub const NO: Flag = Flag(false);
    pub const YES: Flag = Flag(true);

    pub fn is_set(&self) -> bool {
        self.0
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(self.0))
    }
}

impl FromStr for Flag {
    type Err = LoadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "0" => Ok(Flag(false)),
            "1" => Ok(Flag(true)),
            _ => Err(LoadError::InvalidFlag(value.to_string())),
        }
    }
}

static ACCESSION_PARTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\d+)$").expect("accession regex"));

/// An accession id split the way ACC_Accession stores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessionId {
    id: String,
    prefix: String,
    numeric: Option<u64>,
}

impl AccessionId {
    pub fn from_parts(prefix: &str, numeric: u64) -> Self {
        Self {
            id: format!("{prefix}{numeric}"),
            prefix: prefix.to_string(),
            numeric: Some(numeric),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn numeric(&self) -> Option<u64> {
        self.numeric
    }
}

impl fmt::Display for AccessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl FromStr for AccessionId {
    type Err = LoadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let id = value.trim();
        if id.is_empty() || id.contains('|') {
            return Err(LoadError::InvalidAccession(value.to_string()));
        }
        let (prefix, numeric) = match ACCESSION_PARTS.captures(id) {
            Some(caps) => {
                // Trailing digits must fit the numeric column.
                let numeric = caps[2]
                    .parse::<u64>()
                    .map_err(|_| LoadError::InvalidAccession(value.to_string()))?;
                (caps[1].to_string(), Some(numeric))
            }
            None => (id.to_string(), None),
        };
        Ok(Self {
            id: id.to_string(),
            prefix,
            numeric,
        })
    }
}

/// Splits a pipe-delimited cell, dropping empty entries.
pub fn split_pipe_list(value: &str) -> Vec<String> {
    value
        .split('|')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_flag() {
        assert_eq!("1".parse::<Flag>().unwrap(), Flag::YES);
        assert_eq!(" 0".parse::<Flag>().unwrap(), Flag::NO);
        assert_matches!("yes".parse::<Flag>(), Err(LoadError::InvalidFlag(_)));
    }

    #[test]
    fn accession_without_digits_keeps_whole_prefix() {
        let acc: AccessionId = "EMMA".parse().unwrap();
        assert_eq!(acc.prefix(), "EMMA");
        assert_eq!(acc.numeric(), None);
    }

    #[test]
    fn accession_digits_beyond_u64_are_rejected() {
        assert_matches!(
            "JAX:99999999999999999999999".parse::<AccessionId>(),
            Err(LoadError::InvalidAccession(_))
        );
    }

    #[test]
    fn pipe_list_skips_blanks() {
        assert_eq!(split_pipe_list("a||b|"), vec!["a", "b"]);
        assert!(split_pipe_list("").is_empty());
    }
}
