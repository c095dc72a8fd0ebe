use std::fs;

use camino::Utf8Path;

use crate::domain::{LineNo, Pipeline, split_pipe_list};
use crate::error::LoadError;

/// One line of a create file, still untyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRecord {
    pub line: LineNo,
    pub external_id: String,
    pub name: String,
    pub allele_ids: Vec<String>,
    pub strain_type: String,
    pub species: String,
    pub standard: String,
    pub origin_note: String,
    pub external_logical_db: String,
    pub external_mgi_type: String,
    pub attributes: Vec<String>,
    pub created_by: String,
    pub mutant_note: String,
    pub private: String,
    pub colony_note: String,
}

/// One line of an update or curator file, still untyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub line: LineNo,
    pub strain_id: String,
    pub allele_ids: Vec<String>,
    pub name: String,
    pub standard: String,
    pub private: String,
    pub modified_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Header,
    Blank,
    Create(CreateRecord),
    Update(UpdateRecord),
    Malformed { line: LineNo, text: String },
}

/// Reads the whole input as Latin-1 text.
pub fn read_input(path: &Utf8Path) -> Result<String, LoadError> {
    let bytes = fs::read(path.as_std_path())
        .map_err(|_| LoadError::MissingInput(path.as_std_path().to_path_buf()))?;
    Ok(decode_latin1(&bytes))
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

pub fn parse_line(pipeline: Pipeline, line: LineNo, text: &str) -> ParsedLine {
    let text = text.strip_suffix('\n').unwrap_or(text);
    let text = text.strip_suffix('\r').unwrap_or(text);
    if text.trim().is_empty() {
        return ParsedLine::Blank;
    }

    let tokens: Vec<&str> = text.split('\t').collect();
    if tokens.len() < pipeline.field_count() {
        return ParsedLine::Malformed {
            line,
            text: text.to_string(),
        };
    }
    if tokens[0] == pipeline.header_sentinel() {
        return ParsedLine::Header;
    }

    match pipeline {
        Pipeline::Create => ParsedLine::Create(CreateRecord {
            line,
            external_id: tokens[0].to_string(),
            name: tokens[1].to_string(),
            allele_ids: split_pipe_list(tokens[2]),
            strain_type: tokens[3].to_string(),
            species: tokens[4].to_string(),
            standard: tokens[5].to_string(),
            origin_note: tokens[6].to_string(),
            external_logical_db: tokens[7].to_string(),
            external_mgi_type: tokens[8].to_string(),
            attributes: split_pipe_list(tokens[9]),
            created_by: tokens[10].to_string(),
            mutant_note: tokens[11].to_string(),
            private: tokens[12].to_string(),
            colony_note: tokens[13].to_string(),
        }),
        Pipeline::Update | Pipeline::Curator => ParsedLine::Update(UpdateRecord {
            line,
            strain_id: tokens[0].to_string(),
            allele_ids: split_pipe_list(tokens[1]),
            name: tokens[2].to_string(),
            standard: tokens[3].to_string(),
            private: tokens[4].to_string(),
            modified_by: tokens[5].to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn latin1_bytes_map_to_code_points() {
        assert_eq!(decode_latin1(b"caf\xe9"), "café");
    }

    #[test]
    fn short_line_is_malformed() {
        let parsed = parse_line(Pipeline::Update, 4, "MGI:1\tMGI:2\tname\n");
        assert_matches!(parsed, ParsedLine::Malformed { line: 4, .. });
    }

    #[test]
    fn header_is_recognised_per_pipeline() {
        let header = "MGI:Strain ID\tAllele\tName\tStandard\tPrivate\tModified By";
        assert_eq!(parse_line(Pipeline::Curator, 1, header), ParsedLine::Header);
        assert_matches!(
            parse_line(Pipeline::Create, 1, header),
            ParsedLine::Malformed { .. }
        );
    }
}
