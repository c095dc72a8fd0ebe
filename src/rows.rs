use std::fmt;

use serde::Serialize;

use crate::domain::{Flag, Key};

pub const FIELD_DELIMITER: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Table {
    #[serde(rename = "PRB_Strain")]
    Strain,
    #[serde(rename = "PRB_Strain_Marker")]
    StrainMarker,
    #[serde(rename = "ACC_Accession")]
    Accession,
    #[serde(rename = "VOC_Annot")]
    Annotation,
    #[serde(rename = "MGI_Note")]
    Note,
    #[serde(rename = "MGI_Synonym")]
    Synonym,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Strain,
        Table::StrainMarker,
        Table::Accession,
        Table::Annotation,
        Table::Note,
        Table::Synonym,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Strain => "PRB_Strain",
            Table::StrainMarker => "PRB_Strain_Marker",
            Table::Accession => "ACC_Accession",
            Table::Annotation => "VOC_Annot",
            Table::Note => "MGI_Note",
            Table::Synonym => "MGI_Synonym",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.bcp", self.name())
    }

    pub fn from_name(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|table| table.name() == name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A row destined for one bcp file. Field order lives in `fields`.
pub trait BcpRow {
    const TABLE: Table;

    fn fields(&self) -> Vec<String>;
}

/// Encodes a row as a single pipe-delimited line, without the terminator.
pub fn encode<R: BcpRow>(row: &R) -> String {
    let mut out = String::new();
    for (idx, field) in row.fields().iter().enumerate() {
        if idx > 0 {
            out.push(FIELD_DELIMITER);
        }
        out.push_str(&sanitize(field));
    }
    out
}

// The bcp format has no quoting, so embedded delimiters are flattened.
fn sanitize(field: &str) -> String {
    field
        .chars()
        .map(|ch| match ch {
            FIELD_DELIMITER => '/',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

fn opt(value: Option<Key>) -> String {
    value.map(|key| key.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrainRow {
    pub strain_key: Key,
    pub species_key: Key,
    pub strain_type_key: Key,
    pub name: String,
    pub standard: Flag,
    pub private: Flag,
    pub genetic_background: Flag,
    pub created_by: Key,
    pub modified_by: Key,
    pub date: String,
}

impl BcpRow for StrainRow {
    const TABLE: Table = Table::Strain;

    fn fields(&self) -> Vec<String> {
        vec![
            self.strain_key.to_string(),
            self.species_key.to_string(),
            self.strain_type_key.to_string(),
            self.name.clone(),
            self.standard.to_string(),
            self.private.to_string(),
            self.genetic_background.to_string(),
            self.created_by.to_string(),
            self.modified_by.to_string(),
            self.date.clone(),
            self.date.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrainMarkerRow {
    pub strain_marker_key: Key,
    pub strain_key: Key,
    pub marker_key: Option<Key>,
    pub allele_key: Key,
    pub qualifier_key: Key,
    pub created_by: Key,
    pub modified_by: Key,
    pub date: String,
}

impl BcpRow for StrainMarkerRow {
    const TABLE: Table = Table::StrainMarker;

    fn fields(&self) -> Vec<String> {
        vec![
            self.strain_marker_key.to_string(),
            self.strain_key.to_string(),
            opt(self.marker_key),
            self.allele_key.to_string(),
            self.qualifier_key.to_string(),
            self.created_by.to_string(),
            self.modified_by.to_string(),
            self.date.clone(),
            self.date.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessionRow {
    pub accession_key: Key,
    pub acc_id: String,
    pub prefix_part: String,
    pub numeric_part: Option<u64>,
    pub logical_db_key: Key,
    pub object_key: Key,
    pub mgi_type_key: Key,
    pub private: Flag,
    pub preferred: Flag,
    pub created_by: Key,
    pub modified_by: Key,
    pub date: String,
}

impl BcpRow for AccessionRow {
    const TABLE: Table = Table::Accession;

    fn fields(&self) -> Vec<String> {
        vec![
            self.accession_key.to_string(),
            self.acc_id.clone(),
            self.prefix_part.clone(),
            self.numeric_part
                .map(|value| value.to_string())
                .unwrap_or_default(),
            self.logical_db_key.to_string(),
            self.object_key.to_string(),
            self.mgi_type_key.to_string(),
            self.private.to_string(),
            self.preferred.to_string(),
            self.created_by.to_string(),
            self.modified_by.to_string(),
            self.date.clone(),
            self.date.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRow {
    pub annot_key: Key,
    pub annot_type_key: Key,
    pub object_key: Key,
    pub term_key: Key,
    pub qualifier_key: Key,
    pub date: String,
}

impl BcpRow for AnnotationRow {
    const TABLE: Table = Table::Annotation;

    fn fields(&self) -> Vec<String> {
        vec![
            self.annot_key.to_string(),
            self.annot_type_key.to_string(),
            self.object_key.to_string(),
            self.term_key.to_string(),
            self.qualifier_key.to_string(),
            self.date.clone(),
            self.date.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRow {
    pub note_key: Key,
    pub object_key: Key,
    pub mgi_type_key: Key,
    pub note_type_key: Key,
    pub note: String,
    pub created_by: Key,
    pub modified_by: Key,
    pub date: String,
}

impl BcpRow for NoteRow {
    const TABLE: Table = Table::Note;

    fn fields(&self) -> Vec<String> {
        vec![
            self.note_key.to_string(),
            self.object_key.to_string(),
            self.mgi_type_key.to_string(),
            self.note_type_key.to_string(),
            self.note.clone(),
            self.created_by.to_string(),
            self.modified_by.to_string(),
            self.date.clone(),
            self.date.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymRow {
    pub synonym_key: Key,
    pub object_key: Key,
    pub mgi_type_key: Key,
    pub synonym_type_key: Key,
    pub refs_key: Option<Key>,
    pub synonym: String,
    pub created_by: Key,
    pub modified_by: Key,
    pub date: String,
}

impl BcpRow for SynonymRow {
    const TABLE: Table = Table::Synonym;

    fn fields(&self) -> Vec<String> {
        vec![
            self.synonym_key.to_string(),
            self.object_key.to_string(),
            self.mgi_type_key.to_string(),
            self.synonym_type_key.to_string(),
            opt(self.refs_key),
            self.synonym.clone(),
            self.created_by.to_string(),
            self.modified_by.to_string(),
            self.date.clone(),
            self.date.clone(),
        ]
    }
}
