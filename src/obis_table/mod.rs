//! OBIS field definitions
//!
//! The table maps the OBIS key found in front of a telegram data line to the
//! name it is published under and the way its values have to be decoded.
//! It is loaded once on startup and never changed afterwards.

use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

const BUILTIN_TABLE: &str = include_str!("../../config/obis.json");

#[derive(Error, Debug)]
pub enum ObisTableError {
    #[error("Unable to read OBIS table {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Unable to parse OBIS table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Field {name} selects value position {position} but only {types} types are defined")]
    InvalidValuePosition {
        name: String,
        position: usize,
        types: usize,
    },
}

/// Closed set of value kinds a field can be decoded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ValueKind {
    Float,
    Int,
    Timestamp,
    String,
    Unknown,
}

impl From<String> for ValueKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "float" => ValueKind::Float,
            "int" => ValueKind::Int,
            "timestamp" => ValueKind::Timestamp,
            "string" => ValueKind::String,
            _ => ValueKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    Single(ValueKind),
    List(Vec<ValueKind>),
}

impl FieldType {
    /// Kind used for the value group at `index`; a single type applies to every group.
    pub fn kind_at(&self, index: usize) -> Option<ValueKind> {
        match self {
            FieldType::Single(kind) => Some(*kind),
            FieldType::List(kinds) => kinds.get(index).copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObisFieldSpec {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, rename = "valuePosition")]
    pub value_position: Option<usize>,
}

/* Table files are either a bare list or wrapped in an object */
#[derive(Deserialize)]
#[serde(untagged)]
enum TableFile {
    Wrapped { obis_fields: Vec<ObisFieldSpec> },
    Plain(Vec<ObisFieldSpec>),
}

#[derive(Debug, Clone, Default)]
pub struct ObisFieldTable {
    fields: Vec<ObisFieldSpec>,
    index: HashMap<String, usize>,
}

impl ObisFieldTable {
    pub fn new(fields: Vec<ObisFieldSpec>) -> Result<Self, ObisTableError> {
        let mut index = HashMap::new();

        for (pos, field) in fields.iter().enumerate() {
            if let (Some(position), FieldType::List(kinds)) = (field.value_position, &field.field_type) {
                if position >= kinds.len() {
                    return Err(ObisTableError::InvalidValuePosition {
                        name: field.name.clone(),
                        position,
                        types: kinds.len(),
                    });
                }
            }

            if !validate_obis_code(&field.key) {
                debug!("Field {} uses the non standard key {}", field.name, field.key);
            }

            /* First definition of a key wins */
            if index.contains_key(&field.key) {
                warn!("Duplicate OBIS key {} ignored for field {}", field.key, field.name);
                continue;
            }
            index.insert(field.key.clone(), pos);
        }

        return Ok(ObisFieldTable { fields, index });
    }

    pub fn from_json(json: &str) -> Result<Self, ObisTableError> {
        let fields = match serde_json::from_str::<TableFile>(json)? {
            TableFile::Wrapped { obis_fields } => obis_fields,
            TableFile::Plain(fields) => fields,
        };
        Self::new(fields)
    }

    pub fn from_file(path: &Path) -> Result<Self, ObisTableError> {
        let json = fs::read_to_string(path).map_err(|source| ObisTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The table shipped with the binary, covering the common DSMR fields
    pub fn builtin() -> Result<Self, ObisTableError> {
        Self::from_json(BUILTIN_TABLE)
    }

    /// Loads the configured table or falls back to the builtin one
    pub fn load(path: Option<&str>) -> Result<Self, ObisTableError> {
        match path {
            Some(p) => Self::from_file(Path::new(p)),
            None => Self::builtin(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ObisFieldSpec> {
        self.index.get(key).map(|pos| &self.fields[*pos])
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub fn validate_obis_code(code: &str) -> bool {
    // OBIS code format: A-B:C.D.E*F
    // A: Medium (0=abstract, 1=electricity, 6=heat, 7=gas, 8=water)
    // B: Channel (0-15)
    // C: Physical value (1-255)
    // D: Processing method (0-255)
    // E: Tariff/Time (0-255)
    // F: Storage (optional, 0-255)

    let Some((ab, cde)) = code.split_once(':') else {
        return false;
    };

    let ab_parts: Vec<&str> = ab.split('-').collect();
    if ab_parts.len() != 2 {
        return false;
    }

    let cde = cde.split('*').next().unwrap_or("");
    let cde_parts: Vec<&str> = cde.split('.').collect();
    if cde_parts.len() != 3 {
        return false;
    }

    ab_parts
        .iter()
        .chain(cde_parts.iter())
        .all(|part| part.parse::<u8>().is_ok())
}
