use super::{
    coercer::{coerce_value_in, strip_unit},
    structs::{DecodedTelegram, Telegram},
    P1Error,
};
use crate::obis_table::{ObisFieldSpec, ObisFieldTable};
use chrono::{Local, TimeZone};
use log::trace;
use serde_json::Value;
use std::sync::Arc;

/// A data line split into its key and the contents of its value groups
#[derive(Debug, PartialEq)]
pub struct DataLine<'a> {
    pub key: &'a str,
    pub groups: Vec<&'a str>,
}

/// Splits `key(value)(value)...` into its parts.
///
/// The key ends at the first `(`, every group runs up to the next `)`.
/// Returns `None` for lines without any complete group.
pub fn lex_line(line: &str) -> Option<DataLine<'_>> {
    let start = line.find('(')?;
    let key = &line[..start];

    let mut groups = Vec::new();
    let mut rest = &line[start..];
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(')') else {
            break;
        };
        groups.push(&after[..close]);
        rest = &after[close + 1..];
    }

    if groups.is_empty() {
        return None;
    }
    Some(DataLine { key, groups })
}

pub struct TelegramDecoder<Tz: TimeZone = Local> {
    table: Arc<ObisFieldTable>,
    tz: Tz,
}

impl TelegramDecoder<Local> {
    pub fn new(table: Arc<ObisFieldTable>) -> Self {
        TelegramDecoder { table, tz: Local }
    }
}

impl<Tz: TimeZone> TelegramDecoder<Tz> {
    /// Decoder resolving meter timestamps in `tz` instead of the host time zone
    pub fn with_timezone(table: Arc<ObisFieldTable>, tz: Tz) -> Self {
        TelegramDecoder { table, tz }
    }

    pub fn decode(&self, telegram: &Telegram) -> Result<DecodedTelegram, P1Error> {
        let mut decoded = DecodedTelegram::new();

        for raw in telegram.lines() {
            let line = std::str::from_utf8(raw)
                .map_err(|_| P1Error::InvalidDataLine(String::from_utf8_lossy(raw).into_owned()))?;

            if let Some((name, value)) = self.decode_line(line.trim_end_matches(['\r', '\n']))? {
                decoded.insert(name, value);
            }
        }

        return Ok(decoded);
    }

    /// Decodes a single line, `None` if it holds no known field.
    pub fn decode_line(&self, line: &str) -> Result<Option<(String, Value)>, P1Error> {
        let Some(data) = lex_line(line) else {
            return Ok(None);
        };

        let Some(spec) = self.table.get(data.key) else {
            trace!("No field definition for {}", data.key);
            return Ok(None);
        };

        let value = if data.groups.len() == 1 {
            self.coerce_group(spec, &data, 0)?
        } else if let Some(position) = spec.value_position {
            self.coerce_group(spec, &data, position)?
        } else {
            let mut parts = Vec::with_capacity(data.groups.len());
            for index in 0..data.groups.len() {
                parts.push(match self.coerce_group(spec, &data, index)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            }
            Value::String(parts.join("|"))
        };

        Ok(Some((spec.name.clone(), value)))
    }

    fn coerce_group(&self, spec: &ObisFieldSpec, data: &DataLine, index: usize) -> Result<Value, P1Error> {
        let missing = || P1Error::InvalidDataLine(format!("{}: no value {} for {}", data.key, index, spec.name));

        let raw = data.groups.get(index).ok_or_else(missing)?;
        let kind = spec.field_type.kind_at(index).ok_or_else(missing)?;
        coerce_value_in(strip_unit(raw), kind, spec.unit.as_deref(), &self.tz)
    }
}
