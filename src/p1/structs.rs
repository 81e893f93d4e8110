use serde::Serialize;
use serde_json::{Map, Value};

/// Raw lines of one telegram, from the `/` header up to the `!` terminator.
///
/// Lines keep their line endings since the checksum covers them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telegram {
    lines: Vec<Vec<u8>>,
}

impl Telegram {
    pub(crate) fn new() -> Self {
        Telegram { lines: Vec::new() }
    }

    pub(crate) fn push_line(&mut self, line: Vec<u8>) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    pub fn header(&self) -> Option<&[u8]> {
        self.lines.first().map(|l| l.as_slice())
    }

    /// The closing `!` line, which is always the last one of a complete telegram
    pub fn terminator(&self) -> Option<&[u8]> {
        self.lines
            .last()
            .map(|l| l.as_slice())
            .filter(|l| l.starts_with(b"!"))
    }

    /// Every line in front of the terminator
    pub fn body(&self) -> &[Vec<u8>] {
        match self.terminator() {
            Some(_) => &self.lines[..self.lines.len() - 1],
            None => &self.lines,
        }
    }
}

/// Decoded field values keyed by field name, in the order the lines arrived
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecodedTelegram {
    values: Map<String, Value>,
}

impl DecodedTelegram {
    pub fn new() -> Self {
        DecodedTelegram { values: Map::new() }
    }

    pub fn insert(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.values)
    }
}
