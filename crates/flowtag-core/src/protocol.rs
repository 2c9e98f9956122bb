//! Protocol reference data: protocol name <-> protocol number.
//!
//! The reference is built once and passed by shared reference into the lookup
//! table loader and the aggregation engine. There is no process-wide table.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{FlowTagError, Result};

const IANA_REGISTRY: &str = include_str!("../data/protocol-numbers.csv");

/// Which CSV columns hold the protocol name and number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceLayout {
    /// `name,number[,...]`
    #[default]
    NameFirst,
    /// `Decimal,Keyword[,...]` as published by IANA.
    Iana,
}

impl ReferenceLayout {
    fn columns(self) -> (usize, usize) {
        match self {
            Self::NameFirst => (0, 1),
            Self::Iana => (1, 0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolRef {
    /// lower-cased name -> number
    by_name: HashMap<String, String>,
    /// number -> name as written in the source
    by_number: IndexMap<String, String>,
}

impl ProtocolRef {
    /// The IANA protocol number registry bundled with the crate.
    pub fn iana() -> Result<Self> {
        Self::from_reader(IANA_REGISTRY.as_bytes(), ReferenceLayout::Iana)
    }

    pub fn from_path(path: &Path, layout: ReferenceLayout) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, layout)
    }

    /// Parse a reference CSV. The first row is a header and is skipped.
    pub fn from_reader<R: Read>(reader: R, layout: ReferenceLayout) -> Result<Self> {
        let (name_col, number_col) = layout.columns();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut table = Self::default();
        for result in rdr.records() {
            let record = result?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() < 2 {
                return Err(FlowTagError::ReferenceData {
                    line,
                    fields: record.len(),
                });
            }

            let name = record[name_col].trim();
            let number = record[number_col].trim().to_lowercase();
            if name.is_empty() {
                tracing::debug!(line, number = %number, "reference row without a name, skipped");
                continue;
            }
            table.insert(name, number, line);
        }

        tracing::info!(
            names = table.by_name.len(),
            numbers = table.by_number.len(),
            "protocol reference loaded"
        );
        Ok(table)
    }

    fn insert(&mut self, name: &str, number: String, line: u64) {
        if let Some(prev) = self.by_name.insert(name.to_lowercase(), number.clone()) {
            if prev != number {
                tracing::debug!(line, name, old = %prev, new = %number, "protocol name redefined");
            }
        }
        if let Some(prev) = self.by_number.insert(number.clone(), name.to_string()) {
            tracing::debug!(line, number = %number, old = %prev, new = name, "protocol number has several names");
        }
    }

    /// Case-insensitive name -> number.
    pub fn number_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Number -> name, case preserved.
    pub fn name_for(&self, number: &str) -> Option<&str> {
        self.by_number.get(number).map(String::as_str)
    }

    /// `(number, name)` pairs in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_number.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}
