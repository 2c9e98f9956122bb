use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::{FlowTagError, Result};
use crate::models::FlowKey;
use crate::protocol::ProtocolRef;

/// `(dst_port, protocol number) -> tag`, built from an operator supplied CSV.
///
/// When the source repeats a key, the later row replaces the earlier tag.
/// Overwrites are counted, not rejected; see [`LookupTable::overwritten`].
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<FlowKey, String>,
    overwritten: usize,
}

impl LookupTable {
    pub fn from_path(path: &Path, protocols: &ProtocolRef) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, protocols)
    }

    /// Parse `dstport,protocol,tag` rows after a header row.
    ///
    /// Protocol names are resolved case-insensitively through `protocols`. A name
    /// the reference does not know fails the whole load.
    pub fn from_reader<R: Read>(reader: R, protocols: &ProtocolRef) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        let mut table = Self::default();
        for result in rdr.records() {
            let record = result?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() < 3 {
                return Err(FlowTagError::MalformedRow {
                    line,
                    fields: record.len(),
                });
            }

            let port = record[0].trim();
            let name = record[1].trim();
            let tag = record[2].trim();

            let number = protocols
                .number_for(name)
                .ok_or_else(|| FlowTagError::UnknownProtocol {
                    line,
                    name: name.to_string(),
                })?;

            let key = FlowKey::new(port, number);
            if let Some(prev) = table.entries.insert(key, tag.to_string()) {
                table.overwritten += 1;
                tracing::debug!(line, port, protocol = name, old = %prev, new = tag, "lookup key redefined, last row wins");
            }
        }

        tracing::info!(
            entries = table.entries.len(),
            overwritten = table.overwritten,
            "lookup table loaded"
        );
        Ok(table)
    }

    pub fn get(&self, key: &FlowKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows that replaced the tag of an earlier row with the same key.
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }
}
