use std::collections::BTreeMap;
use std::io::BufRead;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{FlowTagError, Result};
use crate::flowlog::{FlowLine, FlowLogReader, SkippedLine};
use crate::lookup::LookupTable;
use crate::models::{FlowKey, PortProtocolRow, TagCountRow, UNTAGGED};
use crate::protocol::ProtocolRef;

/// Records per tag, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCounts(IndexMap<String, u64>);

impl TagCounts {
    fn increment(&mut self, tag: &str) {
        match self.0.get_mut(tag) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(tag.to_string(), 1);
            }
        }
    }

    pub fn get(&self, tag: &str) -> Option<u64> {
        self.0.get(tag).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn rows(&self) -> Vec<TagCountRow> {
        self.iter()
            .map(|(tag, count)| TagCountRow {
                tag: tag.to_string(),
                count,
            })
            .collect()
    }
}

/// Records per distinct `(dst_port, protocol number)`, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortProtocolCounts(IndexMap<FlowKey, u64>);

impl PortProtocolCounts {
    fn increment(&mut self, key: &FlowKey) {
        match self.0.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(key.clone(), 1);
            }
        }
    }

    pub fn get(&self, key: &FlowKey) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, u64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Translate protocol numbers back to names for reporting.
    ///
    /// Fails on the first number the reference has no name for. The counts
    /// themselves are unaffected.
    pub fn resolve(&self, protocols: &ProtocolRef) -> Result<Vec<PortProtocolRow>> {
        self.iter()
            .map(|(key, count)| -> Result<PortProtocolRow> {
                let name = protocols.name_for(&key.protocol).ok_or_else(|| {
                    FlowTagError::UnknownProtocolNumber {
                        number: key.protocol.clone(),
                    }
                })?;
                Ok(PortProtocolRow {
                    port: key.dst_port.clone(),
                    protocol: name.to_string(),
                    count,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub lines_read: u64,
    pub blank_lines: u64,
    pub records: u64,
    pub skipped: u64,
    /// skipped line count per [`crate::flowlog::SkipReason::kind`]
    pub skipped_by_reason: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregates {
    pub tag_counts: TagCounts,
    pub port_protocol_counts: PortProtocolCounts,
    pub summary: Summary,
}

// ---------------------------------------------------------------------------
// Aggregator: one pass over the flow records
// ---------------------------------------------------------------------------

pub struct Aggregator<'a> {
    lookup: &'a LookupTable,
    out: Aggregates,
}

impl<'a> Aggregator<'a> {
    pub fn new(lookup: &'a LookupTable) -> Self {
        Self {
            lookup,
            out: Aggregates::default(),
        }
    }

    /// Count one valid record under its tag and its port/protocol pair.
    pub fn record(&mut self, key: &FlowKey) {
        let tag = self.lookup.get(key).unwrap_or(UNTAGGED);
        self.out.tag_counts.increment(tag);
        self.out.port_protocol_counts.increment(key);
        self.out.summary.records += 1;
    }

    pub fn skip(&mut self, skipped: &SkippedLine) {
        self.out.summary.skipped += 1;
        *self
            .out
            .summary
            .skipped_by_reason
            .entry(skipped.reason.kind().to_string())
            .or_insert(0) += 1;
    }

    pub fn observe(&mut self, line: &FlowLine) {
        match line {
            FlowLine::Record(key) => self.record(key),
            FlowLine::Skipped(skipped) => self.skip(skipped),
        }
    }

    pub fn finish(mut self, lines_read: u64, blank_lines: u64) -> Aggregates {
        self.out.summary.lines_read = lines_read;
        self.out.summary.blank_lines = blank_lines;
        self.out
    }
}

/// Drain `reader` and aggregate every record against `lookup`.
pub fn aggregate_flow_log<R: BufRead>(
    mut reader: FlowLogReader<R>,
    lookup: &LookupTable,
) -> Result<Aggregates> {
    let mut aggregator = Aggregator::new(lookup);
    for line in reader.by_ref() {
        aggregator.observe(&line?);
    }

    let aggregates = aggregator.finish(reader.lines_read(), reader.blank_lines());
    tracing::info!(
        lines = aggregates.summary.lines_read,
        records = aggregates.summary.records,
        skipped = aggregates.summary.skipped,
        tags = aggregates.tag_counts.len(),
        combinations = aggregates.port_protocol_counts.len(),
        "aggregation complete"
    );
    Ok(aggregates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReferenceLayout;

    fn protocols() -> ProtocolRef {
        let csv = "name,number\ntcp,6\nudp,17\nicmp,1\n";
        ProtocolRef::from_reader(csv.as_bytes(), ReferenceLayout::NameFirst).unwrap()
    }

    fn flow(port: &str, proto: &str) -> String {
        format!("2 123456789012 eni-0a1b2c3d 10.0.1.201 198.51.100.2 49153 {port} {proto} 25 20000 1620140761 1620140821 ACCEPT OK\n")
    }

    fn run(lookup_csv: &str, log: &str) -> Aggregates {
        let lookup = LookupTable::from_reader(lookup_csv.as_bytes(), &protocols()).unwrap();
        aggregate_flow_log(FlowLogReader::new(log.as_bytes()), &lookup).unwrap()
    }

    #[test]
    fn test_matched_and_untagged() {
        let log = format!("{}{}", flow("443", "6"), flow("443", "17"));
        let agg = run("dstport,protocol,tag\n443,tcp,web\n", &log);

        assert_eq!(agg.tag_counts.get("web"), Some(1));
        assert_eq!(agg.tag_counts.get(UNTAGGED), Some(1));
        assert_eq!(agg.tag_counts.len(), 2);
        assert_eq!(agg.port_protocol_counts.get(&FlowKey::new("443", "6")), Some(1));
        assert_eq!(agg.port_protocol_counts.get(&FlowKey::new("443", "17")), Some(1));
    }

    #[test]
    fn test_totals_match_valid_records() {
        let log = [
            flow("443", "6"),
            flow("443", "6"),
            flow("22", "6"),
            "1 x x x x x 80 6\n".to_string(),
            flow("53", "17"),
        ]
        .concat();
        let agg = run("dstport,protocol,tag\n443,tcp,web\n22,tcp,ssh\n", &log);

        assert_eq!(agg.summary.records, 4);
        assert_eq!(agg.tag_counts.total(), 4);
        assert_eq!(agg.port_protocol_counts.total(), 4);
        assert_eq!(agg.summary.skipped, 1);
        assert_eq!(agg.summary.skipped_by_reason.get("unsupported_version"), Some(&1));
    }

    #[test]
    fn test_version_1_absent_from_both_aggregates() {
        let agg = run("dstport,protocol,tag\n80,tcp,web\n", "1 x x x x x 80 6\n");
        assert!(agg.tag_counts.is_empty());
        assert!(agg.port_protocol_counts.is_empty());
    }

    #[test]
    fn test_first_seen_order() {
        let log = [flow("22", "6"), flow("443", "6"), flow("22", "6")].concat();
        let agg = run("dstport,protocol,tag\n443,tcp,web\n22,tcp,ssh\n", &log);
        let tags: Vec<&str> = agg.tag_counts.iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["ssh", "web"]);
        assert_eq!(agg.tag_counts.get("ssh"), Some(2));
    }

    #[test]
    fn test_no_numeric_normalization_at_match_time() {
        let agg = run("dstport,protocol,tag\n80,tcp,web\n", &flow("080", "6"));
        assert_eq!(agg.tag_counts.get(UNTAGGED), Some(1));
        assert_eq!(agg.tag_counts.get("web"), None);
    }

    #[test]
    fn test_resolve_protocol_names() {
        let log = [flow("443", "6"), flow("53", "17")].concat();
        let agg = run("dstport,protocol,tag\n", &log);
        let rows = agg.port_protocol_counts.resolve(&protocols()).unwrap();
        assert_eq!(
            rows,
            vec![
                PortProtocolRow { port: "443".into(), protocol: "tcp".into(), count: 1 },
                PortProtocolRow { port: "53".into(), protocol: "udp".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_resolve_unknown_protocol_number() {
        let agg = run("dstport,protocol,tag\n", &flow("8080", "250"));
        assert_eq!(agg.tag_counts.get(UNTAGGED), Some(1));
        let err = agg.port_protocol_counts.resolve(&protocols()).unwrap_err();
        assert!(matches!(err, FlowTagError::UnknownProtocolNumber { number } if number == "250"));
    }
}
