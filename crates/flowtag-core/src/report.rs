use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregates, Summary};
use crate::digest::InputFile;
use crate::error::Result;
use crate::lookup::LookupTable;
use crate::models::{PortProtocolRow, TagCountRow};
use crate::protocol::ProtocolRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportInputs {
    pub flow_log: Option<InputFile>,
    pub lookup_table: Option<InputFile>,
    /// `None` when the bundled IANA registry was used.
    pub protocols: Option<InputFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupStats {
    pub entries: usize,
    pub overwritten: usize,
}

/// Final, fully resolved output of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowReport {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub inputs: ReportInputs,
    pub summary: Summary,
    pub lookup: LookupStats,
    pub tag_counts: Vec<TagCountRow>,
    pub port_protocol_counts: Vec<PortProtocolRow>,
}

impl FlowReport {
    /// Resolve protocol names for every port/protocol combination.
    ///
    /// Fails with `UnknownProtocolNumber` if a flow record used a protocol
    /// number that `protocols` cannot name.
    pub fn build(aggregates: &Aggregates, lookup: &LookupTable, protocols: &ProtocolRef) -> Result<Self> {
        Ok(Self {
            version: crate::VERSION.to_string(),
            generated_at: Utc::now(),
            inputs: ReportInputs::default(),
            summary: aggregates.summary.clone(),
            lookup: LookupStats {
                entries: lookup.len(),
                overwritten: lookup.overwritten(),
            },
            tag_counts: aggregates.tag_counts.rows(),
            port_protocol_counts: aggregates.port_protocol_counts.resolve(protocols)?,
        })
    }

    pub fn with_inputs(mut self, inputs: ReportInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn render(&self, format: ReportFormat) -> serde_json::Result<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => serde_json::to_string_pretty(self),
        }
    }

    /// The two CSV-like sections, without run metadata.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Tag Counts:\n");
        out.push_str("Tag,Count\n");
        for row in &self.tag_counts {
            out.push_str(&format!("{},{}\n", row.tag, row.count));
        }
        out.push('\n');
        out.push_str("Port/Protocol Combination Counts:\n");
        out.push_str("Port,Protocol,Count\n");
        for row in &self.port_protocol_counts {
            out.push_str(&format!("{},{},{}\n", row.port, row.protocol, row.count));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_flow_log;
    use crate::flowlog::FlowLogReader;
    use crate::protocol::ReferenceLayout;

    fn build(log: &str) -> Result<FlowReport> {
        let protocols = ProtocolRef::from_reader(
            "name,number\ntcp,6\nudp,17\n".as_bytes(),
            ReferenceLayout::NameFirst,
        )?;
        let lookup = LookupTable::from_reader(
            "dstport,protocol,tag\n443,tcp,web\n".as_bytes(),
            &protocols,
        )?;
        let agg = aggregate_flow_log(FlowLogReader::new(log.as_bytes()), &lookup)?;
        FlowReport::build(&agg, &lookup, &protocols)
    }

    #[test]
    fn test_render_text_sections() {
        let log = "2 1 eni-1 10.0.0.1 10.0.0.2 50000 443 6 1 1 1 1 ACCEPT OK\n\
                   2 1 eni-1 10.0.0.1 10.0.0.2 50000 53 17 1 1 1 1 ACCEPT OK\n";
        let text = build(log).unwrap().render_text();
        assert_eq!(
            text,
            "Tag Counts:\nTag,Count\nweb,1\nUntagged,1\n\n\
             Port/Protocol Combination Counts:\nPort,Protocol,Count\n443,tcp,1\n53,udp,1\n"
        );
    }

    #[test]
    fn test_json_carries_summary() {
        let log = "2 1 eni-1 10.0.0.1 10.0.0.2 50000 443 6 1 1 1 1 ACCEPT OK\n";
        let json = build(log).unwrap().render(ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["records"], 1);
        assert_eq!(value["lookup"]["entries"], 1);
        assert_eq!(value["tag_counts"][0]["tag"], "web");
        assert_eq!(value["port_protocol_counts"][0]["protocol"], "tcp");
    }

    #[test]
    fn test_unknown_protocol_number_fails_build() {
        let log = "2 1 eni-1 10.0.0.1 10.0.0.2 50000 443 47 1 1 1 1 ACCEPT OK\n";
        assert!(build(log).is_err());
    }
}
