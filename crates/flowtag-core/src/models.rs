use serde::{Deserialize, Serialize};

/// Tag assigned to flow records that match no lookup table row.
pub const UNTAGGED: &str = "Untagged";

// ---------------------------------------------------------------------------
// FlowKey: destination port + protocol number, compared as raw strings
// ---------------------------------------------------------------------------

/// Lookup and aggregation key for a flow record.
///
/// Both components are kept as the literal digit strings seen in the input.
/// No numeric normalization happens, so `"080"` and `"80"` are different ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub dst_port: String,
    pub protocol: String,
}

impl FlowKey {
    pub fn new(dst_port: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            dst_port: dst_port.into(),
            protocol: protocol.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCountRow {
    pub tag: String,
    pub count: u64,
}

/// One port/protocol combination with its protocol number translated back to a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProtocolRow {
    pub port: String,
    pub protocol: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_key_no_numeric_normalization() {
        assert_ne!(FlowKey::new("080", "6"), FlowKey::new("80", "6"));
        assert_eq!(FlowKey::new("80", "6"), FlowKey::new("80", "6"));
    }
}
