//! Provenance keys
//!
//! Every generated entity remembers which template entity it came from and which feed row and
//! rule it was expanded for. The key lives in memory as a `Provenance` value; the bulk format only
//! sees it as the legacy text kept in the `Details` column:
//!
//! ```text
//! source:<template id>
//! city:<row name>
//! tier:<rule name>
//! adgroup:<ad group name>:<template ad group id>
//! ```
//!
//! Older exports wrote `row:` and `rule:` instead of `city:` and `tier:`; both are read.

use std::fmt;

const SOURCE: &str = "source";
const ROW: &str = "city";
const RULE: &str = "tier";
const LEGACY_ROW: &str = "row";
const LEGACY_RULE: &str = "rule";
const AD_GROUP: &str = "adgroup";

/// Link from a video line item to an ad group generated under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdGroupLink {
    pub name: String,
    pub template_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Provenance {
    pub source_id: String,
    pub row_key: String,
    pub rule_key: String,
    pub ad_groups: Vec<AdGroupLink>,
}

impl Provenance {
    pub fn new(
        source_id: impl Into<String>,
        row_key: impl Into<String>,
        rule_key: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            row_key: row_key.into(),
            rule_key: rule_key.into(),
            ad_groups: Vec::new(),
        }
    }

    /// Neither row nor rule: the entity was generated once for the whole feed.
    pub fn is_static(&self) -> bool {
        self.row_key.is_empty() && self.rule_key.is_empty()
    }

    /// `(source, row, rule)` identity used for reconciliation.
    pub fn key(&self) -> ProvenanceKey {
        ProvenanceKey::new(&self.source_id, &self.row_key, &self.rule_key)
    }

    /// Legacy `Details` text.
    pub fn encode(&self) -> String {
        let mut lines = vec![
            format!("{}:{}", SOURCE, self.source_id),
            format!("{}:{}", ROW, self.row_key),
            format!("{}:{}", RULE, self.rule_key),
        ];
        for link in &self.ad_groups {
            lines.push(format!("{}:{}:{}", AD_GROUP, link.name, link.template_id));
        }
        lines.join("\n")
    }

    /// Parse `Details` text. Returns `None` when no `source:` line is present.
    ///
    /// Platform exports sometimes carry the line breaks as a literal `\n`; both forms are
    /// accepted.
    pub fn decode(details: &str) -> Option<Self> {
        let normalized = details.replace("\\n", "\n");
        let mut provenance = Provenance::default();
        let mut has_source = false;
        for line in normalized.lines() {
            let Some((label, rest)) = line.split_once(':') else {
                continue;
            };
            match label.trim() {
                SOURCE => {
                    provenance.source_id = rest.trim().to_string();
                    has_source = !provenance.source_id.is_empty();
                }
                ROW | LEGACY_ROW => provenance.row_key = rest.trim().to_string(),
                RULE | LEGACY_RULE => provenance.rule_key = rest.trim().to_string(),
                AD_GROUP => {
                    if let Some((name, id)) = rest.rsplit_once(':') {
                        provenance.ad_groups.push(AdGroupLink {
                            name: name.to_string(),
                            template_id: id.trim().to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        has_source.then_some(provenance)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Hashable `(source, row, rule)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProvenanceKey {
    pub source_id: String,
    pub row_key: String,
    pub rule_key: String,
}

impl ProvenanceKey {
    pub fn new(source_id: &str, row_key: &str, rule_key: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            row_key: row_key.to_string(),
            rule_key: rule_key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_city_and_tier() {
        let provenance = Provenance::new("4001", "Moscow", "");
        assert_eq!(provenance.encode(), "source:4001\ncity:Moscow\ntier:");
    }

    #[test]
    fn test_decode_reads_both_label_sets() {
        let current = Provenance::decode("source:4001\ncity:Moscow\ntier:Warm").unwrap();
        let legacy = Provenance::decode("source:4001\nrow:Moscow\nrule:Warm").unwrap();
        assert_eq!(current, legacy);
        assert_eq!(current.key(), ProvenanceKey::new("4001", "Moscow", "Warm"));
    }

    #[test]
    fn test_decode_escaped_line_breaks_and_links() {
        let provenance = Provenance::decode(
            "source:5001\\ncity:SPB\\ntier:Cold\\nadgroup:Video: SPB Cold:7001",
        )
        .unwrap();
        assert_eq!(provenance.row_key, "SPB");
        assert_eq!(
            provenance.ad_groups,
            vec![AdGroupLink {
                name: "Video: SPB Cold".to_string(),
                template_id: "7001".to_string(),
            }]
        );
        assert_eq!(Provenance::decode(&provenance.encode()).unwrap(), provenance);
    }

    #[test]
    fn test_decode_without_source() {
        assert!(Provenance::decode("free text").is_none());
        assert!(Provenance::decode("source:\ncity:x").is_none());
        assert!(Provenance::decode("").is_none());
    }

    #[test]
    fn test_static_provenance() {
        assert!(Provenance::new("1", "", "").is_static());
        assert!(!Provenance::new("1", "Moscow", "").is_static());
    }
}
