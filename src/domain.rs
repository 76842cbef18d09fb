use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Which archive a batch of records came from. The two archives publish the
/// same conceptual data in different dialects and are classified slightly
/// differently (the organism rule only applies to ArrayExpress input).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archive {
    Geo,
    ArrayExpress,
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Archive::Geo => write!(f, "geo"),
            Archive::ArrayExpress => write!(f, "arrayexpress"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentAccession(String);

impl ExperimentAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn archive(&self) -> Archive {
        if self.0.starts_with("GSE") {
            Archive::Geo
        } else {
            Archive::ArrayExpress
        }
    }
}

impl fmt::Display for ExperimentAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExperimentAccession {
    type Err = LoadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_geo = normalized
            .strip_prefix("GSE")
            .map(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        let is_ae = normalized
            .strip_prefix("E-")
            .and_then(|rest| rest.split_once('-'))
            .map(|(code, num)| {
                code.len() == 4
                    && code.chars().all(|ch| ch.is_ascii_uppercase())
                    && !num.is_empty()
                    && num.chars().all(|ch| ch.is_ascii_digit())
            })
            .unwrap_or(false);
        if !is_geo && !is_ae {
            return Err(LoadError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// One biological source/treatment description attached to a sample. Keys are
/// free-form beyond a small controlled set (source, taxid, molecule,
/// treatment protocol); values replace on repeated key, otherwise
/// first-insertion order is preserved for row emission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Channel {
    entries: Vec<(String, String)>,
}

impl Channel {
    pub fn set(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One experiment as accumulated from a single record traversal. Mutated only
/// during that traversal and reset at the record boundary; missing fields stay
/// empty strings.
#[derive(Debug, Clone, Default)]
pub struct RawExperiment {
    pub external_id: String,
    pub title: String,
    pub summary: String,
    /// GEO Overall-Design text, appended to the summary to form the full
    /// description handed to the persistence layer.
    pub overall_design: String,
    pub release_date: String,
    pub raw_types: Vec<String>,
    pub organisms: Vec<String>,
    pub is_superseries: bool,
    pub sample_count: String,
    pub pubmed_ids: Vec<String>,
    /// Child sample accessions referenced by the experiment record itself
    /// (distinct from the per-experiment sample metadata file).
    pub sample_refs: Vec<String>,
}

impl RawExperiment {
    pub fn description(&self) -> String {
        if self.overall_design.is_empty() {
            self.summary.clone()
        } else {
            format!("{} {}", self.summary, self.overall_design)
        }
    }
}

/// One sample as accumulated from its sub-tree, identifier already resolved.
#[derive(Debug, Clone, Default)]
pub struct RawSample {
    pub sample_id: String,
    pub description: String,
    pub title: String,
    pub sample_type: String,
    pub channels: Vec<Channel>,
}

/// Read-only lookup from raw experiment-type strings to controlled vocabulary
/// keys. Supplied externally; lookups never mutate it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslationTable(HashMap<String, i64>);

impl TranslationTable {
    pub fn new(entries: HashMap<String, i64>) -> Self {
        Self(entries)
    }

    pub fn lookup(&self, raw_type: &str) -> Option<i64> {
        self.0.get(raw_type).copied()
    }

    pub fn from_json(content: &str) -> Result<Self, LoadError> {
        serde_json::from_str(content).map_err(|err| LoadError::Translation(err.to_string()))
    }
}

/// Normalized experiment record handed to the persistence collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRow {
    pub key: u64,
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub release_date: String,
    pub type_key: i64,
    pub raw_types: Vec<String>,
    pub pubmed_ids: Vec<String>,
    pub sample_count: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleRow {
    pub key: u64,
    pub experiment_key: u64,
    pub sample_id: String,
}

/// One key/value attribute of a sample; `channel` is the 1-based channel
/// position the attribute belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct KeyValueRow {
    pub key: u64,
    pub sample_key: u64,
    pub name: String,
    pub value: String,
    pub channel: u32,
}

/// A PubMed ID newly observed for an experiment already known to the
/// persistence layer.
#[derive(Debug, Clone, Serialize)]
pub struct PubMedAddition {
    pub external_id: String,
    pub pubmed_id: String,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_geo_accession() {
        let acc: ExperimentAccession = " GSE12345 ".parse().unwrap();
        assert_eq!(acc.as_str(), "GSE12345");
        assert_eq!(acc.archive(), Archive::Geo);
    }

    #[test]
    fn parse_arrayexpress_accession() {
        let acc: ExperimentAccession = "E-MTAB-10233".parse().unwrap();
        assert_eq!(acc.archive(), Archive::ArrayExpress);
    }

    #[test]
    fn parse_accession_invalid() {
        let err = "SRR000001".parse::<ExperimentAccession>().unwrap_err();
        assert_matches!(err, LoadError::InvalidAccession(_));
        let err = "GSE".parse::<ExperimentAccession>().unwrap_err();
        assert_matches!(err, LoadError::InvalidAccession(_));
    }

    #[test]
    fn channel_keeps_insertion_order_and_replaces() {
        let mut channel = Channel::default();
        channel.set("source", "liver");
        channel.set("taxid", "10090");
        channel.set("source", "brain");
        let keys: Vec<&str> = channel.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["source", "taxid"]);
        assert_eq!(channel.get("source"), Some("brain"));
    }

    #[test]
    fn channel_drops_empty_values() {
        let mut channel = Channel::default();
        channel.set("molecule", "");
        assert!(channel.is_empty());
    }

    #[test]
    fn description_appends_overall_design() {
        let mut experiment = RawExperiment::default();
        experiment.summary = "summary text.".to_string();
        assert_eq!(experiment.description(), "summary text.");
        experiment.overall_design = "design text.".to_string();
        assert_eq!(experiment.description(), "summary text. design text.");
    }
}
