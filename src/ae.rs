use std::io::BufRead;

use regex::Regex;
use serde_json::Value;

use crate::domain::{Channel, RawExperiment, RawSample};
use crate::error::LoadError;
use crate::ledger::{ClassificationLedger, SkipReason};
use crate::resolver::{IdentifierResolver, Resolution, SampleIdFields};
use crate::text::scrub;

// Controlled SDRF column headers; everything bracketed is free-form.
const SOURCE_NAME: &str = "Source Name";
const ENA_SAMPLE: &str = "Comment[ENA_SAMPLE]";
const BIOSD_SAMPLE: &str = "Comment[BioSD_SAMPLE]";
const EXTRACT_NAME: &str = "Extract Name";

/// Parses one ArrayExpress experiment JSON document into a raw experiment
/// record. A document without an `accno` is malformed.
pub fn parse_experiment(document: &Value, label: &str) -> Result<RawExperiment, LoadError> {
    let json_error = |message: &str| LoadError::Json {
        path: label.to_string(),
        message: message.to_string(),
    };

    let accno = document
        .get("accno")
        .and_then(Value::as_str)
        .ok_or_else(|| json_error("missing accno"))?;

    let mut experiment = RawExperiment {
        external_id: accno.trim().to_string(),
        ..RawExperiment::default()
    };

    for attr in attributes(document) {
        match attr.name {
            "Title" => experiment.title = scrub(attr.value),
            "ReleaseDate" => experiment.release_date = attr.value.trim().to_string(),
            _ => {}
        }
    }

    let section = document.get("section").cloned().unwrap_or(Value::Null);
    for attr in attributes(&section) {
        match attr.name {
            "Study type" => experiment.raw_types.push(attr.value.trim().to_string()),
            "Description" => experiment.summary = scrub(attr.value),
            "Organism" => experiment.organisms.push(attr.value.trim().to_string()),
            _ => {}
        }
    }

    for subsection in subsections(&section) {
        match subsection.get("type").and_then(Value::as_str) {
            Some("Publication") => {
                // accno is present only for published status
                if let Some(pubmed) = subsection.get("accno").and_then(Value::as_str) {
                    if !pubmed.trim().is_empty() {
                        experiment.pubmed_ids.push(pubmed.trim().to_string());
                    }
                }
            }
            Some("Samples") => {
                for attr in attributes(subsection) {
                    if attr.name == "Sample count" {
                        experiment.sample_count = attr.value.trim().to_string();
                    }
                }
            }
            _ => {}
        }
    }

    Ok(experiment)
}

struct NamedValue<'a> {
    name: &'a str,
    value: &'a str,
}

fn attributes(node: &Value) -> Vec<NamedValue<'_>> {
    node.get("attributes")
        .and_then(Value::as_array)
        .map(|attrs| {
            attrs
                .iter()
                .filter_map(|attr| {
                    let name = attr.get("name")?.as_str()?;
                    let value = attr.get("value")?.as_str()?;
                    Some(NamedValue { name, value })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Subsections may be objects or nested arrays of objects; only the objects
/// carry anything this loader reads.
fn subsections(section: &Value) -> Vec<&Value> {
    section
        .get("subsections")
        .and_then(Value::as_array)
        .map(|subs| subs.iter().filter(|sub| sub.is_object()).collect())
        .unwrap_or_default()
}

/// Parses one SDRF sample table. Header columns are non-positional; rows that
/// resolve to an identifier already seen keep only the first occurrence's
/// attributes. Named attributes and bracketed Characteristics / Unit /
/// Factor Value pairs land in a single channel per sample.
pub fn parse_sample_table<R: BufRead>(
    input: R,
    label: &str,
    experiment_id: &str,
    ledger: &mut ClassificationLedger,
) -> Result<Vec<RawSample>, LoadError> {
    let mut lines = input.lines();
    let header = lines
        .next()
        .transpose()
        .map_err(|err| LoadError::Filesystem(err.to_string()))?
        .unwrap_or_default();
    if header.trim().is_empty() {
        return Err(LoadError::EmptySampleTable(label.to_string()));
    }

    let bracket = Regex::new(r"\[(.+)\]").unwrap();
    let columns: Vec<&str> = header.trim_end_matches(['\r', '\n']).split('\t').collect();

    let mut named = NamedColumns::default();
    let mut free_form: Vec<(String, usize)> = Vec::new();
    for (index, column) in columns.iter().enumerate() {
        match *column {
            SOURCE_NAME => named.source_name = Some(index),
            ENA_SAMPLE => named.ena_sample = Some(index),
            BIOSD_SAMPLE => named.biosd_sample = Some(index),
            EXTRACT_NAME => named.extract_name = Some(index),
            other => {
                let is_free_form = other.starts_with("Characteristics")
                    || other.starts_with("Unit")
                    || other.starts_with("Factor Value");
                if is_free_form {
                    if let Some(caps) = bracket.captures(other) {
                        free_form.push((caps[1].to_string(), index));
                    }
                }
            }
        }
    }

    let mut resolver = IdentifierResolver::new();
    let mut samples = Vec::new();

    for line in lines {
        let line = line.map_err(|err| LoadError::Filesystem(err.to_string()))?;
        if line.is_empty() {
            continue;
        }
        // keep empty trailing columns: split, do not trim the row
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        let cell = |index: Option<usize>| {
            index
                .and_then(|i| fields.get(i))
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        let candidates = SampleIdFields {
            source_name: cell(named.source_name),
            ena_sample: cell(named.ena_sample),
            biosd_sample: cell(named.biosd_sample),
        };

        let sample_id = match resolver.resolve(&candidates) {
            Resolution::Resolved(id) => id,
            Resolution::Duplicate(id) => {
                ledger.record(
                    SkipReason::DuplicateIdentifier,
                    format!("{experiment_id}: {id}"),
                );
                continue;
            }
            Resolution::NoIdentifier => {
                ledger.record(SkipReason::NoIdentifier, experiment_id.to_string());
                continue;
            }
        };

        let mut channel = Channel::default();
        channel.set("Source Name", &candidates.source_name);
        channel.set("ENA_SAMPLE", &candidates.ena_sample);
        channel.set("BioSD_SAMPLE", &candidates.biosd_sample);
        channel.set("Extract Name", &cell(named.extract_name));
        for (key, index) in &free_form {
            channel.set(key, &scrub(&cell(Some(*index))));
        }

        samples.push(RawSample {
            sample_id,
            channels: vec![channel],
            ..RawSample::default()
        });
    }

    Ok(samples)
}

#[derive(Debug, Default)]
struct NamedColumns {
    source_name: Option<usize>,
    ena_sample: Option<usize>,
    biosd_sample: Option<usize>,
    extract_name: Option<usize>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn experiment_json() -> Value {
        json!({
            "accno": "E-MTAB-1000",
            "attributes": [
                {"name": "Title", "value": "Mouse retina development"},
                {"name": "ReleaseDate", "value": "2024-02-20"}
            ],
            "section": {
                "attributes": [
                    {"name": "Study type", "value": "RNA-seq of coding RNA"},
                    {"name": "Study type", "value": "CNV profiling"},
                    {"name": "Description", "value": "Time course\tof retina."},
                    {"name": "Organism", "value": "Mus musculus"},
                    {"name": "Organism", "value": "Homo sapiens"}
                ],
                "subsections": [
                    {"type": "Author", "attributes": [{"name": "Name", "value": "A. Person"}]},
                    {"type": "Publication", "accno": "38012345", "attributes": []},
                    {"type": "Samples", "attributes": [{"name": "Sample count", "value": "3"}]},
                    [{"type": "Funding"}]
                ]
            }
        })
    }

    #[test]
    fn parses_experiment_document() {
        let experiment = parse_experiment(&experiment_json(), "E-MTAB-1000.json").unwrap();
        assert_eq!(experiment.external_id, "E-MTAB-1000");
        assert_eq!(experiment.title, "Mouse retina development");
        assert_eq!(experiment.release_date, "2024-02-20");
        assert_eq!(
            experiment.raw_types,
            ["RNA-seq of coding RNA", "CNV profiling"]
        );
        assert_eq!(experiment.summary, "Time course of retina.");
        assert_eq!(experiment.organisms, ["Mus musculus", "Homo sapiens"]);
        assert_eq!(experiment.pubmed_ids, ["38012345"]);
        assert_eq!(experiment.sample_count, "3");
    }

    #[test]
    fn missing_accno_is_malformed() {
        let err = parse_experiment(&json!({"attributes": []}), "x.json").unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));
    }

    const SDRF: &str = "Source Name\tComment[ENA_SAMPLE]\tComment[BioSD_SAMPLE]\tExtract Name\tCharacteristics[organism]\tCharacteristics[age]\tFactor Value[genotype]\n\
liver, 1\tERS001\tSAMEA1\tex1\tMus musculus\t8 weeks\twild type\n\
liver, 2\t\tSAMEA2\tex2\tMus musculus\t\tknockout\n\
liver, 2b\t\tSAMEA2\tex2b\tMus musculus\t8 weeks\tknockout\n\
\t\t\tex3\tMus musculus\t\t\n";

    #[test]
    fn parses_sample_table_with_priority_and_dedup() {
        let mut ledger = ClassificationLedger::new();
        let samples =
            parse_sample_table(SDRF.as_bytes(), "t.sdrf.txt", "E-MTAB-1000", &mut ledger).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].sample_id, "ERS001");
        assert_eq!(samples[1].sample_id, "SAMEA2");

        let channel = &samples[0].channels[0];
        assert_eq!(channel.get("Source Name"), Some("liver, 1"));
        assert_eq!(channel.get("organism"), Some("Mus musculus"));
        assert_eq!(channel.get("age"), Some("8 weeks"));
        assert_eq!(channel.get("genotype"), Some("wild type"));

        // first occurrence of SAMEA2 wins; its empty age never appears
        let second = &samples[1].channels[0];
        assert_eq!(second.get("Extract Name"), Some("ex2"));
        assert_eq!(second.get("age"), None);

        assert_eq!(
            ledger.entries(SkipReason::DuplicateIdentifier),
            ["E-MTAB-1000: SAMEA2"]
        );
        assert_eq!(ledger.entries(SkipReason::NoIdentifier), ["E-MTAB-1000"]);
    }

    #[test]
    fn source_name_used_when_comments_missing() {
        let table = "Source Name\tExtract Name\nliver, 1\tex1\n";
        let mut ledger = ClassificationLedger::new();
        let samples =
            parse_sample_table(table.as_bytes(), "t.sdrf.txt", "E-MTAB-2", &mut ledger).unwrap();
        assert_eq!(samples[0].sample_id, "liver, 1");
    }

    #[test]
    fn empty_header_is_an_error() {
        let mut ledger = ClassificationLedger::new();
        let err = parse_sample_table("".as_bytes(), "t.sdrf.txt", "E-MTAB-3", &mut ledger);
        assert!(matches!(err, Err(LoadError::EmptySampleTable(_))));
    }
}
