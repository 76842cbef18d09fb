use std::io::BufRead;

use crate::classify::SUPERSERIES_MARK;
use crate::domain::{Channel, RawExperiment, RawSample};
use crate::error::LoadError;
use crate::ledger::{ClassificationLedger, SkipReason};
use crate::resolver::{IdentifierResolver, Resolution};
use crate::text::{scrub, scrub_value};
use crate::walker::{Attrs, TagPath, TagPathWalker, TagSink};

/// Top-level tag that closes one experiment record in the eSummary batch
/// file.
const RECORD_TAG: &str = "DocumentSummary";

/// Collects one experiment's attributes across the traversal of one
/// `DocumentSummary` record. The record-completion callback receives the
/// snapshot; all state is reset to empty before the traversal continues.
pub struct ExperimentAccumulator<F>
where
    F: FnMut(RawExperiment),
{
    current: RawExperiment,
    on_record: F,
}

impl<F> ExperimentAccumulator<F>
where
    F: FnMut(RawExperiment),
{
    pub fn new(on_record: F) -> Self {
        Self {
            current: RawExperiment::default(),
            on_record,
        }
    }
}

impl<F> TagSink for ExperimentAccumulator<F>
where
    F: FnMut(RawExperiment),
{
    fn enter(&mut self, _path: &TagPath, _attrs: &Attrs) {}

    fn text(&mut self, path: &TagPath, text: &str) {
        if path.parent() == RECORD_TAG {
            match path.tag() {
                "Accession" => self.current.external_id = text.trim().to_string(),
                "title" => self.current.title = scrub(text),
                "summary" => {
                    self.current.is_superseries = text.contains(SUPERSERIES_MARK);
                    self.current.summary = scrub(text);
                }
                "PDAT" => self.current.release_date = text.trim().to_string(),
                "gdsType" => {
                    self.current.raw_types = text
                        .split(';')
                        .map(|raw| raw.trim().to_string())
                        .filter(|raw| !raw.is_empty())
                        .collect();
                }
                "n_samples" => self.current.sample_count = text.trim().to_string(),
                _ => {}
            }
            return;
        }
        if path.tag() == "int" && path.contains("PubMedIds") {
            self.current.pubmed_ids.push(text.trim().to_string());
        } else if path.ends_with(&["Samples", "Sample", "Accession"]) {
            self.current.sample_refs.push(text.trim().to_string());
        }
    }

    fn exit(&mut self, path: &TagPath) {
        if path.tag() == RECORD_TAG {
            let record = std::mem::take(&mut self.current);
            (self.on_record)(record);
        }
    }
}

/// Parses one eSummary batch file into its experiment records.
pub fn parse_experiment_summaries<R: BufRead>(
    input: R,
    label: &str,
) -> Result<Vec<RawExperiment>, LoadError> {
    let mut records = Vec::new();
    let mut accumulator = ExperimentAccumulator::new(|record| records.push(record));
    TagPathWalker::walk(input, &mut accumulator, label)?;
    Ok(records)
}

#[derive(Debug, Default)]
pub struct SampleFileResult {
    pub samples: Vec<RawSample>,
    /// Series-level Overall-Design text, appended to the experiment summary.
    pub overall_design: String,
}

/// Collects per-sample and per-channel metadata within a MINiML sample file.
/// Channels are keyed by the `position` attribute; a second channel opening
/// before the first is finalized flushes the first into the sequence.
struct SampleAccumulator<'a> {
    experiment_id: String,
    resolver: IdentifierResolver,
    ledger: &'a mut ClassificationLedger,
    result: SampleFileResult,

    sample: RawSample,
    channel: Channel,
    channels: Vec<Channel>,
    characteristic_tag: String,
    /// Set for a duplicate or identifier-less sample; the rest of the
    /// sub-tree is consumed without accumulating.
    skip_sample: bool,
}

impl<'a> SampleAccumulator<'a> {
    fn new(experiment_id: &str, ledger: &'a mut ClassificationLedger) -> Self {
        Self {
            experiment_id: experiment_id.to_string(),
            resolver: IdentifierResolver::new(),
            ledger,
            result: SampleFileResult::default(),
            sample: RawSample::default(),
            channel: Channel::default(),
            channels: Vec::new(),
            characteristic_tag: String::new(),
            skip_sample: false,
        }
    }

    fn reset_sample(&mut self) {
        self.sample = RawSample::default();
        self.channel = Channel::default();
        self.channels.clear();
        self.characteristic_tag.clear();
        self.skip_sample = false;
    }
}

impl TagSink for SampleAccumulator<'_> {
    fn enter(&mut self, path: &TagPath, attrs: &Attrs) {
        match path.tag() {
            "Sample" if path.depth() == 2 => {
                self.reset_sample();
                let iid = attrs.get("iid").unwrap_or("").trim().to_string();
                match self.resolver.resolve_id(&iid) {
                    Resolution::Resolved(id) => self.sample.sample_id = id,
                    Resolution::Duplicate(id) => {
                        self.ledger.record(
                            SkipReason::DuplicateIdentifier,
                            format!("{}: {}", self.experiment_id, id),
                        );
                        self.skip_sample = true;
                    }
                    Resolution::NoIdentifier => {
                        self.ledger
                            .record(SkipReason::NoIdentifier, self.experiment_id.clone());
                        self.skip_sample = true;
                    }
                }
            }
            "Channel" if path.parent() == "Sample" => {
                let position = attrs.get("position").unwrap_or("1");
                if position == "2" && !self.channel.is_empty() {
                    self.channels.push(std::mem::take(&mut self.channel));
                }
            }
            "Characteristics" => {
                self.characteristic_tag = attrs
                    .get("tag")
                    .map(scrub)
                    .filter(|tag| !tag.is_empty())
                    .unwrap_or_else(|| "Characteristics".to_string());
            }
            "Organism" if path.parent() == "Channel" => {
                if let Some(taxid) = attrs.get("taxid") {
                    self.channel.set("taxid", taxid.trim());
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, path: &TagPath, text: &str) {
        if self.skip_sample && path.contains("Sample") {
            return;
        }
        if path.tag() == "Overall-Design" {
            self.result.overall_design = scrub(text);
            return;
        }
        if path.parent() == "Sample" {
            match path.tag() {
                "Description" => self.sample.description = scrub_value(text),
                "Title" => self.sample.title = scrub(text),
                "Type" => self.sample.sample_type = scrub(text),
                _ => {}
            }
            return;
        }
        if path.parent() == "Channel" {
            match path.tag() {
                "Source" => self.channel.set("source", text.trim()),
                "Organism" => self.channel.set("taxidValue", text.trim()),
                "Treatment-Protocol" => self.channel.set("treatmentProt", &scrub(text)),
                "Molecule" => self.channel.set("molecule", text.trim()),
                "Characteristics" => {
                    let tag = std::mem::take(&mut self.characteristic_tag);
                    self.channel.set(&tag, &scrub(text));
                }
                _ => {}
            }
        }
    }

    fn exit(&mut self, path: &TagPath) {
        if path.tag() == "Sample" && path.depth() == 2 {
            if !self.skip_sample {
                if !self.channel.is_empty() {
                    self.channels.push(std::mem::take(&mut self.channel));
                }
                let mut sample = std::mem::take(&mut self.sample);
                sample.channels = std::mem::take(&mut self.channels);
                self.result.samples.push(sample);
            }
            self.reset_sample();
        }
    }
}

/// Parses one MINiML sample file. Duplicate sample identifiers keep the
/// first occurrence; identifier-less samples are dropped; both are recorded
/// in the ledger against `experiment_id`.
pub fn parse_sample_file<R: BufRead>(
    input: R,
    label: &str,
    experiment_id: &str,
    ledger: &mut ClassificationLedger,
) -> Result<SampleFileResult, LoadError> {
    let mut accumulator = SampleAccumulator::new(experiment_id, ledger);
    TagPathWalker::walk(input, &mut accumulator, label)?;
    Ok(accumulator.result)
}
