use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::ae;
use crate::classify::{
    classify_types, organism_matches, release_date_is_valid, sample_count_is_integer,
};
use crate::config::{ResolvedConfig, SamplelessPolicy};
use crate::domain::{
    ExperimentAccession, ExperimentRow, KeyValueRow, PubMedAddition, RawExperiment, RawSample,
    SampleRow, TranslationTable,
};
use crate::error::LoadError;
use crate::geo;
use crate::keys::BatchKeys;
use crate::ledger::{ClassificationLedger, SkipReason};
use crate::reconcile::{Baseline, ReconciliationEngine};
use crate::store::InputStore;

/// Receiver for the normalized output rows. The production collaborator
/// writes bulk-load files; [`DelimitedSink`] is the in-repo reference
/// implementation.
pub trait PersistenceSink {
    fn experiment(&mut self, row: &ExperimentRow) -> Result<(), LoadError>;
    fn sample(&mut self, row: &SampleRow) -> Result<(), LoadError>;
    fn key_value(&mut self, row: &KeyValueRow) -> Result<(), LoadError>;
    fn pubmed_addition(&mut self, addition: &PubMedAddition) -> Result<(), LoadError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub experiments_in_input: usize,
    pub experiments_loaded: usize,
    pub experiments_already_known: usize,
    pub experiments_updated: usize,
    pub samples_loaded: usize,
}

/// One batch run over one archive's input files. Per-experiment failures are
/// recorded in the ledger and the run continues; only a broken batch file or
/// a sink failure aborts the run.
pub struct Loader<S: PersistenceSink> {
    config: ResolvedConfig,
    store: InputStore,
    table: TranslationTable,
    baseline: Baseline,
    keys: BatchKeys,
    pub sink: S,
    pub ledger: ClassificationLedger,
    pub engine: ReconciliationEngine,
    pub summary: BatchSummary,
}

impl<S: PersistenceSink> Loader<S> {
    pub fn new(
        config: ResolvedConfig,
        table: TranslationTable,
        baseline: Baseline,
        keys: BatchKeys,
        sink: S,
    ) -> Self {
        let store = InputStore::new(config.downloads_dir.clone(), &config.sample_suffix);
        Self {
            config,
            store,
            table,
            baseline,
            keys,
            sink,
            ledger: ClassificationLedger::new(),
            engine: ReconciliationEngine::new(),
            summary: BatchSummary::default(),
        }
    }

    /// Runs one GEO batch: a single eSummary file holding many experiment
    /// records, plus one MINiML sample file per experiment under the
    /// downloads directory.
    pub fn run_geo(&mut self, batch_file: &Utf8Path) -> Result<(), LoadError> {
        info!(batch = %batch_file, "starting geo batch");
        let reader = InputStore::open_text(batch_file)?;
        let records = geo::parse_experiment_summaries(reader, batch_file.as_str())?;
        self.summary.experiments_in_input += records.len();

        for record in records {
            let id = record.external_id.clone();
            if self.baseline.is_known(&id) {
                let sample_ids = self.geo_sample_ids(&id);
                self.update_known(&record, sample_ids);
            } else {
                self.load_geo_experiment(record)?;
            }
        }
        info!(summary = ?self.summary, "geo batch finished");
        Ok(())
    }

    /// Runs one ArrayExpress batch driven by an ID list file of
    /// `<exptID>\t<action>` lines.
    pub fn run_ae(&mut self, id_list: &Utf8Path) -> Result<(), LoadError> {
        info!(id_list = %id_list, "starting arrayexpress batch");
        let content = InputStore::read_to_string(id_list)?;

        for line in content.lines() {
            let id = line.split('\t').next().unwrap_or("").trim();
            if id.is_empty() {
                continue;
            }
            self.summary.experiments_in_input += 1;
            if id.parse::<ExperimentAccession>().is_err() {
                self.ledger.record(SkipReason::ParseError, id);
                warn!(id, "unrecognized accession in id list");
                continue;
            }
            if self.baseline.is_known(id) {
                let experiment = match self.read_ae_experiment(id) {
                    Some(experiment) => experiment,
                    None => RawExperiment {
                        external_id: id.to_string(),
                        ..RawExperiment::default()
                    },
                };
                let sample_ids = self.ae_sample_ids(id);
                self.update_known(&experiment, sample_ids);
            } else {
                self.load_ae_experiment(id)?;
            }
        }
        info!(summary = ?self.summary, "arrayexpress batch finished");
        Ok(())
    }

    fn load_geo_experiment(&mut self, mut record: RawExperiment) -> Result<(), LoadError> {
        let id = record.external_id.clone();
        let Some(choice) = classify_types(&record.raw_types, &self.table, &mut self.ledger) else {
            self.ledger.record(SkipReason::UnresolvedType, id.clone());
            debug!(id, "no translatable experiment type");
            return Ok(());
        };
        if record.is_superseries {
            self.ledger.record(SkipReason::Superseries, id);
            return Ok(());
        }
        self.validate_fields(&record);

        let mut samples = match self.store.geo_sample_file(&id) {
            None => {
                self.ledger.record(SkipReason::MissingSampleFile, id.clone());
                Vec::new()
            }
            Some(path) => {
                let reader = InputStore::open_text(&path)?;
                match geo::parse_sample_file(reader, path.as_str(), &id, &mut self.ledger) {
                    Ok(result) => {
                        record.overall_design = result.overall_design;
                        result.samples
                    }
                    Err(err) => {
                        self.ledger.record(SkipReason::ParseError, id.clone());
                        warn!(id, error = %err, "sample file unparsable, experiment skipped");
                        return Ok(());
                    }
                }
            }
        };
        if self.over_sample_maximum(&id, samples.len()) {
            samples.clear();
        }

        self.emit(record, choice.key, samples)
    }

    fn load_ae_experiment(&mut self, id: &str) -> Result<(), LoadError> {
        let Some(experiment) = self.read_ae_experiment(id) else {
            return Ok(());
        };

        let Some(choice) = classify_types(&experiment.raw_types, &self.table, &mut self.ledger)
        else {
            self.ledger.record(SkipReason::UnresolvedType, id);
            return Ok(());
        };
        if !organism_matches(&experiment.organisms, &self.config.organism_prefix) {
            self.ledger.record(SkipReason::NonMouseOrganism, id);
            return Ok(());
        }
        self.validate_fields(&experiment);

        let mut samples = match self.store.ae_sample_file(id) {
            None => {
                self.ledger.record(SkipReason::MissingSampleFile, id);
                Vec::new()
            }
            Some(path) => {
                let reader = InputStore::open_text(&path)?;
                match ae::parse_sample_table(reader, path.as_str(), id, &mut self.ledger) {
                    Ok(samples) => samples,
                    Err(err) => {
                        self.ledger.record(SkipReason::ParseError, id);
                        warn!(id, error = %err, "sample table unparsable, experiment skipped");
                        return Ok(());
                    }
                }
            }
        };
        if self.over_sample_maximum(id, samples.len()) {
            samples.clear();
        }

        self.emit(experiment, choice.key, samples)
    }

    /// Reads and parses one Archive-B experiment document; a missing or
    /// unparsable file is recorded and yields `None`.
    fn read_ae_experiment(&mut self, id: &str) -> Option<RawExperiment> {
        let Some(path) = self.store.ae_experiment_file(id) else {
            self.ledger.record(SkipReason::MissingExperimentFile, id);
            return None;
        };
        let parsed = InputStore::read_to_string(&path)
            .and_then(|content| {
                serde_json::from_str(&content).map_err(|err| LoadError::Json {
                    path: path.to_string(),
                    message: err.to_string(),
                })
            })
            .and_then(|document| ae::parse_experiment(&document, path.as_str()));
        match parsed {
            Ok(experiment) => Some(experiment),
            Err(err) => {
                self.ledger.record(SkipReason::ParseError, id);
                warn!(id, error = %err, "experiment file unparsable");
                None
            }
        }
    }

    /// Known experiments are never re-loaded; incoming PubMed IDs not yet
    /// recorded become property additions, and the current sample set is
    /// reconciled against the baseline for the gain/loss report.
    fn update_known(&mut self, experiment: &RawExperiment, sample_ids: Option<Vec<String>>) {
        let id = &experiment.external_id;
        self.summary.experiments_already_known += 1;

        let additions =
            ReconciliationEngine::pubmed_additions(&self.baseline, id, &experiment.pubmed_ids);
        let updated = !additions.is_empty();
        for pubmed_id in additions {
            if let Err(err) = self.sink.pubmed_addition(&PubMedAddition {
                external_id: id.clone(),
                pubmed_id,
            }) {
                warn!(id, error = %err, "sink rejected pubmed addition");
            }
        }
        if updated {
            self.summary.experiments_updated += 1;
        }

        // reconciliation follows the same sample maximum as a fresh load
        if let Some(ids) = sample_ids {
            if ids.len() > self.config.max_samples {
                self.ledger.record(SkipReason::MaxSamples, id.as_str());
            } else {
                let input = ids.into_iter().collect();
                self.engine.reconcile(&self.baseline, id, &input);
            }
        }
    }

    fn geo_sample_ids(&mut self, id: &str) -> Option<Vec<String>> {
        let path = self.store.geo_sample_file(id)?;
        let reader = InputStore::open_text(&path).ok()?;
        match geo::parse_sample_file(reader, path.as_str(), id, &mut self.ledger) {
            Ok(result) => Some(
                result
                    .samples
                    .into_iter()
                    .map(|sample| sample.sample_id)
                    .collect(),
            ),
            Err(_) => {
                self.ledger.record(SkipReason::ParseError, id);
                None
            }
        }
    }

    fn ae_sample_ids(&mut self, id: &str) -> Option<Vec<String>> {
        let path = self.store.ae_sample_file(id)?;
        let reader = InputStore::open_text(&path).ok()?;
        match ae::parse_sample_table(reader, path.as_str(), id, &mut self.ledger) {
            Ok(samples) => Some(samples.into_iter().map(|sample| sample.sample_id).collect()),
            Err(_) => {
                self.ledger.record(SkipReason::ParseError, id);
                None
            }
        }
    }

    /// Field-shape checks; violations are recorded but never block the load,
    /// the values pass through as text.
    fn validate_fields(&mut self, experiment: &RawExperiment) {
        if !sample_count_is_integer(&experiment.sample_count) {
            self.ledger
                .record(SkipReason::InvalidSampleCount, experiment.external_id.as_str());
        }
        if !release_date_is_valid(&experiment.release_date) {
            self.ledger
                .record(SkipReason::InvalidReleaseDate, experiment.external_id.as_str());
        }
    }

    /// The parsed sample list, not the declared count, decides the maximum;
    /// exceeding it drops the samples while the experiment may still load.
    fn over_sample_maximum(&mut self, id: &str, parsed: usize) -> bool {
        if parsed > self.config.max_samples {
            self.ledger.record(SkipReason::MaxSamples, id);
            return true;
        }
        false
    }

    fn emit(
        &mut self,
        experiment: RawExperiment,
        type_key: i64,
        samples: Vec<RawSample>,
    ) -> Result<(), LoadError> {
        let id = experiment.external_id.clone();

        if samples.is_empty() {
            match self.config.sampleless {
                SamplelessPolicy::Load => {
                    self.ledger.record(SkipReason::LoadedWithoutSamples, &id);
                }
                SamplelessPolicy::Skip => {
                    self.ledger.record(SkipReason::NoSamples, &id);
                    return Ok(());
                }
            }
        }

        let experiment_key = self.keys.experiments.next();
        self.sink.experiment(&ExperimentRow {
            key: experiment_key,
            external_id: id.clone(),
            title: experiment.title.clone(),
            description: experiment.description(),
            release_date: experiment.release_date.clone(),
            type_key,
            raw_types: experiment.raw_types.clone(),
            pubmed_ids: experiment.pubmed_ids.clone(),
            sample_count: experiment.sample_count.clone(),
        })?;
        self.summary.experiments_loaded += 1;

        let mut loaded_ids = std::collections::HashSet::new();
        for sample in &samples {
            let sample_key = self.keys.samples.next();
            self.sink.sample(&SampleRow {
                key: sample_key,
                experiment_key,
                sample_id: sample.sample_id.clone(),
            })?;
            self.summary.samples_loaded += 1;
            loaded_ids.insert(sample.sample_id.clone());

            // sample-level metadata rides along as channel-1 attributes
            let sample_fields = [
                ("description", &sample.description),
                ("title", &sample.title),
                ("sType", &sample.sample_type),
            ];
            for (name, value) in sample_fields {
                if value.is_empty() {
                    continue;
                }
                self.sink.key_value(&KeyValueRow {
                    key: self.keys.key_values.next(),
                    sample_key,
                    name: name.to_string(),
                    value: value.clone(),
                    channel: 1,
                })?;
            }

            for (index, channel) in sample.channels.iter().enumerate() {
                let position = (index + 1) as u32;
                for (name, value) in channel.iter() {
                    self.sink.key_value(&KeyValueRow {
                        key: self.keys.key_values.next(),
                        sample_key,
                        name: name.to_string(),
                        value: value.to_string(),
                        channel: position,
                    })?;
                }
            }
        }

        self.engine.reconcile(&self.baseline, &id, &loaded_ids);
        debug!(id, samples = samples.len(), "experiment loaded");
        Ok(())
    }
}

/// Tab-delimited file sink, one file per output table, written atomically at
/// flush time.
#[derive(Debug, Default)]
pub struct DelimitedSink {
    out_dir: Utf8PathBuf,
    experiments: String,
    samples: String,
    key_values: String,
    pubmed: String,
}

impl DelimitedSink {
    pub fn new(out_dir: Utf8PathBuf) -> Self {
        Self {
            out_dir,
            ..Self::default()
        }
    }

    pub fn flush(&self) -> Result<(), LoadError> {
        InputStore::write_bytes_atomic(
            &self.out_dir.join("experiments.txt"),
            self.experiments.as_bytes(),
        )?;
        InputStore::write_bytes_atomic(&self.out_dir.join("samples.txt"), self.samples.as_bytes())?;
        InputStore::write_bytes_atomic(
            &self.out_dir.join("key_values.txt"),
            self.key_values.as_bytes(),
        )?;
        InputStore::write_bytes_atomic(
            &self.out_dir.join("pubmed_additions.txt"),
            self.pubmed.as_bytes(),
        )?;
        Ok(())
    }
}

impl PersistenceSink for DelimitedSink {
    fn experiment(&mut self, row: &ExperimentRow) -> Result<(), LoadError> {
        self.experiments.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            row.key,
            row.external_id,
            row.title,
            row.description,
            row.release_date,
            row.type_key,
            row.raw_types.join("; "),
            row.pubmed_ids.join(","),
            row.sample_count,
        ));
        Ok(())
    }

    fn sample(&mut self, row: &SampleRow) -> Result<(), LoadError> {
        self.samples.push_str(&format!(
            "{}\t{}\t{}\n",
            row.key, row.experiment_key, row.sample_id
        ));
        Ok(())
    }

    fn key_value(&mut self, row: &KeyValueRow) -> Result<(), LoadError> {
        self.key_values.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\n",
            row.key, row.sample_key, row.channel, row.name, row.value
        ));
        Ok(())
    }

    fn pubmed_addition(&mut self, addition: &PubMedAddition) -> Result<(), LoadError> {
        self.pubmed.push_str(&format!(
            "{}\t{}\n",
            addition.external_id, addition.pubmed_id
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_sink_formats_rows() {
        let mut sink = DelimitedSink::new(Utf8PathBuf::from("unused"));
        sink.experiment(&ExperimentRow {
            key: 5,
            external_id: "GSE1".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            release_date: "2024-06-01".to_string(),
            type_key: 9,
            raw_types: vec!["A".to_string(), "B".to_string()],
            pubmed_ids: vec!["11".to_string()],
            sample_count: "2".to_string(),
        })
        .unwrap();
        sink.sample(&SampleRow {
            key: 7,
            experiment_key: 5,
            sample_id: "GSM1".to_string(),
        })
        .unwrap();
        sink.key_value(&KeyValueRow {
            key: 1,
            sample_key: 7,
            name: "source".to_string(),
            value: "liver".to_string(),
            channel: 2,
        })
        .unwrap();

        assert_eq!(
            sink.experiments,
            "5\tGSE1\tt\td\t2024-06-01\t9\tA; B\t11\t2\n"
        );
        assert_eq!(sink.samples, "7\t5\tGSM1\n");
        assert_eq!(sink.key_values, "1\t7\t2\tsource\tliver\n");
    }
}
