use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Deserialize;

use crate::error::LoadError;

/// Previously persisted state for a batch run: which experiments are already
/// known, their recorded sample identifiers partitioned by curation status,
/// and their recorded PubMed IDs. Read-only input, supplied by the
/// persistence collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Baseline {
    #[serde(default)]
    known: HashMap<String, u64>,
    #[serde(default)]
    curated: HashMap<String, HashSet<String>>,
    #[serde(default)]
    non_curated: HashMap<String, HashSet<String>>,
    #[serde(default)]
    pubmed: HashMap<String, Vec<String>>,
}

impl Baseline {
    pub fn from_json(content: &str) -> Result<Self, LoadError> {
        serde_json::from_str(content).map_err(|err| LoadError::Baseline(err.to_string()))
    }

    pub fn experiment_key(&self, external_id: &str) -> Option<u64> {
        self.known.get(external_id).copied()
    }

    pub fn is_known(&self, external_id: &str) -> bool {
        self.known.contains_key(external_id)
    }

    pub fn pubmed_ids(&self, external_id: &str) -> &[String] {
        self.pubmed
            .get(external_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn partition_of(&self, external_id: &str) -> (Partition, Option<&HashSet<String>>) {
        if let Some(samples) = self.curated.get(external_id) {
            (Partition::Curated, Some(samples))
        } else {
            (Partition::NonCurated, self.non_curated.get(external_id))
        }
    }

    #[cfg(test)]
    pub fn for_tests(
        known: &[(&str, u64)],
        curated: &[(&str, &[&str])],
        non_curated: &[(&str, &[&str])],
    ) -> Self {
        let to_sets = |entries: &[(&str, &[&str])]| {
            entries
                .iter()
                .map(|(id, samples)| {
                    (
                        id.to_string(),
                        samples.iter().map(|s| s.to_string()).collect(),
                    )
                })
                .collect()
        };
        Self {
            known: known
                .iter()
                .map(|(id, key)| (id.to_string(), *key))
                .collect(),
            curated: to_sets(curated),
            non_curated: to_sets(non_curated),
            pubmed: HashMap::new(),
        }
    }
}

/// Curated experiments are held to a stricter "investigate every change"
/// policy downstream, so their gains/losses are totalled separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Curated,
    NonCurated,
}

/// Gained/lost sample identifiers for one experiment. Sets are ordered for
/// deterministic report output; the computation itself is order-free.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleDelta {
    pub gained: BTreeSet<String>,
    pub lost: BTreeSet<String>,
}

impl SampleDelta {
    pub fn is_empty(&self) -> bool {
        self.gained.is_empty() && self.lost.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DeltaLine {
    pub external_id: String,
    pub delta: SampleDelta,
    /// False when the baseline had no entry at all for this experiment; the
    /// empty `lost` set then means "no prior samples", not "all samples lost".
    pub had_prior: bool,
}

#[derive(Debug, Default)]
pub struct PartitionSummary {
    pub gained_total: usize,
    pub lost_total: usize,
    pub lines: Vec<DeltaLine>,
}

/// Computes per-experiment gain/loss sets against the baseline and keeps
/// independent running totals for curated and non-curated experiments.
#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    pub curated: PartitionSummary,
    pub non_curated: PartitionSummary,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconcile(
        &mut self,
        baseline: &Baseline,
        external_id: &str,
        input: &HashSet<String>,
    ) -> SampleDelta {
        let (partition, prior) = baseline.partition_of(external_id);
        let had_prior = prior.is_some();
        let empty = HashSet::new();
        let prior = prior.unwrap_or(&empty);

        let delta = SampleDelta {
            gained: input.difference(prior).cloned().collect(),
            lost: prior.difference(input).cloned().collect(),
        };

        if !delta.is_empty() {
            let summary = match partition {
                Partition::Curated => &mut self.curated,
                Partition::NonCurated => &mut self.non_curated,
            };
            summary.gained_total += delta.gained.len();
            summary.lost_total += delta.lost.len();
            summary.lines.push(DeltaLine {
                external_id: external_id.to_string(),
                delta: delta.clone(),
                had_prior,
            });
        }
        delta
    }

    /// Incoming PubMed IDs not yet recorded for a known experiment, in
    /// incoming order.
    pub fn pubmed_additions(
        baseline: &Baseline,
        external_id: &str,
        incoming: &[String],
    ) -> Vec<String> {
        let recorded: HashSet<&str> = baseline
            .pubmed_ids(external_id)
            .iter()
            .map(String::as_str)
            .collect();
        incoming
            .iter()
            .filter(|id| !recorded.contains(id.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn gained_and_lost_are_set_differences() {
        let baseline = Baseline::for_tests(&[("GSE1", 10)], &[("GSE1", &["S1", "S2"])], &[]);
        let mut engine = ReconciliationEngine::new();
        let delta = engine.reconcile(&baseline, "GSE1", &ids(&["S2", "S3"]));
        assert_eq!(delta.gained, ids(&["S3"]).into_iter().collect());
        assert_eq!(delta.lost, ids(&["S1"]).into_iter().collect());
        assert!(delta.gained.intersection(&delta.lost).next().is_none());
        assert_eq!(engine.curated.gained_total, 1);
        assert_eq!(engine.curated.lost_total, 1);
    }

    #[test]
    fn curated_and_non_curated_are_totalled_separately() {
        let baseline = Baseline::for_tests(
            &[("GSE1", 10), ("GSE2", 11)],
            &[("GSE1", &["S1"])],
            &[("GSE2", &["T1"])],
        );
        let mut engine = ReconciliationEngine::new();
        engine.reconcile(&baseline, "GSE1", &ids(&["S1", "S9"]));
        engine.reconcile(&baseline, "GSE2", &ids(&[]));
        assert_eq!(engine.curated.gained_total, 1);
        assert_eq!(engine.curated.lost_total, 0);
        assert_eq!(engine.non_curated.lost_total, 1);
        assert_eq!(engine.non_curated.lines.len(), 1);
    }

    #[test]
    fn no_baseline_entry_means_no_prior_samples() {
        let baseline = Baseline::for_tests(&[], &[], &[]);
        let mut engine = ReconciliationEngine::new();
        let delta = engine.reconcile(&baseline, "GSE9", &ids(&["S1"]));
        assert!(delta.lost.is_empty());
        assert_eq!(engine.non_curated.lost_total, 0);
        assert_eq!(engine.non_curated.gained_total, 1);
        assert!(!engine.non_curated.lines[0].had_prior);
    }

    #[test]
    fn unchanged_input_records_nothing() {
        let baseline = Baseline::for_tests(&[("GSE1", 10)], &[("GSE1", &["S1"])], &[]);
        let mut engine = ReconciliationEngine::new();
        let delta = engine.reconcile(&baseline, "GSE1", &ids(&["S1"]));
        assert!(delta.is_empty());
        assert!(engine.curated.lines.is_empty());
    }

    #[test]
    fn reconcile_is_idempotent_after_applying_the_delta() {
        let input = ids(&["S1", "S2"]);
        let updated = Baseline::for_tests(&[("GSE1", 10)], &[("GSE1", &["S1", "S2"])], &[]);
        let mut engine = ReconciliationEngine::new();
        let delta = engine.reconcile(&updated, "GSE1", &input);
        assert!(delta.is_empty());
    }

    #[test]
    fn pubmed_additions_keep_incoming_order() {
        let mut baseline = Baseline::for_tests(&[("GSE1", 10)], &[], &[]);
        baseline
            .pubmed
            .insert("GSE1".to_string(), vec!["111".to_string()]);
        let incoming = vec!["222".to_string(), "111".to_string(), "333".to_string()];
        let additions = ReconciliationEngine::pubmed_additions(&baseline, "GSE1", &incoming);
        assert_eq!(additions, ["222", "333"]);
    }
}
