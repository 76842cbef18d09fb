use std::collections::HashSet;

/// Why a record was skipped or flagged. Reasons are evaluated independently,
/// never short-circuited, so one experiment may land in several categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingExperimentFile,
    MissingSampleFile,
    ParseError,
    UnresolvedType,
    UnresolvedTypeValue,
    Superseries,
    MaxSamples,
    NonMouseOrganism,
    NoIdentifier,
    DuplicateIdentifier,
    LoadedWithoutSamples,
    NoSamples,
    InvalidSampleCount,
    InvalidReleaseDate,
}

impl SkipReason {
    /// Report order; also the iteration order of the ledger.
    pub const ALL: [SkipReason; 14] = [
        SkipReason::MissingExperimentFile,
        SkipReason::MissingSampleFile,
        SkipReason::ParseError,
        SkipReason::UnresolvedType,
        SkipReason::UnresolvedTypeValue,
        SkipReason::Superseries,
        SkipReason::MaxSamples,
        SkipReason::NonMouseOrganism,
        SkipReason::NoIdentifier,
        SkipReason::DuplicateIdentifier,
        SkipReason::LoadedWithoutSamples,
        SkipReason::NoSamples,
        SkipReason::InvalidSampleCount,
        SkipReason::InvalidReleaseDate,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::MissingExperimentFile => "Missing or empty experiment files",
            SkipReason::MissingSampleFile => "Missing sample files",
            SkipReason::ParseError => "Files skipped for parse errors",
            SkipReason::UnresolvedType => "Experiments skipped, type not in translation",
            SkipReason::UnresolvedTypeValue => "Experiment types not found in translation",
            SkipReason::Superseries => "Experiments skipped, SuperSeries",
            SkipReason::MaxSamples => "Experiments over the sample maximum, samples not loaded",
            SkipReason::NonMouseOrganism => "Experiments skipped, organism not matched",
            SkipReason::NoIdentifier => "Samples with no resolvable ID, sample not loaded",
            SkipReason::DuplicateIdentifier => "Experiments with duplicated sample IDs",
            SkipReason::LoadedWithoutSamples => "Experiments loaded without samples",
            SkipReason::NoSamples => "Experiments skipped, no loadable samples",
            SkipReason::InvalidSampleCount => "Experiments with non-integer sample count",
            SkipReason::InvalidReleaseDate => "Experiments with invalid release date",
        }
    }

    /// Set-valued categories deduplicate their entries; the rest are plain
    /// ordered lists that may repeat.
    fn dedupes(&self) -> bool {
        matches!(
            self,
            SkipReason::UnresolvedType
                | SkipReason::UnresolvedTypeValue
                | SkipReason::Superseries
                | SkipReason::MaxSamples
                | SkipReason::InvalidSampleCount
                | SkipReason::InvalidReleaseDate
        )
    }
}

#[derive(Debug, Default)]
struct Category {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl Category {
    fn record(&mut self, detail: String, dedupe: bool) {
        if dedupe {
            if !self.seen.insert(detail.clone()) {
                return;
            }
        }
        self.order.push(detail);
    }
}

/// Append-only accumulator of skip/flag reasons for one batch run. Entries
/// are never removed; iteration is first-insertion order within each
/// category and [`SkipReason::ALL`] order across categories.
#[derive(Debug, Default)]
pub struct ClassificationLedger {
    categories: [Category; SkipReason::ALL.len()],
}

impl ClassificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: SkipReason, detail: impl Into<String>) {
        let index = Self::index(reason);
        self.categories[index].record(detail.into(), reason.dedupes());
    }

    pub fn entries(&self, reason: SkipReason) -> &[String] {
        &self.categories[Self::index(reason)].order
    }

    pub fn count(&self, reason: SkipReason) -> usize {
        self.entries(reason).len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkipReason, &[String])> {
        SkipReason::ALL
            .iter()
            .map(|reason| (*reason, self.entries(*reason)))
    }

    fn index(reason: SkipReason) -> usize {
        SkipReason::ALL
            .iter()
            .position(|candidate| *candidate == reason)
            .unwrap_or(0)
    }
}
