use std::collections::HashSet;

/// Candidate identifier fields for one sample row. Any of them may be empty;
/// empty means "not provided".
#[derive(Debug, Clone, Default)]
pub struct SampleIdFields {
    pub source_name: String,
    pub ena_sample: String,
    pub biosd_sample: String,
}

/// Outcome of resolving one sample against the priority chain and the
/// identifiers already seen within the owning experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// First occurrence of this identifier within the experiment.
    Resolved(String),
    /// Identifier already used by an earlier sample of the same experiment;
    /// the later occurrence's attributes are dropped, the first is kept.
    Duplicate(String),
    /// No candidate field carried a value; the sample cannot be loaded.
    NoIdentifier,
}

/// Chooses a stable sample identifier and tracks duplicates within one
/// experiment. One resolver instance per experiment.
#[derive(Debug, Default)]
pub struct IdentifierResolver {
    seen: HashSet<String>,
}

impl IdentifierResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Priority chain: ENA sample ID, then BioSD sample ID, then source name.
    pub fn choose(fields: &SampleIdFields) -> Option<String> {
        for candidate in [
            &fields.ena_sample,
            &fields.biosd_sample,
            &fields.source_name,
        ] {
            if !candidate.is_empty() {
                return Some(candidate.clone());
            }
        }
        None
    }

    pub fn resolve(&mut self, fields: &SampleIdFields) -> Resolution {
        match Self::choose(fields) {
            Some(id) => self.resolve_id(&id),
            None => Resolution::NoIdentifier,
        }
    }

    /// Dedup entry point for archives that supply the identifier directly
    /// (the GEO sample `iid` attribute).
    pub fn resolve_id(&mut self, id: &str) -> Resolution {
        if id.is_empty() {
            return Resolution::NoIdentifier;
        }
        if self.seen.insert(id.to_string()) {
            Resolution::Resolved(id.to_string())
        } else {
            Resolution::Duplicate(id.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(source: &str, ena: &str, biosd: &str) -> SampleIdFields {
        SampleIdFields {
            source_name: source.to_string(),
            ena_sample: ena.to_string(),
            biosd_sample: biosd.to_string(),
        }
    }

    #[test]
    fn ena_wins_regardless_of_other_fields() {
        let chosen = IdentifierResolver::choose(&fields("liver, 1", "ERS001", "SAMEA1"));
        assert_eq!(chosen.as_deref(), Some("ERS001"));
    }

    #[test]
    fn biosd_beats_source_name() {
        let chosen = IdentifierResolver::choose(&fields("liver, 1", "", "SAMEA1"));
        assert_eq!(chosen.as_deref(), Some("SAMEA1"));
    }

    #[test]
    fn source_name_is_the_last_resort() {
        let chosen = IdentifierResolver::choose(&fields("liver, 1", "", ""));
        assert_eq!(chosen.as_deref(), Some("liver, 1"));
    }

    #[test]
    fn all_empty_is_no_identifier() {
        let mut resolver = IdentifierResolver::new();
        assert_eq!(resolver.resolve(&fields("", "", "")), Resolution::NoIdentifier);
    }

    #[test]
    fn second_occurrence_is_a_duplicate() {
        let mut resolver = IdentifierResolver::new();
        assert_eq!(
            resolver.resolve_id("S1"),
            Resolution::Resolved("S1".to_string())
        );
        assert_eq!(
            resolver.resolve_id("S1"),
            Resolution::Duplicate("S1".to_string())
        );
        assert_eq!(
            resolver.resolve_id("S2"),
            Resolution::Resolved("S2".to_string())
        );
    }
}
