use chrono::NaiveDate;

use crate::domain::TranslationTable;
use crate::ledger::{ClassificationLedger, SkipReason};

/// Catch-all raw type; accepted only when it is the sole raw type on an
/// experiment.
pub const OTHER_TYPE: &str = "Other";

/// Substring of the summary that marks a container (superseries) record.
pub const SUPERSERIES_MARK: &str = "This SuperSeries";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeChoice {
    pub raw: String,
    pub key: i64,
}

/// Resolves the ordered raw type list against the translation table.
///
/// First translatable value wins, but the scan never stops early: every
/// untranslatable value in the list is recorded for vocabulary maintenance,
/// including ones after the winning match. "Other" alongside any other raw
/// type disqualifies the whole list even when "Other" itself translates.
pub fn classify_types(
    raw_types: &[String],
    table: &TranslationTable,
    ledger: &mut ClassificationLedger,
) -> Option<TypeChoice> {
    if raw_types.len() > 1 && raw_types.iter().any(|raw| raw == OTHER_TYPE) {
        return None;
    }
    let mut choice = None;
    for raw in raw_types {
        match table.lookup(raw) {
            Some(key) if choice.is_none() => {
                choice = Some(TypeChoice {
                    raw: raw.clone(),
                    key,
                });
            }
            Some(_) => {}
            None => ledger.record(SkipReason::UnresolvedTypeValue, raw.clone()),
        }
    }
    choice
}

/// Archive-B organism rule: at least one organism string must start with the
/// configured prefix, case-insensitively.
pub fn organism_matches(organisms: &[String], prefix: &str) -> bool {
    let prefix = prefix.to_lowercase();
    organisms
        .iter()
        .any(|organism| organism.to_lowercase().starts_with(&prefix))
}

pub fn sample_count_is_integer(raw: &str) -> bool {
    !raw.is_empty() && raw.chars().all(|ch| ch.is_ascii_digit())
}

pub fn release_date_is_valid(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::TranslationTable;

    fn table(entries: &[(&str, i64)]) -> TranslationTable {
        TranslationTable::new(
            entries
                .iter()
                .map(|(raw, key)| (raw.to_string(), *key))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn raw(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn first_translatable_wins_and_all_misses_are_recorded() {
        let table = table(&[("Y", 7)]);
        let mut ledger = ClassificationLedger::new();
        let choice = classify_types(&raw(&["X", "Y", "Z"]), &table, &mut ledger).unwrap();
        assert_eq!(choice.raw, "Y");
        assert_eq!(choice.key, 7);
        assert_eq!(ledger.entries(SkipReason::UnresolvedTypeValue), ["X", "Z"]);
    }

    #[test]
    fn later_matches_do_not_replace_the_first() {
        let table = table(&[("A", 1), ("B", 2)]);
        let mut ledger = ClassificationLedger::new();
        let choice = classify_types(&raw(&["A", "B"]), &table, &mut ledger).unwrap();
        assert_eq!(choice.raw, "A");
    }

    #[test]
    fn no_translatable_type_is_none() {
        let table = table(&[("Y", 7)]);
        let mut ledger = ClassificationLedger::new();
        assert!(classify_types(&raw(&["X", "Z"]), &table, &mut ledger).is_none());
        assert_eq!(ledger.count(SkipReason::UnresolvedTypeValue), 2);
    }

    #[test]
    fn other_alone_is_accepted() {
        let table = table(&[("Other", 42)]);
        let mut ledger = ClassificationLedger::new();
        let choice = classify_types(&raw(&["Other"]), &table, &mut ledger).unwrap();
        assert_eq!(choice.key, 42);
    }

    #[test]
    fn other_with_company_is_rejected_even_when_both_translate() {
        let table = table(&[("Other", 42), ("Y", 7)]);
        let mut ledger = ClassificationLedger::new();
        assert!(classify_types(&raw(&["Other", "Y"]), &table, &mut ledger).is_none());
        // the early reject happens before any value is scanned
        assert_eq!(ledger.count(SkipReason::UnresolvedTypeValue), 0);
    }

    #[test]
    fn organism_prefix_is_case_insensitive() {
        assert!(organism_matches(&raw(&["Mus musculus"]), "mus"));
        assert!(organism_matches(&raw(&["homo sapiens", "MUS MUSCULUS"]), "mus"));
        assert!(!organism_matches(&raw(&["homo sapiens"]), "mus"));
        assert!(!organism_matches(&[], "mus"));
    }

    #[test]
    fn field_shape_checks() {
        assert!(sample_count_is_integer("3"));
        assert!(!sample_count_is_integer("three"));
        assert!(!sample_count_is_integer(""));
        assert!(release_date_is_valid("2024-06-01"));
        assert!(!release_date_is_valid("06/01/2024"));
    }
}
