use std::fmt::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;

use crate::app::BatchSummary;
use crate::domain::Archive;
use crate::error::LoadError;
use crate::ledger::ClassificationLedger;
use crate::reconcile::{PartitionSummary, ReconciliationEngine};
use crate::store::InputStore;

/// Renders and writes the end-of-batch reports. Rendering is pure so the
/// exact text is testable; only the write step touches the filesystem.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    reports_dir: Utf8PathBuf,
}

impl ReportWriter {
    pub fn new(reports_dir: Utf8PathBuf) -> Self {
        Self { reports_dir }
    }

    pub fn write_qc(
        &self,
        archive: Archive,
        date: NaiveDate,
        summary: &BatchSummary,
        ledger: &ClassificationLedger,
    ) -> Result<Utf8PathBuf, LoadError> {
        let path = self.dated_path("qc", archive, date);
        InputStore::write_bytes_atomic(&path, render_qc(archive, date, summary, ledger).as_bytes())?;
        Ok(path)
    }

    pub fn write_reconciliation(
        &self,
        archive: Archive,
        date: NaiveDate,
        engine: &ReconciliationEngine,
    ) -> Result<Utf8PathBuf, LoadError> {
        let path = self.dated_path("sample_changes", archive, date);
        InputStore::write_bytes_atomic(
            &path,
            render_reconciliation(archive, date, engine).as_bytes(),
        )?;
        Ok(path)
    }

    fn dated_path(&self, stem: &str, archive: Archive, date: NaiveDate) -> Utf8PathBuf {
        self.reports_dir
            .join(format!("{stem}_{archive}_{}.txt", date.format("%b-%d-%Y")))
    }

    pub fn reports_dir(&self) -> &Utf8Path {
        &self.reports_dir
    }
}

pub fn render_qc(
    archive: Archive,
    date: NaiveDate,
    summary: &BatchSummary,
    ledger: &ClassificationLedger,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "High-throughput experiment load QC - {archive} - {}",
        date.format("%b-%d-%Y")
    );
    out.push('\n');
    let _ = writeln!(out, "Experiments in the input: {}", summary.experiments_in_input);
    let _ = writeln!(out, "Experiments loaded: {}", summary.experiments_loaded);
    let _ = writeln!(
        out,
        "Experiments already in the database: {}",
        summary.experiments_already_known
    );
    let _ = writeln!(out, "Experiments updated: {}", summary.experiments_updated);
    let _ = writeln!(out, "Samples loaded: {}", summary.samples_loaded);

    for (reason, entries) in ledger.iter() {
        out.push('\n');
        let _ = writeln!(out, "{}: {}", reason.label(), entries.len());
        for entry in entries {
            let _ = writeln!(out, "    {entry}");
        }
    }
    out
}

pub fn render_reconciliation(
    archive: Archive,
    date: NaiveDate,
    engine: &ReconciliationEngine,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Sample membership changes - {archive} - {}",
        date.format("%b-%d-%Y")
    );
    render_partition(&mut out, "Curated experiments", &engine.curated);
    render_partition(&mut out, "Non-curated experiments", &engine.non_curated);
    out
}

fn render_partition(out: &mut String, heading: &str, partition: &PartitionSummary) {
    out.push('\n');
    let _ = writeln!(
        out,
        "{heading}: {} gained, {} lost",
        partition.gained_total, partition.lost_total
    );
    for line in &partition.lines {
        if line.had_prior {
            let _ = writeln!(out, "  {}", line.external_id);
        } else {
            let _ = writeln!(out, "  {} (no prior samples)", line.external_id);
        }
        if !line.delta.gained.is_empty() {
            let gained: Vec<&str> = line.delta.gained.iter().map(String::as_str).collect();
            let _ = writeln!(out, "    gained: {}", gained.join(", "));
        }
        if !line.delta.lost.is_empty() {
            let lost: Vec<&str> = line.delta.lost.iter().map(String::as_str).collect();
            let _ = writeln!(out, "    lost: {}", lost.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::ledger::SkipReason;
    use crate::reconcile::Baseline;

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn qc_report_lists_every_category_in_fixed_order() {
        let mut ledger = ClassificationLedger::new();
        ledger.record(SkipReason::Superseries, "GSE101");
        ledger.record(SkipReason::UnresolvedTypeValue, "CNV profiling");
        let summary = BatchSummary {
            experiments_in_input: 3,
            experiments_loaded: 1,
            ..BatchSummary::default()
        };

        let text = render_qc(Archive::Geo, june_first(), &summary, &ledger);
        assert!(text.starts_with("High-throughput experiment load QC - geo - Jun-01-2024"));
        assert!(text.contains("Experiments in the input: 3"));
        assert!(text.contains("Experiments skipped, SuperSeries: 1\n    GSE101"));
        let type_pos = text.find("Experiment types not found in translation").unwrap();
        let super_pos = text.find("Experiments skipped, SuperSeries").unwrap();
        assert!(type_pos < super_pos);
        // empty categories still report a zero count
        assert!(text.contains("Missing sample files: 0"));
    }

    #[test]
    fn reconciliation_report_marks_missing_baselines() {
        let baseline = Baseline::for_tests(&[("GSE1", 1)], &[("GSE1", &["S1", "S2"])], &[]);
        let mut engine = ReconciliationEngine::new();
        let input: HashSet<String> = ["S2".to_string(), "S3".to_string()].into_iter().collect();
        engine.reconcile(&baseline, "GSE1", &input);
        let fresh: HashSet<String> = ["T1".to_string()].into_iter().collect();
        engine.reconcile(&baseline, "GSE9", &fresh);

        let text = render_reconciliation(Archive::Geo, june_first(), &engine);
        assert!(text.contains("Curated experiments: 1 gained, 1 lost"));
        assert!(text.contains("  GSE1\n    gained: S3\n    lost: S1\n"));
        assert!(text.contains("Non-curated experiments: 1 gained, 0 lost"));
        assert!(text.contains("  GSE9 (no prior samples)\n    gained: T1\n"));
    }

    #[test]
    fn report_filenames_carry_archive_and_date() {
        let writer = ReportWriter::new(Utf8PathBuf::from("/tmp/reports"));
        let path = writer.dated_path("qc", Archive::ArrayExpress, june_first());
        assert_eq!(path.as_str(), "/tmp/reports/qc_arrayexpress_Jun-01-2024.txt");
    }
}
