use anyhow::Result;
use log::{debug, info};
use pyo3::prelude::*;
use std::path::{Path, PathBuf};

pub mod config;
pub mod counter;
pub mod error;
pub mod report;
pub mod stats;

pub use config::{CounterBackend, ReportConfig};
pub use counter::{BamRecordCounter, RecordCounter, SamtoolsCounter};
pub use error::StatsError;
pub use stats::{FilteringStats, ReportInputs, SampleStats};

/// Path of the JSON summary written next to a report
pub fn json_sidecar_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}

/// Count every input, then write the report to `output`.
///
/// Nothing is written unless every file was counted successfully.
pub fn generate_report<P: AsRef<Path>>(
    inputs: &ReportInputs,
    output: P,
    config: &ReportConfig,
    counter: &dyn RecordCounter,
) -> Result<FilteringStats> {
    let output = output.as_ref();
    let stats = stats::collect_stats(inputs, &config.sample_suffix, counter)?;

    // Sidecar before report: a failed run leaves no fresh report
    if config.json_summary {
        report::ensure_parent_dir(output)?;
        stats.write_json(json_sidecar_path(output))?;
    }
    report::write_report(&stats, output, &report::timestamp())?;

    info!(
        "Blacklist statistics complete: {} samples, {} of {} reads excluded ({})",
        stats.samples.len(),
        stats.total_blacklisted,
        stats.total_original,
        stats::format_percent(stats.percent_excluded)
    );
    Ok(stats)
}

/// Bad arguments become `ValueError`, everything else `RuntimeError`
fn is_config_error(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<StatsError>(), Some(StatsError::Config(_)))
}

fn to_py_err(e: anyhow::Error) -> PyErr {
    log::error!("{:#}", e);
    if is_config_error(&e) {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{:#}", e))
    } else {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{:#}", e))
    }
}

fn build_config(
    suffix: &str,
    backend: &str,
    samtools: &str,
    threads: usize,
    json_summary: bool,
) -> Result<ReportConfig> {
    Ok(ReportConfig {
        sample_suffix: suffix.to_string(),
        backend: backend.parse()?,
        samtools: samtools.to_string(),
        threads,
        json_summary,
    })
}

/// Counts the records in an alignment file.
#[pyfunction]
#[pyo3(signature = (path, backend="samtools", samtools="samtools", threads=1))]
#[pyo3(text_signature = "(path, backend='samtools', samtools='samtools', threads=1)")]
fn count_records(path: PathBuf, backend: &str, samtools: &str, threads: usize) -> PyResult<u64> {
    let config = build_config("", backend, samtools, threads, false).map_err(to_py_err)?;
    config.counter().count_records(&path).map_err(to_py_err)
}

/// Writes blacklist filtering statistics for each sample to `output`.
#[pyfunction]
#[pyo3(name = "generate_report")]
#[pyo3(signature = (
    original_bams,
    filtered_bams,
    excluded_bams,
    output,
    samples=None,
    suffix=".dedup.bam",
    backend="samtools",
    samtools="samtools",
    threads=1,
    json_summary=false
))]
#[pyo3(text_signature = "(original_bams, filtered_bams, excluded_bams, output, samples=None, suffix='.dedup.bam', backend='samtools', samtools='samtools', threads=1, json_summary=False)")]
#[allow(clippy::too_many_arguments)]
fn py_generate_report(
    original_bams: Vec<PathBuf>,
    filtered_bams: Vec<PathBuf>,
    excluded_bams: Vec<PathBuf>,
    output: PathBuf,
    samples: Option<Vec<String>>,
    suffix: &str,
    backend: &str,
    samtools: &str,
    threads: usize,
    json_summary: bool,
) -> PyResult<FilteringStats> {
    let config =
        build_config(suffix, backend, samtools, threads, json_summary).map_err(to_py_err)?;

    let inputs = ReportInputs {
        original: original_bams,
        filtered: filtered_bams,
        excluded: excluded_bams,
        samples,
    };

    let counter = config.counter();
    generate_report(&inputs, &output, &config, counter.as_ref()).map_err(to_py_err)
}

/// Read-count statistics for blacklist filtering.
#[pymodule]
fn blacklist_stats(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();
    if let Err(e) = ctrlc::try_set_handler(move || {
        info!("Received SIGINT, exiting...");
        std::process::exit(130);
    }) {
        debug!("SIGINT handler not installed: {}", e);
    }

    m.add_class::<SampleStats>()?;
    m.add_class::<FilteringStats>()?;
    m.add_function(wrap_pyfunction!(count_records, m)?)?;
    m.add_function(wrap_pyfunction!(py_generate_report, m)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::tests::{two_sample_counter, two_sample_inputs, MockCounter};

    fn without_date(report: &str) -> String {
        report
            .lines()
            .filter(|l| !l.starts_with("# Date:"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_generate_report_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("stats").join("blacklist_stats.txt");
        let config = ReportConfig {
            json_summary: true,
            ..ReportConfig::default()
        };

        let stats =
            generate_report(&two_sample_inputs(), &output, &config, &two_sample_counter())
                .unwrap();
        assert_eq!(stats.total_original, 300);

        let text = std::fs::read_to_string(&output).unwrap();
        let data_rows: Vec<_> = text
            .lines()
            .skip_while(|l| !l.starts_with("Sample"))
            .skip(1)
            .take_while(|l| !l.is_empty())
            .collect();
        assert_eq!(data_rows.len(), 2);
        assert!(data_rows[0].trim_start().starts_with("a "));
        assert!(data_rows[1].trim_start().starts_with("b "));
        assert!(text.contains("Average percentage excluded: 20.00%"));

        let json = std::fs::read_to_string(json_sidecar_path(&output)).unwrap();
        let parsed: FilteringStats = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stats);
    }

    #[test]
    fn test_reruns_differ_only_in_date() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        let config = ReportConfig::default();

        generate_report(&two_sample_inputs(), &first, &config, &two_sample_counter()).unwrap();
        generate_report(&two_sample_inputs(), &second, &config, &two_sample_counter()).unwrap();

        let first = std::fs::read_to_string(first).unwrap();
        let second = std::fs::read_to_string(second).unwrap();
        assert_eq!(without_date(&first), without_date(&second));
    }

    #[test]
    fn test_counting_failure_leaves_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out").join("stats.txt");
        let counter = MockCounter::new(&[
            ("a.dedup.bam", 100),
            ("a.filtered.bam", 90),
            ("a.excluded.bam", 10),
            ("b.dedup.bam", 200),
            ("b.filtered.bam", 150),
        ]);

        let err = generate_report(&two_sample_inputs(), &output, &ReportConfig::default(), &counter)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StatsError>(),
            Some(StatsError::Counting { .. })
        ));
        assert!(!output.exists());
        assert!(!output.parent().unwrap().exists());
    }

    #[test]
    fn test_existing_report_untouched_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("stats.txt");
        std::fs::write(&output, "previous run\n").unwrap();

        let counter = MockCounter::new(&[]);
        assert!(
            generate_report(&two_sample_inputs(), &output, &ReportConfig::default(), &counter)
                .is_err()
        );
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous run\n");
    }

    #[test]
    fn test_native_backend_end_to_end() {
        use noodles::sam::alignment::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let write_bam = |name: &str, n: usize| -> PathBuf {
            let path = dir.path().join(name);
            let mut writer = noodles::bam::io::writer::Builder::default()
                .build_from_path(&path)
                .unwrap();
            let header = noodles::sam::Header::default();
            writer.write_header(&header).unwrap();
            for _ in 0..n {
                writer
                    .write_alignment_record(&header, &noodles::sam::alignment::RecordBuf::default())
                    .unwrap();
            }
            writer.try_finish().unwrap();
            path
        };

        let inputs = ReportInputs::new(
            [write_bam("S1.dedup.bam", 8), write_bam("S2.dedup.bam", 0)],
            [write_bam("S1.filtered.bam", 6), write_bam("S2.filtered.bam", 0)],
            [write_bam("S1.excluded.bam", 2), write_bam("S2.excluded.bam", 0)],
        );
        let config = ReportConfig {
            backend: CounterBackend::Native,
            ..ReportConfig::default()
        };
        let output = dir.path().join("report.txt");

        let stats = generate_report(&inputs, &output, &config, config.counter().as_ref()).unwrap();
        assert_eq!(stats.samples[0].sample, "S1");
        assert_eq!(stats.samples[0].percent_excluded_str(), "25.00%");
        assert_eq!(stats.samples[1].sample, "S2");
        assert_eq!(stats.samples[1].percent_excluded_str(), "0.00%");
        assert_eq!(format!("{:.2}", stats.percent_excluded), "25.00");
    }

    #[test]
    fn test_zero_reads_everywhere_leaves_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("stats.txt");
        let counter = MockCounter::new(&[
            ("a.dedup.bam", 0),
            ("a.filtered.bam", 0),
            ("a.excluded.bam", 0),
            ("b.dedup.bam", 0),
            ("b.filtered.bam", 0),
            ("b.excluded.bam", 0),
        ]);

        let err = generate_report(&two_sample_inputs(), &output, &ReportConfig::default(), &counter)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StatsError>(),
            Some(StatsError::UndefinedAggregate)
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_sidecar_failure_leaves_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("stats.txt");
        // A directory where the sidecar should go makes the JSON write fail
        std::fs::create_dir(json_sidecar_path(&output)).unwrap();
        let config = ReportConfig {
            json_summary: true,
            ..ReportConfig::default()
        };

        assert!(generate_report(&two_sample_inputs(), &output, &config, &two_sample_counter())
            .is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_build_config_rejects_unknown_backend() {
        let err = build_config(".dedup.bam", "bwa", "samtools", 1, false).unwrap_err();
        assert!(matches!(err.downcast_ref::<StatsError>(), Some(StatsError::Config(_))));
        assert!(is_config_error(&err));

        let config = build_config(".bam", "native", "samtools", 2, true).unwrap();
        assert_eq!(config.backend, CounterBackend::Native);
        assert_eq!(config.sample_suffix, ".bam");
    }

    #[test]
    fn test_error_classification() {
        let counting: anyhow::Error = StatsError::counting("a.bam", "file not found").into();
        assert!(!is_config_error(&counting));
        assert!(!is_config_error(&StatsError::UndefinedAggregate.into()));
        assert!(!is_config_error(&anyhow::anyhow!("disk full")));

        let mismatched = collect_config_error();
        assert!(is_config_error(&mismatched));
    }

    fn collect_config_error() -> anyhow::Error {
        let inputs = ReportInputs::new(["a.bam"], ["a.f.bam", "b.f.bam"], ["a.x.bam"]);
        stats::collect_stats(&inputs, ".bam", &MockCounter::new(&[])).unwrap_err()
    }

    #[test]
    fn test_json_sidecar_path() {
        assert_eq!(
            json_sidecar_path(Path::new("stats/blacklist.txt")),
            PathBuf::from("stats/blacklist.txt.json")
        );
    }
}
