use anyhow::{Context, Result};
use itertools::izip;
use log::{info, warn};
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::counter::RecordCounter;
use crate::error::StatsError;

/// Read counts of one sample across the filtering stages.
#[derive(Debug, Serialize, Clone, Deserialize, PartialEq)]
#[pyclass]
pub struct SampleStats {
    #[pyo3(get)]
    pub sample: String,
    #[pyo3(get)]
    pub original_reads: u64,
    #[pyo3(get)]
    pub filtered_reads: u64,
    #[pyo3(get)]
    pub blacklisted_reads: u64,
}

/// `numerator / denominator * 100`, or 0 when there is nothing to divide by
fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

#[pymethods]
impl SampleStats {
    #[new]
    pub fn new(
        sample: String,
        original_reads: u64,
        filtered_reads: u64,
        blacklisted_reads: u64,
    ) -> Self {
        Self {
            sample,
            original_reads,
            filtered_reads,
            blacklisted_reads,
        }
    }

    /// Share of the original reads that were blacklisted, 0 for an empty input
    pub fn percent_excluded(&self) -> f64 {
        percentage(self.blacklisted_reads, self.original_reads)
    }

    fn __repr__(&self) -> String {
        format!(
            "SampleStats(sample='{}', original_reads={}, filtered_reads={}, blacklisted_reads={})",
            self.sample, self.original_reads, self.filtered_reads, self.blacklisted_reads
        )
    }
}

impl SampleStats {
    pub fn percent_excluded_str(&self) -> String {
        format_percent(self.percent_excluded())
    }
}

/// Per-sample counts in input order plus the column totals.
#[derive(Debug, Serialize, Clone, Deserialize, PartialEq)]
#[pyclass]
pub struct FilteringStats {
    #[pyo3(get)]
    pub samples: Vec<SampleStats>,
    #[pyo3(get)]
    pub total_original: u64,
    #[pyo3(get)]
    pub total_filtered: u64,
    #[pyo3(get)]
    pub total_blacklisted: u64,
    #[pyo3(get)]
    pub percent_excluded: f64,
}

impl FilteringStats {
    pub fn from_samples(samples: Vec<SampleStats>) -> Result<Self> {
        let total_original: u64 = samples.iter().map(|s| s.original_reads).sum();
        let total_filtered: u64 = samples.iter().map(|s| s.filtered_reads).sum();
        let total_blacklisted: u64 = samples.iter().map(|s| s.blacklisted_reads).sum();

        if total_original == 0 {
            return Err(StatsError::UndefinedAggregate.into());
        }

        Ok(Self {
            samples,
            total_original,
            total_filtered,
            total_blacklisted,
            percent_excluded: percentage(total_blacklisted, total_original),
        })
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("Could not create {}", path.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Could not write {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }
}

#[pymethods]
impl FilteringStats {
    fn __len__(&self) -> usize {
        self.samples.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "FilteringStats(n_samples={}, total_original={}, total_filtered={}, total_blacklisted={}, percent_excluded={:.2})",
            self.samples.len(),
            self.total_original,
            self.total_filtered,
            self.total_blacklisted,
            self.percent_excluded
        )
    }
}

/// Files to count for every sample, in report order.
#[derive(Debug, Clone, Default)]
pub struct ReportInputs {
    pub original: Vec<PathBuf>,
    pub filtered: Vec<PathBuf>,
    pub excluded: Vec<PathBuf>,
    pub samples: Option<Vec<String>>,
}

impl ReportInputs {
    pub fn new<P: Into<PathBuf>>(
        original: impl IntoIterator<Item = P>,
        filtered: impl IntoIterator<Item = P>,
        excluded: impl IntoIterator<Item = P>,
    ) -> Self {
        Self {
            original: original.into_iter().map(Into::into).collect(),
            filtered: filtered.into_iter().map(Into::into).collect(),
            excluded: excluded.into_iter().map(Into::into).collect(),
            samples: None,
        }
    }

    pub fn with_samples(mut self, samples: Vec<String>) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        let n = self.original.len();
        if n == 0 {
            return Err(StatsError::Config("no original alignment files given".to_string()));
        }
        if self.filtered.len() != n || self.excluded.len() != n {
            return Err(StatsError::Config(format!(
                "mismatched input lists: {} original, {} filtered, {} excluded",
                n,
                self.filtered.len(),
                self.excluded.len()
            )));
        }
        if let Some(samples) = &self.samples {
            if samples.len() != n {
                return Err(StatsError::Config(format!(
                    "{} sample names given for {} original alignment files",
                    samples.len(),
                    n
                )));
            }
        }
        Ok(())
    }

    /// Explicit sample names, or the original file names with `suffix` stripped
    pub fn sample_names(&self, suffix: &str) -> Vec<String> {
        match &self.samples {
            Some(samples) => samples.clone(),
            None => self
                .original
                .iter()
                .map(|p| sample_name_from_path(p, suffix))
                .collect(),
        }
    }
}

pub fn sample_name_from_path(path: &Path, suffix: &str) -> String {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    match file_name.strip_suffix(suffix) {
        Some(stem) if !suffix.is_empty() && !stem.is_empty() => stem.to_string(),
        _ => file_name,
    }
}

/// Count every file and assemble the statistics. Stops at the first failure.
pub fn collect_stats(
    inputs: &ReportInputs,
    sample_suffix: &str,
    counter: &dyn RecordCounter,
) -> Result<FilteringStats> {
    inputs.validate()?;

    let names = inputs.sample_names(sample_suffix);
    let mut samples = Vec::with_capacity(names.len());

    for (sample, original, filtered, excluded) in
        izip!(names, &inputs.original, &inputs.filtered, &inputs.excluded)
    {
        let original_reads = counter.count_records(original)?;
        let filtered_reads = counter.count_records(filtered)?;
        let blacklisted_reads = counter.count_records(excluded)?;

        let stats = SampleStats::new(sample, original_reads, filtered_reads, blacklisted_reads);
        if blacklisted_reads > original_reads {
            warn!(
                "{}: more blacklisted reads ({}) than original reads ({})",
                stats.sample, blacklisted_reads, original_reads
            );
        }
        info!(
            "{}: {} original, {} filtered, {} blacklisted ({})",
            stats.sample,
            original_reads,
            filtered_reads,
            blacklisted_reads,
            stats.percent_excluded_str()
        );
        samples.push(stats);
    }

    FilteringStats::from_samples(samples)
}
