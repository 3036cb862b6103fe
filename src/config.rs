//! Run configuration for the blacklist statistics report.
//!
//! Everything the workflow used to hand over implicitly (suffix convention,
//! counting tool, thread count) lives here as typed fields. The struct can be
//! built in code, from the Python bindings, or loaded from a JSON file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::counter::{BamRecordCounter, RecordCounter, SamtoolsCounter};
use crate::error::StatsError;

/// Which implementation counts the records of an alignment file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    #[default]
    Samtools,
    Native,
}

impl std::fmt::Display for CounterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CounterBackend::Samtools => write!(f, "samtools"),
            CounterBackend::Native => write!(f, "native"),
        }
    }
}

impl std::str::FromStr for CounterBackend {
    type Err = StatsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "samtools" => Ok(CounterBackend::Samtools),
            "native" | "noodles" => Ok(CounterBackend::Native),
            other => Err(StatsError::Config(format!(
                "Unknown counting backend '{}' (expected 'samtools' or 'native')",
                other
            ))),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ReportConfig {
    /// Stripped from file names when sample names are not supplied
    #[serde(default = "default_sample_suffix")]
    pub sample_suffix: String,
    #[serde(default)]
    pub backend: CounterBackend,
    /// Program invoked by the samtools backend
    #[serde(default = "default_samtools")]
    pub samtools: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Also write `<output>.json` next to the text report
    #[serde(default)]
    pub json_summary: bool,
}

fn default_sample_suffix() -> String { ".dedup.bam".to_string() }
fn default_samtools() -> String { "samtools".to_string() }
fn default_threads() -> usize { 1 }

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sample_suffix: default_sample_suffix(),
            backend: CounterBackend::default(),
            samtools: default_samtools(),
            threads: default_threads(),
            json_summary: false,
        }
    }
}

impl ReportConfig {
    /// Load configuration from a JSON file; absent fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Could not open config file {}", path.display()))?;
        let config: ReportConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Could not parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Build the record counter selected by `backend`
    pub fn counter(&self) -> Box<dyn RecordCounter> {
        match self.backend {
            CounterBackend::Samtools => Box::new(
                SamtoolsCounter::new(&self.samtools).with_threads(self.threads),
            ),
            CounterBackend::Native => Box::new(BamRecordCounter::default()),
        }
    }
}
