use anyhow::Result;
use log::debug;
use noodles::bam;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use crate::error::StatsError;

// ETXTBSY: the program file is still open for writing in some process
const TEXT_FILE_BUSY: i32 = 26;
const SPAWN_ATTEMPTS: u32 = 5;

/// Run `cmd`, retrying while the executable is briefly busy
fn run_with_retry(cmd: &mut Command) -> std::io::Result<Output> {
    let mut attempt = 1;
    loop {
        match cmd.output() {
            Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) && attempt < SPAWN_ATTEMPTS => {
                debug!("Executable busy, retrying ({}/{})", attempt, SPAWN_ATTEMPTS);
                std::thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Counts the alignment records stored in a file.
///
/// Aggregation only talks to this trait so the subprocess and the native
/// implementation are interchangeable.
pub trait RecordCounter {
    fn count_records(&self, path: &Path) -> Result<u64>;
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(StatsError::counting(path, "file not found").into());
    }
    Ok(())
}

/// Counts records with `samtools view -c`.
#[derive(Debug, Clone)]
pub struct SamtoolsCounter {
    program: PathBuf,
    threads: usize,
}

impl Default for SamtoolsCounter {
    fn default() -> Self {
        Self::new("samtools")
    }
}

impl SamtoolsCounter {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            threads: 1,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("view").arg("-c");
        // samtools -@ is the number of *additional* threads
        if self.threads > 1 {
            cmd.arg("-@").arg((self.threads - 1).to_string());
        }
        cmd.arg(path).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

impl RecordCounter for SamtoolsCounter {
    fn count_records(&self, path: &Path) -> Result<u64> {
        ensure_exists(path)?;

        let mut cmd = self.command(path);
        debug!("Running {:?}", cmd);

        let output = run_with_retry(&mut cmd).map_err(|e| {
            StatsError::counting(
                path,
                format!("could not run {}: {}", self.program.display(), e),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StatsError::counting(
                path,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    stderr.trim()
                ),
            )
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let count = stdout.trim().parse::<u64>().map_err(|_| {
            StatsError::counting(
                path,
                format!("unexpected output from {}: '{}'", self.program.display(), stdout.trim()),
            )
        })?;

        Ok(count)
    }
}

/// Counts every record of a BAM file by reading it with noodles.
///
/// Matches `samtools view -c` without filters: secondary, supplementary and
/// unmapped records are all counted.
#[derive(Debug, Clone, Default)]
pub struct BamRecordCounter;

impl RecordCounter for BamRecordCounter {
    fn count_records(&self, path: &Path) -> Result<u64> {
        ensure_exists(path)?;
        debug!("Counting records in {} with noodles", path.display());

        let mut reader = bam::io::reader::Builder::default()
            .build_from_path(path)
            .map_err(|e| StatsError::counting(path, e.to_string()))?;
        reader
            .read_header()
            .map_err(|e| StatsError::counting(path, format!("invalid header: {}", e)))?;

        let mut n_records = 0;
        for record in reader.records() {
            record.map_err(|e| StatsError::counting(path, format!("invalid record: {}", e)))?;
            n_records += 1;
        }

        Ok(n_records)
    }
}
