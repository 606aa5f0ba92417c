//! Loads load-test aggregate reports into the benchmark table.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{AppError, BenchmarkRow, BenchmarkStore, LoadSummary, ReportError};
use crate::infra::report::read_benchmark_rows;

use super::retry::{Backoff, RetryPolicy};

/// Parsed rows waiting to be inserted while a file is loaded
pub const ROW_BUFFER: usize = 64;

/// Loader behaviour
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Log and count rows that fail to parse or validate instead of aborting
    pub skip_invalid_rows: bool,
    /// Policy for each insert; only transient database errors are retried
    pub insert_policy: RetryPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            skip_invalid_rows: false,
            insert_policy: RetryPolicy::new(3).with_backoff(Backoff::Exponential {
                base: Duration::from_millis(200),
                max: Duration::from_secs(2),
                jitter: true,
            }),
        }
    }
}

/// Streams report rows into a [`BenchmarkStore`]
pub struct BenchmarkLoader {
    store: Arc<dyn BenchmarkStore>,
    config: LoaderConfig,
}

impl BenchmarkLoader {
    #[must_use]
    pub fn new(store: Arc<dyn BenchmarkStore>) -> Self {
        Self::with_config(store, LoaderConfig::default())
    }

    #[must_use]
    pub fn with_config(store: Arc<dyn BenchmarkStore>, config: LoaderConfig) -> Self {
        Self { store, config }
    }

    /// Load the CSV report at `path`.
    ///
    /// The file is parsed on a blocking thread and rows are handed over one
    /// at a time, so at most [`ROW_BUFFER`] parsed rows are held in memory.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<LoadSummary, AppError> {
        let path = path.as_ref().to_path_buf();
        let (tx, mut rx) = mpsc::channel(ROW_BUFFER);

        let parser = tokio::task::spawn_blocking(move || -> Result<(), AppError> {
            let file = File::open(&path).map_err(ReportError::from)?;
            for record in read_benchmark_rows(BufReader::new(file))? {
                // Receiver gone: the loader already stopped
                if tx.blocking_send(record).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let mut summary = LoadSummary::default();
        let mut stored = Ok(());
        while let Some(record) = rx.recv().await {
            if let Err(e) = self.store_record(record, &mut summary).await {
                stored = Err(e);
                break;
            }
        }
        drop(rx);

        parser
            .await
            .map_err(|e| ReportError::Io(std::io::Error::other(e)))??;
        stored?;

        Self::finish(summary)
    }

    /// Load a CSV report from any reader, inserting rows in file order
    pub async fn load_reader<R: Read>(&self, reader: R) -> Result<LoadSummary, AppError> {
        let mut summary = LoadSummary::default();
        for record in read_benchmark_rows(reader)? {
            self.store_record(record, &mut summary).await?;
        }
        Self::finish(summary)
    }

    async fn store_record(
        &self,
        record: Result<BenchmarkRow, AppError>,
        summary: &mut LoadSummary,
    ) -> Result<(), AppError> {
        let row = match record {
            Ok(row) => row,
            Err(AppError::Report(ReportError::InvalidRow { line, message }))
                if self.config.skip_invalid_rows =>
            {
                warn!(line, message = %message, "Skipping invalid report row");
                summary.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let id = self
            .config
            .insert_policy
            .run_if(
                || self.store.insert_benchmark_row(&row),
                AppError::is_transient,
            )
            .await?;
        debug!(id, label = %row.label, "Inserted benchmark row");
        summary.inserted += 1;
        Ok(())
    }

    fn finish(summary: LoadSummary) -> Result<LoadSummary, AppError> {
        info!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            "Benchmark report loaded"
        );
        Ok(summary)
    }
}
