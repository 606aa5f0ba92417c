//! CSV reader for aggregate load-test reports.
//!
//! The report has one header line followed by one row per sampler label:
//!
//! ```text
//! Label,No_Samples,Average,Min,Max,Std_Dev,Error_Per,Throughput,Received_KBpersec,Sent_KBpersec,Avg_Bytes
//! ```
//!
//! `Error_Per` is written with a trailing `%` by most tools; the sign is
//! optional here and an empty cell means zero errors.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use validator::Validate;

use crate::domain::{AppError, BenchmarkRow, ReportError};

/// Columns every report must carry
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "Label",
    "No_Samples",
    "Average",
    "Min",
    "Max",
    "Std_Dev",
    "Error_Per",
    "Throughput",
    "Received_KBpersec",
    "Sent_KBpersec",
    "Avg_Bytes",
];

/// One row as written in the file
#[derive(Debug, Deserialize)]
struct RawBenchmarkRecord {
    #[serde(rename = "Label")]
    label: String,
    #[serde(rename = "No_Samples")]
    no_samples: i64,
    #[serde(rename = "Average")]
    average: f64,
    #[serde(rename = "Min")]
    min: f64,
    #[serde(rename = "Max")]
    max: f64,
    #[serde(rename = "Std_Dev")]
    std_dev: f64,
    #[serde(rename = "Error_Per")]
    error_per: String,
    #[serde(rename = "Throughput")]
    throughput: f64,
    #[serde(rename = "Received_KBpersec")]
    received_kb_per_sec: f64,
    #[serde(rename = "Sent_KBpersec")]
    sent_kb_per_sec: f64,
    #[serde(rename = "Avg_Bytes")]
    avg_bytes: f64,
}

impl RawBenchmarkRecord {
    fn into_row(self) -> Result<BenchmarkRow, String> {
        let error_per = parse_error_percent(&self.error_per)?;
        for (column, value) in [
            ("Average", self.average),
            ("Min", self.min),
            ("Max", self.max),
            ("Std_Dev", self.std_dev),
            ("Throughput", self.throughput),
            ("Received_KBpersec", self.received_kb_per_sec),
            ("Sent_KBpersec", self.sent_kb_per_sec),
            ("Avg_Bytes", self.avg_bytes),
        ] {
            if !value.is_finite() {
                return Err(format!("{} is not a finite number: {}", column, value));
            }
        }
        Ok(BenchmarkRow {
            label: self.label,
            no_samples: self.no_samples,
            average: self.average,
            min: self.min,
            max: self.max,
            std_dev: self.std_dev,
            error_per,
            throughput: self.throughput,
            received_kb_per_sec: self.received_kb_per_sec,
            sent_kb_per_sec: self.sent_kb_per_sec,
            avg_bytes: self.avg_bytes,
        })
    }
}

/// Parse an error percentage such as `"2.50%"`, `"2.5"` or `""`
pub fn parse_error_percent(raw: &str) -> Result<f64, String> {
    let value = raw.trim();
    let value = value.strip_suffix('%').unwrap_or(value).trim_end();
    if value.is_empty() {
        return Ok(0.0);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|percent| percent.is_finite())
        .ok_or_else(|| format!("Error_Per is not a percentage: '{}'", raw))
}

/// Open a report and check its header.
///
/// Rows are parsed lazily by the returned iterator; a missing column fails
/// here, before any row is produced.
pub fn read_benchmark_rows<R: Read>(reader: R) -> Result<BenchmarkRows<R>, AppError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(false)
        .from_reader(reader);

    let headers = reader.headers().map_err(ReportError::from)?.clone();
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|h| h == **column))
    {
        return Err(ReportError::MissingColumn((*missing).to_string()).into());
    }

    Ok(BenchmarkRows {
        reader,
        headers,
        record: StringRecord::new(),
        done: false,
    })
}

/// Iterator over validated report rows
pub struct BenchmarkRows<R> {
    reader: csv::Reader<R>,
    headers: StringRecord,
    record: StringRecord,
    done: bool,
}

impl<R: Read> BenchmarkRows<R> {
    fn next_row(&mut self) -> Option<Result<BenchmarkRow, AppError>> {
        match self.reader.read_record(&mut self.record) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                let line = self.record.position().map_or(0, |p| p.line());
                Some(parse_record(&self.record, &self.headers, line))
            }
            Err(e) => match e.kind() {
                // Wrong field count still leaves the reader usable
                csv::ErrorKind::UnequalLengths { pos, .. } => {
                    let line = pos.as_ref().map_or(0, |p| p.line());
                    Some(Err(invalid_row(line, e.to_string())))
                }
                _ => {
                    self.done = true;
                    Some(Err(ReportError::from(e).into()))
                }
            },
        }
    }
}

impl<R: Read> Iterator for BenchmarkRows<R> {
    type Item = Result<BenchmarkRow, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.next_row()
    }
}

fn parse_record(
    record: &StringRecord,
    headers: &StringRecord,
    line: u64,
) -> Result<BenchmarkRow, AppError> {
    let raw: RawBenchmarkRecord = record
        .deserialize(Some(headers))
        .map_err(|e| invalid_row(line, e.to_string()))?;
    let row = raw.into_row().map_err(|message| invalid_row(line, message))?;
    row.validate()
        .map_err(|e| invalid_row(line, e.to_string()))?;
    Ok(row)
}

fn invalid_row(line: u64, message: String) -> AppError {
    ReportError::InvalidRow { line, message }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Label,No_Samples,Average,Min,Max,Std_Dev,Error_Per,Throughput,Received_KBpersec,Sent_KBpersec,Avg_Bytes\n";

    fn rows(body: &str) -> Vec<Result<BenchmarkRow, AppError>> {
        read_benchmark_rows(format!("{}{}", HEADER, body).as_bytes())
            .unwrap()
            .collect()
    }

    #[test]
    fn test_parse_error_percent() {
        assert_eq!(parse_error_percent("2.50%").unwrap(), 2.5);
        assert_eq!(parse_error_percent(" 7 % ").unwrap(), 7.0);
        assert_eq!(parse_error_percent("0").unwrap(), 0.0);
        assert_eq!(parse_error_percent("").unwrap(), 0.0);
        assert!(parse_error_percent("n/a").is_err());
        assert!(parse_error_percent("NaN%").is_err());
        assert!(parse_error_percent("inf").is_err());
    }

    #[test]
    fn test_non_finite_values_are_invalid_rows() {
        let rows = rows(
            "x,1,1,1,1,1,NaN%,1,1,1,1
             y,1,1,1,1,1,0%,NaN,1,1,1
             z,1,1,1,inf,1,0%,1,1,1,1
",
        );

        assert_eq!(rows.len(), 3);
        for (row, expected_line) in rows.iter().zip(2u64..) {
            match row {
                Err(AppError::Report(ReportError::InvalidRow { line, .. })) => {
                    assert_eq!(*line, expected_line);
                }
                other => panic!("Expected InvalidRow, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_reads_rows() {
        let rows = rows(
            "getBalance, 50, 120, 80, 400, 22.5, 0.00%, 8.1, 2.0, 1.1, 256\n\
             TOTAL,50,120,80,400,22.5,,8.1,2.0,1.1,256\n",
        );

        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.label, "getBalance");
        assert_eq!(first.no_samples, 50);
        assert_eq!(first.std_dev, 22.5);
        assert_eq!(first.avg_bytes, 256.0);
        assert_eq!(rows[1].as_ref().unwrap().error_per, 0.0);
    }

    #[test]
    fn test_column_order_does_not_matter() {
        let report = "Avg_Bytes,Label,No_Samples,Average,Min,Max,Std_Dev,Error_Per,Throughput,Received_KBpersec,Sent_KBpersec\n\
                      512,send,3,1,1,1,0,1%,1,1,1\n";
        let rows: Vec<_> = read_benchmark_rows(report.as_bytes()).unwrap().collect();

        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.label, "send");
        assert_eq!(row.avg_bytes, 512.0);
        assert_eq!(row.error_per, 1.0);
    }

    #[test]
    fn test_missing_column_is_rejected_up_front() {
        let report = "Label,No_Samples,Average\nsend,1,2\n";
        let result = read_benchmark_rows(report.as_bytes());

        match result {
            Err(AppError::Report(ReportError::MissingColumn(column))) => {
                assert_eq!(column, "Min");
            }
            _ => panic!("Expected MissingColumn error"),
        }
    }

    #[test]
    fn test_invalid_rows_carry_line_numbers() {
        let rows = rows(
            "ok,1,1,1,1,1,0%,1,1,1,1\n\
             bad,x,1,1,1,1,0%,1,1,1,1\n\
             short,1,1\n\
             ,1,1,1,1,1,0%,1,1,1,1\n\
             ok2,1,1,1,1,1,0%,1,1,1,1\n",
        );

        assert_eq!(rows.len(), 5);
        assert!(rows[0].is_ok());
        for (index, expected_line) in [(1, 3u64), (2, 4), (3, 5)] {
            match &rows[index] {
                Err(AppError::Report(ReportError::InvalidRow { line, .. })) => {
                    assert_eq!(*line, expected_line);
                }
                other => panic!("Expected InvalidRow, got {:?}", other),
            }
        }
        assert!(rows[4].is_ok());
    }

    #[test]
    fn test_empty_report_has_no_rows() {
        assert!(rows("").is_empty());
    }
}
