use crate::signal::SampledPoint;
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{fs::File, io::Read, path::Path};

/// Parse `timestamp_ms,value` rows (header required, column order free).
pub fn parse_samples<R: Read>(reader: R) -> Result<Vec<SampledPoint>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers().context("reading header")?.clone();
    let ts_idx = locate_column(&headers, "timestamp_ms")?;
    let value_idx = locate_column(&headers, "value")?;

    let mut points = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("reading row {}", row + 1))?;
        let timestamp_ms = field(&record, ts_idx, row)?
            .parse::<i64>()
            .with_context(|| format!("parsing timestamp on row {}", row + 1))?;
        let value = field(&record, value_idx, row)?
            .parse::<f64>()
            .with_context(|| format!("parsing value on row {}", row + 1))?;
        if let Some(prev) = points.last().map(|p: &SampledPoint| p.timestamp_ms) {
            if timestamp_ms < prev {
                anyhow::bail!("row {}: timestamp {timestamp_ms} goes backwards", row + 1);
            }
        }
        points.push(SampledPoint::new(value, timestamp_ms));
    }
    if points.is_empty() {
        anyhow::bail!("no samples found");
    }
    Ok(points)
}

pub fn read_samples(path: &Path) -> Result<Vec<SampledPoint>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_samples(file).with_context(|| format!("parsing samples {}", path.display()))
}

/// Sampling rate implied by the median spacing of the timestamps.
pub fn estimate_rate(points: &[SampledPoint]) -> Option<f64> {
    let mut gaps: Vec<i64> = points
        .windows(2)
        .map(|w| w[1].timestamp_ms - w[0].timestamp_ms)
        .filter(|&d| d > 0)
        .collect();
    if gaps.is_empty() {
        return None;
    }
    gaps.sort_unstable();
    let median = gaps[gaps.len() / 2];
    Some(1000.0 / median as f64)
}

fn field(record: &csv::StringRecord, idx: usize, row: usize) -> Result<&str> {
    record
        .get(idx)
        .ok_or_else(|| anyhow::anyhow!("row {} is missing column {}", row + 1, idx + 1))
}

fn locate_column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow::anyhow!("missing `{name}` column"))
}
