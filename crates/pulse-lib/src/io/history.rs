//! Day history files: a JSON array of records, or CSV with the same
//! camelCase column names. The format follows the file extension.

use crate::metrics::DailyRecord;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::{fs, path::Path};

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

/// Load history ordered by timestamp (oldest first).
pub fn read_history(path: &Path) -> Result<Vec<DailyRecord>> {
    let mut records = if is_csv(path) {
        let mut reader = ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        reader
            .deserialize()
            .enumerate()
            .map(|(row, rec)| rec.with_context(|| format!("parsing row {} of {}", row + 1, path.display())))
            .collect::<Result<Vec<DailyRecord>>>()?
    } else {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str::<Vec<DailyRecord>>(&text)
            .with_context(|| format!("parsing history {}", path.display()))?
    };
    records.sort_by_key(|r| r.timestamp_ms);
    Ok(records)
}

pub fn write_history(path: &Path, records: &[DailyRecord]) -> Result<()> {
    if is_csv(path) {
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        for record in records {
            writer.serialize(record).context("writing history row")?;
        }
        writer
            .flush()
            .with_context(|| format!("flushing {}", path.display()))?;
    } else {
        let json = serde_json::to_string_pretty(records).context("serializing history")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::synthetic_history;

    #[test]
    fn json_and_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let history = synthetic_history(10, 4);
        for name in ["days.json", "days.csv"] {
            let path = dir.path().join(name);
            write_history(&path, &history).unwrap();
            let back = read_history(&path).unwrap();
            assert_eq!(back.len(), history.len(), "{name}");
            for (a, b) in back.iter().zip(&history) {
                assert_eq!(a.timestamp_ms, b.timestamp_ms);
                assert_eq!(a.fatigue_level, b.fatigue_level);
                assert!((a.rmssd - b.rmssd).abs() < 1e-9, "{name}");
            }
        }
    }

    #[test]
    fn reads_unsorted_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("days.json");
        fs::write(
            &path,
            r#"[{"timestamp": 200, "rmssd": 31.0, "fatigueLevel": 4},
                {"timestamp": 100, "rmssd": 35.0}]"#,
        )
        .unwrap();
        let history = read_history(&path).unwrap();
        assert_eq!(history[0].timestamp_ms, 100);
        assert_eq!(history[0].fatigue_level, 0);
        assert_eq!(history[1].fatigue_level, 4);
    }

    #[test]
    fn csv_headers_are_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("days.csv");
        write_history(&path, &synthetic_history(1, 1)).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "timestamp,meanRR,sdnn,rmssd,pnn50,heartRate,validBeats,fatigueLevel"
        ));
    }

    #[test]
    fn bad_rows_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("days.csv");
        fs::write(&path, "timestamp,rmssd\n1,abc\n").unwrap();
        let err = read_history(&path).unwrap_err();
        assert!(format!("{err:#}").contains("row 1"));
    }
}
