//! Tab-separated export of loaded rows.

use crate::dictionary::{DataDictionary, DataType};
use crate::value::{cell, Record};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use polars::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Build a frame with one column per key, typed from the dictionary.
///
/// NUMBER fields become integer columns when every value is whole, float columns otherwise.
/// Everything else is written as text. Missing cells are null.
pub fn records_frame(
    dictionary: &DataDictionary,
    records: &[Record],
    columns: &[String],
) -> Result<DataFrame> {
    if columns.is_empty() {
        return Err(eyre!("No columns to export"));
    }
    let mut out: Vec<Column> = Vec::with_capacity(columns.len());
    for key in columns {
        let data_type = dictionary
            .field(key)
            .map(|f| f.data_type.clone())
            .unwrap_or(DataType::String);
        let series = if data_type == DataType::Number {
            let values: Vec<Option<f64>> = records
                .iter()
                .map(|r| cell(r, key).coerce_number())
                .collect();
            if values.iter().flatten().all(|v| v.fract() == 0.0 && v.abs() < 1e15) {
                let ints: Vec<Option<i64>> =
                    values.into_iter().map(|v| v.map(|n| n as i64)).collect();
                Series::new(key.as_str().into(), ints)
            } else {
                Series::new(key.as_str().into(), values)
            }
        } else {
            let values: Vec<Option<String>> = records
                .iter()
                .map(|r| {
                    let value = cell(r, key);
                    (!value.is_missing()).then(|| value.to_string())
                })
                .collect();
            Series::new(key.as_str().into(), values)
        };
        out.push(series.into());
    }
    Ok(DataFrame::new(out)?)
}

/// Write `frame` as TSV with a header row.
pub fn write_table<W: Write>(writer: W, frame: &mut DataFrame) -> Result<()> {
    CsvWriter::new(writer)
        .with_separator(b'\t')
        .include_header(true)
        .finish(frame)?;
    Ok(())
}

/// Export `records` to `path`; returns the number of rows written.
pub fn export_table(
    path: &Path,
    dictionary: &DataDictionary,
    records: &[Record],
    columns: &[String],
) -> Result<usize> {
    let mut frame = records_frame(dictionary, records, columns)?;
    let file = File::create(path).wrap_err_with(|| format!("Creating {}", path.display()))?;
    write_table(file, &mut frame)?;
    info!(path = %path.display(), rows = frame.height(), "exported table");
    Ok(frame.height())
}

/// Export columns: the id column first when the dictionary has it, then the selection.
pub fn export_columns(
    dictionary: &DataDictionary,
    selected: &[String],
    id_column: Option<&str>,
) -> Vec<String> {
    let mut columns = Vec::with_capacity(selected.len() + 1);
    if let Some(id) = id_column.filter(|id| dictionary.contains(id)) {
        columns.push(id.to_string());
    }
    for key in selected {
        if !columns.contains(key) {
            columns.push(key.clone());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::FieldMeta;
    use crate::value::Scalar;

    fn dictionary() -> DataDictionary {
        DataDictionary::new(vec![
            FieldMeta::new("sample_id", DataType::String),
            FieldMeta::new("age", DataType::Number),
            FieldMeta::new("tmb", DataType::Number),
            FieldMeta::new("sex", DataType::String),
        ])
    }

    fn record(id: &str, age: Option<f64>, tmb: f64, sex: &str) -> Record {
        let mut r: Record = [
            ("sample_id".to_string(), Scalar::from(id)),
            ("tmb".to_string(), Scalar::from(tmb)),
            ("sex".to_string(), Scalar::from(sex)),
        ]
        .into();
        if let Some(age) = age {
            r.insert("age".to_string(), Scalar::from(age));
        }
        r
    }

    #[test]
    fn test_records_frame_types() -> Result<()> {
        let rows = vec![
            record("S1", Some(61.0), 1.5, "F"),
            record("S2", None, 2.0, ""),
        ];
        let columns: Vec<String> = ["sample_id", "age", "tmb", "sex"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let frame = records_frame(&dictionary(), &rows, &columns)?;
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.column("age")?.dtype(), &polars::prelude::DataType::Int64);
        assert_eq!(frame.column("tmb")?.dtype(), &polars::prelude::DataType::Float64);
        assert_eq!(frame.column("age")?.null_count(), 1);
        assert_eq!(frame.column("sex")?.null_count(), 1);
        Ok(())
    }

    #[test]
    fn test_write_table_is_tab_separated() -> Result<()> {
        let rows = vec![record("S1", Some(61.0), 1.5, "F")];
        let columns = vec!["sample_id".to_string(), "age".to_string()];
        let mut frame = records_frame(&dictionary(), &rows, &columns)?;
        let mut out = Vec::new();
        write_table(&mut out, &mut frame)?;
        let text = String::from_utf8(out)?;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("sample_id\tage"));
        assert_eq!(lines.next(), Some("S1\t61"));
        Ok(())
    }

    #[test]
    fn test_export_table_to_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rows.tsv");
        let rows = vec![
            record("S1", Some(61.0), 1.5, "F"),
            record("S2", Some(48.0), 0.5, "M"),
        ];
        let written = export_table(&path, &dictionary(), &rows, &["sex".to_string()])?;
        assert_eq!(written, 2);
        let text = std::fs::read_to_string(&path)?;
        assert_eq!(text.lines().count(), 3);
        Ok(())
    }

    #[test]
    fn test_export_columns_puts_id_first() {
        let cols = export_columns(
            &dictionary(),
            &["sex".to_string(), "sample_id".to_string()],
            Some("sample_id"),
        );
        assert_eq!(cols, vec!["sample_id", "sex"]);
        let cols = export_columns(&dictionary(), &["sex".to_string()], Some("patient"));
        assert_eq!(cols, vec!["sex"]);
    }

    #[test]
    fn test_no_columns_is_an_error() {
        assert!(records_frame(&dictionary(), &[], &[]).is_err());
    }
}
