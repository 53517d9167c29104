#![allow(dead_code)]

use biostudio::value::{Record, Scalar};
use biostudio::{DataDictionary, DataType, FieldMeta, StaticBackend};
use std::path::{Path, PathBuf};

/// Clinical fields as a studio would describe them. Orders 1-5 are selected by default.
pub fn clinical_dictionary() -> DataDictionary {
    DataDictionary::new(vec![
        FieldMeta::new("sex", DataType::String)
            .with_name("Sex")
            .with_allowed_values(["M", "F"])
            .with_order(1),
        FieldMeta::new("age", DataType::Number)
            .with_name("Age")
            .with_order(2),
        FieldMeta::new("stage", DataType::String)
            .with_allowed_values(["I", "II", "III", "IV"])
            .with_order(3),
        FieldMeta::new("os_months", DataType::Number).with_order(4),
        FieldMeta::new("os_status", DataType::String)
            .with_allowed_values(["0:LIVING", "1:DECEASED"])
            .with_order(5),
        FieldMeta::new("sample_id", DataType::String).with_order(6),
        FieldMeta::new("tmb", DataType::Number).with_order(7),
    ])
}

/// `n` deterministic patients. Every seventh patient has no recorded age.
pub fn clinical_records(n: usize) -> Vec<Record> {
    const STAGES: [&str; 4] = ["I", "II", "III", "IV"];
    (0..n)
        .map(|i| {
            let mut r = Record::new();
            r.insert("sample_id".into(), Scalar::from(format!("S{i:03}")));
            r.insert(
                "sex".into(),
                Scalar::from(if i % 3 == 0 { "F" } else { "M" }),
            );
            if i % 7 != 0 {
                r.insert("age".into(), Scalar::from(40.0 + (i % 30) as f64));
            }
            r.insert("stage".into(), Scalar::from(STAGES[i % 4]));
            r.insert("os_months".into(), Scalar::from(((i * 5) % 60 + 1) as f64));
            r.insert(
                "os_status".into(),
                Scalar::from(if i % 2 == 0 { "1:DECEASED" } else { "0:LIVING" }),
            );
            r.insert("tmb".into(), Scalar::from((i % 10) as f64 * 0.75));
            r
        })
        .collect()
}

pub fn clinical_backend(n: usize) -> StaticBackend {
    StaticBackend::new(clinical_dictionary(), clinical_records(n))
}

/// Write the clinical fixtures as JSON files in `dir`; returns (dictionary, records) paths.
pub fn write_clinical_files(dir: &Path, n: usize) -> color_eyre::Result<(PathBuf, PathBuf)> {
    let dictionary = dir.join("dictionary.json");
    let records = dir.join("records.json");
    std::fs::write(&dictionary, serde_json::to_string(&clinical_dictionary())?)?;
    std::fs::write(&records, serde_json::to_string(&clinical_records(n))?)?;
    Ok((dictionary, records))
}

pub fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}
