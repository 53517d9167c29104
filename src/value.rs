//! Cell values and row records as they arrive from the dataset backend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One cell of a row record.
///
/// Deserialized untagged from JSON, so `null`, booleans, numbers and strings map
/// directly. Arrays and objects are not valid cells; records containing them fail
/// to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

static NULL: Scalar = Scalar::Null;

impl Scalar {
    /// Null and empty strings are missing. Absent keys are missing too, see [`cell`].
    pub fn is_missing(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// The value when the cell holds an actual number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    /// Lenient numeric reading: numbers, numeric text and booleans (as 0/1).
    pub fn coerce_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            Scalar::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Number(a), Scalar::Number(b)) => number_bits(*a) == number_bits(*b),
            (Scalar::String(a), Scalar::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Null => {}
            Scalar::Bool(b) => b.hash(state),
            Scalar::Number(n) => number_bits(*n).hash(state),
            Scalar::String(s) => s.hash(state),
        }
    }
}

// -0.0 and 0.0 compare equal, so they must hash equal.
fn number_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{}", format_number(*n)),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

/// Integers print without a fractional part, everything else as the shortest float.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// A row: field key to cell. Keys absent from the map are missing cells.
pub type Record = HashMap<String, Scalar>;

/// Cell lookup that treats absent keys as null.
pub fn cell<'a>(record: &'a Record, key: &str) -> &'a Scalar {
    record.get(key).unwrap_or(&NULL)
}

/// One page of records. `total` counts every matching row on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowPage {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub total: usize,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default)]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn rec(pairs: &[(&str, Scalar)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_missing_values() {
        assert!(Scalar::Null.is_missing());
        assert!(Scalar::from("").is_missing());
        assert!(!Scalar::from("0").is_missing());
        assert!(!Scalar::from(0.0).is_missing());
        assert!(!Scalar::Bool(false).is_missing());
        let r = rec(&[("a", Scalar::from(1.0))]);
        assert!(cell(&r, "b").is_missing());
    }

    #[test]
    fn test_parse_record_json() {
        let r: Record =
            serde_json::from_str(r#"{"sex":"M","age":30,"alive":true,"os":null}"#).unwrap();
        assert_eq!(cell(&r, "sex"), &Scalar::from("M"));
        assert_eq!(cell(&r, "age").as_number(), Some(30.0));
        assert_eq!(cell(&r, "alive"), &Scalar::Bool(true));
        assert!(cell(&r, "os").is_missing());
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Scalar::from(30.0).to_string(), "30");
        assert_eq!(Scalar::from(2.5).to_string(), "2.5");
        assert_eq!(Scalar::Null.to_string(), "");
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(Scalar::from(" 12.5 ").coerce_number(), Some(12.5));
        assert_eq!(Scalar::from("abc").coerce_number(), None);
        assert_eq!(Scalar::from("12").as_number(), None);
        assert_eq!(Scalar::Bool(true).coerce_number(), Some(1.0));
    }

    #[test]
    fn test_zero_hash_equality() {
        let mut set = HashSet::new();
        set.insert(Scalar::from(0.0));
        assert!(set.contains(&Scalar::from(-0.0)));
    }

    #[test]
    fn test_row_page_wire_defaults() {
        let page: RowPage =
            serde_json::from_str(r#"{"records": [{"age": 61, "sex": null}], "total": 95}"#)
                .unwrap();
        assert_eq!(page.total, 95);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 0);
        assert!(cell(&page.records[0], "sex").is_missing());
        assert_eq!(cell(&page.records[0], "age").as_number(), Some(61.0));
    }
}
