//! Data dictionary: the server-described schema of a dataset.

use crate::query::Operator;
use crate::value::Scalar;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Semantic column type reported by the backend.
///
/// Unknown type names are kept so they can be shown, but nothing is recommended for
/// them and predicates allow only equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Other(String),
}

impl From<String> for DataType {
    fn from(s: String) -> Self {
        match s.to_uppercase().as_str() {
            "STRING" => DataType::String,
            "NUMBER" => DataType::Number,
            "BOOLEAN" => DataType::Boolean,
            _ => DataType::Other(s),
        }
    }
}

impl From<DataType> for String {
    fn from(t: DataType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => f.write_str("STRING"),
            DataType::Number => f.write_str("NUMBER"),
            DataType::Boolean => f.write_str("BOOLEAN"),
            DataType::Other(s) => f.write_str(s),
        }
    }
}

impl DataType {
    /// Operators a predicate on a field of this type may use, in menu order.
    pub fn operators(&self) -> &'static [Operator] {
        use Operator::*;
        match self {
            DataType::Number => &[Eq, Ne, Lt, Le, Gt, Ge, In, NotIn],
            DataType::String => &[Eq, Ne, Like, NotLike, ILike, In, NotIn],
            DataType::Boolean => &[Eq, Ne, In, NotIn],
            DataType::Other(_) => &[Eq],
        }
    }

    pub fn allows(&self, op: Operator) -> bool {
        self.operators().contains(&op)
    }
}

/// One dictionary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub data_type: DataType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allowed_values: Vec<Scalar>,
    #[serde(default)]
    pub order: Option<i64>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl FieldMeta {
    pub fn new(key: &str, data_type: DataType) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            data_type,
            description: String::new(),
            notes: String::new(),
            allowed_values: Vec::new(),
            order: None,
        }
    }

    pub fn with_allowed_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Display label, falling back to the key when the backend sent no name.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    /// Cardinality proxy used by the recommender.
    pub fn cardinality(&self) -> usize {
        self.allowed_values.len()
    }

    pub fn operators(&self) -> &'static [Operator] {
        self.data_type.operators()
    }

    /// First operator of the field's type, the default for a new rule.
    pub fn default_operator(&self) -> Operator {
        self.operators()[0]
    }
}

/// Schema of one dataset version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDictionary {
    pub fields: Vec<FieldMeta>,
}

impl DataDictionary {
    pub fn new(fields: Vec<FieldMeta>) -> Self {
        Self { fields }
    }

    pub fn field(&self, key: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keys of the fields shown by default: those whose display order is at most `max_order`.
    pub fn default_selected_keys(&self, max_order: i64) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.order.is_some_and(|o| o <= max_order))
            .map(|f| f.key.clone())
            .collect()
    }

    /// Keys that occur more than once.
    pub fn duplicate_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for f in &self.fields {
            if !seen.insert(f.key.as_str()) && !dups.contains(&f.key) {
                dups.push(f.key.clone());
            }
        }
        dups
    }

    /// Fields whose allowed values repeat. A repeated value means the source
    /// collapsed or truncated the list, which skews cardinality-based choices.
    pub fn fields_with_repeated_values(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| {
                let mut seen = HashSet::new();
                !f.allowed_values.iter().all(|v| seen.insert(v))
            })
            .map(|f| f.key.as_str())
            .collect()
    }
}
