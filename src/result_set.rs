//! Result Set - ordered rows returned by the query executor

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Rows sharing one column list. Serialises as an array of objects whose
/// keys follow select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Convenience constructor for tests and fakes.
    pub fn from_columns(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows, same columns.
    pub fn head(&self, n: usize) -> ResultSet {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

struct OrderedRow<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for OrderedRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (i, column) in self.columns.iter().enumerate() {
            map.serialize_entry(column, self.values.get(i).unwrap_or(&Value::Null))?;
        }
        map.end()
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for values in &self.rows {
            seq.serialize_element(&OrderedRow {
                columns: &self.columns,
                values,
            })?;
        }
        seq.end()
    }
}
