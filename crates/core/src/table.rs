//! Tabular query results.
//!
//! A [`Table`] is the payload of a cache entry: named columns in a fixed order
//! and row-major values. Backends are free to transpose it, but loading must
//! give back the same columns, rows and values in the same order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A single cell of a [`Table`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Arbitrary nested value with no fixed column representation.
    Json(serde_json::Value),
}

/// The type shared by the non-null values of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Json,
}

impl Value {
    /// Kind of this value, `None` for nulls.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Bytes(_) => Some(ValueKind::Bytes),
            Value::Json(_) => Some(ValueKind::Json),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// JSON rendering for display. Bytes become a `0x`-prefixed hex string and
    /// non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(x) => {
                serde_json::Number::from_f64(*x).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(format!("0x{}", hex::encode(b))),
            Value::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Json => "json",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Value::Int(i),
                (None, Some(f)) => Value::Float(f),
                (None, None) => Value::Json(serde_json::Value::Number(n)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// A tabular result: ordered column names and ordered rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { columns: columns.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    /// Create a table from columns and rows, checking every row's width.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the row length differs from the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), Error> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidInput(format!(
                "row {} has {} values but the table has {} columns",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the values of a named column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    /// Value at (row, column name).
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// Kind shared by the non-null values of column `index`.
    ///
    /// `Ok(None)` for an all-null column, `Err((first, other))` when the column
    /// mixes kinds.
    pub fn column_kind(&self, index: usize) -> Result<Option<ValueKind>, (ValueKind, ValueKind)> {
        let mut found = None;
        for kind in self.rows.iter().filter_map(|row| row[index].kind()) {
            match found {
                None => found = Some(kind),
                Some(first) if first != kind => return Err((first, kind)),
                Some(_) => {}
            }
        }
        Ok(found)
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            ["a", "b", "c"],
            vec![
                vec![Value::Int(0), Value::Float(0.5), Value::from("x")],
                vec![Value::Int(1), Value::Null, Value::from("y")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut table = Table::new(["a", "b"]);
        let result = table.push_row(vec![Value::Int(1)]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn test_column_access() {
        let table = sample();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.num_columns(), 3);
        let c: Vec<_> = table.column("c").unwrap().cloned().collect();
        assert_eq!(c, vec![Value::from("x"), Value::from("y")]);
        assert!(table.column("missing").is_none());
        assert_eq!(table.get(1, "a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::Bytes(vec![0, 255]).to_json(), serde_json::json!("0x00ff"));
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Int(-3).to_json(), serde_json::json!(-3));
        assert_eq!(Value::from("x").to_json(), serde_json::json!("x"));
    }

    #[test]
    fn test_column_kind() {
        let table = sample();
        assert_eq!(table.column_kind(0), Ok(Some(ValueKind::Int)));
        assert_eq!(table.column_kind(1), Ok(Some(ValueKind::Float)));

        let nulls = Table::from_rows(["n"], vec![vec![Value::Null], vec![Value::Null]]).unwrap();
        assert_eq!(nulls.column_kind(0), Ok(None));

        let mixed = Table::from_rows(["m"], vec![vec![Value::Int(1)], vec![Value::from("1")]]).unwrap();
        assert_eq!(mixed.column_kind(0), Err((ValueKind::Int, ValueKind::Text)));
    }

    #[test]
    fn test_value_from_json() {
        assert_eq!(Value::from(serde_json::json!(3)), Value::Int(3));
        assert_eq!(Value::from(serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(serde_json::json!("s")), Value::from("s"));
        assert!(matches!(Value::from(serde_json::json!({"k": 1})), Value::Json(_)));
    }
}
