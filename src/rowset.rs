//! Row Sets
//!
//! Ordered rows of named fields. The same structure backs loaded feeds, the joined feed and
//! every bulk-format entity table. Columns are taken from the first row; rows may carry extra
//! fields added later (join snapshots, overlays), which `all_fields` reports in first-seen order.

use crate::error::ApiError;
use indexmap::IndexMap;
use serde_json::Value;

/// A single row: field name to value, in insertion order.
pub type Row = IndexMap<String, Value>;

static NULL: Value = Value::Null;

/// Ordered list of rows sharing a column set.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RowSet {
    /// Build from rows; the first row defines the columns.
    pub fn from_rows(rows: Vec<Row>) -> Result<Self, ApiError> {
        let first = rows
            .first()
            .ok_or_else(|| ApiError::DataError("Row set values are empty".to_string()))?;
        let columns: Vec<String> = first.keys().cloned().collect();
        if columns.is_empty() {
            return Err(ApiError::DataError("Row set columns are empty".to_string()));
        }
        Ok(Self { columns, rows })
    }

    /// Build from JSON values, each of which must be an object.
    pub fn from_json_values(values: Vec<Value>) -> Result<Self, ApiError> {
        if values.is_empty() {
            return Err(ApiError::DataError("Row set values are empty".to_string()));
        }
        let mut rows = Vec::with_capacity(values.len());
        for (idx, value) in values.into_iter().enumerate() {
            match value {
                Value::Object(map) => rows.push(map.into_iter().collect::<Row>()),
                other => {
                    return Err(ApiError::DataError(format!(
                        "Expected an array of objects, got {} at index {}",
                        json_kind(&other),
                        idx
                    )))
                }
            }
        }
        Self::from_rows(rows)
    }

    /// Empty row set with the given columns.
    pub fn from_columns(columns: Vec<String>) -> Result<Self, ApiError> {
        if columns.is_empty() {
            return Err(ApiError::DataError("Row set columns are empty".to_string()));
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Declared columns followed by any extra fields present in rows, in first-seen order.
    pub fn all_fields(&self) -> Vec<String> {
        let mut fields: IndexMap<&str, ()> =
            self.columns.iter().map(|c| (c.as_str(), ())).collect();
        for row in &self.rows {
            for key in row.keys() {
                fields.entry(key.as_str()).or_insert(());
            }
        }
        fields.into_keys().map(str::to_string).collect()
    }

    /// Value of `column` at `row`; missing fields read as null.
    pub fn get(&self, column: &str, row: i64) -> Result<&Value, ApiError> {
        let idx = self.resolve(row)?;
        Ok(self.rows[idx].get(column).unwrap_or(&NULL))
    }

    /// Text form of `column` at `row`.
    pub fn get_text(&self, column: &str, row: i64) -> Result<String, ApiError> {
        self.get(column, row).map(value_text)
    }

    pub fn set(&mut self, column: &str, row: i64, value: Value) -> Result<&mut Self, ApiError> {
        let idx = self.resolve(row)?;
        self.rows[idx].insert(column.to_string(), value);
        Ok(self)
    }

    pub fn get_row(&self, row: i64) -> Result<&Row, ApiError> {
        let idx = self.resolve(row)?;
        Ok(&self.rows[idx])
    }

    /// Copy of the row at `row` restricted to `columns` (absent fields are skipped).
    pub fn get_row_columns(&self, row: i64, columns: &[&str]) -> Result<Row, ApiError> {
        let source = self.get_row(row)?;
        Ok(columns
            .iter()
            .filter_map(|c| source.get(*c).map(|v| (c.to_string(), v.clone())))
            .collect())
    }

    /// Append a row and return its index.
    pub fn add_row(&mut self, row: Row) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Merge `values` into the row at `row`.
    pub fn update_row(&mut self, row: i64, values: Row) -> Result<(), ApiError> {
        let idx = self.resolve(row)?;
        let target = &mut self.rows[idx];
        for (key, value) in values {
            target.insert(key, value);
        }
        Ok(())
    }

    pub fn remove_row(&mut self, row: i64) -> Result<Row, ApiError> {
        let idx = self.resolve(row)?;
        Ok(self.rows.remove(idx))
    }

    /// Indices of rows whose `column` loosely equals `value`.
    pub fn find_all(&self, column: &str, value: &Value) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| loose_eq(row.get(column).unwrap_or(&NULL), value))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Copy of columns and rows.
    pub fn clone_full(&self) -> Self {
        self.clone()
    }

    /// Empty row set with the same columns.
    pub fn clone_empty_schema(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    fn resolve(&self, row: i64) -> Result<usize, ApiError> {
        let len = self.rows.len() as i64;
        let idx = if row < 0 { len + row } else { row };
        if idx < 0 || idx >= len {
            return Err(ApiError::DataError(format!(
                "Invalid row index {} (row count {})",
                row, len
            )));
        }
        Ok(idx as usize)
    }
}

/// Equality with numeric coercion between numbers, numeric text and booleans.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => {
            false
        }
        _ => match (loose_number(a), loose_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => try_parse_number(s),
        _ => None,
    }
}

/// Numeric reading of a number or numeric text.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => try_parse_number(s),
        _ => None,
    }
}

/// Field by literal name, or by a dotted path whose longest matching prefix is a field and whose
/// remaining segments walk into nested objects.
pub fn field<'a>(row: &'a Row, path: &str) -> Option<&'a Value> {
    if let Some(value) = row.get(path) {
        return Some(value);
    }
    let segments: Vec<&str> = path.split('.').collect();
    for split in (1..segments.len()).rev() {
        let Some(mut current) = row.get(&segments[..split].join(".")) else {
            continue;
        };
        for segment in &segments[split..] {
            current = match current {
                Value::Object(map) => map.get(*segment)?,
                _ => return None,
            };
        }
        return Some(current);
    }
    None
}

/// Parse numeric-looking text; empty or non-finite text is not a number.
pub fn try_parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// JSON number for `n`, integral when possible.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Shortest text form of a number, without a trailing `.0` for integers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Replace numeric-looking text fields with numbers, in place.
pub fn coerce_numbers(row: &mut Row) {
    for value in row.values_mut() {
        if let Value::String(s) = value {
            if let Some(n) = try_parse_number(s) {
                *value = number_value(n);
            }
        }
    }
}

/// Text rendering used for names, keys and export.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() => format_number(f),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build a row from `(name, value)` pairs.
pub fn row_from<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
