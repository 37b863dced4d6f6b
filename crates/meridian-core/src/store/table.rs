//! Row-oriented projection of usage payloads, and its CSV form.

use std::collections::HashSet;
use std::io::{self, Write};
use std::mem::take;

use serde_json::{Map, Value};

/// Candidate list fields, checked in this order
pub const ROW_LIST_FIELDS: &[&str] = &["readings", "usage", "consumption", "data", "results", "items"];

/// Column used for list items that are not objects
const SCALAR_COLUMN: &str = "value";

/// Locate the list of records inside a payload
///
/// A top-level array is used as-is. Otherwise the first field in
/// [`ROW_LIST_FIELDS`] whose value is an array wins; fields holding anything
/// else are passed over.
pub fn find_row_list(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => ROW_LIST_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_array)),
        _ => None,
    }
}

/// Render one JSON value as a CSV cell
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Named columns with string cells; every row is as wide as `columns`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table whose columns are the union of record keys in first-seen order
    pub fn from_records(records: &[Value]) -> Self {
        let mut table = Table::default();

        for record in records {
            let mut row = vec![String::new(); table.columns.len()];
            match record {
                Value::Object(fields) => {
                    for (key, value) in fields {
                        let index = table.column_index_or_insert(key, &mut row);
                        row[index] = cell(value);
                    }
                }
                scalar => {
                    let index = table.column_index_or_insert(SCALAR_COLUMN, &mut row);
                    row[index] = cell(scalar);
                }
            }
            table.rows.push(row);
        }

        table
    }

    /// Find a column, adding it (and padding every row) when missing
    fn column_index_or_insert(&mut self, name: &str, pending: &mut Vec<String>) -> usize {
        if let Some(index) = self.columns.iter().position(|c| c == name) {
            return index;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        pending.push(String::new());
        self.columns.len() - 1
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append another table, aligning columns by name
    ///
    /// Columns new to `self` are added at the end; cells a row has no value
    /// for are left empty.
    pub fn append(&mut self, other: Table) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| {
                let mut scratch = Vec::new();
                self.column_index_or_insert(name, &mut scratch)
            })
            .collect();

        for row in other.rows {
            let mut aligned = vec![String::new(); self.columns.len()];
            for (value, &index) in row.into_iter().zip(&mapping) {
                aligned[index] = value;
            }
            self.rows.push(aligned);
        }
    }

    /// Drop rows identical to an earlier row, keeping the first
    pub fn dedup(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row.clone()));
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let fields: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned().map(Value::String))
                    .collect();
                Value::Object(fields)
            })
            .collect()
    }

    /// Write header and rows as comma-separated values
    pub fn write_csv<W: Write>(&self, mut w: W) -> io::Result<()> {
        write_row(&mut w, &self.columns)?;
        for row in &self.rows {
            write_row(&mut w, row)?;
        }
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_csv(&mut out);
        out
    }

    /// Parse CSV text whose first row is the header
    ///
    /// Short rows are padded and long rows truncated to the header width.
    pub fn from_csv(text: &str) -> Self {
        let mut rows = parse_rows(text).into_iter();
        let Some(columns) = rows.next() else {
            return Table::default();
        };

        let width = columns.len();
        let rows = rows
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        Table { columns, rows }
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    // A lone empty cell would otherwise be an empty line
    if row.len() == 1 && row[0].is_empty() {
        return writeln!(w, "\"\"");
    }

    for (i, value) in row.iter().enumerate() {
        if i > 0 {
            write!(w, ",")?;
        }
        if needs_quotes(value) {
            write!(w, "\"{}\"", value.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", value)?;
        }
    }
    writeln!(w)
}

/// Quote-aware CSV tokenizer (CRLF tolerant, blank lines skipped)
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut touched = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                touched = true;
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                touched = true;
                row.push(take(&mut field));
            }
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                if touched {
                    row.push(take(&mut field));
                    rows.push(take(&mut row));
                }
                touched = false;
            }
            _ => {
                touched = true;
                field.push(ch);
            }
        }
    }

    if touched {
        row.push(field);
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_row_list_priority_order() {
        let payload = json!({
            "items": [1, 2, 3],
            "usage": [{"kwh": 1}],
            "readings": [{"kwh": 2}, {"kwh": 3}],
        });
        assert_eq!(find_row_list(&payload).unwrap().len(), 2);

        let payload = json!({"results": [1], "data": [1, 2, 3, 4]});
        assert_eq!(find_row_list(&payload).unwrap().len(), 4);
    }

    #[test]
    fn test_non_array_candidate_falls_through() {
        let payload = json!({"data": {"nested": true}, "items": [{"a": 1}]});
        assert_eq!(find_row_list(&payload).unwrap(), &vec![json!({"a": 1})]);

        assert!(find_row_list(&json!({"summary": [1, 2]})).is_none());
        assert!(find_row_list(&json!("text")).is_none());
        assert_eq!(find_row_list(&json!([{"t": 1}])).unwrap().len(), 1);
    }

    #[test]
    fn test_from_records_unions_columns() {
        let records = vec![
            json!({"t": 1, "kwh": 0.5}),
            json!({"t": 2, "note": "estimated", "kwh": null}),
        ];
        let table = Table::from_records(&records);

        assert_eq!(table.columns, strings(&["kwh", "t", "note"]));
        assert_eq!(table.rows[0], strings(&["0.5", "1", ""]));
        assert_eq!(table.rows[1], strings(&["", "2", "estimated"]));
    }

    #[test]
    fn test_scalar_and_nested_cells() {
        let records = vec![json!(3), json!({"meta": {"a": [1]}, "flag": true})];
        let table = Table::from_records(&records);

        assert_eq!(table.columns, strings(&["value", "flag", "meta"]));
        assert_eq!(table.rows[0], strings(&["3", "", ""]));
        assert_eq!(table.rows[1], strings(&["", "true", r#"{"a":[1]}"#]));
    }

    #[test]
    fn test_csv_write_then_read() {
        let table = Table {
            columns: strings(&["date", "note"]),
            rows: vec![
                strings(&["2025-06-12", "peak, \"estimated\""]),
                strings(&["2025-06-13", "line\nbreak"]),
                strings(&["2025-06-14", ""]),
            ],
        };
        let text = String::from_utf8(table.to_csv_bytes()).unwrap();
        assert!(text.starts_with("date,note\n"));
        assert!(text.contains("\"peak, \"\"estimated\"\"\""));

        assert_eq!(Table::from_csv(&text), table);
    }

    #[test]
    fn test_single_empty_cell_survives_csv() {
        let table = Table {
            columns: strings(&["value"]),
            rows: vec![strings(&[""]), strings(&["1"])],
        };
        let text = String::from_utf8(table.to_csv_bytes()).unwrap();
        assert_eq!(Table::from_csv(&text), table);
    }

    #[test]
    fn test_from_csv_pads_ragged_rows_and_skips_blank_lines() {
        let table = Table::from_csv("a,b,c\r\n1,2\r\n\r\n4,5,6,7\r\n");
        assert_eq!(table.rows, vec![strings(&["1", "2", ""]), strings(&["4", "5", "6"])]);
        assert_eq!(Table::from_csv(""), Table::default());
    }

    #[test]
    fn test_append_aligns_by_name() {
        let mut left = Table {
            columns: strings(&["t", "kwh"]),
            rows: vec![strings(&["1", "0.5"])],
        };
        let right = Table {
            columns: strings(&["kwh", "meter"]),
            rows: vec![strings(&["0.7", "A"])],
        };
        left.append(right);

        assert_eq!(left.columns, strings(&["t", "kwh", "meter"]));
        assert_eq!(
            left.rows,
            vec![strings(&["1", "0.5", ""]), strings(&["", "0.7", "A"])]
        );
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut table = Table {
            columns: strings(&["t"]),
            rows: vec![strings(&["1"]), strings(&["2"]), strings(&["1"]), strings(&["3"])],
        };
        table.dedup();
        assert_eq!(table.rows, vec![strings(&["1"]), strings(&["2"]), strings(&["3"])]);
    }

    #[test]
    fn test_to_records() {
        let table = Table {
            columns: strings(&["t", "kwh"]),
            rows: vec![strings(&["1", "0.5"])],
        };
        assert_eq!(table.to_records(), vec![json!({"t": "1", "kwh": "0.5"})]);
    }
}
