//! CSV and JSON encodings of a [`DataTable`]
//!
//! CSV files carry a header row; cells are typed on read (integer, float,
//! boolean, empty as null, anything else text). JSON files are an array of
//! records, or an object with `columns` and `rows`.

use common::DataTable;
use serde_json::{Map, Number, Value};

use crate::error::{GatewayError, GatewayResult};

/// Parses CSV bytes with a header row
pub fn parse_csv(bytes: &[u8]) -> GatewayResult<DataTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| GatewayError::InvalidData(format!("unreadable CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| GatewayError::InvalidData(format!("CSV row {}: {}", i + 1, e)))?;
        rows.push(record.iter().map(infer_cell).collect());
    }

    DataTable::new(columns, rows).map_err(|e| GatewayError::InvalidData(e.to_string()))
}

/// Encodes a table as CSV with a header row
pub fn write_csv(table: &DataTable) -> GatewayResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.columns)
        .map_err(|e| GatewayError::InvalidData(e.to_string()))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(cell_to_text))
            .map_err(|e| GatewayError::InvalidData(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| GatewayError::InvalidData(e.to_string()))
}

/// Parses a JSON dataset
pub fn parse_json(bytes: &[u8]) -> GatewayResult<DataTable> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| GatewayError::InvalidData(format!("malformed JSON dataset: {}", e)))?;

    match value {
        Value::Array(records) => records_to_table(records),
        Value::Object(_) => serde_json::from_value::<DataTable>(value)
            .map_err(|e| GatewayError::InvalidData(format!("expected columns and rows: {}", e)))
            .and_then(|t| {
                t.validate().map_err(|e| GatewayError::InvalidData(e.to_string()))?;
                Ok(t)
            }),
        _ => Err(GatewayError::InvalidData(
            "JSON dataset must be an array of records".to_string(),
        )),
    }
}

/// Encodes a table as a pretty-printed array of records
pub fn write_json(table: &DataTable) -> GatewayResult<Vec<u8>> {
    let records: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let record: Map<String, Value> = table
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            Value::Object(record)
        })
        .collect();
    serde_json::to_vec_pretty(&records).map_err(|e| GatewayError::InvalidData(e.to_string()))
}

fn records_to_table(records: Vec<Value>) -> GatewayResult<DataTable> {
    let mut columns: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for (i, record) in records.into_iter().enumerate() {
        match record {
            Value::Object(map) => {
                for key in map.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
                objects.push(map);
            }
            _ => return Err(GatewayError::InvalidData(format!("record {} is not an object", i))),
        }
    }

    let rows = objects
        .iter()
        .map(|map| {
            columns
                .iter()
                .map(|c| map.get(c).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    DataTable::new(columns, rows).map_err(|e| GatewayError::InvalidData(e.to_string()))
}

fn infer_cell(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = text.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match text.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

fn cell_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_cell_inference() {
        let table = parse_csv(b"a, b ,c,d\n1,2.5,yes,\n-3,1e2,TRUE,x\n").unwrap();
        assert_eq!(table.columns, vec!["a", "b", "c", "d"]);
        assert_eq!(table.rows[0], vec![json!(1), json!(2.5), json!("yes"), Value::Null]);
        assert_eq!(table.rows[1], vec![json!(-3), json!(100.0), json!(true), json!("x")]);
    }

    #[test]
    fn test_csv_ragged_rows_rejected() {
        assert!(matches!(parse_csv(b"a,b\n1\n"), Err(GatewayError::InvalidData(_))));
    }

    #[test]
    fn test_csv_write_then_read() {
        let table = DataTable::new(
            vec!["x".into(), "label".into()],
            vec![vec![json!(1.5), json!("a,b")], vec![Value::Null, json!(2)]],
        )
        .unwrap();
        let bytes = write_csv(&table).unwrap();
        assert_eq!(parse_csv(&bytes).unwrap(), table);
    }

    #[test]
    fn test_json_records_keep_column_order() {
        let table = parse_json(br#"[{"z": 1, "a": 2}, {"a": 3, "z": 4, "m": "x"}]"#).unwrap();
        assert_eq!(table.columns, vec!["z", "a", "m"]);
        assert_eq!(table.rows[0], vec![json!(1), json!(2), Value::Null]);
        assert_eq!(table.rows[1], vec![json!(4), json!(3), json!("x")]);

        let back = parse_json(&write_json(&table).unwrap()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_json_columns_rows_form() {
        let table = parse_json(br#"{"columns": ["a"], "rows": [[1], [2]]}"#).unwrap();
        assert_eq!(table.row_count(), 2);
        assert!(parse_json(br#"{"columns": ["a"], "rows": [[1, 2]]}"#).is_err());
        assert!(parse_json(b"42").is_err());
    }
}
