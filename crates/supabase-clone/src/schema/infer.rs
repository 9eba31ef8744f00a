//! Column type inference over sampled rows.

use super::{ColumnType, InferredColumn, StorageType, MAX_SAMPLE_VALUES};
use crate::remote::Row;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Storage type of a single non-null value; `None` for null.
pub fn classify_value(value: &Value) -> Option<StorageType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(StorageType::Boolean),
        Value::Number(n) => Some(classify_number(n)),
        Value::String(s) => Some(classify_string(s)),
        Value::Array(_) | Value::Object(_) => Some(StorageType::Json),
    }
}

fn classify_number(n: &Number) -> StorageType {
    if n.is_i64() || n.is_u64() {
        return StorageType::Integer;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 => StorageType::Integer,
        _ => StorageType::Float,
    }
}

fn classify_string(s: &str) -> StorageType {
    if is_uuid(s) {
        StorageType::Uuid
    } else if is_timestamp(s) {
        StorageType::Timestamp
    } else {
        StorageType::Text
    }
}

/// Hyphenated 8-4-4-4-12 hex form only.
fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}

fn is_timestamp(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || TIMESTAMP_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
        || (s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
}

#[derive(Default)]
struct ColumnState {
    name: String,
    storage: Option<StorageType>,
    seen_null: bool,
    present_in: usize,
    samples: Vec<Value>,
}

/// Infer columns from sample rows.
///
/// Columns appear in first-observed order. Each column's type is the
/// widening of every non-null sample; a column that was only ever null is
/// text. A column missing from some rows, or null in any, is nullable.
pub fn infer_columns(rows: &[Row]) -> Vec<InferredColumn> {
    let mut states: Vec<ColumnState> = Vec::new();

    for row in rows {
        for (name, value) in row {
            let idx = match states.iter().position(|s| &s.name == name) {
                Some(idx) => idx,
                None => {
                    states.push(ColumnState {
                        name: name.clone(),
                        ..Default::default()
                    });
                    states.len() - 1
                }
            };
            let state = &mut states[idx];
            state.present_in += 1;

            match classify_value(value) {
                None => state.seen_null = true,
                Some(t) => {
                    state.storage = Some(match state.storage {
                        Some(current) => current.widen(t),
                        None => t,
                    });
                    if state.samples.len() < MAX_SAMPLE_VALUES {
                        state.samples.push(value.clone());
                    }
                }
            }
        }
    }

    states
        .into_iter()
        .map(|s| InferredColumn {
            column_type: ColumnType::Storage(s.storage.unwrap_or(StorageType::Text)),
            nullable: s.seen_null || s.present_in < rows.len(),
            sample_values: s.samples,
            name: s.name,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Value) -> Vec<Row> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn type_of(columns: &[InferredColumn], name: &str) -> ColumnType {
        columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type.clone())
            .unwrap()
    }

    #[test]
    fn test_fractional_sample_widens_column() {
        let cols = infer_columns(&rows(json!([{"a": 1}, {"a": 2.5}])));
        assert_eq!(type_of(&cols, "a"), ColumnType::Storage(StorageType::Float));

        let cols = infer_columns(&rows(json!([{"a": 1}, {"a": 2}])));
        assert_eq!(type_of(&cols, "a"), ColumnType::Storage(StorageType::Integer));
    }

    #[test]
    fn test_string_shapes() {
        let cols = infer_columns(&rows(json!([{
            "b": "2023-01-01T00:00:00Z",
            "c": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "d": "2023-01-01",
            "e": "2024-05-01 10:00:00",
            "f": "hello",
            "g": "12.5"
        }])));
        assert_eq!(type_of(&cols, "b"), ColumnType::Storage(StorageType::Timestamp));
        assert_eq!(type_of(&cols, "c"), ColumnType::Storage(StorageType::Uuid));
        assert_eq!(type_of(&cols, "d"), ColumnType::Storage(StorageType::Timestamp));
        assert_eq!(type_of(&cols, "e"), ColumnType::Storage(StorageType::Timestamp));
        assert_eq!(type_of(&cols, "f"), ColumnType::Storage(StorageType::Text));
        assert_eq!(type_of(&cols, "g"), ColumnType::Storage(StorageType::Text));
    }

    #[test]
    fn test_structured_and_boolean() {
        let cols = infer_columns(&rows(json!([{"meta": {"k": 1}, "tags": ["x"], "ok": true}])));
        assert_eq!(type_of(&cols, "meta"), ColumnType::Storage(StorageType::Json));
        assert_eq!(type_of(&cols, "tags"), ColumnType::Storage(StorageType::Json));
        assert_eq!(type_of(&cols, "ok"), ColumnType::Storage(StorageType::Boolean));
    }

    #[test]
    fn test_conflicting_samples_widen_to_text() {
        let cols = infer_columns(&rows(json!([
            {"x": "3fa85f64-5717-4562-b3fc-2c963f66afa6"},
            {"x": "not a uuid"}
        ])));
        assert_eq!(type_of(&cols, "x"), ColumnType::Storage(StorageType::Text));
    }

    #[test]
    fn test_nulls_and_order() {
        let cols = infer_columns(&rows(json!([
            {"id": 1, "note": null},
            {"id": 2, "note": null, "late": true}
        ])));
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "note", "late"]);

        assert_eq!(type_of(&cols, "note"), ColumnType::Storage(StorageType::Text));
        assert!(cols[1].nullable);
        assert!(!cols[0].nullable);
        // Missing from the first row.
        assert!(cols[2].nullable);
    }

    #[test]
    fn test_sample_values_bounded() {
        let data: Vec<Value> = (0..8).map(|i| json!({"n": i})).collect();
        let cols = infer_columns(&rows(Value::Array(data)));
        assert_eq!(cols[0].sample_values.len(), MAX_SAMPLE_VALUES);
        assert_eq!(cols[0].sample_values[0], json!(0));
    }
}
