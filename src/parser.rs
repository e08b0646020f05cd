use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use csv::ReaderBuilder;
use std::sync::Arc;

use crate::error::{EtlError, Result};

/// Cell values read as missing, besides the empty cell.
pub const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>", "N/A",
    "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Parses a comma-separated table with a header row into a single batch,
/// inferring a nullable type for every column. Empty cells and NA tokens
/// become nulls; rows shorter than the header are padded with nulls, longer
/// rows are rejected.
pub fn parse_csv(data: &[u8]) -> Result<RecordBatch> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(EtlError::ConversionFailed("no columns to parse from input".into()));
    }

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record?;
        if record.len() > headers.len() {
            return Err(EtlError::ConversionFailed(format!(
                "row {} has {} fields, but the header has {}",
                rows + 1,
                record.len(),
                headers.len()
            )));
        }
        for (i, column) in columns.iter_mut().enumerate() {
            column.push(record.get(i).filter(|cell| !is_missing(cell)).map(str::to_string));
        }
        rows += 1;
    }

    let mut fields = Vec::with_capacity(headers.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(headers.len());
    for (name, cells) in headers.iter().zip(columns) {
        let data_type = infer_type(&cells);
        arrays.push(build_array(&data_type, cells));
        fields.push(Field::new(name, data_type, true));
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
    Ok(batch)
}

/// Best-fit type for a column's non-null cells.
///
/// Integers win over floats, floats that are all integral collapse to
/// integers, then booleans; anything else (or nothing at all) stays text.
pub fn infer_type(cells: &[Option<String>]) -> DataType {
    let values: Vec<&str> = cells.iter().flatten().map(|v| v.trim()).collect();
    if values.is_empty() {
        return DataType::Utf8;
    }
    if values.iter().all(|v| v.parse::<i64>().is_ok()) {
        return DataType::Int64;
    }
    if let Some(floats) = values.iter().map(|v| v.parse::<f64>().ok()).collect::<Option<Vec<_>>>() {
        if floats.iter().all(|f| is_integral(*f)) {
            return DataType::Int64;
        }
        return DataType::Float64;
    }
    if values.iter().all(|v| parse_bool(v).is_some()) {
        return DataType::Boolean;
    }
    DataType::Utf8
}

fn build_array(data_type: &DataType, cells: Vec<Option<String>>) -> ArrayRef {
    match data_type {
        DataType::Int64 => Arc::new(Int64Array::from(
            cells
                .iter()
                .map(|c| c.as_deref().and_then(parse_int))
                .collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            cells
                .iter()
                .map(|c| c.as_deref().and_then(|v| v.trim().parse::<f64>().ok()))
                .collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            cells
                .iter()
                .map(|c| c.as_deref().and_then(parse_bool))
                .collect::<Vec<_>>(),
        )),
        _ => Arc::new(StringArray::from(cells)),
    }
}

// i64 covers the integral f64 range checked in `is_integral`.
fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|f| is_integral(*f)).map(|f| f as i64))
}

fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || NA_TOKENS.contains(&cell)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
