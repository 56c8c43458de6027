use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray, ListArray,
};
use arrow::datatypes::DataType;
use ndarray::{Array2, Array3};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::Dataset;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Post-processing applied to every loaded dataset.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub normalise: bool,
    pub name: Option<String>,
    pub n_observations: Option<usize>,
    pub n_variables: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            normalise: true,
            name: None,
            n_observations: None,
            n_variables: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row of variable names, one realisation per row
/// * `.json`    – nested arrays (`n × p` or `n × p × t`), or `{ "name": .., "data": [..] }`
/// * `.parquet` – numeric columns (`n × p`) or list columns of equal length (`n × p × t`)
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading dataset {}", path.display()))?;

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    finish(dataset, options, default_name)
}

fn finish(dataset: Dataset, options: &LoadOptions, default_name: String) -> Result<Dataset> {
    let mut dataset = dataset.subsample(options.n_observations, options.n_variables)?;
    if options.normalise {
        dataset = dataset.normalised();
    }
    let name = match &options.name {
        Some(name) => name.clone(),
        None if dataset.name().is_empty() => default_name,
        None => dataset.name().to_string(),
    };
    log::info!(
        "Loaded dataset '{name}' with shape {:?}{}",
        dataset.shape(),
        if dataset.is_normalised() { " (normalised)" } else { "" }
    );
    Ok(dataset.with_name(&name))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema, either a bare array or an object wrapping it:
///
/// ```json
/// { "name": "forex", "data": [[0.1, 0.2], [0.3, 0.4], ...] }
/// ```
fn load_json(path: &Path) -> Result<Dataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let (name, data) = match &root {
        JsonValue::Object(obj) => (
            obj.get("name").and_then(|n| n.as_str()).map(str::to_string),
            obj.get("data").context("JSON object has no 'data' field")?,
        ),
        other => (None, other),
    };

    let rows = data.as_array().context("Expected a JSON array of realisations")?;
    let depth = nesting_depth(data);
    let dataset = match depth {
        2 => {
            let rows: Vec<Vec<f64>> = rows
                .iter()
                .enumerate()
                .map(|(i, row)| json_array_to_f64(Some(row), &format!("Row {i}")))
                .collect::<Result<_>>()?;
            Dataset::from_rows(rows)?
        }
        3 => {
            let n = rows.len();
            let p = rows[0].as_array().map(|r| r.len()).unwrap_or(0);
            let t = rows[0]
                .as_array()
                .and_then(|r| r.first())
                .and_then(|c| c.as_array())
                .map(|c| c.len())
                .unwrap_or(0);
            let mut cube = Array3::<f64>::zeros((n, p, t));
            for (i, row) in rows.iter().enumerate() {
                let cells = row
                    .as_array()
                    .with_context(|| format!("Row {i} is not an array"))?;
                if cells.len() != p {
                    bail!("Row {i} has {} variables, expected {p}", cells.len());
                }
                for (j, cell) in cells.iter().enumerate() {
                    let series = json_array_to_f64(Some(cell), &format!("Row {i}, variable {j}"))?;
                    if series.len() != t {
                        let found = series.len();
                        bail!("Row {i}, variable {j} has {found} time steps, expected {t}");
                    }
                    for (k, v) in series.into_iter().enumerate() {
                        cube[[i, j, k]] = v;
                    }
                }
            }
            Dataset::new(cube.into_dyn())?
        }
        other => bail!("Expected 2 or 3 levels of nested arrays, found {other}"),
    };

    Ok(match name {
        Some(name) => dataset.with_name(&name),
        None => dataset,
    })
}

fn nesting_depth(value: &JsonValue) -> usize {
    match value {
        JsonValue::Array(items) => 1 + items.first().map(nesting_depth).unwrap_or(0),
        _ => 0,
    }
}

fn json_array_to_f64(val: Option<&JsonValue>, what: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("{what}: missing or invalid array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| match v {
            JsonValue::Null => Ok(f64::NAN),
            other => other
                .as_f64()
                .with_context(|| format!("{what}[{j}]: not a number")),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with variable names, one realisation per row.
/// Empty cells are read as NaN.
fn load_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let row = record
            .iter()
            .enumerate()
            .map(|(j, tok)| parse_cell(tok, row_no, headers.get(j).map_or("?", String::as_str)))
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    Dataset::from_rows(rows)?.with_var_names(headers)
}

fn parse_cell(tok: &str, row: usize, col: &str) -> Result<f64> {
    let tok = tok.trim();
    if tok.is_empty() {
        return Ok(f64::NAN);
    }
    tok.parse::<f64>()
        .with_context(|| format!("Row {row}, column '{col}': '{tok}' is not a number"))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file.
///
/// Expected schema, one of:
/// - numeric columns (Float64, Float32, Int64, Int32), one per variable
/// - List<Float64> / LargeList<Float64> columns, one per variable, each row
///   holding that variable's time series
fn load_parquet(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    // rows[i][j] is the series of variable j at realisation i (length 1 for scalars)
    let mut rows: Vec<Vec<Vec<f64>>> = Vec::new();
    let mut is_series: Option<bool> = None;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;

        for row in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(batch.num_columns());
            for (j, col) in batch.columns().iter().enumerate() {
                let list = matches!(col.data_type(), DataType::List(_) | DataType::LargeList(_));
                match is_series {
                    None => is_series = Some(list),
                    Some(expected) if expected != list => {
                        bail!("Column '{}' mixes list and scalar columns", names[j])
                    }
                    _ => {}
                }
                let cell = if list {
                    extract_f64_list(col, row)
                        .with_context(|| format!("Row {row}: failed to read '{}'", names[j]))?
                } else {
                    vec![extract_f64(col, row)
                        .with_context(|| format!("Row {row}: failed to read '{}'", names[j]))?]
                };
                cells.push(cell);
            }
            rows.push(cells);
        }
    }

    let n = rows.len();
    let p = names.len();
    let dataset = if is_series == Some(true) {
        let t = rows.first().and_then(|r| r.first()).map(|c| c.len()).unwrap_or(0);
        let mut cube = Array3::<f64>::zeros((n, p, t));
        for (i, cells) in rows.into_iter().enumerate() {
            for (j, series) in cells.into_iter().enumerate() {
                if series.len() != t {
                    bail!("Row {i}: '{}' has {} time steps, expected {t}", names[j], series.len());
                }
                for (k, v) in series.into_iter().enumerate() {
                    cube[[i, j, k]] = v;
                }
            }
        }
        Dataset::new(cube.into_dyn())?
    } else {
        let flat: Vec<f64> = rows.into_iter().flatten().flatten().collect();
        Dataset::new(Array2::from_shape_vec((n, p), flat)?.into_dyn())?
    };
    dataset.with_var_names(names)
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.map(f64::from).unwrap_or(f64::NAN)).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a single numeric value; nulls become NaN.
fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Result<f64> {
    if col.is_null(row) {
        return Ok(f64::NAN);
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| a.value(row))
            .context("expected Float64Array"),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| f64::from(a.value(row)))
            .context("expected Float32Array"),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| a.value(row) as f64)
            .context("expected Int64Array"),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| f64::from(a.value(row)))
            .context("expected Int32Array"),
        other => bail!("Unsupported column type {other:?}"),
    }
}
