use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::ArrayD;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Column – (statistic, reducer) header pair
// ---------------------------------------------------------------------------

/// Two-level column label. `reducer` is `self` for self-reduced results and
/// `name_k` (1-based) when a reduction produced several values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Column {
    pub statistic: String,
    pub reducer: String,
}

/// Sentinel reducer name for results that need no reducer.
pub const SELF_REDUCED: &str = "self";

// ---------------------------------------------------------------------------
// ResultsTable – one row, two-level columns
// ---------------------------------------------------------------------------

/// One row of values (the dataset) under `(statistic, reducer)` columns, in
/// configuration order. `labels` tag the row, e.g. with class annotations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultsTable {
    row: String,
    labels: Vec<String>,
    columns: Vec<Column>,
    values: Vec<f64>,
}

impl ResultsTable {
    pub fn new(row: &str) -> Self {
        Self {
            row: row.to_string(),
            ..Self::default()
        }
    }

    pub fn with_labels(mut self, labels: &[String]) -> Self {
        self.labels = labels.to_vec();
        self
    }

    /// Append one (statistic, reducer) result, expanding multi-valued results
    /// into `reducer_1..k` columns.
    pub fn push(&mut self, statistic: &str, reducer: &str, result: &ArrayD<f64>) {
        let size = result.len();
        for (k, value) in result.iter().enumerate() {
            let reducer = if size == 1 {
                reducer.to_string()
            } else {
                format!("{reducer}_{}", k + 1)
            };
            self.columns.push(Column {
                statistic: statistic.to_string(),
                reducer,
            });
            self.values.push(*value);
        }
    }

    pub fn row(&self) -> &str {
        &self.row
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, statistic: &str, reducer: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c.statistic == statistic && c.reducer == reducer)
            .map(|i| self.values[i])
    }

    /// Whether any column belongs to `statistic`.
    pub fn has_statistic(&self, statistic: &str) -> bool {
        self.columns.iter().any(|c| c.statistic == statistic)
    }

    /// Distinct statistic names in column order.
    pub fn statistic_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for column in &self.columns {
            if !names.contains(&column.statistic.as_str()) {
                names.push(&column.statistic);
            }
        }
        names
    }

    // -- export -------------------------------------------------------------

    /// Two header rows (`Statistic`, `Reducer`), then the data row.
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut statistics = vec!["Statistic".to_string()];
        statistics.extend(self.columns.iter().map(|c| c.statistic.clone()));
        wtr.write_record(&statistics)?;

        let mut reducers = vec!["Reducer".to_string()];
        reducers.extend(self.columns.iter().map(|c| c.reducer.clone()));
        wtr.write_record(&reducers)?;

        let mut data = vec![self.row.clone()];
        data.extend(self.values.iter().map(|v| v.to_string()));
        wtr.write_record(&data)?;

        wtr.flush()?;
        Ok(())
    }

    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
        self.to_csv(file)
            .with_context(|| format!("Cannot write results to {}", path.display()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Long format: one record per column with `statistic`, `reducer` and the
    /// row's value.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("statistic", DataType::Utf8, false),
            Field::new("reducer", DataType::Utf8, false),
            Field::new(self.value_column(), DataType::Float64, true),
        ]));
        let statistics: StringArray =
            self.columns.iter().map(|c| Some(c.statistic.as_str())).collect();
        let reducers: StringArray = self.columns.iter().map(|c| Some(c.reducer.as_str())).collect();
        let values = Float64Array::from(self.values.clone());

        let columns: Vec<ArrayRef> =
            vec![Arc::new(statistics), Arc::new(reducers), Arc::new(values)];
        Ok(RecordBatch::try_new(schema, columns)?)
    }

    pub fn export_parquet(&self, path: &Path) -> Result<()> {
        let batch = self.to_record_batch()?;
        let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    fn value_column(&self) -> &str {
        if self.row.is_empty() {
            "value"
        } else {
            &self.row
        }
    }
}

impl fmt::Display for ResultsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let batch = self.to_record_batch().map_err(|_| fmt::Error)?;
        let table = arrow::util::pretty::pretty_format_batches(&[batch]).map_err(|_| fmt::Error)?;
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn table() -> ResultsTable {
        let mut t = ResultsTable::new("ds");
        t.push("m.Cov.a", "m.Trace.x", &arr1(&[3.0]).into_dyn());
        t.push("m.Cov.a", "m.Diag.x", &arr1(&[1.0, 2.0]).into_dyn());
        t.push("m.Pca.b", SELF_REDUCED, &arr1(&[0.5]).into_dyn());
        t
    }

    #[test]
    fn multi_valued_results_expand_into_numbered_columns() {
        let t = table();
        assert_eq!(t.len(), 4);
        assert_eq!(t.get("m.Cov.a", "m.Diag.x_2"), Some(2.0));
        assert_eq!(t.get("m.Cov.a", "m.Diag.x"), None);
        assert_eq!(t.statistic_names(), vec!["m.Cov.a", "m.Pca.b"]);
    }

    #[test]
    fn csv_has_two_header_rows() {
        let mut buf = Vec::new();
        table().to_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Statistic,m.Cov.a,m.Cov.a,m.Cov.a,m.Pca.b");
        assert_eq!(lines[1], "Reducer,m.Trace.x,m.Diag.x_1,m.Diag.x_2,self");
        assert_eq!(lines[2], "ds,3,1,2,0.5");
    }

    #[test]
    fn display_and_json_mention_every_column() {
        let t = table();
        let shown = t.to_string();
        assert!(shown.contains("m.Diag.x_1"));
        assert!(shown.contains("self"));
        let json: serde_json::Value = serde_json::from_str(&t.to_json().unwrap()).unwrap();
        assert_eq!(json["columns"].as_array().unwrap().len(), 4);
        assert_eq!(json["row"], "ds");
        assert_eq!(json["labels"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn labels_travel_with_the_row() {
        let labels = vec!["control".to_string(), "batch-2".to_string()];
        let t = table().with_labels(&labels);
        assert_eq!(t.labels(), labels.as_slice());
        let json: serde_json::Value = serde_json::from_str(&t.to_json().unwrap()).unwrap();
        assert_eq!(json["labels"][0], "control");
        assert_eq!(json["labels"][1], "batch-2");
    }

    #[test]
    fn parquet_export_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.parquet");
        table().export_parquet(&path).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }
}
