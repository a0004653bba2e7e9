//! Time-indexed result table produced by a run.
use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One row: the values of the requested columns at `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub time: f64,
    pub values: Vec<f64>,
}

/// Rows ordered by time; `records[i].values[j]` belongs to `columns[j]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl OutputTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, records: Vec::new() }
    }

    pub(crate) fn push(&mut self, time: f64, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.records.push(Record { time, values });
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn times(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.time).collect()
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SimulationError::UnknownColumn(name.to_string()))
    }

    /// The full series of one column.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let j = self.position(name)?;
        Ok(self.records.iter().map(|r| r.values[j]).collect())
    }

    /// Value of `name` in the final row.
    pub fn last(&self, name: &str) -> Result<f64> {
        let j = self.position(name)?;
        self.records
            .last()
            .map(|r| r.values[j])
            .ok_or_else(|| SimulationError::NotYetComputed(name.to_string()))
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = (f64, BTreeMap<&str, f64>)> + '_ {
        self.records.iter().map(move |r| {
            let row = self.columns.iter().map(String::as_str).zip(r.values.iter().copied()).collect();
            (r.time, row)
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SimulationError::MalformedRequest(e.to_string()))
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| {
            SimulationError::invalid_parameter(path.display().to_string(), format!("cannot write output: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OutputTable {
        let mut table = OutputTable::new(vec!["a".into(), "b".into()]);
        table.push(0.0, vec![1.0, 10.0]);
        table.push(1.0, vec![2.0, 20.0]);
        table
    }

    #[test]
    fn test_column_access() {
        let table = sample();
        assert_eq!(table.column("b").unwrap(), vec![10.0, 20.0]);
        assert_eq!(table.last("a").unwrap(), 2.0);
        assert_eq!(table.times(), vec![0.0, 1.0]);
        assert_eq!(table.column("c").unwrap_err(), SimulationError::UnknownColumn("c".into()));
    }

    #[test]
    fn test_last_on_empty_table() {
        let table = OutputTable::new(vec!["a".into()]);
        assert!(table.is_empty());
        assert!(matches!(table.last("a"), Err(SimulationError::NotYetComputed(_))));
    }

    #[test]
    fn test_iter_rows_maps_columns() {
        let table = sample();
        let rows: Vec<_> = table.iter_rows().collect();
        assert_eq!(rows[1].0, 1.0);
        assert_eq!(rows[1].1["b"], 20.0);
    }

    #[test]
    fn test_save_json_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let table = sample();
        table.save_json(&path).unwrap();
        let loaded: OutputTable = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, table);
    }
}
