use crate::error::{Result, TrendError};
use crate::model::{AggregateRow, MetricSchema, MetricValue, SnapshotId, SNAPSHOT_COLUMN};
use std::io::{Read, Write};

/// What `Dataset::merge` did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Replaced,
    Skipped,
}

/// The aggregate rows, unique by snapshot and kept in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<AggregateRow>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Ok(Self::new());
        }

        let key_index = headers
            .iter()
            .position(|h| h == SNAPSHOT_COLUMN)
            .ok_or_else(|| TrendError::Dataset(format!("missing '{SNAPSHOT_COLUMN}' column")))?;

        let mut dataset = Self {
            columns: headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != key_index)
                .map(|(_, h)| h.to_string())
                .collect(),
            rows: Vec::new(),
        };

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let key = record.get(key_index).unwrap_or_default();
            let snapshot: SnapshotId = key
                .parse()
                .map_err(|e| TrendError::Dataset(format!("row {}: {e}", line + 1)))?;

            let mut row = AggregateRow::new(snapshot);
            for (i, cell) in record.iter().enumerate() {
                if i == key_index {
                    continue;
                }
                if let Some(value) = MetricValue::parse_cell(cell)? {
                    row.insert(&headers[i], value);
                }
            }

            match dataset.position(snapshot) {
                Ok(_) => {
                    return Err(TrendError::Dataset(format!("duplicate snapshot {snapshot}")));
                }
                Err(pos) => dataset.rows.insert(pos, row),
            }
        }

        Ok(dataset)
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        Self::from_csv(text.as_bytes())
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(std::iter::once(SNAPSHOT_COLUMN).chain(self.columns.iter().map(String::as_str)))?;
        for row in &self.rows {
            let mut record = vec![row.snapshot.to_string()];
            record.extend(
                self.columns
                    .iter()
                    .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| TrendError::Dataset(e.to_string()))
    }

    pub fn rows(&self) -> &[AggregateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, snapshot: SnapshotId) -> bool {
        self.position(snapshot).is_ok()
    }

    pub fn get(&self, snapshot: SnapshotId) -> Option<&AggregateRow> {
        self.position(snapshot).ok().map(|i| &self.rows[i])
    }

    pub fn earliest(&self) -> Option<SnapshotId> {
        self.rows.first().map(|r| r.snapshot)
    }

    /// Validate `row` against `schema` and insert it in date order.
    ///
    /// An existing row with the same snapshot is kept unless `replace` is set.
    pub fn merge(&mut self, row: AggregateRow, schema: &MetricSchema, replace: bool) -> Result<MergeOutcome> {
        schema.validate(&row)?;

        let pos = self.position(row.snapshot);
        if pos.is_ok() && !replace {
            return Ok(MergeOutcome::Skipped);
        }

        for column in row.columns() {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.to_string());
            }
        }
        let row = self.normalize(row);

        Ok(match pos {
            Ok(i) => {
                self.rows[i] = row;
                MergeOutcome::Replaced
            }
            Err(i) => {
                self.rows.insert(i, row);
                MergeOutcome::Added
            }
        })
    }

    fn position(&self, snapshot: SnapshotId) -> std::result::Result<usize, usize> {
        self.rows.binary_search_by(|r| r.snapshot.cmp(&snapshot))
    }

    // Reorder values to follow the header so rows compare equal after a CSV round-trip.
    fn normalize(&self, row: AggregateRow) -> AggregateRow {
        let mut ordered = AggregateRow::new(row.snapshot);
        for column in &self.columns {
            if let Some(value) = row.get(column) {
                ordered.insert(column, value);
            }
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schema() -> MetricSchema {
        MetricSchema::new(["lines mean", "todo_comments total"], ["lines code"])
    }

    fn row(date: &str, lines: f64, todos: i64) -> AggregateRow {
        let mut row = AggregateRow::new(date.parse().unwrap());
        row.insert("lines mean", lines);
        row.insert("todo_comments total", todos);
        row
    }

    #[test]
    fn merge_keeps_rows_sorted_and_unique() {
        let mut ds = Dataset::new();
        assert_eq!(ds.merge(row("2023-03-01", 3.0, 3), &schema(), false).unwrap(), MergeOutcome::Added);
        assert_eq!(ds.merge(row("2023-01-01", 1.0, 1), &schema(), false).unwrap(), MergeOutcome::Added);
        assert_eq!(ds.merge(row("2023-01-01", 9.0, 9), &schema(), false).unwrap(), MergeOutcome::Skipped);

        let dates: Vec<String> = ds.rows().iter().map(|r| r.snapshot.to_string()).collect();
        assert_eq!(dates, vec!["2023-01-01", "2023-03-01"]);
        assert_eq!(
            ds.get("2023-01-01".parse().unwrap()).unwrap().get("lines mean"),
            Some(MetricValue::Float(1.0))
        );
    }

    #[test]
    fn replace_overwrites_existing_row() {
        let mut ds = Dataset::new();
        ds.merge(row("2023-01-01", 1.0, 1), &schema(), false).unwrap();
        assert_eq!(ds.merge(row("2023-01-01", 2.0, 2), &schema(), true).unwrap(), MergeOutcome::Replaced);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.rows()[0].get("todo_comments total"), Some(MetricValue::Int(2)));
    }

    #[test]
    fn merge_rejects_rows_outside_schema() {
        let mut ds = Dataset::new();
        let mut bad = row("2023-01-01", 1.0, 1);
        bad.insert("surprise", 1i64);
        assert!(matches!(
            ds.merge(bad, &schema(), false),
            Err(TrendError::SchemaMismatch { .. })
        ));
        assert!(ds.is_empty());
    }

    #[test]
    fn csv_round_trip_preserves_rows() {
        let mut ds = Dataset::new();
        ds.merge(row("2023-02-01", 2.5, 4), &schema(), false).unwrap();
        let mut with_cloc = row("2023-01-01", 12.0, 0);
        with_cloc.insert("lines code", 900i64);
        ds.merge(with_cloc, &schema(), false).unwrap();

        let text = ds.to_csv_string().unwrap();
        assert_eq!(
            text,
            "date,lines mean,todo_comments total,lines code\n\
             2023-01-01,12.0,0,900\n\
             2023-02-01,2.5,4,\n"
        );
        assert_eq!(Dataset::parse(&text).unwrap(), ds);
    }

    #[test]
    fn reads_unsorted_files_with_key_anywhere() {
        let text = "lines mean,date\n4.0,2023-05-01\n1.5,2023-04-01\n";
        let ds = Dataset::parse(text).unwrap();
        assert_eq!(ds.earliest(), Some("2023-04-01".parse().unwrap()));
        assert_eq!(ds.to_csv_string().unwrap(), "date,lines mean\n2023-04-01,1.5\n2023-05-01,4.0\n");
    }

    #[test]
    fn load_errors_are_descriptive() {
        assert!(matches!(Dataset::parse("a,b\n1,2\n"), Err(TrendError::Dataset(_))));
        assert!(matches!(
            Dataset::parse("date,a\n2023-01-01,1\n2023-01-01,2\n"),
            Err(TrendError::Dataset(_))
        ));
        assert!(matches!(Dataset::parse("date,a\nsoon,1\n"), Err(TrendError::Dataset(_))));
        assert!(Dataset::parse("").unwrap().is_empty());
    }
}
