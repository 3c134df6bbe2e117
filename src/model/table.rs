use crate::error;
use crate::model::headers::{header_is_id, header_is_timestamp, REQUIRED_COLUMNS};
use crate::model::{Headers, Record, Value};
use anyhow::Result;
use chrono::{Local, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::debug;

/// One data row of a table.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Row {
    /// The 1-based worksheet row this was loaded from. `None` for rows appended in memory.
    number: Option<u32>,
    /// One value per header. Rows are padded to the header width.
    values: Vec<Value>,
}

impl Row {
    pub fn number(&self) -> Option<u32> {
        self.number
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, ix: usize) -> &Value {
        static EMPTY: Value = Value::Empty;
        self.values.get(ix).unwrap_or(&EMPTY)
    }
}

/// The in-memory contents of one worksheet: a header row followed by data rows.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Table {
    name: String,
    headers: Headers,
    rows: Vec<Row>,
}

impl Table {
    /// An empty table with the given header row.
    pub fn new(name: impl Into<String>, headers: Headers) -> Self {
        Self {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    /// Builds a table from worksheet rows. The first row is the header row and sits at the
    /// 1-based worksheet row `header_row`; a header row that is entirely blank is replaced by the
    /// default layout. Data rows that are entirely blank are skipped, but the worksheet row
    /// numbers of the remaining rows are kept.
    pub fn from_sheet_rows<I>(name: impl Into<String>, header_row: u32, sheet_rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut sheet_rows = sheet_rows.into_iter();
        let header_values = sheet_rows.next().unwrap_or_default();
        let headers = if header_values.iter().all(Value::is_empty) {
            Headers::default_layout()
        } else {
            Headers::sanitize(header_values.iter().map(Value::to_string))
        };
        let mut table = Table::new(name, headers);
        for (number, mut values) in (header_row.saturating_add(1)..).zip(sheet_rows) {
            if values.iter().all(Value::is_empty) {
                continue;
            }
            // values past the last header have nowhere to go
            values.resize(table.headers.len(), Value::Empty);
            table.rows.push(Row {
                number: Some(number),
                values,
            });
        }
        table
    }

    /// True if rows were appended since the table was read from its worksheet.
    pub fn has_new_rows(&self) -> bool {
        self.rows.iter().any(|row| row.number.is_none())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Adds a column, backfilling existing rows with empty values. Returns the column index.
    pub fn add_column(&mut self, header: impl Into<String>) -> usize {
        let ix = self.headers.push(header);
        for row in &mut self.rows {
            row.values.resize(self.headers.len(), Value::Empty);
        }
        ix
    }

    /// Adds every required column that is missing (compared case-insensitively). Returns the
    /// names of the columns that were added; calling it again adds nothing.
    pub fn ensure_schema(&mut self) -> Vec<String> {
        let mut added = Vec::new();
        for required in REQUIRED_COLUMNS {
            if !self.headers.contains_ignore_case(required) {
                self.add_column(*required);
                added.push(required.to_string());
            }
        }
        if !added.is_empty() {
            debug!("Added columns {:?} to sheet '{}'", added, self.name);
        }
        added
    }

    /// Validates and appends a single record. See `append_all`.
    pub fn append(&mut self, record: Record, required: &[&str]) -> Result<()> {
        self.append_all(vec![record], required)
    }

    /// Appends `records` as new rows after validating all of them, so either every record is
    /// appended or none is.
    ///
    /// - Every field named in `required` must be present and non-empty in each record.
    /// - Fields naming unknown columns add those columns.
    /// - Blank timestamp-like columns are stamped with the current local time.
    /// - When a single record is appended, blank ID-like columns get the next number.
    pub fn append_all(&mut self, records: Vec<Record>, required: &[&str]) -> Result<()> {
        if records.is_empty() || records.iter().all(Record::is_blank) {
            return Err(error::validation("There is nothing to save"));
        }
        for record in &records {
            for field in required {
                if record.get(field).map_or(true, Value::is_empty) {
                    return Err(error::validation(format!("{field} is required.")));
                }
            }
        }

        let single = records.len() == 1;
        let now = now_to_the_minute();
        for record in records {
            for (name, _) in record.iter() {
                if !self.headers.contains(name) {
                    self.add_column(name);
                }
            }
            let mut values = vec![Value::Empty; self.headers.len()];
            for (name, value) in record.iter() {
                if let Some(ix) = self.headers.position(name) {
                    values[ix] = value.clone();
                }
            }
            for (ix, header) in self.headers.names().iter().enumerate() {
                if !values[ix].is_empty() {
                    continue;
                }
                if header_is_timestamp(header) {
                    values[ix] = Value::DateTime(now);
                } else if single && header_is_id(header) {
                    values[ix] = Value::Text(self.next_id(ix).to_string());
                }
            }
            self.rows.push(Row {
                number: None,
                values,
            });
        }
        Ok(())
    }

    /// One more than the largest integer in column `ix`, or 1 when there is none.
    pub fn next_id(&self, ix: usize) -> i64 {
        self.rows
            .iter()
            .filter_map(|row| row.get(ix).as_integer())
            .max()
            .map_or(1, |max| max + 1)
    }

    /// The values of the column named `header`, in row order.
    pub fn column(&self, header: &str) -> impl Iterator<Item = &Value> + '_ {
        let ix = self.headers.position(header);
        self.rows
            .iter()
            .filter_map(move |row| ix.map(|ix| row.get(ix)))
    }

    /// The row at `ix` as a `Record` of every column.
    pub fn record(&self, ix: usize) -> Option<Record> {
        self.rows.get(ix).map(|row| self.to_record(row))
    }

    /// All rows as records, in order.
    pub fn records(&self) -> Vec<Record> {
        self.rows.iter().map(|row| self.to_record(row)).collect()
    }

    fn to_record(&self, row: &Row) -> Record {
        self.headers
            .names()
            .iter()
            .enumerate()
            .map(|(ix, header)| (header.clone(), row.get(ix).clone()))
            .collect()
    }

    /// Returns the rows where any of `columns` contains `query`, compared case-insensitively on
    /// the displayed cell text. An empty `columns` searches every column, and a blank `query`
    /// matches every row. Matches are returned in table order and the table is not modified.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if a column in `columns` does not exist.
    pub fn search<S: AsRef<str>>(&self, query: &str, columns: &[S]) -> Result<Vec<Record>> {
        let ixs: Vec<usize> = if columns.is_empty() {
            (0..self.headers.len()).collect()
        } else {
            columns
                .iter()
                .map(|c| {
                    self.headers.position(c.as_ref()).ok_or_else(|| {
                        error::validation(format!(
                            "Column '{}' does not exist in sheet '{}'",
                            c.as_ref(),
                            self.name
                        ))
                    })
                })
                .collect::<Result<_>>()?
        };

        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(self.records());
        }
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                ixs.iter()
                    .any(|&ix| row.get(ix).to_string().to_lowercase().contains(&needle))
            })
            .map(|row| self.to_record(row))
            .collect())
    }
}

fn now_to_the_minute() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorType};
    use crate::model::headers::REASON_FOR_PURCHASE;

    fn po(po: &str, vendor: &str, item: &str) -> Record {
        Record::new()
            .with("PO Number", po)
            .with("Vendor/Store", vendor)
            .with("Items Being Purchased", item)
    }

    fn sample() -> Table {
        let mut table = Table::new("PO Log", Headers::default_layout());
        table
            .append(po("IT579", "Dell", "Dock"), &["Vendor/Store"])
            .unwrap();
        table
            .append(po("IT580", "Amazon", "USB-C cable"), &["Vendor/Store"])
            .unwrap();
        table
            .append(po("IT581", "CDW", "Docking station"), &["Vendor/Store"])
            .unwrap();
        table
    }

    #[test]
    fn test_append_then_search_finds_record() {
        let table = sample();
        let found = table.search("amazon", &[] as &[&str]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].get("PO Number"),
            Some(&Value::Text("IT580".into()))
        );
    }

    #[test]
    fn test_search_empty_query_returns_all_in_order() {
        let table = sample();
        let found = table.search("   ", &[] as &[&str]).unwrap();
        let pos: Vec<String> = found
            .iter()
            .map(|r| r.get("PO Number").unwrap().to_string())
            .collect();
        assert_eq!(pos, vec!["IT579", "IT580", "IT581"]);
    }

    #[test]
    fn test_search_limited_columns_preserves_order() {
        let table = sample();
        let found = table.search("DOCK", &["Items Being Purchased"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].get("Vendor/Store").unwrap().to_string(), "Dell");
        assert_eq!(found[1].get("Vendor/Store").unwrap().to_string(), "CDW");

        let none = table.search("dock", &["Vendor/Store"]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_search_unknown_column() {
        let err = sample().search("x", &["Nope"]).unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::Validation));
    }

    #[test]
    fn test_search_is_non_destructive() {
        let table = sample();
        let before = table.clone();
        let _ = table.search("dell", &[] as &[&str]).unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let mut table = sample();
        let added = table.ensure_schema();
        assert_eq!(added, vec![REASON_FOR_PURCHASE.to_string()]);
        let headers = table.headers().clone();
        assert!(table.ensure_schema().is_empty());
        assert_eq!(table.headers(), &headers);
        // existing rows are backfilled
        assert!(table
            .column(REASON_FOR_PURCHASE)
            .all(|v| *v == Value::Empty));
        assert_eq!(table.column(REASON_FOR_PURCHASE).count(), 3);
    }

    #[test]
    fn test_ensure_schema_case_insensitive() {
        let mut table = Table::new("s", Headers::sanitize(["reason for purchase"]));
        assert!(table.ensure_schema().is_empty());
    }

    #[test]
    fn test_append_missing_required_field() {
        let mut table = Table::new("PO Log", Headers::default_layout());
        let err = table
            .append(po("IT1", "  ", "Dock"), &["Vendor/Store"])
            .unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::Validation));
        assert!(err.to_string().contains("Vendor/Store"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_append_all_is_all_or_nothing() {
        let mut table = Table::new("PO Log", Headers::default_layout());
        let records = vec![po("IT1", "Dell", "Dock"), po("", "", "Cable")];
        assert!(table.append_all(records, &["Vendor/Store"]).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_append_adds_unknown_columns() {
        let mut table = Table::new("s", Headers::sanitize(["A"]));
        table
            .append(Record::new().with("A", "1").with("B", "2"), &[])
            .unwrap();
        assert_eq!(table.headers().names(), &["A", "B"]);
        assert_eq!(table.rows()[0].get(1), &Value::Text("2".into()));
    }

    #[test]
    fn test_append_fills_id_and_timestamp() {
        let mut table = Table::new("s", Headers::sanitize(["Record ID", "Created", "Note"]));
        table
            .append(Record::new().with("Note", "first"), &[])
            .unwrap();
        table
            .append(Record::new().with("Note", "second"), &[])
            .unwrap();
        assert_eq!(table.rows()[0].get(0).to_string(), "1");
        assert_eq!(table.rows()[1].get(0).to_string(), "2");
        assert!(matches!(table.rows()[1].get(1), Value::DateTime(_)));
    }

    #[test]
    fn test_append_multiple_rows_leaves_ids_blank() {
        let mut table = Table::new("s", Headers::sanitize(["Record ID", "Note"]));
        let records = vec![
            Record::new().with("Note", "a"),
            Record::new().with("Note", "b"),
        ];
        table.append_all(records, &[]).unwrap();
        assert!(table.column("Record ID").all(Value::is_empty));
    }

    #[test]
    fn test_append_nothing() {
        let mut table = Table::new("s", Headers::default_layout());
        assert!(table.append(Record::new(), &[]).is_err());
    }

    #[test]
    fn test_from_sheet_rows() {
        let rows = vec![
            vec![Value::from("A"), Value::Empty, Value::from("A")],
            vec![Value::from("1"), Value::from("2")],
            vec![Value::Empty, Value::from(" ")],
            vec![Value::from("3"), Value::from("4"), Value::from("5"), Value::from("6")],
        ];
        let table = Table::from_sheet_rows("s", 1, rows);
        assert_eq!(table.headers().names(), &["A", "Column 2", "A (2)"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].number(), Some(2));
        assert_eq!(table.rows()[0].values().len(), 3);
        assert_eq!(table.rows()[1].number(), Some(4));
        assert_eq!(table.rows()[1].values().len(), 3);
        assert!(!table.has_new_rows());
    }

    #[test]
    fn test_from_sheet_rows_header_below_first_row() {
        let rows = vec![
            vec![Value::from("A")],
            vec![Value::Empty],
            vec![Value::from("1")],
        ];
        let mut table = Table::from_sheet_rows("s", 3, rows);
        assert_eq!(table.rows()[0].number(), Some(5));
        table.append(Record::new().with("A", "2"), &[]).unwrap();
        assert!(table.has_new_rows());
        assert_eq!(table.rows()[1].number(), None);
    }

    #[test]
    fn test_from_sheet_rows_blank_header_row() {
        let table = Table::from_sheet_rows("s", 1, vec![vec![Value::Empty]]);
        assert_eq!(table.headers(), &Headers::default_layout());
    }
}
