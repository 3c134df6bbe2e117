//! The `search` command and the formats its results are printed in.

use crate::args::SearchArgs;
use crate::commands::{OutputFormat, Out};
use crate::error::{self, ErrorType, IntoResult};
use crate::model::{Record, Table};
use crate::{store, Config, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// Matching rows in the requested output format.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rows {
    /// JSON array of objects where each row is a self-describing object with column names as keys.
    Json(serde_json::Value),
    /// Markdown table as a single formatted string.
    Table(String),
    /// CSV data as a properly escaped string.
    Csv(String),
}

impl Debug for Rows {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rows::Json(v) => write!(f, "Rows::Json({:?})", v),
            Rows::Table(s) => write!(f, "Rows::Table({} chars)", s.len()),
            Rows::Csv(s) => write!(f, "Rows::Csv({} chars)", s.len()),
        }
    }
}

impl Display for Rows {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rows::Json(v) => {
                if let Ok(s) = serde_json::to_string_pretty(v) {
                    write!(f, "{}", s)
                } else {
                    write!(f, "{:?}", v)
                }
            }
            Rows::Table(s) => write!(f, "{}", s),
            Rows::Csv(s) => write!(f, "{}", s),
        }
    }
}

impl Rows {
    /// Renders `records` with the column order of `headers`.
    pub fn render(format: OutputFormat, headers: &[String], records: &[Record]) -> anyhow::Result<Self> {
        Ok(match format {
            OutputFormat::Json => Rows::Json(
                serde_json::to_value(records).context("Unable to serialize the rows")?,
            ),
            OutputFormat::Table => Rows::Table(markdown(headers, records)),
            OutputFormat::Csv => Rows::Csv(csv(headers, records)?),
        })
    }
}

/// The result of `search`.
#[derive(Debug, Clone, Serialize)]
pub struct Found {
    pub sheet: String,
    /// The number of rows in the sheet.
    pub total: usize,
    /// The number of rows that matched.
    pub matched: usize,
    pub rows: Rows,
}

/// Searches a sheet of the workbook without modifying it. Rows where any of the searched columns
/// contains the query (ignoring case) are returned in sheet order; an empty query returns every
/// row.
///
/// # Errors
/// - `ErrorType::NotFound` if the workbook does not exist.
/// - `ErrorType::Validation` if a named column is not in the sheet.
pub fn search(config: &Config, args: &SearchArgs) -> Result<Out<Found>> {
    search_inner(config, args)
        .context("Unable to search the workbook")
        .pub_result(ErrorType::Workbook)
}

fn search_inner(config: &Config, args: &SearchArgs) -> anyhow::Result<Out<Found>> {
    let path = config.workbook_path();
    if !path.is_file() {
        return Err(error::not_found(format!(
            "The workbook '{}' does not exist",
            path.display()
        )));
    }
    let sheet = store::resolve_sheet(path, args.sheet().or(config.sheet_name()))?;
    let table = store::load(path, &sheet)?;
    let records = table.search(args.query(), args.columns())?;
    let found = Found {
        total: table.len(),
        matched: records.len(),
        rows: Rows::render(args.format(), &display_headers(&table), &records)?,
        sheet,
    };
    Ok(Out::new(
        format!(
            "Found {} of {} rows in sheet '{}'",
            found.matched, found.total, found.sheet
        ),
        found,
    ))
}

fn display_headers(table: &Table) -> Vec<String> {
    table.headers().names().to_vec()
}

fn cells<'a>(headers: &'a [String], record: &'a Record) -> impl Iterator<Item = String> + 'a {
    headers.iter().map(move |h| {
        record
            .get(h)
            .map(ToString::to_string)
            .unwrap_or_default()
    })
}

fn markdown(headers: &[String], records: &[Record]) -> String {
    let escape = |s: &str| s.replace('|', "\\|").replace('\n', " ");
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| cells(headers, r).map(|c| escape(&c)).collect())
        .collect();
    let header_row: Vec<String> = headers.iter().map(|h| escape(h)).collect();
    let widths: Vec<usize> = (0..headers.len())
        .map(|ix| {
            rows.iter()
                .map(|row| row[ix].chars().count())
                .chain(std::iter::once(header_row[ix].chars().count()))
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect();

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect();
        format!("| {} |", padded.join(" | "))
    };
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut out = vec![line(&header_row), line(&separator)];
    out.extend(rows.iter().map(|row| line(row)));
    out.join("\n")
}

fn csv(headers: &[String], records: &[Record]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(headers)
        .context("Unable to write CSV header")?;
    for record in records {
        writer
            .write_record(cells(headers, record))
            .context("Unable to write CSV row")?;
    }
    let bytes = writer.into_inner().context("Unable to finish CSV output")?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::AddArgs;
    use crate::commands::add;
    use crate::test::TestEnv;

    fn env_with_orders() -> TestEnv {
        let env = TestEnv::new();
        let config = env.config();
        add(&config, &AddArgs::new("Dell", vec!["Dock;120".into()])).unwrap();
        add(&config, &AddArgs::new("Amazon", vec!["USB-C cable;9.99;3".into()])).unwrap();
        add(&config, &AddArgs::new("CDW", vec!["Docking station;180".into()])).unwrap();
        env
    }

    fn search_args(query: &str, columns: &[&str], format: OutputFormat) -> SearchArgs {
        SearchArgs::new(
            Some(query.to_string()),
            columns.iter().map(|c| c.to_string()).collect(),
            format,
        )
    }

    #[test]
    fn test_search_json() {
        let env = env_with_orders();
        let out = search(&env.config(), &search_args("amazon", &[], OutputFormat::Json)).unwrap();
        let found = out.structure().unwrap();
        assert_eq!(found.total, 3);
        assert_eq!(found.matched, 1);
        let Rows::Json(json) = &found.rows else {
            panic!("expected json");
        };
        assert_eq!(json[0]["PO Number"], "IT580");
        assert_eq!(json[0]["Quantity"], 3.0);
    }

    #[test]
    fn test_search_empty_query_keeps_order() {
        let env = env_with_orders();
        let out = search(&env.config(), &search_args(" ", &[], OutputFormat::Csv)).unwrap();
        let found = out.structure().unwrap();
        assert_eq!(found.matched, 3);
        let text = found.rows.to_string();
        let vendors: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(2).unwrap())
            .collect();
        assert_eq!(vendors, vec!["Dell", "Amazon", "CDW"]);
    }

    #[test]
    fn test_search_columns_and_table() {
        let env = env_with_orders();
        let args = search_args("DOCK", &["Items Being Purchased"], OutputFormat::Table);
        let out = search(&env.config(), &args).unwrap();
        let found = out.structure().unwrap();
        assert_eq!(found.matched, 2);
        let text = found.rows.to_string();
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().next().unwrap().starts_with("| PO Number |"));
        assert!(text.contains("| Dell "));
        assert!(!text.contains("Amazon"));
        assert_eq!(out.message(), "Found 2 of 3 rows in sheet 'PO Log'");
    }

    #[test]
    fn test_search_unknown_column() {
        let env = env_with_orders();
        let args = search_args("x", &["Nope"], OutputFormat::Table);
        let err = search(&env.config(), &args).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[test]
    fn test_search_missing_workbook() {
        let env = TestEnv::new();
        std::fs::remove_file(env.workbook_path()).unwrap();
        let err = search(&env.config(), &SearchArgs::default()).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotFound);
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let headers = vec!["A".to_string(), "B".to_string()];
        let records = vec![Record::new().with("A", "x|y").with("B", 1.0)];
        let text = markdown(&headers, &records);
        assert_eq!(text, "| A    | B   |\n| ---- | --- |\n| x\\|y | 1   |");
    }
}
