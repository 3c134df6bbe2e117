//! The workbook store: reads worksheets into `Table`s with calamine and writes the whole workbook
//! back with rust_xlsxwriter.
//!
//! Saving rewrites every sheet of the file, so callers load the full `Workbook`, change the one
//! table they care about and save it back. Every cell read from the file, formulas included, is
//! written back where it was found; only rows appended since loading and newly added header
//! cells are written on top. Cell styling does not survive a save.

use crate::backup::{Backup, BackupInfo};
use crate::model::{Headers, Table, Value, DEFAULT_SHEET_NAME};
use crate::{error, fs};
use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, Xlsx};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use rust_xlsxwriter::{ExcelDateTime, Format, Formula, Workbook as XlsxWorkbook, Worksheet};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

const XLSX: &str = "xlsx";

/// All the sheets of a workbook file, in workbook order.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    path: PathBuf,
    sheets: Vec<Sheet>,
}

/// A table and, when it was read from a file, the worksheet cells it was read from.
#[derive(Debug, Clone, PartialEq)]
struct Sheet {
    table: Table,
    source: Option<Source>,
}

/// The cells of a worksheet as they were found in the file.
#[derive(Debug, Clone, PartialEq)]
struct Source {
    /// Keyed by 0-based (row, column).
    cells: BTreeMap<(u32, u32), Cell>,
    /// 0-based row of the header row.
    header_row: u32,
    /// 0-based row after the last used row, where appended rows go.
    next_row: u32,
    /// The number of table columns when the sheet was read. Later columns were added in memory.
    columns: usize,
    /// The header row was blank and the table took the default layout.
    blank_header: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Value(Value),
    /// A formula without the leading `=`, and its last calculated result.
    Formula { formula: String, result: String },
}

impl Sheet {
    fn new(table: Table) -> Self {
        Self {
            table,
            source: None,
        }
    }

    /// True if the table differs from the worksheet it was read from.
    fn is_changed(&self) -> bool {
        match &self.source {
            None => true,
            Some(source) => {
                self.table.headers().len() > source.columns || self.table.has_new_rows()
            }
        }
    }
}

impl Workbook {
    /// A workbook with no sheets that will be written to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheets: Vec::new(),
        }
    }

    /// Loads the workbook at `path`, or starts an empty one if the file does not exist.
    pub fn open_or_new(path: &Path) -> Result<Self> {
        match load_workbook(path) {
            Ok(workbook) => Ok(workbook),
            Err(e) if error::classify(&e) == Some(error::ErrorType::NotFound) => {
                debug!("{} does not exist, starting a new workbook", path.display());
                Ok(Self::new(path))
            }
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.sheets.iter().map(|s| &s.table)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.tables().map(Table::name).collect()
    }

    /// The sheet named `name`, compared case-insensitively like Excel does.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables().find(|t| same_sheet(t.name(), name))
    }

    /// The sheet named `name`, adding it with the default headers if it does not exist.
    pub fn table_mut(&mut self, name: &str) -> &mut Table {
        let ix = match self.position(name) {
            Some(ix) => ix,
            None => {
                self.sheets
                    .push(Sheet::new(Table::new(name, Headers::default_layout())));
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[ix].table
    }

    /// Takes the sheet named `name` out of the workbook, or a new empty one with the default
    /// headers.
    pub fn into_table(mut self, name: &str) -> Table {
        match self.position(name) {
            Some(ix) => self.sheets.swap_remove(ix).table,
            None => Table::new(name, Headers::default_layout()),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|s| same_sheet(s.table.name(), name))
    }
}

fn same_sheet(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Reads every sheet of the workbook at `path`, values and formulas.
///
/// # Errors
/// - `ErrorType::NotFound` if the file does not exist.
/// - `ErrorType::Access` if the file is locked or cannot be read.
/// - The file is not a readable xlsx workbook.
pub fn load_workbook(path: &Path) -> Result<Workbook> {
    let mut xlsx = open(path)?;
    let mut sheets = Vec::new();
    for name in xlsx.sheet_names() {
        let range = xlsx
            .worksheet_range(&name)
            .with_context(|| format!("Unable to read sheet '{name}' of {}", path.display()))?;
        let formulas = xlsx.worksheet_formula(&name).with_context(|| {
            format!("Unable to read formulas of sheet '{name}' of {}", path.display())
        })?;
        let sheet = read_sheet(&name, &range, &formulas);
        debug!(
            "Loaded sheet '{}' with {} columns, {} rows and {} cells",
            name,
            sheet.table.headers().len(),
            sheet.table.len(),
            sheet.source.as_ref().map_or(0, |s| s.cells.len())
        );
        sheets.push(sheet);
    }
    Ok(Workbook {
        path: path.to_path_buf(),
        sheets,
    })
}

fn read_sheet(name: &str, range: &Range<Data>, formulas: &Range<String>) -> Sheet {
    let (first_row, first_col) = range.start().unwrap_or((0, 0));
    let rows = range.rows().map(|row| {
        // keep columns at their worksheet positions
        let mut values = vec![Value::Empty; first_col as usize];
        values.extend(row.iter().map(to_value));
        values
    });
    let table = Table::from_sheet_rows(name, first_row + 1, rows);
    let blank_header = range
        .rows()
        .next()
        .map_or(true, |row| row.iter().all(|c| to_value(c).is_empty()));

    let mut formula_cells: HashMap<(u32, u32), &String> = HashMap::new();
    if let Some((row0, col0)) = formulas.start() {
        for (row, col, formula) in formulas.used_cells() {
            formula_cells.insert((row0 + row as u32, col0 + col as u32), formula);
        }
    }
    let mut cells = BTreeMap::new();
    for (row, col, data) in range.used_cells() {
        let pos = (first_row + row as u32, first_col + col as u32);
        let cell = match formula_cells.remove(&pos) {
            Some(formula) => Cell::Formula {
                formula: formula.clone(),
                result: formula_result(data),
            },
            None => Cell::Value(to_value(data)),
        };
        cells.insert(pos, cell);
    }
    // formulas that were never calculated have no value
    for (pos, formula) in formula_cells {
        cells.insert(
            pos,
            Cell::Formula {
                formula: formula.clone(),
                result: String::new(),
            },
        );
    }

    let next_row = [range.end(), formulas.end()]
        .into_iter()
        .flatten()
        .map(|(row, _)| row + 1)
        .max()
        .unwrap_or(0)
        .max(first_row + 1);
    let columns = table.headers().len();
    Sheet {
        table,
        source: Some(Source {
            cells,
            header_row: first_row,
            next_row,
            columns,
            blank_header,
        }),
    }
}

/// Reads one sheet. A sheet that does not exist yields an empty table with the default headers.
///
/// # Errors
/// Same as `load_workbook`.
pub fn load(path: &Path, sheet: &str) -> Result<Table> {
    Ok(load_workbook(path)?.into_table(sheet))
}

/// The sheet names of the workbook at `path`, in workbook order.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    Ok(open(path)?.sheet_names())
}

/// Writes a new workbook at `path` with one sheet holding only a header row. Parent directories
/// are created.
pub fn create(path: &Path, sheet: &str, headers: &Headers) -> Result<Workbook> {
    let workbook = Workbook {
        path: path.to_path_buf(),
        sheets: vec![Sheet::new(Table::new(sheet, headers.clone()))],
    };
    write(&workbook)?;
    debug!("Created workbook {} with sheet '{sheet}'", path.display());
    Ok(workbook)
}

/// Makes sure every changed table has the required columns, writes the workbook to its path,
/// then backs it up and prunes old backups. Sheets that were not changed since loading are
/// written back as they were read.
///
/// # Errors
/// - `ErrorType::Access` if the workbook cannot be written. No backup is made in that case.
pub fn save(workbook: &mut Workbook, backup: &Backup) -> Result<BackupInfo> {
    for sheet in &mut workbook.sheets {
        if sheet.is_changed() {
            sheet.table.ensure_schema();
        }
    }
    write(workbook)?;
    debug!("Saved {}", workbook.path.display());
    backup
        .create(&workbook.path)
        .context("The workbook was saved but the backup failed")
}

/// Chooses the sheet to work with when none is configured: the configured name if given,
/// otherwise the best scoring sheet of an existing workbook, otherwise `PO Log`.
pub fn resolve_sheet(path: &Path, configured: Option<&str>) -> Result<String> {
    if let Some(name) = configured.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(name.to_string());
    }
    if !path.is_file() {
        return Ok(DEFAULT_SHEET_NAME.to_string());
    }
    let names = sheet_names(path)?;
    let year = chrono::Local::now().year();
    Ok(choose_default_sheet(&names, year).unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()))
}

/// Scores each sheet name for how likely it is to be the current PO log. Names mentioning `year`
/// win; totals and summary sheets follow. When nothing scores, `PO Log` is preferred, then the
/// first sheet.
pub fn choose_default_sheet<S: AsRef<str>>(names: &[S], year: i32) -> Option<String> {
    let year = year.to_string();
    let scored = names
        .iter()
        .enumerate()
        .map(|(ix, name)| (sheet_score(name.as_ref(), &year), ix))
        .filter(|(score, _)| *score > 0)
        // highest score, first sheet on ties
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    if let Some((_, ix)) = scored {
        return Some(names[ix].as_ref().to_string());
    }
    names
        .iter()
        .find(|n| same_sheet(n.as_ref(), DEFAULT_SHEET_NAME))
        .or_else(|| names.first())
        .map(|n| n.as_ref().to_string())
}

fn sheet_score(name: &str, year: &str) -> u32 {
    let lowered = name.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mut score = 0;
    if words.contains(&year) {
        score += 140;
    } else if lowered.contains(year) {
        score += 110;
    }
    if let Some((_, after)) = lowered.split_once(year) {
        let after = after.trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == '_');
        if after.starts_with("total") {
            score += 50;
        }
    }
    if lowered.contains("totals") {
        score += 32;
    } else if lowered.contains("total") {
        score += 24;
    }
    if lowered.contains("grand total") {
        score += 20;
    }
    if lowered.contains("summary") {
        score += 8;
    }
    if words.iter().any(|w| *w == "po" || *w == "log") {
        score += 4;
    }
    score
}

/// Checks user input naming the workbook. Surrounding quotes are removed and `~` is expanded.
///
/// # Errors
/// - `ErrorType::Validation` for blank input, web links, `.url` shortcuts, extensions other than
///   `.xlsx`, and directories.
pub fn validate_workbook_path(text: &str) -> Result<PathBuf> {
    let text = text.trim().trim_matches('"').trim();
    if text.is_empty() {
        return Err(error::validation("Enter the path of the workbook."));
    }
    let lowered = text.to_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return Err(error::validation(
            "The workbook must be a file on this computer, not a web link. Download it first.",
        ));
    }
    let path = expand_home(text);
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if extension == "url" {
        return Err(error::validation(format!(
            "'{text}' is an internet shortcut, not a workbook."
        )));
    }
    if path.is_dir() {
        return Err(error::validation(format!(
            "'{text}' is a folder. Choose the .xlsx workbook inside it."
        )));
    }
    if extension != XLSX {
        return Err(error::validation(format!(
            "'{text}' is not an .xlsx workbook. Only .xlsx files can be written."
        )));
    }
    Ok(path)
}

fn expand_home(text: &str) -> PathBuf {
    match (text.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(text),
    }
}

fn open(path: &Path) -> Result<Xlsx<Cursor<Vec<u8>>>> {
    let bytes = fs::read(path)?;
    Xlsx::new(Cursor::new(bytes))
        .with_context(|| format!("'{}' is not a readable xlsx workbook", path.display()))
}

/// The cached result of a formula cell, as the text Excel stores for it.
fn formula_result(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Bool(true) => "TRUE".to_string(),
        Data::Bool(false) => "FALSE".to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        other => other.to_string(),
    }
}

fn to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Empty,
        Data::String(s) if s.trim().is_empty() => Value::Empty,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(Value::from_date_time)
            .unwrap_or(Value::Number(dt.as_f64())),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(Value::from_date_time)
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Value::Date))
            .unwrap_or_else(|_| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(e) => Value::Text(e.to_string()),
    }
}

struct Formats {
    header: Format,
    date: Format,
    date_time: Format,
}

fn write(workbook: &Workbook) -> Result<()> {
    let formats = Formats {
        header: Format::new().set_bold(),
        date: Format::new().set_num_format("yyyy-mm-dd"),
        date_time: Format::new().set_num_format("yyyy-mm-dd hh:mm"),
    };
    let mut xlsx = XlsxWorkbook::new();
    for sheet in &workbook.sheets {
        let table = &sheet.table;
        let worksheet = xlsx
            .add_worksheet()
            .set_name(table.name())
            .with_context(|| format!("Invalid sheet name '{}'", table.name()))?;
        match &sheet.source {
            Some(source) => write_source(worksheet, table, source, &formats),
            None => write_table(worksheet, table, &formats),
        }
        .with_context(|| format!("Unable to write sheet '{}'", table.name()))?;
    }
    let bytes = xlsx
        .save_to_buffer()
        .context("Unable to serialize the workbook")?;
    fs::write_atomic(&workbook.path, &bytes)
}

/// Writes a sheet that only exists in memory: a header row followed by every row.
fn write_table(sheet: &mut Worksheet, table: &Table, formats: &Formats) -> Result<()> {
    for (col, header) in table.headers().names().iter().enumerate() {
        sheet.write_string_with_format(0, col_num(col)?, header, &formats.header)?;
    }
    write_rows(sheet, 1, table.rows().iter().map(|row| row.values()), formats)?;
    sheet.set_freeze_panes(1, 0)?;
    sheet.autofit();
    Ok(())
}

/// Writes a sheet read from a file: its cells where they were found, then header cells for
/// columns added since loading, then the appended rows below the last used row.
fn write_source(
    sheet: &mut Worksheet,
    table: &Table,
    source: &Source,
    formats: &Formats,
) -> Result<()> {
    for (&(row, col), cell) in &source.cells {
        let col = col_num(col as usize)?;
        match cell {
            Cell::Value(Value::Text(s)) if row == source.header_row => {
                sheet.write_string_with_format(row, col, s, &formats.header)?;
            }
            Cell::Value(value) => write_value(sheet, row, col, value, formats)?,
            Cell::Formula { formula, result } => {
                let mut formula = Formula::new(formula);
                if !result.is_empty() {
                    formula = formula.set_result(result);
                }
                sheet.write_formula(row, col, formula)?;
            }
        }
    }

    let defaults = source.blank_header && table.has_new_rows();
    for (ix, header) in table.headers().names().iter().enumerate() {
        // blank header cells of the file stay blank
        if ix >= source.columns || defaults {
            let col = col_num(ix)?;
            sheet.write_string_with_format(source.header_row, col, header, &formats.header)?;
        }
    }

    let new_rows = table
        .rows()
        .iter()
        .filter(|row| row.number().is_none())
        .map(|row| row.values());
    write_rows(sheet, source.next_row, new_rows, formats)?;
    sheet.autofit();
    Ok(())
}

fn write_rows<'a>(
    sheet: &mut Worksheet,
    first_row: u32,
    rows: impl Iterator<Item = &'a [Value]>,
    formats: &Formats,
) -> Result<()> {
    for (ix, values) in rows.enumerate() {
        let row_num = u32::try_from(ix)
            .ok()
            .and_then(|ix| first_row.checked_add(ix))
            .context("Too many rows for a worksheet")?;
        for (col, value) in values.iter().enumerate() {
            write_value(sheet, row_num, col_num(col)?, value, formats)?;
        }
    }
    Ok(())
}

fn col_num(col: usize) -> Result<u16> {
    u16::try_from(col).context("Too many columns for a worksheet")
}

fn write_value(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
    formats: &Formats,
) -> Result<()> {
    match value {
        Value::Empty => {}
        Value::Text(s) => {
            sheet.write_string(row, col, s)?;
        }
        Value::Number(n) => {
            sheet.write_number(row, col, *n)?;
        }
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Date(d) => match excel_date(d) {
            Some(dt) => {
                sheet.write_datetime_with_format(row, col, &dt, &formats.date)?;
            }
            None => {
                sheet.write_string(row, col, value.to_string())?;
            }
        },
        Value::DateTime(dt) => match excel_date_time(dt) {
            Some(excel) => {
                sheet.write_datetime_with_format(row, col, &excel, &formats.date_time)?;
            }
            None => {
                sheet.write_string(row, col, value.to_string())?;
            }
        },
    }
    Ok(())
}

/// Excel cannot represent dates before 1900; those are written as text.
fn excel_date(d: &NaiveDate) -> Option<ExcelDateTime> {
    let year = u16::try_from(d.year()).ok()?;
    ExcelDateTime::from_ymd(year, d.month() as u8, d.day() as u8).ok()
}

fn excel_date_time(dt: &NaiveDateTime) -> Option<ExcelDateTime> {
    excel_date(&dt.date())?
        .and_hms(dt.hour() as u16, dt.minute() as u8, f64::from(dt.second()))
        .ok()
}
