//! These structs provide the CLI interface for the polog CLI.

use crate::commands::OutputFormat;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// polog: record and search purchase orders in an Excel workbook.
///
/// Purchase orders are appended to a sheet of an `.xlsx` workbook, one row per line item. Every
/// save is followed by a timestamped backup of the workbook, and old backups are pruned to the
/// configured count.
///
/// Close the workbook in Excel before adding a purchase order; a workbook that is open elsewhere
/// cannot be written.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the polog home directory and its configuration, and create the workbook if it does
    /// not exist.
    ///
    /// By default the workbook is `~/Downloads/IT POs.xlsx` and backups are written to a
    /// `PO_Backups` directory beside it.
    Init(InitArgs),
    /// Add a purchase order to the workbook.
    ///
    /// Each --item is one line of the order written as NAME;PRICE;QTY, for example
    /// --item "USB-C Dock;129.99;2". The quantity may be omitted and defaults to 1.
    Add(Box<AddArgs>),
    /// Search the rows of the workbook. Without a query every row is shown.
    Search(SearchArgs),
    /// List the sheets of the workbook.
    Sheets,
    /// Create, list or restore backups of the workbook.
    Backup(BackupArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// none, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG. See the tracing-subscriber EnvFilter documentation.
    #[arg(long, default_value_t = LevelFilter::INFO, value_parser = parse_log_level)]
    log_level: LevelFilter,

    /// The directory where the polog configuration is held. Defaults to ~/polog
    #[arg(long, env = "POLOG_HOME", default_value_t = default_polog_home())]
    polog_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, polog_home: PathBuf) -> Self {
        Self {
            log_level,
            polog_home: polog_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn polog_home(&self) -> &DisplayPath {
        &self.polog_home
    }
}

fn parse_log_level(s: &str) -> Result<LevelFilter, String> {
    if s.eq_ignore_ascii_case("none") {
        return Ok(LevelFilter::OFF);
    }
    s.parse()
        .map_err(|_| format!("'{s}' is not one of none, error, warn, info, debug, trace"))
}

/// Args for the `polog init` command, which writes `config.json` and creates the workbook if it
/// does not exist yet.
#[derive(Debug, Parser, Clone, Default)]
pub struct InitArgs {
    /// The workbook to record purchase orders in. Must be an .xlsx file.
    #[arg(long)]
    workbook: Option<PathBuf>,

    /// Where to keep backups. Defaults to PO_Backups beside the workbook.
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// How many backups to keep, from 1 to 25. Defaults to 1.
    #[arg(long)]
    backup_copies: Option<u32>,

    /// The sheet to write to. By default the sheet is chosen from the sheet names, preferring one
    /// named for the current year.
    #[arg(long)]
    sheet: Option<String>,
}

impl InitArgs {
    pub fn new(
        workbook: Option<PathBuf>,
        backup_dir: Option<PathBuf>,
        backup_copies: Option<u32>,
        sheet: Option<String>,
    ) -> Self {
        Self {
            workbook,
            backup_dir,
            backup_copies,
            sheet,
        }
    }

    pub fn workbook(&self) -> Option<&Path> {
        self.workbook.as_deref()
    }

    pub fn backup_dir(&self) -> Option<&Path> {
        self.backup_dir.as_deref()
    }

    pub fn backup_copies(&self) -> Option<u32> {
        self.backup_copies
    }

    pub fn sheet(&self) -> Option<&str> {
        self.sheet.as_deref()
    }
}

/// (Not shown): Args for the `polog add` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct AddArgs {
    /// The vendor or store the order is placed with.
    #[arg(long)]
    vendor: String,

    /// A line item as NAME;PRICE;QTY. Repeat for each line of the order.
    #[arg(long = "item", required = true)]
    items: Vec<String>,

    /// The PO number. When omitted the next number in the sheet is used.
    #[arg(long)]
    po: Option<String>,

    /// The order date as YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long)]
    department: Option<String>,

    #[arg(long)]
    location: Option<String>,

    /// The shipping charge, e.g. 12.50
    #[arg(long)]
    shipping: Option<String>,

    /// The sales tax, e.g. 8.25
    #[arg(long)]
    tax: Option<String>,

    /// Why the purchase is being made.
    #[arg(long)]
    reason: Option<String>,

    /// Any other column as "Header=Value", written on the first row. Repeatable.
    #[arg(long = "field")]
    fields: Vec<String>,

    /// The sheet to write to, instead of the configured one.
    #[arg(long)]
    sheet: Option<String>,
}

impl AddArgs {
    pub fn new(vendor: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            vendor: vendor.into(),
            items,
            ..Self::default()
        }
    }

    pub fn with_po(mut self, po: impl Into<String>) -> Self {
        self.po = Some(po.into());
        self
    }

    pub fn with_shipping(mut self, shipping: impl Into<String>) -> Self {
        self.shipping = Some(shipping.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn po(&self) -> Option<&str> {
        self.po.as_deref()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn shipping(&self) -> Option<&str> {
        self.shipping.as_deref()
    }

    pub fn tax(&self) -> Option<&str> {
        self.tax.as_deref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn sheet(&self) -> Option<&str> {
        self.sheet.as_deref()
    }
}

/// (Not shown): Args for the `polog search` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct SearchArgs {
    /// Text to look for, ignoring case. Rows where any searched column contains it are shown.
    query: Option<String>,

    /// Only search this column. Repeat to search several. Defaults to every column.
    #[arg(long = "column")]
    columns: Vec<String>,

    /// How to print the matching rows.
    #[arg(long, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// The sheet to search, instead of the configured one.
    #[arg(long)]
    sheet: Option<String>,
}

impl SearchArgs {
    pub fn new(query: Option<String>, columns: Vec<String>, format: OutputFormat) -> Self {
        Self {
            query,
            columns,
            format,
            sheet: None,
        }
    }

    pub fn query(&self) -> &str {
        self.query.as_deref().unwrap_or_default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn sheet(&self) -> Option<&str> {
        self.sheet.as_deref()
    }
}

/// (Not shown): Args for the `polog backup` command.
#[derive(Debug, Parser, Clone)]
pub struct BackupArgs {
    #[command(subcommand)]
    action: BackupAction,
}

impl BackupArgs {
    pub fn new(action: BackupAction) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &BackupAction {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum BackupAction {
    /// Back up the workbook now.
    Create,
    /// List the backups of the workbook, newest first.
    List,
    /// Replace the workbook with a backup. The current workbook is copied aside first.
    Restore(RestoreArgs),
}

/// (Not shown): Args for the `polog backup restore` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct RestoreArgs {
    /// The backup to restore, by file name or path within the backup directory. Defaults to the
    /// most recent backup.
    file: Option<PathBuf>,
}

impl RestoreArgs {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { file }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

fn default_polog_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("polog"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --polog-home or POLOG_HOME instead of relying on the default \
                polog home directory.",
            );
            PathBuf::from("polog")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
