use crate::args::AddArgs;
use crate::backup::BackupInfo;
use crate::commands::Out;
use crate::error::{self, ErrorType, IntoResult};
use crate::model::{
    next_po_number, po_number_exists, Amount, FieldMap, LineItem, PurchaseOrder,
};
use crate::store::{self, Workbook};
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

/// What `add` wrote.
#[derive(Debug, Clone, Serialize)]
pub struct Added {
    pub po_number: String,
    pub sheet: String,
    pub rows: usize,
    pub grand_total: Amount,
    pub backup: BackupInfo,
}

/// Validates the purchase order, appends its rows to the sheet and saves the workbook, which
/// also creates a backup. The workbook is created if it does not exist.
///
/// # Errors
/// - `ErrorType::Validation` if a required field is missing, a line item or amount is malformed,
///   or the PO number is already used.
/// - `ErrorType::Access` if the workbook is open in another program or cannot be written.
pub fn add(config: &Config, args: &AddArgs) -> Result<Out<Added>> {
    add_inner(config, args)
        .context("Unable to add the purchase order")
        .pub_result(ErrorType::Workbook)
}

fn add_inner(config: &Config, args: &AddArgs) -> anyhow::Result<Out<Added>> {
    let mut order = purchase_order(args)?;
    order.validate()?;

    let path = config.workbook_path();
    let sheet = store::resolve_sheet(path, args.sheet().or(config.sheet_name()))?;
    let mut workbook = Workbook::open_or_new(path)?;
    let table = workbook.table_mut(&sheet);

    let prefix = config.po_prefix();
    let po_number = match args.po().map(str::trim).filter(|po| !po.is_empty()) {
        Some(po) => {
            if po_number_exists(table, po, prefix) {
                return Err(error::validation(format!(
                    "PO number {po} is already used in sheet '{sheet}'."
                )));
            }
            po.to_string()
        }
        None => next_po_number(table, prefix, config.po_start())?,
    };
    debug!("Using PO number {po_number}");
    order.po_number = Some(po_number.clone());

    let fields = FieldMap::detect(table.headers());
    let records = order.to_records(&fields)?;
    let rows = records.len();
    table.append_all(records, &[])?;

    let backup = store::save(&mut workbook, &config.backup())?;
    let added = Added {
        po_number,
        sheet,
        rows,
        grand_total: order.grand_total()?,
        backup,
    };
    Ok(Out::new(
        format!(
            "Saved {} to sheet '{}' ({} rows, grand total {}). Backup: {}",
            added.po_number,
            added.sheet,
            added.rows,
            added.grand_total,
            added.backup.path.display()
        ),
        added,
    ))
}

fn purchase_order(args: &AddArgs) -> anyhow::Result<PurchaseOrder> {
    let items = args
        .items()
        .iter()
        .map(|s| LineItem::from_str(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let extra = args
        .fields()
        .iter()
        .map(|f| parse_field(f))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(PurchaseOrder {
        po_number: None,
        date: args.date(),
        vendor: args.vendor().trim().to_string(),
        department: args.department().unwrap_or_default().to_string(),
        location: args.location().unwrap_or_default().to_string(),
        items,
        shipping: parse_amount("Shipping", args.shipping())?,
        tax: parse_amount("Tax", args.tax())?,
        reason: args.reason().unwrap_or_default().to_string(),
        extra,
    })
}

fn parse_amount(name: &str, value: Option<&str>) -> anyhow::Result<Amount> {
    let amount = value
        .map(Amount::from_str)
        .transpose()
        .map_err(|e| error::validation(format!("{name}: {e}")))?
        .unwrap_or(Amount::ZERO);
    if amount < Amount::ZERO {
        return Err(error::validation(format!("{name} cannot be negative.")));
    }
    Ok(amount)
}

/// Parses `Header=Value`.
fn parse_field(field: &str) -> anyhow::Result<(String, String)> {
    match field.split_once('=') {
        Some((header, value)) if !header.trim().is_empty() => {
            Ok((header.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(error::validation(format!(
            "'{field}' should look like Header=Value"
        ))),
    }
}
