//! A purchase order as it is entered, and its expansion into worksheet rows.
//!
//! One purchase order becomes one row per line item. The order-level fields (PO number, date,
//! vendor, ...) are written on the first row only, shipping and tax get rows of their own, and the
//! grand total goes on the last row. This mirrors how the PO log workbook has always been kept by
//! hand.

use crate::error;
use crate::model::headers::REASON_FOR_PURCHASE;
use crate::model::{Amount, Headers, Record, Table, Value};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const PO_NUMBER: &str = "PO Number";
pub const DATE: &str = "Date";
pub const VENDOR: &str = "Vendor/Store";
pub const DEPARTMENT: &str = "Department";
pub const LOCATION: &str = "Location";
pub const ITEM: &str = "Items Being Purchased";
pub const PRICE: &str = "Price Per Item";
pub const QUANTITY: &str = "Quantity";
pub const SUB_TOTAL: &str = "Sub Total";
pub const SHIPPING: &str = "Shipping Cost";
pub const TAX: &str = "Sales Tax";
pub const GRAND_TOTAL: &str = "Grand Total";

/// The item text on the row that carries the shipping charge.
const SHIPPING_ROW: &str = "Shipping Cost";
/// The item text on the row that carries the sales tax.
const TAX_ROW: &str = "Tax";

/// One line of a purchase order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub item: String,
    pub price: Amount,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(item: impl Into<String>, price: Amount, quantity: u32) -> Self {
        Self {
            item: item.into(),
            price,
            quantity: quantity.max(1),
        }
    }

    /// `price × quantity`, to the cent.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if the result is too large to represent.
    pub fn sub_total(&self) -> Result<Amount> {
        self.price.checked_mul(self.quantity).ok_or_else(|| {
            error::validation(format!("The total for '{}' is too large.", self.item))
        })
    }
}

/// Parses `NAME;PRICE[;QTY]`, e.g. `USB-C Dock;$129.99;2`. A missing, zero or unparseable
/// quantity is 1, matching how the entry form treats it.
impl FromStr for LineItem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';').map(str::trim);
        let item = parts.next().unwrap_or_default().to_string();
        let price = parts
            .next()
            .map(Amount::from_str)
            .transpose()
            .map_err(|e| error::validation(format!("Line item '{s}': {e}")))?
            .unwrap_or(Amount::ZERO);
        let quantity = parts
            .next()
            .and_then(|q| q.parse::<f64>().ok())
            .map(|q| q.round())
            .filter(|q| *q >= 1.0 && *q <= u32::MAX as f64)
            .map_or(1, |q| q as u32);
        if parts.next().is_some() {
            return Err(error::validation(format!(
                "Line item '{s}' should look like NAME;PRICE;QTY"
            )));
        }
        let line = LineItem::new(item, price, quantity);
        line.sub_total()?;
        Ok(line)
    }
}

impl Display for LineItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x{} @ {}", self.item, self.quantity, self.price)
    }
}

/// A purchase order as entered by the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurchaseOrder {
    pub po_number: Option<String>,
    pub date: Option<NaiveDate>,
    pub vendor: String,
    pub department: String,
    pub location: String,
    pub items: Vec<LineItem>,
    pub shipping: Amount,
    pub tax: Amount,
    pub reason: String,
    /// Additional `(header, value)` pairs written on the first row.
    pub extra: Vec<(String, String)>,
}

impl PurchaseOrder {
    /// Lines with neither an item name nor a price are treated as unused form rows.
    fn used_items(&self) -> impl Iterator<Item = &LineItem> {
        self.items
            .iter()
            .filter(|line| !line.item.trim().is_empty() || !line.price.is_zero())
    }

    /// Checks the fields the user must fill in.
    ///
    /// # Errors
    /// - `ErrorType::Validation` naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        if self.vendor.trim().is_empty() {
            return Err(error::validation(format!("{VENDOR} is required.")));
        }
        for (ix, line) in self.items.iter().enumerate() {
            if line.item.trim().is_empty() && !line.price.is_zero() {
                return Err(error::validation(format!(
                    "Line {} is missing an item name.",
                    ix + 1
                )));
            }
        }
        if self.used_items().next().is_none() {
            return Err(error::validation(
                "Add at least one item line before saving.",
            ));
        }
        self.grand_total()?;
        Ok(())
    }

    /// Sum of the line sub totals plus shipping and tax.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if a line total or the sum is too large to represent.
    pub fn grand_total(&self) -> Result<Amount> {
        let sub_totals = self
            .used_items()
            .map(LineItem::sub_total)
            .collect::<Result<Vec<_>>>()?;
        sub_totals
            .into_iter()
            .chain([self.shipping, self.tax])
            .try_fold(Amount::ZERO, Amount::checked_add)
            .ok_or_else(|| error::validation("The grand total is too large."))
    }

    /// Expands the order into worksheet rows using the header names in `fields`. The order must
    /// have a PO number by now.
    pub fn to_records(&self, fields: &FieldMap) -> Result<Vec<Record>> {
        self.validate()?;
        let po_number = self
            .po_number
            .as_deref()
            .filter(|po| !po.trim().is_empty())
            .context("The purchase order has no PO number")?;
        let date = self
            .date
            .unwrap_or_else(|| chrono::Local::now().date_naive());

        let mut records = Vec::new();
        for (ix, line) in self.used_items().enumerate() {
            let mut record = Record::new();
            if ix == 0 {
                record.set(fields.get(PO_NUMBER), po_number);
                record.set(fields.get(DATE), date);
                record.set(fields.get(VENDOR), self.vendor.as_str());
                fields.set_department_location(&mut record, &self.department, &self.location);
                if !self.reason.trim().is_empty() {
                    record.set(fields.get(REASON_FOR_PURCHASE), self.reason.as_str());
                }
                for (header, value) in &self.extra {
                    record.set(header.as_str(), Value::parse(value));
                }
            }
            record.set(fields.get(ITEM), line.item.trim());
            record.set(fields.get(PRICE), line.price.to_f64());
            record.set(fields.get(QUANTITY), f64::from(line.quantity));
            record.set(fields.get(SUB_TOTAL), line.sub_total()?.to_f64());
            records.push(record);
        }

        for (label, amount, column) in [
            (SHIPPING_ROW, self.shipping, SHIPPING),
            (TAX_ROW, self.tax, TAX),
        ] {
            if amount.is_positive() {
                let mut record = Record::new()
                    .with(fields.get(ITEM), label)
                    .with(fields.get(PRICE), amount.to_f64())
                    .with(fields.get(QUANTITY), 1.0)
                    .with(fields.get(SUB_TOTAL), amount.to_f64());
                if let Some(header) = fields.get_existing(column) {
                    record.set(header, amount.to_f64());
                }
                records.push(record);
            }
        }

        if let Some(last) = records.last_mut() {
            last.set(fields.get(GRAND_TOTAL), self.grand_total()?.to_f64());
        }
        Ok(records)
    }
}

/// Maps the canonical PO fields onto the headers actually present in a sheet, so that older
/// sheets with headers such as `PO #`, `Vendor`, `Item` or `QTY` are written in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    pairs: Vec<(&'static str, String)>,
    /// A single column that holds both department and location, e.g. `Department/Loc`.
    combined_department_location: Option<String>,
}

const ALIASES: &[(&str, &[&str])] = &[
    (PO_NUMBER, &["PO Number", "PO#", "PO #", "PO"]),
    (DATE, &["Date"]),
    (VENDOR, &["Vendor/Store", "Vendor"]),
    (DEPARTMENT, &["Department", "Deparment"]),
    (LOCATION, &["Location", "Loc"]),
    (ITEM, &["Items Being Purchased", "Item", "Items"]),
    (PRICE, &["Price Per Item", "Price"]),
    (QUANTITY, &["Quantity", "QTY"]),
    (SUB_TOTAL, &["Sub Total", "Subtotal"]),
    (SHIPPING, &["Shipping Cost", "Shipping"]),
    (TAX, &["Sales Tax", "Tax"]),
    (GRAND_TOTAL, &["Grand Total", "GrandTotal"]),
    (REASON_FOR_PURCHASE, &["Reason for Purchase", "Reason"]),
];

const COMBINED_DEPARTMENT_LOCATION: &[&str] = &["Department/Loc", "Deparment/Loc"];

impl FieldMap {
    /// Resolves each canonical field against `headers`. Fields without a matching header keep
    /// their canonical name and become new columns when written.
    pub fn detect(headers: &Headers) -> Self {
        let pairs = ALIASES
            .iter()
            .filter_map(|(field, aliases)| {
                headers
                    .find_first(aliases)
                    .map(|header| (*field, header.to_string()))
            })
            .collect();
        let combined_department_location = if headers.find_first(&[DEPARTMENT]).is_none()
            && headers.find_first(&[LOCATION, "Loc"]).is_none()
        {
            headers
                .find_first(COMBINED_DEPARTMENT_LOCATION)
                .map(str::to_string)
        } else {
            None
        };
        Self {
            pairs,
            combined_department_location,
        }
    }

    /// The header to write `field` into.
    pub fn get<'a>(&'a self, field: &'a str) -> &'a str {
        self.get_existing(field).unwrap_or(field)
    }

    /// The header for `field` only if the sheet already has one.
    pub fn get_existing(&self, field: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, h)| h.as_str())
    }

    fn set_department_location(&self, record: &mut Record, department: &str, location: &str) {
        let (department, location) = (department.trim(), location.trim());
        match &self.combined_department_location {
            Some(header) => {
                let combined = if department.is_empty() || location.is_empty() {
                    format!("{location}{department}")
                } else if department.eq_ignore_ascii_case(location) {
                    location.to_string()
                } else {
                    format!("{location}/{department}")
                };
                record.set(header.as_str(), combined);
            }
            None => {
                record.set(self.get(DEPARTMENT), department);
                record.set(self.get(LOCATION), location);
            }
        }
    }
}

/// Parses `IT579`, `IT-0579`, `it_579` or `'IT 579` into `579` for the prefix `IT`.
pub fn parse_po_number(value: &str, prefix: &str) -> Option<u64> {
    let upper = value.trim().trim_start_matches('\'').to_uppercase();
    let rest = upper.strip_prefix(&prefix.trim().to_uppercase())?.trim_start();
    let rest = rest
        .strip_prefix(['-', '_', '/'])
        .unwrap_or(rest)
        .trim();
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Every PO sequence number in the PO column of `table`. Sheets without a recognizable PO header
/// are scanned in their first column, where older logs keep the PO number.
pub fn po_sequences(table: &Table, prefix: &str) -> Vec<u64> {
    let fields = FieldMap::detect(table.headers());
    let column = fields
        .get_existing(PO_NUMBER)
        .map(str::to_string)
        .or_else(|| table.headers().get(0).map(str::to_string));
    match column {
        Some(column) => table
            .column(&column)
            .filter_map(|v| parse_po_number(&v.to_string(), prefix))
            .collect(),
        None => Vec::new(),
    }
}

/// The PO number following the largest one in `table`, but never below `<prefix><start>`.
///
/// # Errors
/// - `ErrorType::Validation` if the largest PO number in `table` has no successor.
pub fn next_po_number(table: &Table, prefix: &str, start: u64) -> Result<String> {
    let next = match po_sequences(table, prefix).into_iter().max() {
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| error::validation(format!("PO number {prefix}{max} has no successor.")))?
            .max(start),
        None => start,
    };
    Ok(format!("{prefix}{next}"))
}

/// True if `po_number` is already used in `table`.
pub fn po_number_exists(table: &Table, po_number: &str, prefix: &str) -> bool {
    match parse_po_number(po_number, prefix) {
        Some(seq) => po_sequences(table, prefix).contains(&seq),
        None => table
            .column(FieldMap::detect(table.headers()).get(PO_NUMBER))
            .any(|v| v.to_string().eq_ignore_ascii_case(po_number.trim())),
    }
}
