//! Types that represent the core data model: worksheet tables and the purchase orders written
//! into them.
mod amount;
mod headers;
mod order;
mod record;
mod table;
mod value;

pub use amount::{Amount, AmountError};
pub use headers::{
    header_is_id, header_is_timestamp, normalize_token, Headers, DEFAULT_HEADERS,
    DEFAULT_SHEET_NAME, REASON_FOR_PURCHASE, REQUIRED_COLUMNS,
};
pub use order::{
    next_po_number, parse_po_number, po_number_exists, FieldMap, LineItem, PurchaseOrder,
};
pub use record::Record;
pub use table::{Row, Table};
pub use value::Value;
