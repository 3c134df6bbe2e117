use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// The sheet that is created in a new workbook.
pub const DEFAULT_SHEET_NAME: &str = "PO Log";

/// The header row of a new workbook.
pub const DEFAULT_HEADERS: &[&str] = &[
    "PO Number",
    "Date",
    "Vendor/Store",
    "Department",
    "Location",
    "Items Being Purchased",
    "Price Per Item",
    "Quantity",
    "Sub Total",
    "Shipping Cost",
    "Sales Tax",
    "Grand Total",
];

/// The column holding the free-text justification for a purchase.
pub const REASON_FOR_PURCHASE: &str = "Reason for Purchase";

/// Columns that every saved table must have.
pub const REQUIRED_COLUMNS: &[&str] = &[REASON_FOR_PURCHASE];

/// The ordered column names of a table, with a case-sensitive index for lookups.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Headers {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Headers {
    /// Builds headers from a raw header row. Blank cells become `Column N` and duplicates get a
    /// numeric suffix, so the result is always unique.
    pub fn sanitize<S, I>(raw: I) -> Self
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S>,
    {
        let mut headers = Headers::default();
        for (ix, value) in raw.into_iter().enumerate() {
            let mut header = value.as_ref().trim().to_string();
            if header.is_empty() {
                header = format!("Column {}", ix + 1);
            }
            let base = header.clone();
            let mut suffix = 2;
            while headers.contains(&header) {
                header = format!("{base} ({suffix})");
                suffix += 1;
            }
            headers.push(header);
        }
        headers
    }

    /// The default header row for a new sheet.
    pub fn default_layout() -> Self {
        Self::sanitize(DEFAULT_HEADERS)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, ix: usize) -> Option<&str> {
        self.names.get(ix).map(String::as_str)
    }

    pub fn contains(&self, header: &str) -> bool {
        self.index.contains_key(header)
    }

    pub fn position(&self, header: &str) -> Option<usize> {
        self.index.get(header).copied()
    }

    /// Case-insensitive presence check.
    pub fn contains_ignore_case(&self, header: &str) -> bool {
        let wanted = header.to_lowercase();
        self.names.iter().any(|h| h.to_lowercase() == wanted)
    }

    /// Appends `header` and returns its index. Existing headers are not duplicated.
    pub fn push(&mut self, header: impl Into<String>) -> usize {
        let header = header.into();
        if let Some(ix) = self.position(&header) {
            return ix;
        }
        let ix = self.names.len();
        self.index.insert(header.clone(), ix);
        self.names.push(header);
        ix
    }

    /// The first header whose normalized form matches one of `aliases`.
    pub fn find_first(&self, aliases: &[&str]) -> Option<&str> {
        let tokens: Vec<String> = aliases.iter().map(|a| normalize_token(a)).collect();
        self.names
            .iter()
            .find(|h| tokens.contains(&normalize_token(h)))
            .map(String::as_str)
    }
}

impl Serialize for Headers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.names.len()))?;
        for name in &self.names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

/// Lowercases and strips everything but ASCII letters and digits, so that `PO #`, `PO#` and
/// `po` compare equal modulo the `#`.
pub fn normalize_token(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Columns whose blank cells receive the next sequential number on a single-row append.
pub fn header_is_id(header: &str) -> bool {
    let lowered = header.to_lowercase();
    [" id", "id ", "po number", "po #", "po#", "record number"]
        .iter()
        .any(|token| lowered.contains(token))
        || lowered == "id"
        || lowered == "po"
}

/// Columns whose blank cells are stamped with the current time on append.
pub fn header_is_timestamp(header: &str) -> bool {
    let lowered = header.to_lowercase();
    ["created", "timestamp", "entered", "entry"]
        .iter()
        .any(|token| lowered.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_blank_and_duplicates() {
        let headers = Headers::sanitize(["Vendor", "", "Vendor", " Vendor ", "Total"]);
        assert_eq!(
            headers.names(),
            &["Vendor", "Column 2", "Vendor (2)", "Vendor (3)", "Total"]
        );
        assert_eq!(headers.position("Vendor (3)"), Some(3));
    }

    #[test]
    fn test_default_layout() {
        let headers = Headers::default_layout();
        assert_eq!(headers.len(), DEFAULT_HEADERS.len());
        assert_eq!(headers.get(0), Some("PO Number"));
        assert!(!headers.contains_ignore_case(REASON_FOR_PURCHASE));
    }

    #[test]
    fn test_push_does_not_duplicate() {
        let mut headers = Headers::sanitize(["A"]);
        assert_eq!(headers.push("B"), 1);
        assert_eq!(headers.push("A"), 0);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_find_first_by_alias() {
        let headers = Headers::sanitize(["PO #", "Vendor", "QTY"]);
        assert_eq!(headers.find_first(&["PO Number", "PO#"]), Some("PO #"));
        assert_eq!(headers.find_first(&["Quantity", "Qty"]), Some("QTY"));
        assert_eq!(headers.find_first(&["Location"]), None);
    }

    #[test]
    fn test_header_kinds() {
        assert!(header_is_id("PO Number"));
        assert!(header_is_id("Record ID"));
        assert!(header_is_id("id"));
        assert!(!header_is_id("Vendor/Store"));
        assert!(header_is_timestamp("Created At"));
        assert!(header_is_timestamp("Date Entered"));
        assert!(!header_is_timestamp("Date"));
    }
}
