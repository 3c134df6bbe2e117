use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A single cell of a worksheet.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Blank text counts as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Parses user input the way a spreadsheet would: numbers become `Number`, ISO dates become
    /// `Date` or `DateTime`, and everything else is trimmed text.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Value::Empty;
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT) {
            return Value::DateTime(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
            return Value::Date(d);
        }
        match s.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(s.to_string()),
        }
    }

    /// Collapses a date-time at midnight into a plain date.
    pub fn from_date_time(dt: NaiveDateTime) -> Self {
        if dt.time() == NaiveTime::MIN {
            Value::Date(dt.date())
        } else {
            Value::DateTime(dt)
        }
    }

    /// Integer value of a numeric cell or of text that is all digits.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Value::Text(s) => {
                let s = s.trim();
                if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                    s.parse().ok()
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATE_TIME_FORMAT)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            Value::Empty
        } else {
            Value::Text(value.trim().to_string())
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::from(value.as_str())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Empty.to_string(), "");
        assert_eq!(Value::Number(120.0).to_string(), "120");
        assert_eq!(Value::Number(12.5).to_string(), "12.5");
        let d = NaiveDate::from_ymd_opt(2026, 2, 19).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2026-02-19");
        let dt = d.and_hms_opt(9, 5, 0).unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2026-02-19 09:05");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Value::parse("  "), Value::Empty);
        assert_eq!(Value::parse("42"), Value::Number(42.0));
        assert_eq!(
            Value::parse("2026-02-19"),
            Value::Date(NaiveDate::from_ymd_opt(2026, 2, 19).unwrap())
        );
        assert_eq!(Value::parse(" IT579 "), Value::Text("IT579".into()));
        assert_eq!(Value::parse("NaN"), Value::Text("NaN".into()));
    }

    #[test]
    fn test_from_date_time_midnight() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_eq!(
            Value::from_date_time(d.and_hms_opt(0, 0, 0).unwrap()),
            Value::Date(d)
        );
    }

    #[test]
    fn test_as_integer() {
        assert_eq!(Value::Number(7.0).as_integer(), Some(7));
        assert_eq!(Value::Number(7.5).as_integer(), None);
        assert_eq!(Value::Text(" 12 ".into()).as_integer(), Some(12));
        assert_eq!(Value::Text("IT12".into()).as_integer(), None);
        assert_eq!(Value::Bool(true).as_integer(), None);
    }

    #[test]
    fn test_blank_text_is_empty() {
        assert!(Value::Text("   ".into()).is_empty());
        assert!(!Value::Number(0.0).is_empty());
    }
}
