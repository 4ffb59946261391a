//! Cell values: raw cell text -> typed value, and back.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed cell value.
///
/// Empty cells are `Text("")`, never a separate null variant: an empty config
/// cell means "inherit the column default" and the registry checks for it explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.is_empty())
    }

    /// Equality where `NaN` matches `NaN`, so an unchanged `nan` cell is not
    /// reported as edited on every comparison.
    pub fn same_as(&self, other: &CellValue) -> bool {
        match (self, other) {
            (CellValue::Float(a), CellValue::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    /// Cell text that `coerce` maps back to the same value.
    ///
    /// Floats always keep a `.` or an exponent (`2.0`, not `2`) so they never
    /// come back as integers.
    pub fn to_cell_string(&self) -> String {
        match self {
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => format!("{f:?}"),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell_string())
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

/// Converts period-formatted cell text into a typed value.
///
/// Precedence: empty -> bool literal -> signed decimal integer -> float -> text.
/// No hex/octal/binary, no thousands separators.
pub fn coerce(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::empty();
    }

    if raw.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }

    if is_signed_decimal(raw) {
        // Out-of-range integers stay text rather than degrading into a float.
        return match raw.parse::<i64>() {
            Ok(i) => CellValue::Int(i),
            Err(_) => CellValue::Text(raw.to_string()),
        };
    }

    match raw.parse::<f64>() {
        Ok(f) => CellValue::Float(f),
        Err(_) => CellValue::Text(raw.to_string()),
    }
}

fn is_signed_decimal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Decimal separator used by the table.
///
/// Some spreadsheet locales render `1.5E-3` as `1,5E-3`. With `Comma`, every
/// `,` in a config cell becomes `.` before coercion and every `.` becomes `,`
/// on the way back out. Both directions must be applied or values drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalFormat {
    #[default]
    Period,
    Comma,
}

impl DecimalFormat {
    pub fn from_comma_flag(comma: bool) -> Self {
        if comma {
            DecimalFormat::Comma
        } else {
            DecimalFormat::Period
        }
    }

    /// Raw cell text -> period form.
    pub fn normalize<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        match self {
            DecimalFormat::Comma if raw.contains(',') => Cow::Owned(raw.replace(',', ".")),
            _ => Cow::Borrowed(raw),
        }
    }

    /// Period form -> cell text for this table.
    pub fn localize(&self, text: String) -> String {
        match self {
            DecimalFormat::Comma => text.replace('.', ","),
            DecimalFormat::Period => text,
        }
    }

    /// Normalize then coerce.
    pub fn parse(&self, raw: &str) -> CellValue {
        coerce(&self.normalize(raw))
    }

    /// Render a value as it should be written into a config cell.
    pub fn render(&self, value: &CellValue) -> String {
        self.localize(value.to_cell_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", CellValue::Text(String::new()))]
    #[case("TRUE", CellValue::Bool(true))]
    #[case("True", CellValue::Bool(true))]
    #[case("true", CellValue::Bool(true))]
    #[case("FALSE", CellValue::Bool(false))]
    #[case("False", CellValue::Bool(false))]
    #[case("false", CellValue::Bool(false))]
    #[case("42", CellValue::Int(42))]
    #[case("0", CellValue::Int(0))]
    #[case("-42", CellValue::Int(-42))]
    #[case("0.01", CellValue::Float(0.01))]
    #[case(".01", CellValue::Float(0.01))]
    #[case("0.0", CellValue::Float(0.0))]
    #[case("-0.01", CellValue::Float(-0.01))]
    #[case("-2e-4", CellValue::Float(-2e-4))]
    #[case("-2E-4", CellValue::Float(-2e-4))]
    #[case("Whatever", CellValue::Text("Whatever".to_string()))]
    fn coerce_follows_precedence(#[case] raw: &str, #[case] expected: CellValue) {
        assert_eq!(coerce(raw), expected);
    }

    #[rstest]
    #[case("-")]
    #[case("0x1F")]
    #[case("1,000")]
    #[case("--5")]
    #[case("tru")]
    fn non_numeric_text_is_unchanged(#[case] raw: &str) {
        assert_eq!(coerce(raw), CellValue::Text(raw.to_string()));
    }

    #[test]
    fn integer_overflow_falls_back_to_text() {
        let raw = "99999999999999999999999";
        assert_eq!(coerce(raw), CellValue::Text(raw.to_string()));
    }

    #[rstest]
    #[case(CellValue::Bool(true))]
    #[case(CellValue::Bool(false))]
    #[case(CellValue::Int(-17))]
    #[case(CellValue::Int(i64::MAX))]
    #[case(CellValue::Float(2.0))]
    #[case(CellValue::Float(0.1))]
    #[case(CellValue::Float(-2.5e-3))]
    #[case(CellValue::Float(1e21))]
    fn cell_string_round_trips(#[case] value: CellValue) {
        assert_eq!(coerce(&value.to_cell_string()), value);
    }

    #[test]
    fn nan_is_the_same_as_nan() {
        let nan = CellValue::Float(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.same_as(&CellValue::Float(f64::NAN)));
        assert!(!nan.same_as(&CellValue::Float(0.0)));
        assert!(!CellValue::Int(1).same_as(&CellValue::Float(1.0)));
    }

    #[test]
    fn comma_format_round_trips_through_cells() {
        let fmt = DecimalFormat::Comma;
        assert_eq!(fmt.parse("-2,5E-3"), CellValue::Float(-0.0025));

        let written = fmt.render(&CellValue::Float(0.25));
        assert_eq!(written, "0,25");
        assert_eq!(fmt.parse(&written), CellValue::Float(0.25));
    }

    #[test]
    fn period_format_leaves_commas_alone() {
        let fmt = DecimalFormat::Period;
        assert_eq!(fmt.parse("1,5"), CellValue::Text("1,5".to_string()));
        assert_eq!(fmt.render(&CellValue::Float(1.5)), "1.5");
    }

    #[test]
    fn untagged_serialization_uses_plain_json_values() {
        let json = serde_json::to_value(vec![
            CellValue::Bool(true),
            CellValue::Int(3),
            CellValue::Float(0.5),
            CellValue::from("adam"),
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([true, 3, 0.5, "adam"]));
    }
}
