//! Exact decimal handling for meter values.
//!
//! Decimals are written as JSON strings in plain notation so the digit
//! sequence (trailing zeros included) survives any downstream JSON parser.
//! Input may be a JSON string or a JSON number; numbers are read from their
//! original text, which requires `serde_json`'s `arbitrary_precision`.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

/// Source text of a numeric field, exactly as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalText(String);

impl DecimalText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parse into an exact decimal, `None` if the text is not a decimal.
    pub fn parse(&self) -> Option<BigDecimal> {
        parse(&self.0)
    }
}

impl<'de> Deserialize<'de> for DecimalText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(de::Error::custom(format!(
                "expected a decimal string or number, found {other}"
            ))),
        }
    }
}

/// Largest accepted |scale|. Plain-notation text grows linearly with the
/// scale, so an unbounded exponent such as `1e9223372036854775807` cannot be
/// written out.
pub const MAX_SCALE: i64 = 1024;

/// Parse a decimal from text. Surrounding whitespace is ignored; empty text,
/// `NaN`, infinities and values with |scale| above [`MAX_SCALE`] are rejected.
pub fn parse(text: &str) -> Option<BigDecimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value = BigDecimal::from_str(trimmed).ok()?;
    let (_, scale) = value.as_bigint_and_exponent();
    if scale.unsigned_abs() > MAX_SCALE.unsigned_abs() {
        return None;
    }
    Some(value)
}

/// Plain-notation text of a decimal, never scientific.
pub fn to_text(value: &BigDecimal) -> String {
    value.to_plain_string()
}

/// `#[serde(with = "decimal::option")]` for `Option<BigDecimal>` fields.
pub mod option {
    use bigdecimal::BigDecimal;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::DecimalText;

    pub fn serialize<S: Serializer>(
        value: &Option<BigDecimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_str(&super::to_text(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BigDecimal>, D::Error> {
        let text: Option<DecimalText> = Option::deserialize(deserializer)?;
        text.map(|t| {
            t.parse()
                .ok_or_else(|| de::Error::custom(format!("invalid decimal '{}'", t.as_str())))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_scale() {
        let d = parse("1234.5670").expect("valid decimal");
        assert_eq!(to_text(&d), "1234.5670");
    }

    #[test]
    fn parse_expands_exponent_to_plain_text() {
        let d = parse("1.5e3").expect("valid decimal");
        assert_eq!(to_text(&d), "1500");
        let small = parse("25e-4").expect("valid decimal");
        assert_eq!(to_text(&small), "0.0025");
    }

    #[test]
    fn parse_rejects_non_numbers() {
        assert!(parse("").is_none());
        assert!(parse("   ").is_none());
        assert!(parse("abc").is_none());
        assert!(parse("NaN").is_none());
        assert!(parse("1.2.3").is_none());
    }

    #[test]
    fn parse_bounds_scale() {
        assert!(parse("1e1024").is_some());
        assert!(parse("1e-1024").is_some());
        assert!(parse("1e1025").is_none());
        assert!(parse("1e-1025").is_none());
        assert!(parse("1e9223372036854775807").is_none());
        assert!(parse("1e-9223372036854775807").is_none());
    }

    #[test]
    fn decimal_text_reads_json_number_verbatim() {
        let text: DecimalText = serde_json::from_str("0.1000000000000000055511151231257827")
            .expect("number deserializes");
        assert_eq!(text.as_str(), "0.1000000000000000055511151231257827");
    }

    #[test]
    fn decimal_text_rejects_booleans() {
        let res: Result<DecimalText, _> = serde_json::from_str("true");
        assert!(res.is_err());
    }
}
