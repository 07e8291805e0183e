//! PostgreSQL row values to JSON document fields.

use anyhow::{anyhow, Result};
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;
use tracing::warn;

/// Convert column `index` of `row` to a JSON value.
///
/// Timestamps become RFC 3339 strings in UTC, dates `YYYY-MM-DD`, `bytea`
/// standard base64. Types without a dedicated conversion are read as text.
/// NUMERIC values `Decimal` cannot hold are decoded from the wire format.
pub fn convert_postgres_value(row: &Row, index: usize) -> Result<Value> {
    let column = &row.columns()[index];
    let pg_type = column.type_();

    let value = match *pg_type {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)?
            .map(|i| Value::from(i64::from(i))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)?
            .map(|i| Value::from(i64::from(i))),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.map(Value::from),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)?
            .map(|f| float_to_json(f64::from(f))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(float_to_json),
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(index) {
            Ok(decimal) => decimal.map(decimal_to_json),
            // NaN, infinities and more than 28 significant digits
            Err(_) => row
                .try_get::<_, Option<PgNumeric>>(index)
                .map_err(|e| anyhow!("NUMERIC conversion failed for {}: {e}", column.name()))?
                .map(PgNumeric::into_json),
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(index)?.map(Value::String)
        }
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(|ts| timestamp_to_json(DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc))),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(timestamp_to_json),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(index)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(index)?
            .map(|t| Value::String(t.to_string())),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(index)?,
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(index)?
            .map(|u| Value::String(u.to_string())),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(index)?
            .map(|bytes| Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => row
            .try_get::<_, Option<Vec<Option<String>>>>(index)?
            .map(|items| {
                Value::Array(
                    items
                        .into_iter()
                        .map(|s| s.map(Value::String).unwrap_or(Value::Null))
                        .collect(),
                )
            }),
        Type::INT4_ARRAY => row
            .try_get::<_, Option<Vec<Option<i32>>>>(index)?
            .map(|items| Value::Array(items.into_iter().map(|i| json_or_null(i.map(i64::from))).collect())),
        Type::INT8_ARRAY => row
            .try_get::<_, Option<Vec<Option<i64>>>>(index)?
            .map(|items| Value::Array(items.into_iter().map(json_or_null).collect())),
        _ => match row.try_get::<_, Option<String>>(index) {
            Ok(text) => text.map(Value::String),
            Err(_) => {
                return Err(anyhow!(
                    "Unsupported PostgreSQL type {pg_type} in column {}; cast it to text in a view",
                    column.name()
                ))
            }
        },
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Use `result` as the field value, or index the field as null when the
/// column could not be converted. One bad value must not stall the table.
pub fn value_or_null(result: Result<Value>, column: &str, key: &str) -> Value {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("Indexing column {column} of row {key} as null: {e:#}");
            Value::Null
        }
    }
}

/// A NUMERIC read straight from PostgreSQL's binary format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgNumeric {
    /// Exact decimal text, e.g. `-1234.50`.
    Finite(String),
    NaN,
    Infinity,
    NegativeInfinity,
}

impl PgNumeric {
    /// Like [`decimal_to_json`]; NaN and the infinities have no JSON form.
    pub fn into_json(self) -> Value {
        match self {
            PgNumeric::Finite(text) => text
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(text)),
            PgNumeric::NaN | PgNumeric::Infinity | PgNumeric::NegativeInfinity => Value::Null,
        }
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

impl<'a> FromSql<'a> for PgNumeric {
    /// Layout: `ndigits`, `weight`, `sign`, `dscale`, then `ndigits` base-10000
    /// digits, all 16-bit big-endian. Digit `i` is worth `10000^(weight - i)`.
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let word = |i: usize| -> std::result::Result<u16, Box<dyn std::error::Error + Sync + Send>> {
            raw.get(i * 2..i * 2 + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| "truncated NUMERIC value".into())
        };
        let ndigits = usize::from(word(0)?);
        let weight = i32::from(word(1)? as i16);
        let sign = word(2)?;
        let dscale = usize::from(word(3)?);

        match sign {
            NUMERIC_NAN => return Ok(PgNumeric::NaN),
            NUMERIC_PINF => return Ok(PgNumeric::Infinity),
            NUMERIC_NINF => return Ok(PgNumeric::NegativeInfinity),
            NUMERIC_POS | NUMERIC_NEG => {}
            other => return Err(format!("invalid NUMERIC sign {other:#06x}").into()),
        }
        let digits = (0..ndigits)
            .map(|i| word(4 + i))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let digit_at = |exponent: i32| -> u16 {
            usize::try_from(weight - exponent)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0)
        };

        let mut text = String::new();
        if sign == NUMERIC_NEG {
            text.push('-');
        }
        if weight < 0 {
            text.push('0');
        } else {
            text.push_str(&digit_at(weight).to_string());
            for exponent in (0..weight).rev() {
                text.push_str(&format!("{:04}", digit_at(exponent)));
            }
        }
        if dscale > 0 {
            let mut fraction = String::with_capacity(dscale + 4);
            let mut exponent = -1;
            while fraction.len() < dscale {
                fraction.push_str(&format!("{:04}", digit_at(exponent)));
                exponent -= 1;
            }
            fraction.truncate(dscale);
            text.push('.');
            text.push_str(&fraction);
        }
        Ok(PgNumeric::Finite(text))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// NUMERIC values are indexed as `double`; values beyond `f64` fall back
/// to their exact text form.
pub fn decimal_to_json(decimal: Decimal) -> Value {
    if decimal.scale() == 0 {
        if let Some(i) = decimal.to_i64() {
            return Value::from(i);
        }
    }
    match decimal.to_f64().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(decimal.to_string()),
    }
}

fn float_to_json(f: f64) -> Value {
    // NaN and infinities have no JSON form
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn timestamp_to_json(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn json_or_null(i: Option<i64>) -> Value {
    i.map(Value::from).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_decimal_integers_stay_integers() {
        assert_eq!(decimal_to_json(Decimal::from(42)), Value::from(42));
        assert_eq!(decimal_to_json(Decimal::from(-7)), Value::from(-7));
    }

    #[test]
    fn test_decimal_fractions_become_doubles() {
        let value = decimal_to_json(Decimal::from_str("1234.56").unwrap());
        assert_eq!(value.as_f64(), Some(1234.56));
    }

    #[test]
    fn test_float_edge_values() {
        assert_eq!(float_to_json(f64::NAN), Value::Null);
        assert_eq!(float_to_json(f64::INFINITY), Value::Null);
        assert_eq!(float_to_json(0.5), Value::from(0.5));
    }

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        for word in [digits.len() as u16, weight as u16, sign, dscale]
            .into_iter()
            .chain(digits.iter().copied())
        {
            raw.extend_from_slice(&word.to_be_bytes());
        }
        raw
    }

    fn decode(raw: &[u8]) -> PgNumeric {
        PgNumeric::from_sql(&Type::NUMERIC, raw).unwrap()
    }

    #[test]
    fn test_numeric_wire_format() {
        let finite = |text: &str| PgNumeric::Finite(text.to_string());
        assert_eq!(decode(&numeric(0, NUMERIC_POS, 1, &[1234, 5000])), finite("1234.5"));
        assert_eq!(decode(&numeric(0, NUMERIC_NEG, 2, &[1234, 5000])), finite("-1234.50"));
        assert_eq!(decode(&numeric(-1, NUMERIC_POS, 4, &[12])), finite("0.0012"));
        assert_eq!(decode(&numeric(-2, NUMERIC_POS, 8, &[12])), finite("0.00000012"));
        assert_eq!(decode(&numeric(2, NUMERIC_POS, 0, &[1])), finite("100000000"));
        assert_eq!(decode(&numeric(0, NUMERIC_POS, 0, &[])), finite("0"));
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &[0, 1]).is_err());
    }

    #[test]
    fn test_numeric_beyond_decimal_range() {
        // 10^40 has more digits than rust_decimal can hold
        let huge = decode(&numeric(10, NUMERIC_POS, 0, &[1]));
        assert_eq!(huge, PgNumeric::Finite(format!("1{}", "0".repeat(40))));
        assert_eq!(huge.into_json(), Value::from(1e40));
    }

    #[test]
    fn test_numeric_special_values_become_null() {
        for (sign, expected) in [
            (NUMERIC_NAN, PgNumeric::NaN),
            (NUMERIC_PINF, PgNumeric::Infinity),
            (NUMERIC_NINF, PgNumeric::NegativeInfinity),
        ] {
            let value = decode(&numeric(0, sign, 0, &[]));
            assert_eq!(value, expected);
            assert_eq!(value.into_json(), Value::Null);
        }
    }

    #[test]
    fn test_unconvertible_value_is_indexed_as_null() {
        assert_eq!(
            value_or_null(Err(anyhow!("Unsupported PostgreSQL type point")), "location", "7"),
            Value::Null
        );
        assert_eq!(value_or_null(Ok(Value::from(3)), "qty", "7"), Value::from(3));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(timestamp_to_json(ts), Value::from("2024-03-01T12:30:00Z"));
    }
}
