//! Wire conversions between [`Value`] and Postgres types.
//!
//! Parameters are coerced to whatever type the server inferred for the
//! placeholder, the same way a text-protocol driver lets the server cast a
//! quoted literal. Columns decode into the closest [`Value`] variant.

use crate::value::{Value, format_timestamp};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;
const NUMERIC_MAX_DSCALE: i64 = 0x3FFF;
/// Digits the server accepts before the decimal point.
const NUMERIC_MAX_INT_DIGITS: i64 = 131_072;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    ) || matches!(ty.kind(), Kind::Enum(_))
        || matches!(ty.name(), "citext" | "ltree" | "lquery")
}

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {} to parameter of type {}", value.type_name(), ty).into()
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::INT2 => i16::from(*b).to_sql(ty, out),
                Type::INT4 => i32::from(*b).to_sql(ty, out),
                Type::INT8 => i64::from(*b).to_sql(ty, out),
                _ if is_text(ty) => write_text(if *b { "true" } else { "false" }, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Int(i) => int_to_sql(*i, ty, out).unwrap_or_else(|| Err(mismatch(self, ty))),
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                Type::NUMERIC => write_numeric(&float_text(*f), out),
                _ if is_text(ty) => write_text(&float_text(*f), out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Text(s) | Value::Object(s) => text_to_sql(s, ty, out),
            Value::Timestamp(ts) => match *ty {
                Type::TIMESTAMPTZ => ts.to_sql(ty, out),
                Type::TIMESTAMP => ts.naive_local().to_sql(ty, out),
                Type::DATE => ts.date_naive().to_sql(ty, out),
                _ if is_text(ty) => write_text(&format_timestamp(ts), out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Array(_) => Err(mismatch(self, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(i: i64, ty: &Type, out: &mut BytesMut) -> Option<Result<IsNull, BoxError>> {
    let result = match *ty {
        Type::INT2 => i16::try_from(i)
            .map_err(BoxError::from)
            .and_then(|v| v.to_sql(ty, out)),
        Type::INT4 => i32::try_from(i)
            .map_err(BoxError::from)
            .and_then(|v| v.to_sql(ty, out)),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)
            .map_err(BoxError::from)
            .and_then(|v| v.to_sql(ty, out)),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => write_numeric(&i.to_string(), out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ if is_text(ty) => write_text(&i.to_string(), out),
        _ => return None,
    };
    Some(result)
}

fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => parse_bool(s)?.to_sql(ty, out),
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::OID => s.trim().parse::<u32>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => write_numeric(s.trim(), out),
        Type::TIMESTAMPTZ => parse_timestamptz(s)?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(s)?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s.trim())?.to_sql(ty, out),
        Type::JSON => write_text(s, out),
        Type::JSONB => {
            out.put_u8(1);
            write_text(s, out)
        }
        _ if is_text(ty) => write_text(s, out),
        _ => Err(format!("cannot bind string to parameter of type {ty}").into()),
    }
}

fn write_text(s: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    out.put_slice(s.as_bytes());
    Ok(IsNull::No)
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        other => Err(format!("invalid boolean literal {other:?}").into()),
    }
}

fn parse_timestamptz(s: &str) -> Result<DateTime<FixedOffset>, BoxError> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map_err(|e| format!("invalid timestamp {s:?}: {e}").into())
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| format!("invalid timestamp {s:?}").into())
}

/// Encode decimal text (`-12.50`, `1e3`, `NaN`) as binary NUMERIC.
pub(crate) fn write_numeric(text: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let special = match text {
        "NaN" => Some(NUMERIC_NAN),
        "Infinity" | "+Infinity" => Some(NUMERIC_PINF),
        "-Infinity" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(IsNull::No);
    }

    let invalid = || -> BoxError { format!("invalid numeric literal {text:?}").into() };

    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(pos) => (
            &unsigned[..pos],
            unsigned[pos + 1..].parse::<i32>().map_err(|_| invalid())?,
        ),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    // All digits with the decimal point `point` digits from the left.
    let digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes())
        .map(|b| b - b'0')
        .collect();
    let point = int_part.len() as i64 + i64::from(exponent);
    let dscale = (digits.len() as i64 - point).max(0);
    if dscale > NUMERIC_MAX_DSCALE || point > NUMERIC_MAX_INT_DIGITS {
        return Err(invalid());
    }

    // Left-pad so the point falls on a 4-digit group boundary.
    let lead = (4 - point.rem_euclid(4)) % 4;
    let int_groups = (point + lead) / 4;
    let mut padded: Vec<u8> = std::iter::repeat_n(0, lead as usize)
        .chain(digits.iter().copied())
        .collect();
    if (padded.len() as i64) < lead + point {
        padded.resize((lead + point) as usize, 0);
    }
    while padded.len() % 4 != 0 {
        padded.push(0);
    }

    let mut groups: Vec<i16> = padded
        .chunks(4)
        .map(|c| c.iter().fold(0_i16, |acc, d| acc * 10 + i16::from(*d)))
        .collect();
    let mut weight = int_groups - 1;
    let leading_zeros = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading_zeros);
    weight -= leading_zeros as i64;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    let weight = i16::try_from(weight).map_err(|_| invalid())?;
    let ndigits = i16::try_from(groups.len()).map_err(|_| invalid())?;
    out.put_i16(ndigits);
    out.put_i16(weight);
    out.put_u16(if negative && !groups.is_empty() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    });
    out.put_u16(dscale as u16);
    for group in groups {
        out.put_i16(group);
    }
    Ok(IsNull::No)
}

/// Decode binary NUMERIC into decimal text.
pub(crate) fn read_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let header = |i: usize| -> Result<[u8; 2], BoxError> {
        raw.get(i..i + 2)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| "truncated numeric value".into())
    };
    let ndigits = i16::from_be_bytes(header(0)?);
    let weight = i16::from_be_bytes(header(2)?);
    let sign = u16::from_be_bytes(header(4)?);
    let dscale = u16::from_be_bytes(header(6)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{other:04x}").into()),
    }

    let groups = (0..usize::try_from(ndigits).map_err(|_| "negative numeric digit count")?)
        .map(|i| header(8 + i * 2).map(i16::from_be_bytes))
        .collect::<Result<Vec<i16>, BoxError>>()?;
    let group_at = |idx: i64| -> i16 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| groups.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG && !groups.is_empty() {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group_at(0).to_string());
        for idx in 1..=i64::from(weight) {
            text.push_str(&format!("{:04}", group_at(idx)));
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(usize::from(dscale) + 4);
        let mut idx = i64::from(weight) + 1;
        while frac.len() < usize::from(dscale) {
            frac.push_str(&format!("{:04}", group_at(idx)));
            idx += 1;
        }
        frac.truncate(usize::from(dscale));
        text.push('.');
        text.push_str(&frac);
    }
    Ok(text)
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::OID => Value::Int(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Text(read_numeric(raw)?),
            Type::TIMESTAMPTZ => Value::Timestamp(DateTime::<FixedOffset>::from_sql(ty, raw)?),
            Type::TIMESTAMP => {
                Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc().fixed_offset())
            }
            Type::DATE => Value::object(NaiveDate::from_sql(ty, raw)?),
            Type::UUID => Value::object(uuid::Uuid::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::object(serde_json::Value::from_sql(ty, raw)?),
            _ if is_text(ty) => Value::Text(std::str::from_utf8(raw)?.to_string()),
            _ => return Err(format!("unsupported column type {ty}").into()),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
