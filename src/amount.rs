//! Point amounts are exact decimals end to end. JSON carries them either as
//! strings or as numbers; numbers are re-read from their decimal text, never
//! through a float. serde_json keeps that text with `arbitrary_precision`.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{de, Deserialize, Deserializer, Serializer};
use serde_json::Value;

pub fn parse(text: &str) -> Option<BigDecimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    BigDecimal::from_str(text).ok()
}

fn from_value<E: de::Error>(value: Value) -> Result<BigDecimal, E> {
    let text = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        other => return Err(E::custom(format!("expected decimal amount, got {other}"))),
    };
    parse(&text).ok_or_else(|| E::custom(format!("invalid decimal amount: {text}")))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    from_value(Value::deserialize(deserializer)?)
}

pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => from_value(value).map(Some),
    }
}

pub fn serialize<S>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.normalized().to_string())
}

pub fn serialize_option<S>(value: &Option<BigDecimal>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serialize(value, serializer),
        None => serializer.serialize_none(),
    }
}
